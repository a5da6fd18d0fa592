use crate::api::TokenUsage;

/// Client-side view of a server-tracked conversation: the opaque session id
/// plus the token counters the service reports back. Created at startup,
/// replaced wholesale on clear, and re-pointed on import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSession {
    id: String,
    usage: TokenUsage,
}

impl ChatSession {
    /// Start a fresh session. Ids are millisecond timestamps, which is what
    /// the service expects from new clients.
    pub fn new() -> Self {
        ChatSession {
            id: chrono::Utc::now().timestamp_millis().to_string(),
            usage: TokenUsage::default(),
        }
    }

    #[cfg(test)]
    pub fn with_id(id: impl Into<String>) -> Self {
        ChatSession {
            id: id.into(),
            usage: TokenUsage::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn usage(&self) -> TokenUsage {
        self.usage
    }

    /// Swap in a fresh id and forget the counters. Used after a clear and
    /// when the server no longer knows the current id.
    pub fn regenerate(&mut self) {
        *self = ChatSession::new();
    }

    /// Point this session at an imported conversation.
    pub fn adopt(&mut self, id: impl Into<String>) {
        self.id = id.into();
        self.usage = TokenUsage::default();
    }

    pub fn apply_usage(&mut self, usage: TokenUsage) {
        self.usage = usage;
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        ChatSession::new()
    }
}
