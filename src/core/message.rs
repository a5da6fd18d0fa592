use serde::{Deserialize, Serialize};

/// Role of a transcript entry. `User` and `Assistant` round-trip through
/// the remote service; the `App*` roles are client-authored notices that
/// never leave the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TranscriptRole {
    User,
    Assistant,
    AppInfo,
    AppError,
}

impl TranscriptRole {
    pub fn as_str(self) -> &'static str {
        match self {
            TranscriptRole::User => "user",
            TranscriptRole::Assistant => "assistant",
            TranscriptRole::AppInfo => "app/info",
            TranscriptRole::AppError => "app/error",
        }
    }

    pub fn is_user(self) -> bool {
        self == TranscriptRole::User
    }

    pub fn is_assistant(self) -> bool {
        self == TranscriptRole::Assistant
    }

    /// Whether this entry belongs to the remote conversation (as opposed to
    /// a client-side notice).
    pub fn is_conversation(self) -> bool {
        matches!(self, TranscriptRole::User | TranscriptRole::Assistant)
    }
}

impl TryFrom<&str> for TranscriptRole {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "user" => Ok(TranscriptRole::User),
            "assistant" => Ok(TranscriptRole::Assistant),
            "app/info" => Ok(TranscriptRole::AppInfo),
            "app/error" => Ok(TranscriptRole::AppError),
            _ => Err(format!("invalid transcript role: {value}")),
        }
    }
}

impl TryFrom<String> for TranscriptRole {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl From<TranscriptRole> for String {
    fn from(value: TranscriptRole) -> Self {
        value.as_str().to_string()
    }
}

/// One transcript entry. `content` is the raw text as authored: user input
/// before sanitizing, assistant markdown before formatting. Rendering
/// happens at display time so a message survives re-rendering unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: TranscriptRole,
    pub content: String,
}

impl Message {
    pub fn new(role: TranscriptRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(TranscriptRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(TranscriptRole::Assistant, content)
    }

    pub fn app_info(content: impl Into<String>) -> Self {
        Self::new(TranscriptRole::AppInfo, content)
    }

    pub fn app_error(content: impl Into<String>) -> Self {
        Self::new(TranscriptRole::AppError, content)
    }

    pub fn is_user(&self) -> bool {
        self.role.is_user()
    }

    pub fn is_assistant(&self) -> bool {
        self.role.is_assistant()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_roles_exclude_app_notices() {
        assert!(TranscriptRole::User.is_conversation());
        assert!(TranscriptRole::Assistant.is_conversation());
        assert!(!TranscriptRole::AppInfo.is_conversation());
        assert!(!TranscriptRole::AppError.is_conversation());
    }

    #[test]
    fn service_role_strings_round_trip() {
        assert_eq!(TranscriptRole::try_from("user"), Ok(TranscriptRole::User));
        assert_eq!(
            TranscriptRole::try_from("assistant"),
            Ok(TranscriptRole::Assistant)
        );
        assert_eq!(String::from(TranscriptRole::User), "user");
    }

    #[test]
    fn invalid_role_strings_are_rejected() {
        assert!(TranscriptRole::try_from("system").is_err());
    }
}
