//! Wire payloads for the remote chat service.
//!
//! Shapes mirror the service's JSON exactly; everything the client does not
//! interpret stays opaque (notably the export document, of which only the
//! session id is read).

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Serialize, Clone)]
pub struct SendForm<'a> {
    pub message: &'a str,
    #[serde(rename = "chatId")]
    pub chat_id: &'a str,
    pub model: &'a str,
}

/// Per-request token breakdown reported by the service. Only `total` feeds
/// the session counters; the rest is kept for logging.
#[derive(Deserialize, Debug, Clone, Copy, Default)]
pub struct TokenBreakdown {
    #[serde(default)]
    pub message: u64,
    #[serde(default)]
    pub response: u64,
    #[serde(default)]
    pub context: u64,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub prompt: u64,
}

#[derive(Deserialize, Debug, Default)]
pub struct SendResponse {
    pub response: Option<String>,
    #[serde(rename = "chatId")]
    pub chat_id: Option<String>,
    pub model: Option<String>,
    pub tokens: Option<TokenBreakdown>,
    pub context_messages: Option<u64>,
    pub error: Option<String>,
}

/// The summary the core exposes to callers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub total: u64,
    pub context_messages: u64,
}

#[derive(Deserialize, Debug, Default)]
pub struct DeleteResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default)]
    pub remaining_messages: u64,
    #[serde(default)]
    pub pair_removed: bool,
    pub error: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct ClearResponse {
    #[serde(default)]
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u64>,
}

#[derive(Deserialize, Debug, Default)]
pub struct HistoryResponse {
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub tokens: u64,
    pub error: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct ModelsResponse {
    pub models: Vec<String>,
}

/// Pull the session id out of an exported chat document. The rest of the
/// document is opaque to the client and round-trips through import as-is.
pub fn exported_chat_id(document: &Value) -> Option<&str> {
    document.get("id").and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_response_deserializes_service_shape() {
        let payload = r#"{
            "response": "Hello!",
            "chatId": "1714000000000",
            "model": "gemini-2.0-flash",
            "tokens": {"message": 3, "response": 2, "context": 5, "total": 42, "prompt": 9},
            "context_messages": 4
        }"#;
        let reply: SendResponse = serde_json::from_str(payload).expect("send payload");
        assert_eq!(reply.response.as_deref(), Some("Hello!"));
        assert_eq!(reply.tokens.map(|t| t.total), Some(42));
        assert_eq!(reply.context_messages, Some(4));
        assert!(reply.error.is_none());
    }

    #[test]
    fn send_response_surfaces_error_field() {
        let payload = r#"{"error": "Response was filtered for safety reasons."}"#;
        let reply: SendResponse = serde_json::from_str(payload).expect("error payload");
        assert!(reply.response.is_none());
        assert_eq!(
            reply.error.as_deref(),
            Some("Response was filtered for safety reasons.")
        );
    }

    #[test]
    fn delete_response_carries_pairing_info() {
        let payload = r#"{
            "success": true,
            "total_tokens": 17,
            "remaining_messages": 2,
            "pair_removed": true
        }"#;
        let reply: DeleteResponse = serde_json::from_str(payload).expect("delete payload");
        assert!(reply.success);
        assert!(reply.pair_removed);
        assert_eq!(reply.total_tokens, 17);
        assert_eq!(reply.remaining_messages, 2);
    }

    #[test]
    fn history_entries_keep_roles_in_order() {
        let payload = r#"{
            "history": [
                {"role": "user", "content": "hi", "tokens": 1},
                {"role": "assistant", "content": "hello", "tokens": 2}
            ],
            "tokens": 3
        }"#;
        let reply: HistoryResponse = serde_json::from_str(payload).expect("history payload");
        assert_eq!(reply.history.len(), 2);
        assert_eq!(reply.history[0].role, "user");
        assert_eq!(reply.history[1].content, "hello");
        assert_eq!(reply.tokens, 3);
    }

    #[test]
    fn export_document_id_is_read_without_interpreting_the_rest() {
        let document: Value = serde_json::from_str(
            r#"{"id": "1714000000000", "messages": [{"role": "user", "content": "hi"}], "tokens": 1}"#,
        )
        .expect("export document");
        assert_eq!(exported_chat_id(&document), Some("1714000000000"));
        assert_eq!(exported_chat_id(&Value::Null), None);
    }

    #[test]
    fn send_form_serializes_service_field_names() {
        let form = SendForm {
            message: "hi",
            chat_id: "123",
            model: "gemini-2.0-flash",
        };
        let encoded = serde_json::to_value(&form).expect("form value");
        assert_eq!(encoded["chatId"], "123");
        assert_eq!(encoded["message"], "hi");
    }
}
