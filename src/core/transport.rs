//! HTTP client for the remote chat service, plus the channel-backed service
//! that runs transport calls off the UI loop.
//!
//! Every operation maps one REST endpoint. Failures are classified into a
//! small taxonomy the UI can render directly; a user-initiated cancellation
//! is part of that taxonomy but is not a fault. The transport never retries.

use std::fmt;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::api::{
    ClearResponse, DeleteResponse, HistoryEntry, HistoryResponse, ModelsResponse, SendForm,
    SendResponse, TokenUsage,
};
use crate::utils::url::construct_api_url;

#[derive(Debug)]
pub enum TransportError {
    /// The caller cancelled the request. Rendered as a notice, not an error.
    Cancelled,
    /// The service refused the content (safety filter).
    ContentFiltered(String),
    NotFound,
    /// The service reported a failure of its own.
    Api(String),
    /// The request never completed.
    Http(reqwest::Error),
}

impl TransportError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransportError::Cancelled)
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Cancelled => write!(f, "Response cancelled by user"),
            TransportError::ContentFiltered(msg) => write!(f, "{msg}"),
            TransportError::NotFound => write!(f, "The requested resource was not found."),
            TransportError::Api(msg) => write!(f, "{msg}"),
            TransportError::Http(err) => {
                write!(f, "An error occurred while processing your request: {err}")
            }
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::Http(err) => Some(err),
            _ => None,
        }
    }
}

/// Map a response status and the service's `error` field (when present) to
/// the error taxonomy.
fn classify(status: reqwest::StatusCode, error: Option<String>) -> TransportError {
    if let Some(msg) = &error {
        if msg.contains("RECITATION") {
            return TransportError::ContentFiltered(
                "Response was filtered for safety reasons. Please try rephrasing your message."
                    .to_string(),
            );
        }
    }
    match status {
        reqwest::StatusCode::FORBIDDEN => TransportError::ContentFiltered(
            "Message was filtered due to content safety policies.".to_string(),
        ),
        reqwest::StatusCode::NOT_FOUND => TransportError::NotFound,
        _ => TransportError::Api(
            error.unwrap_or_else(|| format!("Request failed with status {status}")),
        ),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SendReply {
    pub text: String,
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub pair_removed: bool,
    pub total_tokens: u64,
    pub remaining_messages: u64,
}

#[derive(Debug, Clone)]
pub struct HistorySnapshot {
    pub entries: Vec<HistoryEntry>,
    pub tokens: u64,
}

#[derive(Clone)]
pub struct ChatTransport {
    client: reqwest::Client,
    base_url: String,
}

impl ChatTransport {
    pub fn new(base_url: &str) -> Self {
        ChatTransport {
            client: reqwest::Client::new(),
            base_url: crate::utils::url::normalize_base_url(base_url),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a user message and wait for the assistant's reply. The request
    /// races `cancel`; a fired token resolves to [`TransportError::Cancelled`]
    /// and the response, if it ever arrives, is dropped on the floor.
    pub async fn send_message(
        &self,
        chat_id: &str,
        model: &str,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<SendReply, TransportError> {
        tokio::select! {
            result = self.send_inner(chat_id, model, message) => result,
            _ = cancel.cancelled() => Err(TransportError::Cancelled),
        }
    }

    async fn send_inner(
        &self,
        chat_id: &str,
        model: &str,
        message: &str,
    ) -> Result<SendReply, TransportError> {
        let url = construct_api_url(&self.base_url, "api/chat");
        let form = SendForm {
            message,
            chat_id,
            model,
        };
        let response = self
            .client
            .post(url)
            .form(&form)
            .send()
            .await
            .map_err(TransportError::Http)?;
        let status = response.status();
        let text = response.text().await.map_err(TransportError::Http)?;
        let body: SendResponse = serde_json::from_str(&text).unwrap_or_default();

        if let Some(error) = body.error {
            return Err(classify(status, Some(error)));
        }
        if !status.is_success() {
            return Err(classify(status, None));
        }

        let reply = body
            .response
            .filter(|text| !text.is_empty())
            .ok_or_else(|| TransportError::Api("Invalid response from language model".into()))?;
        let usage = TokenUsage {
            total: body.tokens.map(|t| t.total).unwrap_or_default(),
            context_messages: body.context_messages.unwrap_or_default(),
        };
        tracing::debug!(tokens = usage.total, "assistant reply received");
        Ok(SendReply { text: reply, usage })
    }

    pub async fn delete_message(
        &self,
        chat_id: &str,
        index: usize,
    ) -> Result<DeleteOutcome, TransportError> {
        let url = construct_api_url(&self.base_url, &format!("api/chat/message/{chat_id}/{index}"));
        let response = self
            .client
            .delete(url)
            .send()
            .await
            .map_err(TransportError::Http)?;
        let status = response.status();
        let text = response.text().await.map_err(TransportError::Http)?;
        let body: DeleteResponse = serde_json::from_str(&text).unwrap_or_default();

        if let Some(error) = body.error {
            return Err(classify(status, Some(error)));
        }
        if !status.is_success() || !body.success {
            return Err(classify(status, None));
        }
        Ok(DeleteOutcome {
            pair_removed: body.pair_removed,
            total_tokens: body.total_tokens,
            remaining_messages: body.remaining_messages,
        })
    }

    pub async fn clear(&self, chat_id: &str) -> Result<(), TransportError> {
        let url = construct_api_url(&self.base_url, &format!("api/chat/clear/{chat_id}"));
        let response = self
            .client
            .post(url)
            .send()
            .await
            .map_err(TransportError::Http)?;
        let status = response.status();
        let body: ClearResponse = response.json().await.unwrap_or_default();

        if let Some(error) = body.error {
            return Err(classify(status, Some(error)));
        }
        if !status.is_success() || !body.success {
            return Err(classify(status, None));
        }
        Ok(())
    }

    /// Fetch the server-side history for a session. A 404 is not an error:
    /// it means the id is unknown and the caller should quietly start fresh.
    pub async fn history(&self, chat_id: &str) -> Result<Option<HistorySnapshot>, TransportError> {
        let url = construct_api_url(&self.base_url, &format!("api/chat/history/{chat_id}"));
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(TransportError::Http)?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let text = response.text().await.map_err(TransportError::Http)?;
        let body: HistoryResponse = serde_json::from_str(&text).unwrap_or_default();

        if let Some(error) = body.error {
            return Err(classify(status, Some(error)));
        }
        if !status.is_success() {
            return Err(classify(status, None));
        }
        Ok(Some(HistorySnapshot {
            entries: body.history,
            tokens: body.tokens,
        }))
    }

    /// Fetch the session's export document. Opaque to the client: it is
    /// written to disk verbatim and fed back through `import` unchanged.
    pub async fn export(&self, chat_id: &str) -> Result<Value, TransportError> {
        let url = construct_api_url(&self.base_url, &format!("api/chat/export/{chat_id}"));
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(TransportError::Http)?;
        let status = response.status();
        let document: Value = response.json().await.map_err(TransportError::Http)?;

        if let Some(error) = document.get("error").and_then(Value::as_str) {
            return Err(classify(status, Some(error.to_string())));
        }
        if !status.is_success() {
            return Err(classify(status, None));
        }
        Ok(document)
    }

    pub async fn import(&self, document: &Value) -> Result<(), TransportError> {
        let url = construct_api_url(&self.base_url, "api/chat/import");
        let response = self
            .client
            .post(url)
            .json(document)
            .send()
            .await
            .map_err(TransportError::Http)?;
        let status = response.status();
        let body: ClearResponse = response.json().await.unwrap_or_default();

        if let Some(error) = body.error {
            return Err(classify(status, Some(error)));
        }
        if !status.is_success() || !body.success {
            return Err(classify(status, None));
        }
        Ok(())
    }

    pub async fn fetch_models(&self) -> Result<Vec<String>, TransportError> {
        let url = construct_api_url(&self.base_url, "api/models");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(TransportError::Http)?;
        let status = response.status();
        if !status.is_success() {
            return Err(classify(status, None));
        }
        let body: ModelsResponse = response.json().await.map_err(TransportError::Http)?;
        Ok(body.models)
    }
}

/// Which operation a [`TransportEvent::Failed`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportOp {
    Send,
    Delete,
    Clear,
    History,
    Export,
    Import,
    Models,
}

/// Results delivered back to the UI loop. Paired with the request id that
/// was current when the operation was spawned, so superseded sends are
/// dropped by the receiver.
#[derive(Debug)]
pub enum TransportEvent {
    Reply(SendReply),
    Deleted {
        index: usize,
        outcome: DeleteOutcome,
    },
    Cleared,
    History(Option<HistorySnapshot>),
    Exported(Value),
    Imported {
        id: String,
    },
    Models(Vec<String>),
    Failed {
        op: TransportOp,
        error: TransportError,
    },
}

/// Spawns transport calls as tasks and funnels their results into one
/// channel the UI loop drains between frames.
#[derive(Clone)]
pub struct TransportService {
    tx: mpsc::UnboundedSender<(TransportEvent, u64)>,
}

impl TransportService {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(TransportEvent, u64)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn spawn_send(
        &self,
        transport: ChatTransport,
        chat_id: String,
        model: String,
        message: String,
        cancel: CancellationToken,
        request_id: u64,
    ) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let event = match transport
                .send_message(&chat_id, &model, &message, &cancel)
                .await
            {
                Ok(reply) => TransportEvent::Reply(reply),
                Err(error) => TransportEvent::Failed {
                    op: TransportOp::Send,
                    error,
                },
            };
            let _ = tx.send((event, request_id));
        });
    }

    pub fn spawn_delete(
        &self,
        transport: ChatTransport,
        chat_id: String,
        index: usize,
        request_id: u64,
    ) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let event = match transport.delete_message(&chat_id, index).await {
                Ok(outcome) => TransportEvent::Deleted { index, outcome },
                Err(error) => TransportEvent::Failed {
                    op: TransportOp::Delete,
                    error,
                },
            };
            let _ = tx.send((event, request_id));
        });
    }

    pub fn spawn_clear(&self, transport: ChatTransport, chat_id: String, request_id: u64) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let event = match transport.clear(&chat_id).await {
                Ok(()) => TransportEvent::Cleared,
                Err(error) => TransportEvent::Failed {
                    op: TransportOp::Clear,
                    error,
                },
            };
            let _ = tx.send((event, request_id));
        });
    }

    pub fn spawn_history(&self, transport: ChatTransport, chat_id: String, request_id: u64) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let event = match transport.history(&chat_id).await {
                Ok(snapshot) => TransportEvent::History(snapshot),
                Err(error) => TransportEvent::Failed {
                    op: TransportOp::History,
                    error,
                },
            };
            let _ = tx.send((event, request_id));
        });
    }

    pub fn spawn_export(&self, transport: ChatTransport, chat_id: String, request_id: u64) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let event = match transport.export(&chat_id).await {
                Ok(document) => TransportEvent::Exported(document),
                Err(error) => TransportEvent::Failed {
                    op: TransportOp::Export,
                    error,
                },
            };
            let _ = tx.send((event, request_id));
        });
    }

    pub fn spawn_import(
        &self,
        transport: ChatTransport,
        document: Value,
        id: String,
        request_id: u64,
    ) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let event = match transport.import(&document).await {
                Ok(()) => TransportEvent::Imported { id },
                Err(error) => TransportEvent::Failed {
                    op: TransportOp::Import,
                    error,
                },
            };
            let _ = tx.send((event, request_id));
        });
    }

    pub fn spawn_models(&self, transport: ChatTransport, request_id: u64) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let event = match transport.fetch_models().await {
                Ok(models) => TransportEvent::Models(models),
                Err(error) => TransportEvent::Failed {
                    op: TransportOp::Models,
                    error,
                },
            };
            let _ = tx.send((event, request_id));
        });
    }
}
