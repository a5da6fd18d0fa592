//! Controller state for one chat surface.
//!
//! The phase machine replaces the original ad hoc flags: a surface is idle,
//! waiting on the service, or replaying a reply. Every transition is driven
//! by a discrete event (user submit, transport resolved, transport
//! cancelled, animation complete), and in-flight work is owned through a
//! cancellation token plus a monotonically increasing id, so superseded
//! tasks can finish on their own time without touching current state.

use std::collections::VecDeque;

use tokio_util::sync::CancellationToken;

use crate::api::TokenUsage;
use crate::core::message::{Message, TranscriptRole};
use crate::core::session::ChatSession;
use crate::core::transport::{DeleteOutcome, HistorySnapshot, SendReply, TransportError};
use crate::render::animate::AnimationOptions;
use crate::utils::logging::LoggingState;

pub const CANCELLED_NOTICE: &str = "Response cancelled by user";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatPhase {
    Idle,
    Sending { request_id: u64 },
    AnimatingResponse { animation_id: u64 },
}

/// Handed to the caller when a send begins; the token and id travel with
/// the spawned request.
pub struct SendStart {
    pub request_id: u64,
    pub cancel: CancellationToken,
}

/// Handed to the caller when a reply is accepted and its animation should
/// be spawned.
pub struct AnimationStart {
    pub animation_id: u64,
    pub cancel: CancellationToken,
    pub raw: String,
}

pub struct App {
    pub messages: VecDeque<Message>,
    pub input: String,
    pub session: ChatSession,
    pub model: String,
    pub phase: ChatPhase,
    pub scroll_offset: u16,
    pub auto_scroll: bool,
    pub status: Option<String>,
    pub logging: LoggingState,
    pub animation_options: AnimationOptions,
    /// Partially revealed markup of the reply currently being animated.
    /// `None` means the last assistant message renders from its raw content.
    pub animation_frame: Option<String>,
    request_counter: u64,
    animation_counter: u64,
    send_cancel: Option<CancellationToken>,
    animation_cancel: Option<CancellationToken>,
}

impl App {
    pub fn new(model: String, logging: LoggingState, animation_options: AnimationOptions) -> Self {
        App {
            messages: VecDeque::new(),
            input: String::new(),
            session: ChatSession::new(),
            model,
            phase: ChatPhase::Idle,
            scroll_offset: 0,
            auto_scroll: true,
            status: None,
            logging,
            animation_options,
            animation_frame: None,
            request_counter: 0,
            animation_counter: 0,
            send_cancel: None,
            animation_cancel: None,
        }
    }

    /// The id stamped on every spawned transport call. Send replies are only
    /// accepted when their id is still current.
    pub fn current_request_id(&self) -> u64 {
        self.request_counter
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = Some(status.into());
    }

    pub fn add_app_info(&mut self, content: impl Into<String>) {
        self.messages.push_back(Message::app_info(content));
    }

    pub fn add_app_error(&mut self, content: impl Into<String>) {
        self.messages.push_back(Message::app_error(content));
    }

    /// Begin sending `text`. Any outstanding request is cancelled first
    /// (with its one notice); a running animation is settled by committing
    /// its full content.
    pub fn begin_send(&mut self, text: String) -> SendStart {
        self.cancel_inflight_request();
        self.settle_animation();

        let message = Message::user(text);
        if let Err(err) = self.logging.log_turn(&message) {
            tracing::warn!("transcript log write failed: {err}");
        }
        self.messages.push_back(message);

        self.request_counter += 1;
        let cancel = CancellationToken::new();
        self.send_cancel = Some(cancel.clone());
        self.phase = ChatPhase::Sending {
            request_id: self.request_counter,
        };
        self.auto_scroll = true;

        SendStart {
            request_id: self.request_counter,
            cancel,
        }
    }

    /// Esc: cancel whatever is in flight. Returns false when there was
    /// nothing to cancel.
    pub fn cancel_current(&mut self) -> bool {
        match self.phase {
            ChatPhase::Sending { .. } => {
                self.cancel_inflight_request();
                true
            }
            ChatPhase::AnimatingResponse { .. } => {
                self.settle_animation();
                true
            }
            ChatPhase::Idle => false,
        }
    }

    /// Accept a reply for `request_id`. Stale replies (superseded or
    /// cancelled requests) are dropped and must not mutate the surface.
    pub fn accept_reply(&mut self, request_id: u64, reply: SendReply) -> Option<AnimationStart> {
        if self.phase != (ChatPhase::Sending { request_id }) {
            tracing::debug!(request_id, "dropping stale reply");
            return None;
        }

        self.send_cancel = None;
        self.session.apply_usage(reply.usage);

        let message = Message::assistant(reply.text.clone());
        if let Err(err) = self.logging.log_turn(&message) {
            tracing::warn!("transcript log write failed: {err}");
        }
        self.messages.push_back(message);

        self.animation_counter += 1;
        let cancel = CancellationToken::new();
        self.animation_cancel = Some(cancel.clone());
        self.animation_frame = Some(String::new());
        self.phase = ChatPhase::AnimatingResponse {
            animation_id: self.animation_counter,
        };

        Some(AnimationStart {
            animation_id: self.animation_counter,
            cancel,
            raw: reply.text,
        })
    }

    /// A send failed (or resolved as cancelled on the transport side).
    pub fn fail_send(&mut self, request_id: u64, error: &TransportError) {
        if self.phase != (ChatPhase::Sending { request_id }) {
            return;
        }
        self.send_cancel = None;
        self.phase = ChatPhase::Idle;
        if error.is_cancelled() {
            self.add_app_info(CANCELLED_NOTICE);
        } else {
            self.add_app_error(error.to_string());
        }
    }

    pub fn apply_animation_frame(&mut self, animation_id: u64, frame: String) {
        if self.phase == (ChatPhase::AnimatingResponse { animation_id }) {
            self.animation_frame = Some(frame);
        }
    }

    pub fn finish_animation(&mut self, animation_id: u64) {
        if self.phase == (ChatPhase::AnimatingResponse { animation_id }) {
            self.animation_cancel = None;
            self.animation_frame = None;
            self.phase = ChatPhase::Idle;
        }
    }

    /// Number of messages that exist server-side (user/assistant turns).
    pub fn conversation_len(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.role.is_conversation())
            .count()
    }

    /// Transcript position of the nth conversation message.
    fn conversation_position(&self, conversation_index: usize) -> Option<usize> {
        self.messages
            .iter()
            .enumerate()
            .filter(|(_, m)| m.role.is_conversation())
            .nth(conversation_index)
            .map(|(pos, _)| pos)
    }

    /// Apply a confirmed server-side deletion to the local transcript.
    pub fn apply_delete(&mut self, conversation_index: usize, outcome: DeleteOutcome) {
        let Some(position) = self.conversation_position(conversation_index) else {
            return;
        };
        self.messages.remove(position);

        if outcome.pair_removed {
            // The service removed the paired reply as well; mirror that if
            // the next conversation entry is an assistant turn.
            let paired = self
                .messages
                .iter()
                .enumerate()
                .skip(position)
                .find(|(_, m)| m.role.is_conversation());
            if let Some((pair_position, message)) = paired {
                if message.is_assistant() {
                    self.messages.remove(pair_position);
                }
            }
        }

        self.session.apply_usage(TokenUsage {
            total: outcome.total_tokens,
            context_messages: outcome.remaining_messages,
        });
        if let Err(err) = self.logging.rewrite_transcript(&self.messages) {
            tracing::warn!("transcript log rewrite failed: {err}");
        }
    }

    /// The server cleared the session: drop the transcript and start a
    /// fresh id.
    pub fn apply_clear(&mut self) {
        self.messages.clear();
        self.session.regenerate();
        self.animation_frame = None;
        self.set_status("Conversation cleared");
    }

    /// Rebuild the transcript from server history. An unknown session id is
    /// not an error: the session silently starts over.
    pub fn apply_history(&mut self, snapshot: Option<HistorySnapshot>) {
        let Some(snapshot) = snapshot else {
            self.session.regenerate();
            return;
        };

        let count = snapshot.entries.len() as u64;
        self.messages = snapshot
            .entries
            .into_iter()
            .filter_map(|entry| {
                TranscriptRole::try_from(entry.role.as_str())
                    .ok()
                    .map(|role| Message::new(role, entry.content))
            })
            .collect();
        self.session.apply_usage(TokenUsage {
            total: snapshot.tokens,
            context_messages: count,
        });
        self.auto_scroll = true;
    }

    pub fn adopt_import(&mut self, id: String) {
        self.session.adopt(id);
    }

    pub fn is_busy(&self) -> bool {
        self.phase != ChatPhase::Idle
    }

    fn cancel_inflight_request(&mut self) {
        if !matches!(self.phase, ChatPhase::Sending { .. }) {
            return;
        }
        if let Some(cancel) = self.send_cancel.take() {
            cancel.cancel();
        }
        // Bump the counter so the request's eventual resolution is stale;
        // the one notice is rendered here, synchronously.
        self.request_counter += 1;
        self.phase = ChatPhase::Idle;
        self.add_app_info(CANCELLED_NOTICE);
    }

    /// Settle a running animation by committing the full reply at once.
    fn settle_animation(&mut self) {
        if !matches!(self.phase, ChatPhase::AnimatingResponse { .. }) {
            return;
        }
        if let Some(cancel) = self.animation_cancel.take() {
            cancel.cancel();
        }
        self.animation_counter += 1;
        self.animation_frame = None;
        self.phase = ChatPhase::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::TokenUsage;

    fn test_app() -> App {
        App::new(
            "test-model".to_string(),
            LoggingState::new(None).expect("logging"),
            AnimationOptions::default(),
        )
    }

    fn reply(text: &str) -> SendReply {
        SendReply {
            text: text.to_string(),
            usage: TokenUsage {
                total: 5,
                context_messages: 2,
            },
        }
    }

    fn notice_count(app: &App) -> usize {
        app.messages
            .iter()
            .filter(|m| m.role == TranscriptRole::AppInfo && m.content == CANCELLED_NOTICE)
            .count()
    }

    #[test]
    fn begin_send_enters_sending_with_user_turn() {
        let mut app = test_app();
        let start = app.begin_send("hello".to_string());

        assert_eq!(
            app.phase,
            ChatPhase::Sending {
                request_id: start.request_id
            }
        );
        assert_eq!(app.messages.len(), 1);
        assert!(app.messages[0].is_user());
        assert!(!start.cancel.is_cancelled());
    }

    #[test]
    fn second_send_cancels_first_with_exactly_one_notice() {
        let mut app = test_app();
        let first = app.begin_send("one".to_string());
        let second = app.begin_send("two".to_string());

        assert!(first.cancel.is_cancelled());
        assert!(!second.cancel.is_cancelled());
        assert_eq!(notice_count(&app), 1);

        // The first request's resolution must not mutate the surface.
        assert!(app.accept_reply(first.request_id, reply("late")).is_none());
        assert_eq!(app.conversation_len(), 2);

        // The second proceeds normally.
        assert!(app.accept_reply(second.request_id, reply("hi")).is_some());
        assert_eq!(app.conversation_len(), 3);
    }

    #[test]
    fn esc_cancels_a_pending_request() {
        let mut app = test_app();
        let start = app.begin_send("hello".to_string());

        assert!(app.cancel_current());
        assert!(start.cancel.is_cancelled());
        assert_eq!(app.phase, ChatPhase::Idle);
        assert_eq!(notice_count(&app), 1);

        // Late resolution is stale; no second notice, no reply appended.
        app.fail_send(start.request_id, &TransportError::Cancelled);
        assert!(app.accept_reply(start.request_id, reply("late")).is_none());
        assert_eq!(notice_count(&app), 1);
    }

    #[test]
    fn reply_starts_animation_and_frames_apply() {
        let mut app = test_app();
        let start = app.begin_send("hello".to_string());
        let animation = app
            .accept_reply(start.request_id, reply("**hi**"))
            .expect("animation should start");

        assert_eq!(
            app.phase,
            ChatPhase::AnimatingResponse {
                animation_id: animation.animation_id
            }
        );
        assert_eq!(app.session.usage().total, 5);

        app.apply_animation_frame(animation.animation_id, "<str".to_string());
        assert_eq!(app.animation_frame.as_deref(), Some("<str"));

        // Frames from a superseded session are inert.
        app.apply_animation_frame(animation.animation_id + 1, "bogus".to_string());
        assert_eq!(app.animation_frame.as_deref(), Some("<str"));

        app.finish_animation(animation.animation_id);
        assert_eq!(app.phase, ChatPhase::Idle);
        assert!(app.animation_frame.is_none());
    }

    #[test]
    fn sending_during_animation_settles_it() {
        let mut app = test_app();
        let start = app.begin_send("hello".to_string());
        let animation = app
            .accept_reply(start.request_id, reply("long reply"))
            .expect("animation");

        app.begin_send("next".to_string());
        assert!(animation.cancel.is_cancelled());
        assert!(app.animation_frame.is_none());
        // No cancellation notice for settling an animation.
        assert_eq!(notice_count(&app), 0);

        // The settled session's trailing frames are dropped.
        app.apply_animation_frame(animation.animation_id, "stale".to_string());
        assert!(app.animation_frame.is_none());
    }

    #[test]
    fn failed_send_renders_error_and_cancellation_renders_notice() {
        let mut app = test_app();
        let start = app.begin_send("hello".to_string());
        app.fail_send(
            start.request_id,
            &TransportError::Api("model overloaded".to_string()),
        );
        assert_eq!(app.phase, ChatPhase::Idle);
        assert!(app
            .messages
            .iter()
            .any(|m| m.role == TranscriptRole::AppError && m.content == "model overloaded"));

        let start = app.begin_send("again".to_string());
        app.fail_send(start.request_id, &TransportError::Cancelled);
        assert_eq!(notice_count(&app), 1);
    }

    #[test]
    fn delete_removes_the_pair_when_the_service_did() {
        let mut app = test_app();
        app.messages.push_back(Message::user("q1"));
        app.messages.push_back(Message::assistant("a1"));
        app.add_app_info("notice between");
        app.messages.push_back(Message::user("q2"));

        app.apply_delete(
            0,
            DeleteOutcome {
                pair_removed: true,
                total_tokens: 3,
                remaining_messages: 1,
            },
        );

        assert_eq!(app.conversation_len(), 1);
        assert_eq!(app.messages.len(), 2); // notice survives
        assert!(app.messages.iter().any(|m| m.content == "q2"));
        assert_eq!(app.session.usage().total, 3);
        assert_eq!(app.session.usage().context_messages, 1);
    }

    #[test]
    fn delete_without_pair_removes_only_the_target() {
        let mut app = test_app();
        app.messages.push_back(Message::user("q1"));
        app.messages.push_back(Message::user("q2"));

        app.apply_delete(
            0,
            DeleteOutcome {
                pair_removed: false,
                total_tokens: 1,
                remaining_messages: 1,
            },
        );

        assert_eq!(app.conversation_len(), 1);
        assert_eq!(app.messages[0].content, "q2");
    }

    #[test]
    fn history_rebuilds_the_transcript() {
        use crate::api::HistoryEntry;

        let mut app = test_app();
        app.apply_history(Some(HistorySnapshot {
            entries: vec![
                HistoryEntry {
                    role: "user".to_string(),
                    content: "hi".to_string(),
                    tokens: Some(1),
                },
                HistoryEntry {
                    role: "assistant".to_string(),
                    content: "hello".to_string(),
                    tokens: Some(2),
                },
            ],
            tokens: 3,
        }));

        assert_eq!(app.conversation_len(), 2);
        assert_eq!(app.session.usage().total, 3);
        assert_eq!(app.session.usage().context_messages, 2);
    }

    #[test]
    fn unknown_history_silently_starts_fresh() {
        let mut app = test_app();
        app.session = ChatSession::with_id("stale-id");
        app.messages.push_back(Message::user("stale"));

        app.apply_history(None);

        assert_ne!(app.session.id(), "stale-id");
        // No error notice is rendered.
        assert!(app
            .messages
            .iter()
            .all(|m| m.role != TranscriptRole::AppError));
    }

    #[test]
    fn clear_resets_transcript_and_session() {
        let mut app = test_app();
        app.session = ChatSession::with_id("old-session");
        app.messages.push_back(Message::user("hi"));
        app.session.apply_usage(TokenUsage {
            total: 9,
            context_messages: 1,
        });

        app.apply_clear();

        assert!(app.messages.is_empty());
        assert_ne!(app.session.id(), "old-session");
        assert_eq!(app.session.usage().total, 0);
    }
}
