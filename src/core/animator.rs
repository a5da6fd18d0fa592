//! Bridges the typing animator onto the UI loop's channel model.
//!
//! Each animation session runs as its own task and streams full-content
//! frames tagged with a session id. The UI loop drops frames whose id is no
//! longer current, which is what makes superseding an in-flight animation
//! safe: the old task keeps running until its token is observed, but its
//! output is inert.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::render::animate::{animate, AnimationOptions, AnimationOutcome, Surface, SurfaceError};
use crate::render::{markup, segment};

#[derive(Debug, Clone)]
pub enum AnimationMessage {
    /// The surface's full content as of this frame.
    Frame(String),
    /// The last segment has been committed.
    Done,
}

pub struct AnimationParams {
    /// The assistant reply as raw markdown; formatting happens on the task.
    pub raw: String,
    pub options: AnimationOptions,
    pub cancel: CancellationToken,
    pub animation_id: u64,
}

struct ChannelSurface {
    tx: mpsc::UnboundedSender<(AnimationMessage, u64)>,
    animation_id: u64,
}

impl Surface for ChannelSurface {
    fn render(&mut self, markup: &str) -> Result<(), SurfaceError> {
        self.tx
            .send((AnimationMessage::Frame(markup.to_string()), self.animation_id))
            .map_err(|_| SurfaceError("frame channel closed".into()))
    }
}

#[derive(Clone)]
pub struct AnimatorService {
    tx: mpsc::UnboundedSender<(AnimationMessage, u64)>,
}

impl AnimatorService {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(AnimationMessage, u64)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn spawn_animation(&self, params: AnimationParams) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let AnimationParams {
                raw,
                options,
                cancel,
                animation_id,
            } = params;

            let markup = markup::format(&raw);
            let segments = segment::extract(&markup);
            let mut surface = ChannelSurface {
                tx: tx.clone(),
                animation_id,
            };

            let outcome = animate(&mut surface, &segments, &options, &cancel).await;
            if outcome == AnimationOutcome::Completed {
                let _ = tx.send((AnimationMessage::Done, animation_id));
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn fast() -> AnimationOptions {
        AnimationOptions {
            char_delay: Duration::from_millis(1),
            post_code_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn frames_stream_until_done() {
        let (service, mut rx) = AnimatorService::new();
        service.spawn_animation(AnimationParams {
            raw: "hi".to_string(),
            options: fast(),
            cancel: CancellationToken::new(),
            animation_id: 7,
        });
        drop(service);

        let mut frames = Vec::new();
        let mut done = false;
        while let Some((message, id)) = rx.recv().await {
            assert_eq!(id, 7);
            match message {
                AnimationMessage::Frame(content) => frames.push(content),
                AnimationMessage::Done => done = true,
            }
        }

        assert!(done);
        assert_eq!(frames, vec!["h", "hi"]);
    }

    #[tokio::test]
    async fn cancelled_sessions_never_report_done() {
        let (service, mut rx) = AnimatorService::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        service.spawn_animation(AnimationParams {
            raw: "hi".to_string(),
            options: fast(),
            cancel,
            animation_id: 1,
        });
        drop(service);

        while let Some((message, _)) = rx.recv().await {
            assert!(
                !matches!(message, AnimationMessage::Done),
                "cancelled session must not complete"
            );
        }
    }
}
