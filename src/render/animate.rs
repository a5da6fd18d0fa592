//! Character-by-character replay of an extracted segment sequence.
//!
//! The animator owns no I/O of its own: it drives a [`Surface`] with
//! successive full-content frames and suspends between characters and after
//! code blocks. Cancellation is checked before every reveal and before
//! every atomic commit. A surface fault abandons the incremental path and
//! commits the fully-formatted markup in one shot instead of erroring.

use std::fmt;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use unicode_segmentation::UnicodeSegmentation;

use super::segment::{full_markup, Segment};

/// Longest entity name worth scanning for before giving up and treating
/// the ampersand as a plain character.
const MAX_ENTITY_LEN: usize = 8;

#[derive(Debug)]
pub struct SurfaceError(pub String);

impl fmt::Display for SurfaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface rejected frame: {}", self.0)
    }
}

impl std::error::Error for SurfaceError {}

/// A render target for animation frames. Each frame replaces the surface's
/// whole content; implementations decide what "content" means (a transcript
/// slot in the TUI, a buffer in tests).
pub trait Surface: Send {
    fn render(&mut self, markup: &str) -> Result<(), SurfaceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnimationOptions {
    pub char_delay: Duration,
    pub post_code_delay: Duration,
}

impl Default for AnimationOptions {
    fn default() -> Self {
        AnimationOptions {
            char_delay: Duration::from_millis(8),
            post_code_delay: Duration::from_millis(150),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationOutcome {
    Completed,
    Cancelled,
}

/// Replay `segments` onto `surface`. Resolves once the last segment is
/// committed, or earlier when `cancel` fires. Never errors: a surface fault
/// downgrades to a single full-content commit.
pub async fn animate(
    surface: &mut dyn Surface,
    segments: &[Segment],
    options: &AnimationOptions,
    cancel: &CancellationToken,
) -> AnimationOutcome {
    match run(surface, segments, options, cancel).await {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::warn!("animation fell back to full render: {err}");
            let _ = surface.render(&full_markup(segments));
            AnimationOutcome::Completed
        }
    }
}

async fn run(
    surface: &mut dyn Surface,
    segments: &[Segment],
    options: &AnimationOptions,
    cancel: &CancellationToken,
) -> Result<AnimationOutcome, SurfaceError> {
    let mut committed = String::new();

    for segment in segments {
        match segment {
            Segment::Text(text) => {
                for (i, line) in text.split('\n').enumerate() {
                    if i > 0 {
                        if cancel.is_cancelled() {
                            return Ok(AnimationOutcome::Cancelled);
                        }
                        committed.push_str("<br>");
                        surface.render(&committed)?;
                    }
                    if line.is_empty() {
                        continue;
                    }
                    if line.trim().is_empty() {
                        // Whitespace-only lines are committed, not animated.
                        if cancel.is_cancelled() {
                            return Ok(AnimationOutcome::Cancelled);
                        }
                        committed.push_str(line);
                        surface.render(&committed)?;
                        continue;
                    }

                    let mut revealed = committed.clone();
                    for unit in reveal_units(line) {
                        if cancel.is_cancelled() {
                            return Ok(AnimationOutcome::Cancelled);
                        }
                        revealed.push_str(unit);
                        surface.render(&revealed)?;
                        sleep(options.char_delay).await;
                    }
                    committed.push_str(line);
                }
            }
            Segment::Code(markup) => {
                if cancel.is_cancelled() {
                    return Ok(AnimationOutcome::Cancelled);
                }
                committed.push_str(markup);
                surface.render(&committed)?;
                sleep(options.post_code_delay).await;
            }
            Segment::Html(markup) => {
                if cancel.is_cancelled() {
                    return Ok(AnimationOutcome::Cancelled);
                }
                committed.push_str(markup);
                surface.render(&committed)?;
            }
        }
    }

    Ok(AnimationOutcome::Completed)
}

/// Split a line into reveal units: grapheme clusters, except that a complete
/// entity sequence (`&...;`) is revealed whole so no frame carries a torn
/// entity.
fn reveal_units(line: &str) -> Vec<&str> {
    let mut units = Vec::new();
    let mut rest = line;

    while !rest.is_empty() {
        let len = entity_len(rest).unwrap_or_else(|| grapheme_len(rest));
        units.push(&rest[..len]);
        rest = &rest[len..];
    }

    units
}

fn grapheme_len(s: &str) -> usize {
    s.graphemes(true).next().map(str::len).unwrap_or(s.len())
}

fn entity_len(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    if bytes.first() != Some(&b'&') {
        return None;
    }
    let limit = bytes.len().min(1 + MAX_ENTITY_LEN);
    let semi = bytes[1..limit].iter().position(|&b| b == b';')? + 1;
    let name = &bytes[1..semi];
    if !name.is_empty()
        && name
            .iter()
            .all(|b| b.is_ascii_alphanumeric() || *b == b'#')
    {
        Some(semi + 1)
    } else {
        None
    }
}
