//! Segment extraction: formatted markup to an ordered animation plan.
//!
//! Text runs are revealed character-by-character, everything else is
//! committed atomically. Emission is strictly in input order, and the
//! concatenation of emitted segment markup reconstructs the formatted
//! markup byte-for-byte (with text-segment newlines standing in for `<br>`),
//! so the surface always converges on exactly what the formatter produced.

use super::node::{self, Node, Tag};

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// A run of plain text, revealed character-by-character. Newlines mark
    /// the positions of line-break elements in the source markup.
    Text(String),
    /// A fenced code block's full markup. Never split, never re-animated.
    Code(String),
    /// Any other element's full markup, committed in one step.
    Html(String),
}

impl Segment {
    /// The markup this segment contributes to the finished surface.
    pub fn rendered_markup(&self) -> String {
        match self {
            Segment::Text(text) => text.replace('\n', "<br>"),
            Segment::Code(markup) | Segment::Html(markup) => markup.clone(),
        }
    }
}

/// Walk formatted markup and produce the ordered segment sequence.
pub fn extract(markup: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut buffer = String::new();

    for node in node::parse(markup) {
        match node {
            Node::Text(text) => buffer.push_str(&text),
            Node::Element(el) if el.tag == Tag::Br => buffer.push('\n'),
            Node::Element(el) if el.tag == Tag::Pre => {
                flush(&mut buffer, &mut segments);
                segments.push(Segment::Code(el.raw));
            }
            Node::Element(el) => {
                flush(&mut buffer, &mut segments);
                segments.push(Segment::Html(el.raw));
            }
        }
    }

    flush(&mut buffer, &mut segments);
    segments
}

/// Reassemble the full formatted markup a segment sequence stands for.
/// This is also the animator's fail-safe output.
pub fn full_markup(segments: &[Segment]) -> String {
    segments.iter().map(Segment::rendered_markup).collect()
}

fn flush(buffer: &mut String, segments: &mut Vec<Segment>) {
    if !buffer.is_empty() {
        segments.push(Segment::Text(std::mem::take(buffer)));
    }
}
