//! Terminal rendering: markup to styled lines, plus the frame layout.
//!
//! Everything on screen is derived state. User turns render through the
//! sanitizer, assistant turns through the markdown formatter (or the
//! current animation frame while a reply is typing out), so a redraw can
//! never diverge from the transcript.

use ratatui::{
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};
use unicode_width::UnicodeWidthStr;

use crate::core::app::{App, ChatPhase};
use crate::core::message::TranscriptRole;
use crate::render::markup;
use crate::render::node::{self, Element, Node, Tag};

const USER_PREFIX: &str = "You: ";

pub fn ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),
            Constraint::Length(1),
            Constraint::Length(3),
        ])
        .split(f.area());

    let lines = build_display_lines(app);
    let viewport = transcript_viewport_height(chunks[0].height);
    let max_offset = max_scroll_offset(lines.len(), viewport);
    let scroll_offset = if app.auto_scroll {
        max_offset
    } else {
        app.scroll_offset.min(max_offset)
    };

    let transcript = Paragraph::new(lines)
        .block(Block::default().title("Parley"))
        .wrap(Wrap { trim: false })
        .scroll((scroll_offset, 0));
    f.render_widget(transcript, chunks[0]);

    f.render_widget(status_line(app), chunks[1]);

    let input = Paragraph::new(app.input.as_str())
        .style(Style::default().fg(Color::Yellow))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Message (Enter to send, /help for commands)"),
        );
    f.render_widget(input, chunks[2]);

    f.set_cursor_position((
        chunks[2].x + app.input.width() as u16 + 1,
        chunks[2].y + 1,
    ));
}

pub fn transcript_viewport_height(area_height: u16) -> u16 {
    // One row is taken by the transcript title.
    area_height.saturating_sub(1)
}

pub fn max_scroll_offset(total_lines: usize, viewport: u16) -> u16 {
    (total_lines as u16).saturating_sub(viewport)
}

fn status_line(app: &App) -> Paragraph<'static> {
    let usage = app.session.usage();
    let phase = match app.phase {
        ChatPhase::Idle => "",
        ChatPhase::Sending { .. } => "  thinking...",
        ChatPhase::AnimatingResponse { .. } => "  typing...",
    };

    let mut spans = vec![
        Span::styled(
            format!(" {} ", app.model),
            Style::default().fg(Color::Cyan),
        ),
        Span::styled(
            format!(
                "| Total tokens: {} | Context messages: {}",
                usage.total, usage.context_messages
            ),
            Style::default().fg(Color::DarkGray),
        ),
        Span::styled(phase, Style::default().fg(Color::Magenta)),
    ];
    if let Some(status) = &app.status {
        spans.push(Span::styled(
            format!("  {status}"),
            Style::default().fg(Color::DarkGray),
        ));
    }
    Paragraph::new(Line::from(spans))
}

pub fn build_display_lines(app: &App) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    let last_assistant = app
        .messages
        .iter()
        .rposition(|m| m.is_assistant());

    for (position, message) in app.messages.iter().enumerate() {
        match message.role {
            TranscriptRole::User => {
                let rendered = markup_lines(
                    &markup::sanitize(&message.content),
                    Style::default().fg(Color::Cyan),
                );
                lines.extend(with_prefix(
                    rendered,
                    Span::styled(
                        USER_PREFIX,
                        Style::default()
                            .fg(Color::Cyan)
                            .add_modifier(Modifier::BOLD),
                    ),
                ));
            }
            TranscriptRole::Assistant => {
                let animating = Some(position) == last_assistant && app.animation_frame.is_some();
                let rendered = if animating {
                    app.animation_frame.clone().unwrap_or_default()
                } else {
                    markup::format(&message.content)
                };
                lines.extend(markup_lines(&rendered, Style::default().fg(Color::White)));
            }
            TranscriptRole::AppInfo => {
                for line in message.content.lines() {
                    lines.push(Line::from(Span::styled(
                        line.to_string(),
                        Style::default().fg(Color::DarkGray),
                    )));
                }
            }
            TranscriptRole::AppError => {
                for line in message.content.lines() {
                    lines.push(Line::from(Span::styled(
                        line.to_string(),
                        Style::default().fg(Color::Red),
                    )));
                }
            }
        }
        lines.push(Line::from(""));
    }

    if matches!(app.phase, ChatPhase::Sending { .. }) {
        lines.push(Line::from(Span::styled(
            "...",
            Style::default().fg(Color::DarkGray),
        )));
        lines.push(Line::from(""));
    }

    lines
}

/// Render markup into styled terminal lines. Inline tags map to style
/// modifiers, anchors show their target, code blocks become their own
/// block of lines.
pub fn markup_lines(markup: &str, base: Style) -> Vec<Line<'static>> {
    let mut builder = LineBuilder::new(base);
    for parsed in node::parse(markup) {
        builder.push_node(&parsed);
    }
    builder.finish()
}

struct LineBuilder {
    base: Style,
    lines: Vec<Line<'static>>,
    current: Vec<Span<'static>>,
}

impl LineBuilder {
    fn new(base: Style) -> Self {
        LineBuilder {
            base,
            lines: Vec::new(),
            current: Vec::new(),
        }
    }

    fn push_node(&mut self, parsed: &Node) {
        match parsed {
            Node::Text(text) => self.push_text(&node::decode_entities(text), self.base),
            Node::Element(el) => self.push_element(el),
        }
    }

    fn push_element(&mut self, el: &Element) {
        match el.tag {
            Tag::Br => self.end_line(),
            Tag::Strong => {
                let style = self.base.add_modifier(Modifier::BOLD);
                self.push_text(&flatten_text(el), style);
            }
            Tag::Em => {
                let style = self.base.add_modifier(Modifier::ITALIC);
                self.push_text(&flatten_text(el), style);
            }
            Tag::Code => {
                self.push_text(&flatten_text(el), Style::default().fg(Color::Yellow));
            }
            Tag::Anchor => {
                let label = flatten_text(el);
                let style = Style::default()
                    .fg(Color::Blue)
                    .add_modifier(Modifier::UNDERLINED);
                match el.href() {
                    Some(href) if href != label => {
                        self.push_text(&format!("{label} ({href})"), style)
                    }
                    _ => self.push_text(&label, style),
                }
            }
            Tag::Pre => self.push_code_block(el),
        }
    }

    fn push_code_block(&mut self, el: &Element) {
        self.end_line();

        let language = el.children.iter().find_map(|child| match child {
            Node::Element(code) if code.tag == Tag::Code => code.language(),
            _ => None,
        });
        if let Some(language) = language {
            self.lines.push(Line::from(Span::styled(
                format!("[{language}]"),
                Style::default().fg(Color::DarkGray),
            )));
        }

        let body = flatten_text(el);
        for line in body.lines() {
            self.lines.push(Line::from(Span::styled(
                line.to_string(),
                Style::default().fg(Color::Green),
            )));
        }
    }

    fn push_text(&mut self, text: &str, style: Style) {
        let mut first = true;
        for line in text.split('\n') {
            if !first {
                self.end_line();
            }
            if !line.is_empty() {
                self.current.push(Span::styled(line.to_string(), style));
            }
            first = false;
        }
    }

    fn end_line(&mut self) {
        self.lines.push(Line::from(std::mem::take(&mut self.current)));
    }

    fn finish(mut self) -> Vec<Line<'static>> {
        if !self.current.is_empty() {
            self.end_line();
        }
        self.lines
    }
}

/// Concatenated, entity-decoded text of an element's subtree.
fn flatten_text(el: &Element) -> String {
    let mut out = String::new();
    collect_text(&el.children, &mut out);
    out
}

fn collect_text(nodes: &[Node], out: &mut String) {
    for parsed in nodes {
        match parsed {
            Node::Text(text) => out.push_str(&node::decode_entities(text)),
            Node::Element(el) if el.tag == Tag::Br => out.push('\n'),
            Node::Element(el) => collect_text(&el.children, out),
        }
    }
}

fn with_prefix(mut lines: Vec<Line<'static>>, prefix: Span<'static>) -> Vec<Line<'static>> {
    if lines.is_empty() {
        return vec![Line::from(prefix)];
    }
    let mut spans = vec![prefix];
    spans.extend(lines[0].spans.clone());
    lines[0] = Line::from(spans);
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::animate::AnimationOptions;
    use crate::utils::logging::LoggingState;

    fn line_text(line: &Line<'_>) -> String {
        line.spans.iter().map(|s| s.content.clone()).collect()
    }

    fn test_app() -> App {
        App::new(
            "test-model".to_string(),
            LoggingState::new(None).expect("logging"),
            AnimationOptions::default(),
        )
    }

    #[test]
    fn bold_markup_becomes_a_bold_span() {
        let lines = markup_lines("say <strong>hi</strong>", Style::default());
        assert_eq!(lines.len(), 1);
        assert_eq!(line_text(&lines[0]), "say hi");
        let bold = &lines[0].spans[1];
        assert!(bold.style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn breaks_split_lines() {
        let lines = markup_lines("a<br>b", Style::default());
        assert_eq!(lines.len(), 2);
        assert_eq!(line_text(&lines[0]), "a");
        assert_eq!(line_text(&lines[1]), "b");
    }

    #[test]
    fn code_blocks_render_as_their_own_lines_with_language() {
        let markup = "<pre><code class=\"language-rust\">let x = 1;\nlet y = 2;</code></pre>";
        let lines = markup_lines(markup, Style::default());
        let texts: Vec<String> = lines.iter().map(line_text).collect();
        assert!(texts.contains(&"[rust]".to_string()));
        assert!(texts.contains(&"let x = 1;".to_string()));
        assert!(texts.contains(&"let y = 2;".to_string()));
    }

    #[test]
    fn anchors_show_their_target() {
        let lines = markup_lines(
            "<a href=\"https://example.com\" target=\"_blank\" rel=\"noopener noreferrer\">docs</a>",
            Style::default(),
        );
        assert_eq!(line_text(&lines[0]), "docs (https://example.com)");
    }

    #[test]
    fn entities_are_decoded_for_display() {
        let lines = markup_lines("a &amp; b", Style::default());
        assert_eq!(line_text(&lines[0]), "a & b");
    }

    #[test]
    fn animation_frame_overrides_the_last_assistant_turn() {
        let mut app = test_app();
        let start = app.begin_send("hi".to_string());
        app.accept_reply(
            start.request_id,
            crate::core::transport::SendReply {
                text: "full reply".to_string(),
                usage: Default::default(),
            },
        )
        .expect("animation");
        app.apply_animation_frame(1, "ful".to_string());

        let lines = build_display_lines(&app);
        let texts: Vec<String> = lines.iter().map(line_text).collect();
        assert!(texts.contains(&"ful".to_string()));
        assert!(!texts.contains(&"full reply".to_string()));
    }

    #[test]
    fn user_turns_are_prefixed_and_sanitized() {
        let mut app = test_app();
        app.messages
            .push_back(crate::core::message::Message::user("<b>raw</b>"));
        let lines = build_display_lines(&app);
        assert_eq!(line_text(&lines[0]), "You: <b>raw</b>");
    }

    #[test]
    fn scroll_bounds_follow_line_count() {
        assert_eq!(max_scroll_offset(10, 4), 6);
        assert_eq!(max_scroll_offset(3, 4), 0);
        assert_eq!(transcript_viewport_height(10), 9);
    }
}
