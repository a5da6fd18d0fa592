//! Markdown formatting for assistant replies.
//!
//! Assistant text arrives as a constrained markdown dialect: fenced code
//! blocks, inline code, bold, italic, links, and raw newlines. [`format`]
//! turns it into the markup dialect the rest of the renderer understands
//! (`pre`/`code`/`strong`/`em`/`a`/`br`). Code content is extracted into
//! placeholders before any other transform runs, so emphasis and link
//! rewriting can never corrupt it.

use regex::{Captures, Regex};
use std::sync::LazyLock;

static FENCED_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```(\w*)\n([\s\S]*?)```").expect("fenced code pattern"));
static INLINE_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`]+)`").expect("inline code pattern"));
static BOLD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*([^*]+)\*\*").expect("bold pattern"));
static ITALIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*([^*]+)\*").expect("italic pattern"));
static LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").expect("link pattern"));
static ALLOWED_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&lt;(/?)(pre|code|strong|em|a|br)&gt;").expect("tag allow-list"));

/// Escape the characters that would otherwise be read as markup inside a
/// code body. Ampersands first, so already-escaped text is not double-broken.
pub fn escape_code(code: &str) -> String {
    code.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Format a constrained markdown string into sanitized markup.
///
/// The transforms run in a fixed order, each on the output of the previous:
/// fenced code blocks are lifted out behind placeholder tokens, then inline
/// code spans, then bold / italic / link / newline rewriting, and finally the
/// placeholders are restored by index. An unterminated fence never matches,
/// so it survives as literal text.
pub fn format(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    let mut code_blocks: Vec<String> = Vec::new();
    let text = FENCED_CODE.replace_all(raw, |caps: &Captures| {
        let lang = &caps[1];
        let body = caps[2].trim();
        code_blocks.push(format!(
            "<pre><code class=\"language-{lang}\">{}</code></pre>",
            escape_code(body)
        ));
        format!("__CODEBLOCK{}__", code_blocks.len() - 1)
    });

    let mut inline_code: Vec<String> = Vec::new();
    let text = INLINE_CODE.replace_all(&text, |caps: &Captures| {
        inline_code.push(format!("<code>{}</code>", escape_code(&caps[1])));
        format!("__INLINECODE{}__", inline_code.len() - 1)
    });

    let text = BOLD.replace_all(&text, "<strong>$1</strong>");
    let text = ITALIC.replace_all(&text, "<em>$1</em>");
    let text = LINK.replace_all(
        &text,
        "<a href=\"$2\" target=\"_blank\" rel=\"noopener noreferrer\">$1</a>",
    );
    let mut out = text.replace('\n', "<br>");

    for (i, block) in code_blocks.iter().enumerate() {
        out = out.replacen(&format!("__CODEBLOCK{i}__"), block, 1);
    }
    for (i, code) in inline_code.iter().enumerate() {
        out = out.replacen(&format!("__INLINECODE{i}__"), code, 1);
    }

    out
}

/// Sanitize a user-authored message for display.
///
/// This is the narrow path for literal user text: escape everything, keep
/// line breaks, and re-admit only the fixed tag allow-list that an earlier
/// escaping pass may have produced. It never expands markdown.
pub fn sanitize(raw: &str) -> String {
    let escaped = escape_code(raw).replace('\n', "<br>");
    ALLOWED_TAG.replace_all(&escaped, "<$1$2>").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_formats_to_empty_string() {
        assert_eq!(format(""), "");
    }

    #[test]
    fn bold_then_italic_in_order() {
        let out = format("**a** and *b*");
        assert_eq!(out, "<strong>a</strong> and <em>b</em>");
        let strong = out.find("<strong>").expect("strong present");
        let em = out.find("<em>").expect("em present");
        assert!(strong < em);
    }

    #[test]
    fn fenced_code_is_protected_from_emphasis() {
        let out = format("```rust\nlet x = **not bold** < 3;\n```");
        assert_eq!(
            out,
            "<pre><code class=\"language-rust\">let x = **not bold** &lt; 3;</code></pre>"
        );
    }

    #[test]
    fn fenced_code_escapes_amp_lt_gt() {
        let out = format("```\na & b < c > d\n```");
        assert!(out.contains("a &amp; b &lt; c &gt; d"));
    }

    #[test]
    fn unterminated_fence_is_literal_text() {
        let out = format("```rust\nlet x = 1;");
        assert!(!out.contains("<pre>"));
        assert!(out.contains("```rust<br>let x = 1;"));
    }

    #[test]
    fn inline_code_is_protected_and_escaped() {
        let out = format("use `a < b` here");
        assert_eq!(out, "use <code>a &lt; b</code> here");
    }

    #[test]
    fn links_open_in_new_context() {
        let out = format("[docs](https://example.com)");
        assert_eq!(
            out,
            "<a href=\"https://example.com\" target=\"_blank\" rel=\"noopener noreferrer\">docs</a>"
        );
    }

    #[test]
    fn newlines_become_breaks_outside_code() {
        assert_eq!(format("a\nb"), "a<br>b");
    }

    #[test]
    fn code_block_body_keeps_newlines() {
        let out = format("```\nline one\nline two\n```");
        assert!(out.contains("line one\nline two"));
        assert!(!out.contains("line one<br>"));
    }

    #[test]
    fn sanitize_escapes_script_injection() {
        let out = sanitize("<script>alert(1)</script>");
        assert_eq!(out, "&lt;script&gt;alert(1)&lt;/script&gt;");
    }

    #[test]
    fn sanitize_keeps_line_breaks_and_allowed_tags() {
        let out = sanitize("hello\nworld");
        assert_eq!(out, "hello<br>world");

        let out = sanitize("&lt;strong&gt;");
        // Entities typed literally by the user stay double-escaped.
        assert_eq!(out, "&amp;lt;strong&amp;gt;");

        let out = sanitize("<strong>x</strong>");
        assert_eq!(out, "<strong>x</strong>");
    }

    #[test]
    fn sanitize_does_not_expand_markdown() {
        assert_eq!(sanitize("**not bold**"), "**not bold**");
    }

    #[test]
    fn multiple_code_blocks_restore_in_original_order() {
        let out = format("```\nfirst\n```\nmid\n```\nsecond\n```");
        let first = out.find("first").expect("first block");
        let mid = out.find("mid").expect("text between");
        let second = out.find("second").expect("second block");
        assert!(first < mid && mid < second);
    }
}
