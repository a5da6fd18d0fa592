//! A tiny tree parser for the closed markup dialect the formatter emits.
//!
//! Only the tags the formatter can produce are recognized; anything else
//! (stray `<`, unknown tags, unterminated elements) degrades to literal
//! text instead of failing the render. Every element keeps its full
//! serialized markup so downstream consumers can re-emit it byte-for-byte.

use memchr::memchr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Br,
    Pre,
    Code,
    Strong,
    Em,
    Anchor,
}

impl Tag {
    fn from_name(name: &str) -> Option<Tag> {
        match name {
            "br" => Some(Tag::Br),
            "pre" => Some(Tag::Pre),
            "code" => Some(Tag::Code),
            "strong" => Some(Tag::Strong),
            "em" => Some(Tag::Em),
            "a" => Some(Tag::Anchor),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Tag::Br => "br",
            Tag::Pre => "pre",
            Tag::Code => "code",
            Tag::Strong => "strong",
            Tag::Em => "em",
            Tag::Anchor => "a",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Element(Element),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub tag: Tag,
    /// The element's full serialized markup, byte-for-byte out of the input.
    pub raw: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn href(&self) -> Option<&str> {
        self.attr("href")
    }

    /// Language label carried by a fenced code block (`class="language-x"`).
    pub fn language(&self) -> Option<&str> {
        let class = self.attr("class")?;
        let lang = class.strip_prefix("language-")?;
        if lang.is_empty() {
            None
        } else {
            Some(lang)
        }
    }
}

/// Parse markup into a node list. Never fails: malformed tag syntax is
/// folded back into the surrounding text.
pub fn parse(markup: &str) -> Vec<Node> {
    let mut nodes = Vec::new();
    let mut text = String::new();
    let mut rest = markup;

    while !rest.is_empty() {
        let Some(lt) = memchr(b'<', rest.as_bytes()) else {
            text.push_str(rest);
            break;
        };

        text.push_str(&rest[..lt]);
        rest = &rest[lt..];

        match scan_element(rest) {
            Some((element, consumed)) => {
                flush_text(&mut text, &mut nodes);
                nodes.push(Node::Element(element));
                rest = &rest[consumed..];
            }
            None => {
                // Not one of ours: keep the `<` literal and move on.
                text.push('<');
                rest = &rest[1..];
            }
        }
    }

    flush_text(&mut text, &mut nodes);
    nodes
}

/// Decode the entities the formatter can emit back to literal characters,
/// for terminal display.
pub fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

fn flush_text(text: &mut String, nodes: &mut Vec<Node>) {
    if !text.is_empty() {
        nodes.push(Node::Text(std::mem::take(text)));
    }
}

/// Try to read a complete element at the start of `rest` (which begins with
/// `<`). Returns the element and the number of bytes consumed, or `None`
/// when the input is not a well-formed element of the dialect.
fn scan_element(rest: &str) -> Option<(Element, usize)> {
    let (name, attrs, open_len) = scan_open_tag(rest)?;
    let tag = Tag::from_name(&name)?;

    if tag == Tag::Br {
        let element = Element {
            tag,
            raw: rest[..open_len].to_string(),
            attrs,
            children: Vec::new(),
        };
        return Some((element, open_len));
    }

    let inner_start = open_len;
    let close = format!("</{}>", tag.name());
    let open_prefix = format!("<{}", tag.name());

    // Find the matching close tag, counting nested same-name opens.
    let mut depth = 1usize;
    let mut cursor = inner_start;
    let inner_end = loop {
        let lt = memchr(b'<', rest[cursor..].as_bytes())? + cursor;
        if rest[lt..].starts_with(&close) {
            depth -= 1;
            if depth == 0 {
                break lt;
            }
            cursor = lt + close.len();
        } else if is_open_of(&rest[lt..], &open_prefix) {
            depth += 1;
            cursor = lt + open_prefix.len();
        } else {
            cursor = lt + 1;
        }
    };

    let consumed = inner_end + close.len();
    let element = Element {
        tag,
        raw: rest[..consumed].to_string(),
        attrs,
        children: parse(&rest[inner_start..inner_end]),
    };
    Some((element, consumed))
}

fn is_open_of(rest: &str, open_prefix: &str) -> bool {
    if !rest.starts_with(open_prefix) {
        return false;
    }
    // `<pre` must not match `<press`; the name ends at `>` or whitespace.
    matches!(
        rest.as_bytes().get(open_prefix.len()),
        Some(b'>') | Some(b' ')
    )
}

/// Read `<name attr="value" ...>` and return the name, attributes, and the
/// byte length of the open tag.
fn scan_open_tag(rest: &str) -> Option<(String, Vec<(String, String)>, usize)> {
    let bytes = rest.as_bytes();
    if bytes.first() != Some(&b'<') {
        return None;
    }

    let mut i = 1;
    while i < bytes.len() && bytes[i].is_ascii_lowercase() {
        i += 1;
    }
    if i == 1 {
        return None;
    }
    let name = rest[1..i].to_string();

    let mut attrs = Vec::new();
    loop {
        while i < bytes.len() && bytes[i] == b' ' {
            i += 1;
        }
        match bytes.get(i) {
            Some(b'>') => return Some((name, attrs, i + 1)),
            Some(_) => {
                let key_start = i;
                while i < bytes.len() && bytes[i] != b'=' && bytes[i] != b'>' && bytes[i] != b' ' {
                    i += 1;
                }
                let key = rest[key_start..i].to_string();
                if bytes.get(i) == Some(&b'=') && bytes.get(i + 1) == Some(&b'"') {
                    let value_start = i + 2;
                    let quote = memchr(b'"', &bytes[value_start..])? + value_start;
                    attrs.push((key, rest[value_start..quote].to_string()));
                    i = quote + 1;
                } else if key.is_empty() {
                    return None;
                } else {
                    attrs.push((key, String::new()));
                }
            }
            None => return None,
        }
    }
}
