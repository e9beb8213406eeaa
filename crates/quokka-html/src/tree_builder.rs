//! A small, forgiving HTML tree builder.
//!
//! [§ 13.2 Parsing HTML documents](https://html.spec.whatwg.org/multipage/parsing.html)
//!
//! This is not the WHATWG state machine. It splits the input into text and
//! tags, keeps a stack of open elements, and inserts the implicit `html`,
//! `head` and `body` elements where the standard would. Malformed tokens are
//! skipped, never reported as errors.

use quokka_common::warning::warn_once;
use quokka_dom::{AttributesMap, DomTree, ElementData, NodeId, NodeType};

use crate::entities::decode_entities;

/// [§ 13.1.2 Void elements](https://html.spec.whatwg.org/multipage/syntax.html#void-elements)
///
/// "Void elements can't have any contents."
const SELF_CLOSING_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose start tag, seen before `<body>`, implies `<head>`.
const HEAD_TAGS: &[&str] = &[
    "base", "basefont", "bgsound", "noscript", "link", "meta", "title", "style", "script",
];

/// [§ 13.1.2.1 Raw text elements](https://html.spec.whatwg.org/multipage/syntax.html#raw-text-elements)
///
/// Content runs verbatim up to the matching end tag.
const RAW_TEXT_TAGS: &[&str] = &["script", "style"];

/// Builds a [`DomTree`] from an HTML string.
pub struct HtmlParser<'a> {
    input: &'a str,
    tree: DomTree,
    /// Stack of open elements, outermost first.
    unfinished: Vec<NodeId>,
}

impl<'a> HtmlParser<'a> {
    /// A parser over `input`.
    #[must_use]
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            tree: DomTree::new(),
            unfinished: Vec::new(),
        }
    }

    /// Parse the whole input into a document.
    ///
    /// The result always has a document element (`html`) with `head`/`body`
    /// children where the input implied them.
    #[must_use]
    pub fn parse(mut self) -> DomTree {
        let input = self.input;
        let mut text = String::new();
        let mut i = 0;

        while i < input.len() {
            let rest = &input[i..];

            // [§ 13.2.5.43 Comment start state]
            if rest.starts_with("<!--") {
                self.flush_text(&mut text);
                i = rest[4..].find("-->").map_or(input.len(), |end| i + 4 + end + 3);
                continue;
            }

            if rest.starts_with('<') && starts_tag(&rest[1..]) {
                let Some(end) = rest.find('>') else {
                    // Unterminated tag: the remainder is text.
                    text.push_str(rest);
                    break;
                };
                self.flush_text(&mut text);
                let tag_text = &rest[1..end];
                i += end + 1;

                if let Some(opened) = self.add_tag(tag_text) {
                    if RAW_TEXT_TAGS.contains(&opened.as_str()) {
                        let close = find_end_tag(&input[i..], &opened).unwrap_or(input.len() - i);
                        let raw = &input[i..i + close];
                        if !raw.is_empty() {
                            self.append_text(raw.to_string());
                        }
                        i += close;
                    }
                }
                continue;
            }

            let Some(ch) = rest.chars().next() else {
                break;
            };
            text.push(ch);
            i += ch.len_utf8();
        }
        self.flush_text(&mut text);
        self.finish()
    }

    fn flush_text(&mut self, text: &mut String) {
        if text.is_empty() {
            return;
        }
        let raw = std::mem::take(text);
        // Whitespace between tags carries no content for our layout.
        if raw.chars().all(char::is_whitespace) {
            return;
        }
        self.implicit_tags(None);
        self.append_text(decode_entities(&raw));
    }

    fn append_text(&mut self, text: String) {
        let parent = self.current();
        let node = self.tree.alloc(NodeType::Text(text));
        self.tree.append_child(parent, node);
    }

    fn current(&self) -> NodeId {
        self.unfinished.last().copied().unwrap_or(NodeId::ROOT)
    }

    fn open_tags(&self) -> Vec<&str> {
        self.unfinished
            .iter()
            .filter_map(|&id| self.tree.tag_name(id))
            .collect()
    }

    /// Handle one tag token. Returns the tag name if an element was opened
    /// (pushed on the stack of open elements).
    fn add_tag(&mut self, text: &str) -> Option<String> {
        let (tag, attributes) = parse_tag(text)?;
        if tag.starts_with('!') || tag.starts_with('?') {
            // DOCTYPE and processing instructions.
            return None;
        }
        self.implicit_tags(Some(&tag));

        if let Some(name) = tag.strip_prefix('/') {
            self.close_element(name);
            return None;
        }

        let parent = self.current();
        let node = self
            .tree
            .alloc(NodeType::Element(ElementData::new(&tag, attributes)));
        self.tree.append_child(parent, node);

        if SELF_CLOSING_TAGS.contains(&tag.as_str()) || text.trim_end().ends_with('/') {
            return None;
        }
        self.unfinished.push(node);
        Some(tag)
    }

    /// Pop open elements up to and including the nearest `name`. End tags
    /// that match nothing open are ignored. `</body>` and `</html>` close
    /// nothing: trailing content still belongs to the body.
    fn close_element(&mut self, name: &str) {
        if name == "body" || name == "html" {
            return;
        }
        let Some(position) = self
            .unfinished
            .iter()
            .rposition(|&id| self.tree.tag_name(id) == Some(name))
        else {
            warn_once("HTML", &format!("stray end tag </{name}>"));
            return;
        };
        if position == 0 {
            return;
        }
        self.unfinished.truncate(position);
    }

    /// [§ 13.2.6.4 The rules for parsing tokens in HTML content](https://html.spec.whatwg.org/multipage/parsing.html#parsing-main-inhtml)
    ///
    /// Insert the `html`, `head` and `body` elements the document omitted.
    fn implicit_tags(&mut self, tag: Option<&str>) {
        loop {
            let open = self.open_tags();
            if open.is_empty() && tag != Some("html") {
                let _ = self.add_tag("html");
            } else if open == ["html"] && !matches!(tag, Some("head" | "body" | "/html")) {
                if tag.is_some_and(|t| HEAD_TAGS.contains(&t)) {
                    let _ = self.add_tag("head");
                } else {
                    let _ = self.add_tag("body");
                }
            } else if open == ["html", "head"]
                && !tag.is_some_and(|t| t == "/head" || HEAD_TAGS.contains(&t))
            {
                let _ = self.add_tag("/head");
            } else {
                break;
            }
        }
    }

    fn finish(mut self) -> DomTree {
        if self.unfinished.is_empty() {
            self.implicit_tags(None);
        }
        self.tree
    }
}

/// Whether the text after `<` begins a tag (as opposed to a literal `<`).
fn starts_tag(after: &str) -> bool {
    after
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '/' || c == '!' || c == '?')
}

/// Byte offset of `</name` (ASCII case-insensitive) in `haystack`.
fn find_end_tag(haystack: &str, name: &str) -> Option<usize> {
    let needle = format!("</{name}");
    let lower = haystack.to_ascii_lowercase();
    lower.find(&needle)
}

/// Split a tag body (`div class="a b" hidden`) into its lowercased name and
/// attributes. Quoted values may contain spaces; unquoted values end at
/// whitespace; attributes without a value map to the empty string.
fn parse_tag(text: &str) -> Option<(String, AttributesMap)> {
    let text = text.trim();
    let text = text.strip_suffix('/').unwrap_or(text).trim_end();
    let name_end = text.find(char::is_whitespace).unwrap_or(text.len());
    let tag = text[..name_end].to_ascii_lowercase();
    if tag.is_empty() {
        return None;
    }

    let mut attributes = AttributesMap::new();
    let bytes = text.as_bytes();
    let mut i = name_end;
    loop {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() {
            break;
        }
        let start = i;
        while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'=' {
            i += 1;
        }
        let key = text[start..i].to_ascii_lowercase();
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let mut value = String::new();
        if i < bytes.len() && bytes[i] == b'=' {
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            if i < bytes.len() && (bytes[i] == b'"' || bytes[i] == b'\'') {
                let quote = bytes[i];
                let value_start = i + 1;
                let value_end = text[value_start..]
                    .find(char::from(quote))
                    .map_or(text.len(), |offset| value_start + offset);
                value = decode_entities(&text[value_start..value_end]);
                i = (value_end + 1).min(text.len());
            } else {
                let value_start = i;
                while i < bytes.len() && !bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                value = decode_entities(&text[value_start..i]);
            }
        }
        if !key.is_empty() {
            let _ = attributes.entry(key).or_insert(value);
        }
    }
    Some((tag, attributes))
}

/// Parse a complete document.
#[must_use]
pub fn parse_document(html: &str) -> DomTree {
    HtmlParser::new(html).parse()
}

/// Parse an HTML fragment (the value assigned to `innerHTML`).
///
/// The fragment is parsed as the body of a fresh document; the returned
/// tree's [`DomTree::body`] children are the fragment's top-level nodes.
#[must_use]
pub fn parse_fragment(html: &str) -> DomTree {
    parse_document(&format!("<html><body>{html}</body></html>"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tag_attributes() {
        let (tag, attrs) = parse_tag(r#"DIV class="a b" id=main hidden data-x = 'y'"#).unwrap();
        assert_eq!(tag, "div");
        assert_eq!(attrs.get("class").map(String::as_str), Some("a b"));
        assert_eq!(attrs.get("id").map(String::as_str), Some("main"));
        assert_eq!(attrs.get("hidden").map(String::as_str), Some(""));
        assert_eq!(attrs.get("data-x").map(String::as_str), Some("y"));
    }

    #[test]
    fn test_parse_tag_self_closing_syntax() {
        let (tag, attrs) = parse_tag("br/").unwrap();
        assert_eq!(tag, "br");
        assert!(attrs.is_empty());
    }

    #[test]
    fn test_find_end_tag_is_case_insensitive() {
        assert_eq!(find_end_tag("a < b</SCRIPT>", "script"), Some(5));
    }
}
