//! A forgiving CSS parser.
//!
//! [CSS Syntax Level 3](https://www.w3.org/TR/css-syntax-3/)
//!
//! The parser is a hand-written recursive descent over characters. It does
//! not tokenize first. Every production that fails is recovered from by
//! skipping to the next `;` (inside a declaration block) or `}` (between
//! rules), so malformed input loses the smallest possible unit and never
//! aborts the parse.

use std::str::FromStr;

use quokka_common::warning::warn_once;
use quokka_dom::Property;

use crate::selector::Selector;

/// A list of declarations in source order. Later entries win.
pub type Declarations = Vec<(Property, String)>;

/// [Media Queries Level 5 § 12.5 prefers-color-scheme](https://www.w3.org/TR/mediaqueries-5/#prefers-color-scheme)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Media {
    /// `(prefers-color-scheme: dark)`
    Dark,
    /// `(prefers-color-scheme: light)`
    Light,
}

impl Media {
    /// Whether the media condition holds for the tab's colour scheme.
    #[must_use]
    pub const fn matches(self, dark_mode: bool) -> bool {
        match self {
            Self::Dark => dark_mode,
            Self::Light => !dark_mode,
        }
    }
}

/// A style rule: optional media condition, selector and declarations.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    /// The enclosing `@media` condition, if any.
    pub media: Option<Media>,
    /// Which elements the rule applies to.
    pub selector: Selector,
    /// The declaration block.
    pub declarations: Declarations,
}

impl Rule {
    /// Cascade priority of the rule's selector.
    #[must_use]
    pub fn priority(&self) -> u32 {
        self.selector.priority()
    }
}

/// Stable-sort rules ascending by cascade priority, so that applying them
/// in order lets the most specific (then the latest) rule win.
pub fn sort_rules(rules: &mut [Rule]) {
    rules.sort_by_key(Rule::priority);
}

/// A parse failure at some production. Always recovered from; never
/// escapes this module.
#[derive(Debug)]
struct Mismatch;

type Parse<T> = Result<T, Mismatch>;

/// Character-level CSS parser.
///
/// Used for stylesheets ([`CssParser::parse`]) and for `style` attribute
/// values ([`CssParser::body`]).
pub struct CssParser {
    chars: Vec<char>,
    i: usize,
}

impl CssParser {
    /// A parser over `source`.
    #[must_use]
    pub fn new(source: &str) -> Self {
        Self {
            chars: strip_comments(source).chars().collect(),
            i: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.i).copied()
    }

    fn whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.i += 1;
        }
    }

    fn literal(&mut self, literal: char) -> Parse<()> {
        if self.peek() != Some(literal) {
            return Err(Mismatch);
        }
        self.i += 1;
        Ok(())
    }

    /// [§ 4.3.11 Consume an ident sequence](https://www.w3.org/TR/css-syntax-3/#consume-name)
    ///
    /// Loosened to cover numbers, dimensions, hashes and percentages, which
    /// is everything a selector or property name can contain.
    fn word(&mut self) -> Parse<String> {
        let start = self.i;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || "#-.%_".contains(c))
        {
            self.i += 1;
        }
        if self.i == start {
            return Err(Mismatch);
        }
        Ok(self.chars[start..self.i].iter().collect())
    }

    /// Everything up to (not including) the first of `stops`.
    fn until_chars(&mut self, stops: &[char]) -> String {
        let start = self.i;
        while self.peek().is_some_and(|c| !stops.contains(&c)) {
            self.i += 1;
        }
        self.chars[start..self.i].iter().collect()
    }

    /// Skip to the first of `stops`, returning which one was found.
    fn ignore_until(&mut self, stops: &[char]) -> Option<char> {
        while let Some(c) = self.peek() {
            if stops.contains(&c) {
                return Some(c);
            }
            self.i += 1;
        }
        None
    }

    /// `name: value` with the value ending at any of `stops`.
    fn pair(&mut self, stops: &[char]) -> Parse<(String, String)> {
        let name = self.word()?;
        self.whitespace();
        self.literal(':')?;
        self.whitespace();
        let value = self.until_chars(stops);
        Ok((name.to_ascii_lowercase(), value.trim().to_string()))
    }

    /// [§ 5.4.5 Consume a list of declarations](https://www.w3.org/TR/css-syntax-3/#consume-list-of-declarations)
    ///
    /// Parses declarations up to a closing `}` or end of input. Properties
    /// outside the supported set are dropped with a warning. `!important`
    /// is stripped and otherwise ignored.
    pub fn body(&mut self) -> Declarations {
        let mut declarations = Declarations::new();
        self.whitespace();
        while self.peek().is_some_and(|c| c != '}') {
            match self.pair(&[';', '}']) {
                Ok((name, value)) => {
                    push_declaration(&mut declarations, &name, &value);
                    self.whitespace();
                    if self.peek() == Some(';') {
                        self.i += 1;
                    }
                    self.whitespace();
                }
                Err(Mismatch) => match self.ignore_until(&[';', '}']) {
                    Some(';') => {
                        self.i += 1;
                        self.whitespace();
                    }
                    _ => break,
                },
            }
        }
        declarations
    }

    /// One compound selector: a tag or class, optionally with `:focus`.
    fn simple_selector(&mut self) -> Parse<Selector> {
        let word = self.word()?;
        let base = if let Some(class) = word.strip_prefix('.') {
            Selector::Class(class.to_string())
        } else {
            Selector::Tag(word.to_ascii_lowercase())
        };
        if self.peek() != Some(':') {
            return Ok(base);
        }
        self.i += 1;
        let pseudo = self.word()?.to_ascii_lowercase();
        if pseudo == "focus" {
            Ok(Selector::Focus(Box::new(base)))
        } else {
            warn_once("CSS", &format!("unsupported pseudo-class ':{pseudo}'"));
            Err(Mismatch)
        }
    }

    /// A chain of compound selectors joined by descendant combinators.
    fn selector(&mut self) -> Parse<Selector> {
        let mut out = self.simple_selector()?;
        self.whitespace();
        while self.peek().is_some_and(|c| c != '{') {
            let descendant = self.simple_selector()?;
            out = Selector::Descendant {
                ancestor: Box::new(out),
                descendant: Box::new(descendant),
            };
            self.whitespace();
        }
        Ok(out)
    }

    /// `@media (name: value)`, leaving the parser before the `{`.
    fn media_query(&mut self) -> Parse<(String, String)> {
        self.literal('@')?;
        if self.word()? != "media" {
            return Err(Mismatch);
        }
        self.whitespace();
        self.literal('(')?;
        self.whitespace();
        let pair = self.pair(&[')'])?;
        self.whitespace();
        self.literal(')')?;
        Ok(pair)
    }

    /// Skip a `{ ... }` block, including nested blocks.
    fn skip_block(&mut self) {
        let mut depth = 0usize;
        while let Some(c) = self.peek() {
            self.i += 1;
            match c {
                '{' => depth += 1,
                '}' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return;
                    }
                }
                _ => {}
            }
        }
    }

    /// [§ 5.3.3 Parse a stylesheet](https://www.w3.org/TR/css-syntax-3/#parse-stylesheet)
    #[must_use]
    pub fn parse(mut self) -> Vec<Rule> {
        let mut rules = Vec::new();
        let mut media: Option<Media> = None;
        self.whitespace();
        while self.i < self.chars.len() {
            let step = if self.peek() == Some('@') && media.is_none() {
                self.at_rule().map(|found| media = found)
            } else if self.peek() == Some('}') && media.is_some() {
                self.i += 1;
                media = None;
                self.whitespace();
                Ok(())
            } else {
                self.rule(media).map(|rule| rules.push(rule))
            };
            if step.is_err() {
                match self.ignore_until(&['}']) {
                    Some(_) => {
                        self.i += 1;
                        self.whitespace();
                    }
                    None => break,
                }
            }
        }
        rules
    }

    /// An `@media` block opener. Conditions other than
    /// `prefers-color-scheme` skip their whole block.
    fn at_rule(&mut self) -> Parse<Option<Media>> {
        let start = self.i;
        let condition = self.media_query();
        self.whitespace();
        let media = match condition {
            Ok((name, value)) if name == "prefers-color-scheme" && value == "dark" => {
                Some(Media::Dark)
            }
            Ok((name, value)) if name == "prefers-color-scheme" && value == "light" => {
                Some(Media::Light)
            }
            _ => None,
        };
        if media.is_none() {
            let text: String = self.chars[start..self.i].iter().collect();
            warn_once("CSS", &format!("unsupported at-rule '{}'", text.trim()));
            let _ = self.ignore_until(&['{', ';']);
            if self.peek() == Some('{') {
                self.skip_block();
            } else if self.peek() == Some(';') {
                self.i += 1;
            }
            self.whitespace();
            return Ok(None);
        }
        self.literal('{')?;
        self.whitespace();
        Ok(media)
    }

    fn rule(&mut self, media: Option<Media>) -> Parse<Rule> {
        let selector = self.selector()?;
        self.literal('{')?;
        self.whitespace();
        let declarations = self.body();
        self.literal('}')?;
        self.whitespace();
        Ok(Rule {
            media,
            selector,
            declarations,
        })
    }
}

/// Parse a stylesheet.
#[must_use]
pub fn parse_stylesheet(source: &str) -> Vec<Rule> {
    CssParser::new(source).parse()
}

/// Parse the value of a `style` attribute.
#[must_use]
pub fn parse_declarations(source: &str) -> Declarations {
    CssParser::new(source).body()
}

/// [DOM § 4.2.6 querySelectorAll](https://dom.spec.whatwg.org/#dom-parentnode-queryselectorall)
///
/// Parse a selector given to `querySelectorAll`. `None` if it is not a
/// selector this parser supports, or has trailing input.
#[must_use]
pub fn parse_selector(source: &str) -> Option<Selector> {
    let mut parser = CssParser::new(source);
    parser.whitespace();
    let selector = parser.selector().ok()?;
    (parser.i == parser.chars.len()).then_some(selector)
}

fn push_declaration(declarations: &mut Declarations, name: &str, value: &str) {
    let value = value
        .strip_suffix("!important")
        .map_or(value, str::trim_end);
    match Property::from_str(name) {
        Ok(property) => declarations.push((property, value.to_string())),
        Err(_) => warn_once("CSS", &format!("unsupported property '{name}'")),
    }
}

/// [§ 4.3.2 Consume comments](https://www.w3.org/TR/css-syntax-3/#consume-comment)
fn strip_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find("*/") {
            Some(end) => rest = &rest[start + 2 + end + 2..],
            None => return out,
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_recovers_from_garbage() {
        let body = parse_declarations("color: red; ;;; @@ bogus; opacity: 0.5");
        assert_eq!(
            body,
            vec![
                (Property::Color, "red".to_string()),
                (Property::Opacity, "0.5".to_string())
            ]
        );
    }

    #[test]
    fn test_parse_selector() {
        assert!(matches!(parse_selector("div p"), Some(Selector::Descendant { .. })));
        assert!(parse_selector("  a ").is_some());
        assert!(parse_selector("").is_none());
        assert!(parse_selector("div {").is_none());
    }

    #[test]
    fn test_comments_are_stripped() {
        assert_eq!(strip_comments("a/* x */b/* open"), "ab");
    }

    #[test]
    fn test_important_is_ignored() {
        let body = parse_declarations("color: blue !important");
        assert_eq!(body, vec![(Property::Color, "blue".to_string())]);
    }
}
