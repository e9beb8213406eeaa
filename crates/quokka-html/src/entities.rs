//! Character reference decoding.
//!
//! [§ 13.5 Named character references](https://html.spec.whatwg.org/multipage/named-characters.html)
//!
//! The full table defines 2,231 entities; we decode the common ones plus
//! decimal and hexadecimal numeric references.

use std::collections::HashMap;
use std::sync::LazyLock;

/// Maps entity names (without `&` and `;`) to their replacement strings.
static NAMED_ENTITIES: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("amp", "&"),
        ("lt", "<"),
        ("gt", ">"),
        ("quot", "\""),
        ("apos", "'"),
        ("nbsp", "\u{00A0}"),
        ("copy", "\u{00A9}"),
        ("reg", "\u{00AE}"),
        ("trade", "\u{2122}"),
        ("mdash", "\u{2014}"),
        ("ndash", "\u{2013}"),
        ("hellip", "\u{2026}"),
        ("bull", "\u{2022}"),
        ("middot", "\u{00B7}"),
        ("lsquo", "\u{2018}"),
        ("rsquo", "\u{2019}"),
        ("ldquo", "\u{201C}"),
        ("rdquo", "\u{201D}"),
        ("shy", "\u{00AD}"),
    ])
});

/// Longest reference body (between `&` and `;`) we try to match.
const MAX_REFERENCE_LEN: usize = 10;

/// Replace character references in `text`. Unknown references are kept
/// verbatim.
#[must_use]
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        match decode_one(rest) {
            Some((replacement, consumed)) => {
                out.push_str(&replacement);
                rest = &rest[consumed..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Decode the reference at the start of `input` (which begins with `&`).
/// Returns the replacement and the number of bytes consumed.
fn decode_one(input: &str) -> Option<(String, usize)> {
    let semicolon = input[1..].find(';')? + 1;
    let name = &input[1..semicolon];
    if name.is_empty() || name.len() > MAX_REFERENCE_LEN {
        return None;
    }
    let replacement = if let Some(number) = name.strip_prefix('#') {
        let code = match number.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => number.parse::<u32>().ok()?,
        };
        char::from_u32(code).unwrap_or('\u{FFFD}').to_string()
    } else {
        (*NAMED_ENTITIES.get(name)?).to_string()
    };
    Some((replacement, semicolon + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_and_numeric() {
        assert_eq!(decode_entities("a &lt; b &amp;&amp; c"), "a < b && c");
        assert_eq!(decode_entities("&#65;&#x42;"), "AB");
    }

    #[test]
    fn test_unknown_kept() {
        assert_eq!(decode_entities("fish &chips; & more"), "fish &chips; & more");
    }
}
