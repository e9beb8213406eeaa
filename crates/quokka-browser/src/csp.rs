//! [Content Security Policy Level 3](https://www.w3.org/TR/CSP3/)
//!
//! Only the `default-src` directive, with a list of origins.

use quokka_common::url::{Origin, Url};
use quokka_common::warning::warn_once;

/// The sub-resource policy of one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentSecurityPolicy {
    /// `None` when the document sent no policy: everything is allowed.
    allowed_origins: Option<Vec<Origin>>,
}

impl ContentSecurityPolicy {
    /// A policy that allows every request.
    #[must_use]
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// [§ 2.2.1 Parse a serialized CSP](https://www.w3.org/TR/CSP3/#parse-serialized-policy)
    ///
    /// "Let directive name be the result of collecting a sequence of code
    /// points that are not ASCII whitespace."
    ///
    /// Parse a `Content-Security-Policy` header. Directives other than
    /// `default-src` are ignored with a warning; so are sources that are not
    /// absolute URLs.
    #[must_use]
    pub fn parse(header: &str) -> Self {
        let mut allowed_origins = None;
        for directive in header.split(';') {
            let mut tokens = directive.split_ascii_whitespace();
            let Some(name) = tokens.next() else {
                continue;
            };
            if !name.eq_ignore_ascii_case("default-src") {
                warn_once("CSP", &format!("unsupported directive '{name}'"));
                continue;
            }
            let mut origins = Vec::new();
            for source in tokens {
                match Origin::parse(source) {
                    Ok(origin) => origins.push(origin),
                    Err(_) => warn_once("CSP", &format!("unsupported source '{source}'")),
                }
            }
            allowed_origins = Some(origins);
        }
        Self { allowed_origins }
    }

    /// Whether a sub-resource request to `url` may be made.
    #[must_use]
    pub fn allows(&self, url: &Url) -> bool {
        let Some(allowed) = &self.allowed_origins else {
            return true;
        };
        let origin = url.origin();
        allowed.iter().any(|a| a.same_origin(&origin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_no_policy_allows_everything() {
        let policy = ContentSecurityPolicy::allow_all();
        assert!(policy.allows(&url("https://anywhere.test/x.css")));
    }

    #[test]
    fn test_default_src_allow_list() {
        let policy = ContentSecurityPolicy::parse("default-src https://self.example https://cdn.example:8443");
        assert!(policy.allows(&url("https://self.example/style.css")));
        assert!(policy.allows(&url("https://cdn.example:8443/a.js")));
        assert!(!policy.allows(&url("https://cdn.example/a.js")));
        assert!(!policy.allows(&url("https://other.example/style.css")));
        assert!(!policy.allows(&url("http://self.example/style.css")));
    }

    #[test]
    fn test_empty_default_src_blocks_everything() {
        let policy = ContentSecurityPolicy::parse("default-src");
        assert!(!policy.allows(&url("https://self.example/")));
    }

    #[test]
    fn test_other_directives_are_ignored() {
        let policy = ContentSecurityPolicy::parse("script-src 'self'; img-src *");
        assert_eq!(policy, ContentSecurityPolicy::allow_all());
    }
}
