//! URL parsing, resolution and origins.
//!
//! [URL Standard](https://url.spec.whatwg.org/)
//!
//! This is deliberately small: it understands `http`, `https`, `file`,
//! `data` and `about:blank`, which is everything the loader fetches.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Errors produced while parsing or resolving a URL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlError {
    /// The scheme is not one the fetcher understands.
    #[error("unsupported protocol '{0}'")]
    UnsupportedScheme(String),
    /// The string could not be split into scheme, host and path.
    #[error("malformed URL '{0}'")]
    Malformed(String),
}

/// The schemes a [`Url`] may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// Plain HTTP.
    Http,
    /// HTTP over TLS.
    Https,
    /// Local filesystem.
    File,
    /// Inline `data:` payload.
    Data,
    /// `about:` pages (only `about:blank`).
    About,
}

impl Scheme {
    /// The scheme as written before the colon.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
            Self::File => "file",
            Self::Data => "data",
            Self::About => "about",
        }
    }

    const fn default_port(self) -> u16 {
        match self {
            Self::Http => 80,
            Self::Https => 443,
            Self::File | Self::Data | Self::About => 0,
        }
    }
}

/// A parsed absolute URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Url {
    scheme: Scheme,
    host: String,
    port: u16,
    /// Path plus query. For `data:` URLs this is everything after the colon.
    path: String,
}

/// [§ 7.5 Origin](https://html.spec.whatwg.org/multipage/browsers.html#origin)
///
/// "An origin is one of the following: an opaque origin, a tuple origin."
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Origin {
    /// `(scheme, host, port)`.
    Tuple {
        /// Scheme of the origin.
        scheme: Scheme,
        /// Lowercased host.
        host: String,
        /// Explicit or default port.
        port: u16,
    },
    /// Origin of `data:`/`about:` documents. Never same-origin with anything.
    Opaque,
}

impl Origin {
    /// Parse an origin as written in a `Content-Security-Policy` source list.
    ///
    /// # Errors
    ///
    /// Returns an error if `text` is not an absolute URL.
    pub fn parse(text: &str) -> Result<Self, UrlError> {
        Url::parse(text).map(|url| url.origin())
    }

    /// [§ 7.5 same origin](https://html.spec.whatwg.org/multipage/browsers.html#same-origin)
    ///
    /// Opaque origins are only same-origin with themselves; we never keep
    /// the identity around, so two opaque origins never match.
    #[must_use]
    pub fn same_origin(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Opaque, _) | (_, Self::Opaque) => false,
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tuple { scheme, host, port } => {
                write!(f, "{}://{host}:{port}", scheme.as_str())
            }
            Self::Opaque => f.write_str("null"),
        }
    }
}

impl Url {
    /// Parse an absolute URL string.
    ///
    /// # Errors
    ///
    /// Returns [`UrlError::UnsupportedScheme`] for schemes other than
    /// `http`, `https`, `file`, `data` and `about`, and
    /// [`UrlError::Malformed`] when no scheme can be found.
    pub fn parse(input: &str) -> Result<Self, UrlError> {
        let input = input.trim();
        let Some((scheme, rest)) = input.split_once(':') else {
            return Err(UrlError::Malformed(input.to_string()));
        };
        let scheme = match scheme.to_ascii_lowercase().as_str() {
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            "file" => Scheme::File,
            "data" => Scheme::Data,
            "about" => Scheme::About,
            other => return Err(UrlError::UnsupportedScheme(other.to_string())),
        };

        match scheme {
            Scheme::Data | Scheme::About => Ok(Self {
                scheme,
                host: String::new(),
                port: 0,
                path: rest.to_string(),
            }),
            Scheme::File => {
                let path = rest.strip_prefix("//").unwrap_or(rest);
                Ok(Self {
                    scheme,
                    host: String::new(),
                    port: 0,
                    path: strip_fragment(path).to_string(),
                })
            }
            Scheme::Http | Scheme::Https => {
                let Some(rest) = rest.strip_prefix("//") else {
                    return Err(UrlError::Malformed(input.to_string()));
                };
                let (authority, path) = match rest.find('/') {
                    Some(i) => (&rest[..i], &rest[i..]),
                    None => (rest, "/"),
                };
                if authority.is_empty() {
                    return Err(UrlError::Malformed(input.to_string()));
                }
                let (host, port) = match authority.rsplit_once(':') {
                    Some((host, port)) => {
                        let port = port
                            .parse::<u16>()
                            .map_err(|_| UrlError::Malformed(input.to_string()))?;
                        (host, port)
                    }
                    None => (authority, scheme.default_port()),
                };
                Ok(Self {
                    scheme,
                    host: host.to_ascii_lowercase(),
                    port,
                    path: strip_fragment(path).to_string(),
                })
            }
        }
    }

    /// `about:blank`, the URL of a frame before anything was loaded into it.
    #[must_use]
    pub fn blank() -> Self {
        Self {
            scheme: Scheme::About,
            host: String::new(),
            port: 0,
            path: "blank".to_string(),
        }
    }

    /// Resolve `href` against this URL.
    ///
    /// [§ 2.4 URLs](https://html.spec.whatwg.org/multipage/urls-and-fetching.html#resolving-urls)
    ///
    /// STEP 1: Absolute URLs are returned as parsed.
    /// STEP 2: Scheme-relative URLs (`//host/...`) take this URL's scheme.
    /// STEP 3: Path-absolute URLs (`/x`) keep this URL's host and port.
    /// STEP 4: Path-relative URLs are joined with this URL's directory,
    ///         consuming leading `../` and `./` segments.
    ///
    /// # Errors
    ///
    /// Returns an error if the result cannot be parsed, or if a relative
    /// reference is resolved against a `data:`/`about:` URL.
    pub fn resolve(&self, href: &str) -> Result<Self, UrlError> {
        let href = href.trim();

        // STEP 1
        if href.contains("://") || href.starts_with("data:") || href.starts_with("about:") {
            return Self::parse(href);
        }
        if matches!(self.scheme, Scheme::Data | Scheme::About) {
            return Err(UrlError::Malformed(href.to_string()));
        }

        // STEP 2
        if let Some(rest) = href.strip_prefix("//") {
            return Self::parse(&format!("{}://{rest}", self.scheme.as_str()));
        }

        // STEP 3 / STEP 4
        let path = if href.starts_with('/') {
            href.to_string()
        } else {
            let base_path = self.path.split(['?', '#']).next().unwrap_or_default();
            let mut dir = base_path.rsplit_once('/').map_or("", |(dir, _)| dir);
            let mut rest = href;
            loop {
                if let Some(stripped) = rest.strip_prefix("../") {
                    rest = stripped;
                    dir = dir.rsplit_once('/').map_or("", |(parent, _)| parent);
                } else if let Some(stripped) = rest.strip_prefix("./") {
                    rest = stripped;
                } else {
                    break;
                }
            }
            format!("{dir}/{rest}")
        };

        Ok(Self {
            scheme: self.scheme,
            host: self.host.clone(),
            port: self.port,
            path: strip_fragment(&path).to_string(),
        })
    }

    /// [§ 7.5 Origin](https://html.spec.whatwg.org/multipage/browsers.html#origin)
    #[must_use]
    pub fn origin(&self) -> Origin {
        match self.scheme {
            Scheme::Http | Scheme::Https => Origin::Tuple {
                scheme: self.scheme,
                host: self.host.clone(),
                port: self.port,
            },
            Scheme::File | Scheme::Data | Scheme::About => Origin::Opaque,
        }
    }

    /// The URL's scheme.
    #[must_use]
    pub const fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// The URL's host (empty for non-network schemes).
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The URL's port (explicit or the scheme default).
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Path and query (or the payload for `data:` URLs).
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scheme {
            Scheme::Data | Scheme::About => write!(f, "{}:{}", self.scheme.as_str(), self.path),
            Scheme::File => write!(f, "file://{}", self.path),
            Scheme::Http | Scheme::Https => {
                if self.port == self.scheme.default_port() {
                    write!(f, "{}://{}{}", self.scheme.as_str(), self.host, self.path)
                } else {
                    write!(
                        f,
                        "{}://{}:{}{}",
                        self.scheme.as_str(),
                        self.host,
                        self.port,
                        self.path
                    )
                }
            }
        }
    }
}

fn strip_fragment(path: &str) -> &str {
    path.split_once('#').map_or(path, |(before, _)| before)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_http_defaults() {
        let url = Url::parse("http://Example.org").unwrap();
        assert_eq!(url.host(), "example.org");
        assert_eq!(url.port(), 80);
        assert_eq!(url.path(), "/");
        assert_eq!(url.to_string(), "http://example.org/");
    }

    #[test]
    fn test_parse_rejects_unknown_scheme() {
        assert_eq!(
            Url::parse("gopher://x/"),
            Err(UrlError::UnsupportedScheme("gopher".to_string()))
        );
        assert!(matches!(Url::parse("nonsense"), Err(UrlError::Malformed(_))));
    }

    #[test]
    fn test_resolve_relative_paths() {
        let base = Url::parse("https://a.test/dir/sub/page.html").unwrap();
        assert_eq!(
            base.resolve("style.css").unwrap().to_string(),
            "https://a.test/dir/sub/style.css"
        );
        assert_eq!(
            base.resolve("../img.png").unwrap().to_string(),
            "https://a.test/dir/img.png"
        );
        assert_eq!(
            base.resolve("/root.js").unwrap().to_string(),
            "https://a.test/root.js"
        );
        assert_eq!(
            base.resolve("//b.test/x").unwrap().to_string(),
            "https://b.test/x"
        );
    }

    #[test]
    fn test_origin_comparison() {
        let a = Url::parse("https://self.example/index.html").unwrap();
        let b = Url::parse("https://self.example:443/other").unwrap();
        let c = Url::parse("http://self.example/").unwrap();
        assert!(a.origin().same_origin(&b.origin()));
        assert!(!a.origin().same_origin(&c.origin()));
        assert_eq!(a.origin().to_string(), "https://self.example:443");

        let data = Url::parse("data:text/html,hi").unwrap();
        assert!(!data.origin().same_origin(&data.origin()));
    }
}
