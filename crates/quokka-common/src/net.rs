//! Resource fetching for the Quokka browser.
//!
//! The loader never talks to the network directly; it goes through the
//! [`Fetcher`] trait so that frames can be driven from memory in tests.
//! [`NetworkFetcher`] is the real implementation: blocking HTTP(S) via
//! `reqwest`, plus `file:`, `data:` and `about:blank`.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use base64::Engine;
use thiserror::Error;

use crate::url::{Scheme, Url};

/// User-Agent header sent with all requests.
const USER_AGENT: &str = "Quokka/0.1 (incremental rendering engine)";

/// Default request timeout.
const TIMEOUT: Duration = Duration::from_secs(30);

/// Errors raised while fetching a resource.
#[derive(Debug, Error)]
pub enum NetError {
    /// The HTTP client could not be constructed.
    #[error("failed to create HTTP client: {0}")]
    Client(String),
    /// Connecting, sending or reading the response failed.
    #[error("request to {url} failed: {message}")]
    Request {
        /// The URL being fetched.
        url: String,
        /// Underlying error text.
        message: String,
    },
    /// Reading a `file:` URL failed.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Local path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A `data:` URL could not be decoded.
    #[error("invalid data URL: {0}")]
    DataUrl(String),
    /// The resource is not available from this fetcher.
    #[error("no resource for {0}")]
    NotFound(String),
}

/// Request method. Only the two the browser issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// `GET`
    Get,
    /// `POST` (form submission and XHR)
    Post,
}

/// A single outgoing request.
#[derive(Debug, Clone)]
pub struct Request {
    /// Target URL.
    pub url: Url,
    /// Request method.
    pub method: Method,
    /// Request body, sent with `Content-Length`.
    pub body: Option<String>,
    /// URL of the document issuing the request.
    pub referrer: Option<Url>,
}

impl Request {
    /// A `GET` request with no body.
    #[must_use]
    pub const fn get(url: Url) -> Self {
        Self {
            url,
            method: Method::Get,
            body: None,
            referrer: None,
        }
    }

    /// A `POST` request carrying `body`.
    #[must_use]
    pub const fn post(url: Url, body: String) -> Self {
        Self {
            url,
            method: Method::Post,
            body: Some(body),
            referrer: None,
        }
    }

    /// Attach the referrer.
    #[must_use]
    pub fn with_referrer(mut self, referrer: Option<&Url>) -> Self {
        self.referrer = referrer.cloned();
        self
    }
}

/// A fetched resource: status, headers and raw body.
#[derive(Debug, Clone, Default)]
pub struct Response {
    /// HTTP status (200 for non-HTTP schemes).
    pub status: u16,
    /// Header names are stored lowercased.
    headers: HashMap<String, String>,
    /// Raw body bytes.
    pub body: Vec<u8>,
}

impl Response {
    /// Build a response from header pairs; names are lowercased.
    #[must_use]
    pub fn new<K, V>(status: u16, headers: impl IntoIterator<Item = (K, V)>, body: Vec<u8>) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        let headers = headers
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_ascii_lowercase(), v.into()))
            .collect();
        Self {
            status,
            headers,
            body,
        }
    }

    /// A 200 response with no headers.
    #[must_use]
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::new::<&str, String>(200, [], body.into())
    }

    /// Case-insensitive header lookup.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// The body decoded as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Anything that can turn a [`Request`] into a [`Response`].
///
/// Fetchers are shared between the main thread and XHR worker threads.
pub trait Fetcher: Send + Sync {
    /// Perform the request synchronously.
    ///
    /// # Errors
    ///
    /// Returns a [`NetError`] when the resource cannot be obtained.
    fn fetch(&self, request: &Request) -> Result<Response, NetError>;
}

/// The default fetcher: HTTP(S) over `reqwest`, local files, data URLs.
pub struct NetworkFetcher {
    client: reqwest::blocking::Client,
}

impl NetworkFetcher {
    /// Create a fetcher with the default timeout and user agent.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Client`] if the TLS backend cannot be initialised.
    pub fn new() -> Result<Self, NetError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| NetError::Client(e.to_string()))?;
        Ok(Self { client })
    }

    fn fetch_http(&self, request: &Request) -> Result<Response, NetError> {
        let url = request.url.to_string();
        let failed = |e: reqwest::Error| NetError::Request {
            url: url.clone(),
            message: e.to_string(),
        };

        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        };
        if let Some(referrer) = &request.referrer {
            if referrer.origin() == request.url.origin() {
                builder = builder.header("Referer", referrer.to_string());
            }
        }
        if let Some(body) = &request.body {
            builder = builder
                .header("Content-Type", "application/x-www-form-urlencoded")
                .body(body.clone());
        }

        let response = builder.send().map_err(failed)?;
        let status = response.status().as_u16();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().map_err(failed)?.to_vec();
        log::debug!("fetched {url} ({status}, {} bytes)", body.len());
        Ok(Response::new(status, headers, body))
    }
}

impl Fetcher for NetworkFetcher {
    fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        match request.url.scheme() {
            Scheme::Http | Scheme::Https => self.fetch_http(request),
            Scheme::File => {
                let path = request.url.path().to_string();
                let body = std::fs::read(&path).map_err(|source| NetError::Io { path, source })?;
                Ok(Response::ok(body))
            }
            Scheme::Data => {
                let data_url = DataUrl::new(request.url.path());
                let body = data_url.decode()?;
                Ok(Response::new(200, [("content-type", data_url.media_type())], body))
            }
            Scheme::About => Ok(Response::ok(Vec::new())),
        }
    }
}

/// An in-memory fetcher keyed by URL string. Records every request.
///
/// Used to drive frames without a network.
#[derive(Default)]
pub struct MemoryFetcher {
    resources: HashMap<String, Response>,
    log: Mutex<Vec<String>>,
}

impl MemoryFetcher {
    /// An empty fetcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `response` for `url`.
    #[must_use]
    pub fn with(mut self, url: &str, response: Response) -> Self {
        let _ = self.resources.insert(url.to_string(), response);
        self
    }

    /// Serve `body` as a 200 response for `url`.
    #[must_use]
    pub fn with_body(self, url: &str, body: &str) -> Self {
        self.with(url, Response::ok(body))
    }

    /// URLs requested so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<String> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }
}

impl Fetcher for MemoryFetcher {
    fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        let key = request.url.to_string();
        if let Ok(mut log) = self.log.lock() {
            log.push(key.clone());
        }
        if request.url.scheme() == Scheme::Data {
            let data_url = DataUrl::new(request.url.path());
            return Ok(Response::new(
                200,
                [("content-type", data_url.media_type())],
                data_url.decode()?,
            ));
        }
        self.resources
            .get(&key)
            .cloned()
            .ok_or(NetError::NotFound(key))
    }
}

/// The payload of a `data:` URL (everything after `data:`).
///
/// [RFC 2397](https://www.rfc-editor.org/rfc/rfc2397)
pub struct DataUrl<'a> {
    raw: &'a str,
}

impl<'a> DataUrl<'a> {
    /// Wrap the part of a data URL that follows the `data:` prefix.
    #[must_use]
    pub const fn new(raw: &'a str) -> Self {
        Self { raw }
    }

    fn split(&self) -> (&'a str, &'a str) {
        self.raw.split_once(',').unwrap_or((self.raw, ""))
    }

    /// The declared media type, defaulting to `text/plain`.
    #[must_use]
    pub fn media_type(&self) -> String {
        let (metadata, _) = self.split();
        let media = metadata.split(';').next().unwrap_or_default();
        if media.is_empty() {
            "text/plain".to_string()
        } else {
            media.to_string()
        }
    }

    /// Decode the payload into raw bytes.
    ///
    /// `;base64` payloads are base64-decoded; all others are percent-decoded.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::DataUrl`] if the comma is missing or the base64
    /// payload is invalid.
    pub fn decode(&self) -> Result<Vec<u8>, NetError> {
        if !self.raw.contains(',') {
            return Err(NetError::DataUrl("missing comma".to_string()));
        }
        let (metadata, data) = self.split();
        if metadata.ends_with(";base64") {
            base64::engine::general_purpose::STANDARD
                .decode(data)
                .map_err(|e| NetError::DataUrl(format!("base64 decode error: {e}")))
        } else {
            Ok(percent_decode(data))
        }
    }
}

/// Decode `%XX` escapes; malformed escapes are kept literally.
#[must_use]
pub fn percent_decode(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(value) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(value);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}

/// Percent-encode a form field for `application/x-www-form-urlencoded`.
#[must_use]
pub fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_url_base64() {
        let data = DataUrl::new("text/plain;base64,aGVsbG8=");
        assert_eq!(data.decode().unwrap(), b"hello");
        assert_eq!(data.media_type(), "text/plain");
    }

    #[test]
    fn test_data_url_percent_encoded() {
        let data = DataUrl::new("text/html,%3Cp%3Ehi%3C/p%3E");
        assert_eq!(data.decode().unwrap(), b"<p>hi</p>");
        assert_eq!(data.media_type(), "text/html");
    }

    #[test]
    fn test_data_url_missing_comma() {
        assert!(DataUrl::new("text/plain").decode().is_err());
    }

    #[test]
    fn test_percent_round_trip() {
        let encoded = percent_encode("a b&c");
        assert_eq!(encoded, "a%20b%26c");
        assert_eq!(percent_decode(&encoded), b"a b&c");
        assert_eq!(percent_decode("100%"), b"100%");
    }

    #[test]
    fn test_headers_are_case_insensitive() {
        let response = Response::new(
            200,
            [("Content-Security-Policy", "default-src https://a.test")],
            Vec::new(),
        );
        assert_eq!(
            response.header("content-security-policy"),
            Some("default-src https://a.test")
        );
    }

    #[test]
    fn test_memory_fetcher_records_requests() {
        let fetcher = MemoryFetcher::new().with_body("https://a.test/", "<p>x</p>");
        let url = Url::parse("https://a.test/").unwrap();
        let response = fetcher.fetch(&Request::get(url)).unwrap();
        assert_eq!(response.text(), "<p>x</p>");
        let missing = Url::parse("https://a.test/missing").unwrap();
        assert!(fetcher.fetch(&Request::get(missing)).is_err());
        assert_eq!(
            fetcher.requests(),
            vec!["https://a.test/".to_string(), "https://a.test/missing".to_string()]
        );
    }
}
