//! Request and response model seen by the cache manager.
//!
//! These mirror what a page hands to a fetch handler: a method, a URL, the
//! kind of resource being loaded, and whether the load is a top-level
//! navigation. Responses carry a full snapshot of status, headers and body
//! so they can be stored and replayed from cache.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

pub use reqwest::Method;

/// What kind of resource a request is loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    Document,
    Script,
    Style,
    Image,
    Font,
    Manifest,
    /// fetch()/XHR traffic such as `/api/...` JSON calls
    #[default]
    Empty,
}

impl Destination {
    /// Resource types that are written to cache during runtime traffic
    pub fn is_cacheable(self) -> bool {
        matches!(
            self,
            Destination::Document
                | Destination::Script
                | Destination::Style
                | Destination::Image
                | Destination::Font
        )
    }

    /// Guess the destination from the URL path extension.
    /// Paths ending in `/` or with no extension are treated as documents.
    pub fn infer(url: &Url) -> Self {
        let path = url.path();
        if path.starts_with("/api/") {
            return Destination::Empty;
        }
        let file = path.rsplit('/').next().unwrap_or_default();
        let ext = match file.rsplit_once('.') {
            Some((_, ext)) => ext.to_ascii_lowercase(),
            None => return Destination::Document,
        };
        match ext.as_str() {
            "html" | "htm" => Destination::Document,
            "js" | "mjs" => Destination::Script,
            "css" => Destination::Style,
            "png" | "jpg" | "jpeg" | "gif" | "svg" | "ico" | "webp" => Destination::Image,
            "woff" | "woff2" | "ttf" | "otf" => Destination::Font,
            "webmanifest" => Destination::Manifest,
            "json" if file == "manifest.json" => Destination::Manifest,
            _ => Destination::Empty,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Destination::Document => "document",
            Destination::Script => "script",
            Destination::Style => "style",
            Destination::Image => "image",
            Destination::Font => "font",
            Destination::Manifest => "manifest",
            Destination::Empty => "empty",
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Destination {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "document" => Ok(Destination::Document),
            "script" => Ok(Destination::Script),
            "style" => Ok(Destination::Style),
            "image" => Ok(Destination::Image),
            "font" => Ok(Destination::Font),
            "manifest" => Ok(Destination::Manifest),
            "empty" | "" => Ok(Destination::Empty),
            other => Err(format!("unknown destination: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    /// Top-level page navigation
    Navigate,
    #[default]
    SameOrigin,
    Cors,
    NoCors,
}

#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub destination: Destination,
    pub mode: RequestMode,
    pub headers: Vec<(String, String)>,
}

impl Request {
    /// A GET request whose destination is guessed from the URL
    pub fn get(url: Url) -> Self {
        let destination = Destination::infer(&url);
        Self {
            method: Method::GET,
            url,
            destination,
            mode: RequestMode::SameOrigin,
            headers: Vec::new(),
        }
    }

    /// A top-level page navigation
    pub fn navigate(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            destination: Destination::Document,
            mode: RequestMode::Navigate,
            headers: Vec::new(),
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    pub fn cache_key(&self) -> String {
        cache_key(&self.url)
    }
}

/// Normalize a URL into the key it is stored under.
/// The query string is kept (it carries cache-busting versions); the fragment is dropped.
pub fn cache_key(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.into()
}

pub fn is_same_origin(a: &Url, b: &Url) -> bool {
    a.origin() == b.origin()
}

/// Where a response handed back to the page came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    Network,
    Cache,
    /// Cached root document served in place of a failed navigation
    OfflineFallback,
}

impl fmt::Display for ResponseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResponseSource::Network => "network",
            ResponseSource::Cache => "cache",
            ResponseSource::OfflineFallback => "offline fallback",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Final URL after redirects
    pub url: Url,
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub source: ResponseSource,
}

impl Response {
    pub fn new(url: Url, status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            url,
            status,
            status_text: String::new(),
            headers: Vec::new(),
            body: body.into(),
            source: ResponseSource::Network,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// 2xx status
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_cache_key_keeps_query_drops_fragment() {
        let key = cache_key(&url("https://warranty.example/style.css?v=20250119#top"));
        assert_eq!(key, "https://warranty.example/style.css?v=20250119");
    }

    #[test]
    fn test_cache_key_distinguishes_versions() {
        let a = cache_key(&url("https://warranty.example/script.js?v=1"));
        let b = cache_key(&url("https://warranty.example/script.js?v=2"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_destination_infer() {
        assert_eq!(Destination::infer(&url("https://w.example/")), Destination::Document);
        assert_eq!(Destination::infer(&url("https://w.example/status.html")), Destination::Document);
        assert_eq!(Destination::infer(&url("https://w.example/auth.js?v=3")), Destination::Script);
        assert_eq!(Destination::infer(&url("https://w.example/style.css")), Destination::Style);
        assert_eq!(Destination::infer(&url("https://w.example/favicon.PNG")), Destination::Image);
        assert_eq!(Destination::infer(&url("https://w.example/manifest.json")), Destination::Manifest);
        assert_eq!(Destination::infer(&url("https://w.example/api/warranties")), Destination::Empty);
        assert_eq!(Destination::infer(&url("https://w.example/data.json")), Destination::Empty);
    }

    #[test]
    fn test_destination_cacheable_set() {
        assert!(Destination::Document.is_cacheable());
        assert!(Destination::Font.is_cacheable());
        assert!(!Destination::Manifest.is_cacheable());
        assert!(!Destination::Empty.is_cacheable());
    }

    #[test]
    fn test_destination_parse() {
        assert_eq!("Script".parse::<Destination>(), Ok(Destination::Script));
        assert!("video".parse::<Destination>().is_err());
    }

    #[test]
    fn test_same_origin() {
        assert!(is_same_origin(&url("https://w.example/a"), &url("https://w.example/b?x=1")));
        assert!(!is_same_origin(&url("https://w.example/a"), &url("https://cdn.example/a")));
        assert!(!is_same_origin(&url("https://w.example/a"), &url("http://w.example/a")));
    }

    #[test]
    fn test_response_header_lookup_is_case_insensitive() {
        let resp = Response::new(url("https://w.example/"), 200, "ok")
            .with_header("Content-Type", "text/html");
        assert_eq!(resp.content_type(), Some("text/html"));
        assert!(resp.is_ok());
    }
}
