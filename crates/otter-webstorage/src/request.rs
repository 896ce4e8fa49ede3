//! Request / Response values used by the cache API

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// HTTP headers with case-insensitive names.
///
/// Names are stored lowercased, so iteration and serialization are sorted and
/// stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(BTreeMap<String, String>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a header, replacing any previous value
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.0.insert(name.to_ascii_lowercase(), value.into());
    }

    /// Builder-style [`Headers::insert`]
    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (k, v) in iter {
            headers.insert(k.as_ref(), v);
        }
        headers
    }
}

/// Outgoing request description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub url: String,
    pub method: String,
    pub headers: Headers,
}

impl Request {
    /// GET request for `url`
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: "GET".to_string(),
            headers: Headers::new(),
        }
    }

    pub fn method(mut self, method: &str) -> Self {
        self.method = method.to_ascii_uppercase();
        self
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// Anything `Cache` methods accept as a request: a bare URL or a full request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestInfo {
    Url(String),
    Request(Request),
}

impl RequestInfo {
    /// The URL this input resolves to. Cache lookups key on this alone.
    pub fn url(&self) -> &str {
        match self {
            RequestInfo::Url(url) => url,
            RequestInfo::Request(req) => &req.url,
        }
    }

    /// Normalize into a full request (bare URLs become GET requests)
    pub fn into_request(self) -> Request {
        match self {
            RequestInfo::Url(url) => Request::new(url),
            RequestInfo::Request(req) => req,
        }
    }
}

impl From<&str> for RequestInfo {
    fn from(url: &str) -> Self {
        RequestInfo::Url(url.to_string())
    }
}

impl From<String> for RequestInfo {
    fn from(url: String) -> Self {
        RequestInfo::Url(url)
    }
}

impl From<Request> for RequestInfo {
    fn from(req: Request) -> Self {
        RequestInfo::Request(req)
    }
}

impl From<&Request> for RequestInfo {
    fn from(req: &Request) -> Self {
        RequestInfo::Request(req.clone())
    }
}

/// Fully buffered response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub status_text: String,
    pub headers: Headers,
    pub body: Bytes,
}

impl Response {
    /// `200 OK` response with `body`
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            status: 200,
            status_text: "OK".to_string(),
            headers: Headers::new(),
            body: body.into(),
        }
    }

    pub fn status(mut self, status: u16, status_text: impl Into<String>) -> Self {
        self.status = status;
        self.status_text = status_text.into();
        self
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// True for 2xx statuses
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body decoded as UTF-8, lossily
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_case_insensitive() {
        let headers = Headers::new().with("Content-Type", "text/plain");
        assert_eq!(headers.get("content-type"), Some("text/plain"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("text/plain"));
        assert_eq!(headers.len(), 1);

        let json = serde_json::to_string(&headers).unwrap();
        assert_eq!(json, r#"{"content-type":"text/plain"}"#);
    }

    #[test]
    fn test_request_info_url() {
        let raw: RequestInfo = "https://x/a".into();
        assert_eq!(raw.url(), "https://x/a");

        let req: RequestInfo = Request::new("https://x/b").method("post").into();
        assert_eq!(req.url(), "https://x/b");
        assert_eq!(req.into_request().method, "POST");
        assert_eq!(raw.into_request().method, "GET");
    }

    #[test]
    fn test_response_ok() {
        assert!(Response::new("x").ok());
        assert!(!Response::new("x").status(404, "Not Found").ok());
        assert_eq!(Response::new("hello").text(), "hello");
    }
}
