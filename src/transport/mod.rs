//! HTTP transport abstraction
//!
//! The token manager, the API client and the transfer engine only talk to
//! the network through [`HttpTransport`]. The production implementation is
//! backed by reqwest; tests swap in a scripted transport.

pub mod http;

#[cfg(test)]
pub(crate) mod mock;

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde::de::DeserializeOwned;

use crate::error::DriveError;

pub use http::ReqwestTransport;

/// HTTP verbs used against the API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
    Post,
    Delete,
}

/// Request payload
#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Bytes(Bytes),
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
}

impl RequestBody {
    /// Number of payload bytes when known up front
    pub fn len(&self) -> usize {
        match self {
            RequestBody::Bytes(b) => b.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A single HTTP request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::Put, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::Delete, url)
    }

    /// Append a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Attach an OAuth2 bearer token
    pub fn bearer(self, access_token: &str) -> Self {
        self.header("Authorization", format!("Bearer {}", access_token))
    }

    pub fn json(mut self, value: serde_json::Value) -> Self {
        self.body = RequestBody::Json(value);
        self
    }

    pub fn form(mut self, pairs: &[(&str, &str)]) -> Self {
        self.body = RequestBody::Form(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        self
    }

    pub fn bytes(mut self, data: Bytes) -> Self {
        self.body = RequestBody::Bytes(data);
        self
    }

    /// Look up a request header, case-insensitively
    pub fn header_value(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// A fully buffered HTTP response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Body as lossy UTF-8, for error reporting
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, DriveError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Delay requested by the server through `Retry-After` (seconds form)
    pub fn retry_after(&self) -> Option<Duration> {
        self.header("Retry-After")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }

    /// Turn a non-success response into the matching [`DriveError`]
    pub fn error_for(&self, path: &str) -> DriveError {
        DriveError::from_status(self.status, self.text(), self.retry_after(), path)
    }
}

/// Streamed response body
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, DriveError>> + Send>>;

/// A response whose body is consumed incrementally
pub struct StreamingResponse {
    pub status: u16,
    pub content_length: Option<u64>,
    pub body: BodyStream,
}

impl StreamingResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Drain the body into a string. Used for error payloads only.
    pub async fn into_text(mut self) -> String {
        let mut buf = Vec::new();
        while let Some(Ok(chunk)) = self.body.next().await {
            buf.extend_from_slice(&chunk);
        }
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl std::fmt::Debug for StreamingResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingResponse")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Network seam for every component that talks HTTP
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send a request and buffer the whole response
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, DriveError>;

    /// Send a request and hand back the body as a stream
    async fn stream(&self, request: HttpRequest) -> Result<StreamingResponse, DriveError>;
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let req = HttpRequest::put("https://upload.example/session")
            .header("Content-Range", "bytes 0-9/10")
            .bearer("tok")
            .bytes(Bytes::from_static(b"0123456789"));

        assert_eq!(req.method, Method::Put);
        assert_eq!(req.header_value("content-range"), Some("bytes 0-9/10"));
        assert_eq!(req.header_value("Authorization"), Some("Bearer tok"));
        assert_eq!(req.body.len(), 10);
    }

    #[test]
    fn test_response_retry_after() {
        let resp = HttpResponse::new(429, "").with_header("retry-after", "3");
        assert_eq!(resp.retry_after(), Some(Duration::from_secs(3)));

        let resp = HttpResponse::new(503, "").with_header("Retry-After", "Wed, 21 Oct 2015 07:28:00 GMT");
        assert_eq!(resp.retry_after(), None);
    }

    #[test]
    fn test_response_error_for() {
        let resp = HttpResponse::new(404, "{}");
        assert!(matches!(resp.error_for("/a"), DriveError::NotFoundError { .. }));
        assert!(HttpResponse::new(502, "").error_for("/a").is_retryable());
    }

    #[test]
    fn test_response_json() {
        #[derive(serde::Deserialize)]
        struct Session {
            #[serde(rename = "uploadUrl")]
            upload_url: String,
        }
        let resp = HttpResponse::new(200, r#"{"uploadUrl":"https://u"}"#);
        let session: Session = resp.json().unwrap();
        assert_eq!(session.upload_url, "https://u");
    }
}
