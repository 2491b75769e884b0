//! Minimal HTTP/1.x framing for the wire protocol server.
//!
//! Only what the JSON wire protocol needs is supported: one request per
//! connection, `Content-Length` delimited bodies, and four request headers.
//! Everything else in the header block is read and discarded.
//!
//! # Request format
//!
//! ```text
//! POST /session/abc/url HTTP/1.1\r\n
//! Content-Type: application/json\r\n
//! Content-Length: 29\r\n
//! \r\n
//! {"url":"http://example.com/"}
//! ```

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::stream::ConnectionStream;

/// Largest request body the reader will buffer.
pub const MAX_BODY_LEN: usize = 16 * 1024 * 1024;

/// Content type used for every JSON response.
pub const JSON_CONTENT_TYPE: &str = "application/json;charset=utf-8";

const TEXT_CONTENT_TYPE: &str = "text/plain;charset=utf-8";

/// Errors raised while reading or writing HTTP framing.
#[derive(Error, Debug)]
pub enum HttpError {
    /// An I/O error occurred on the socket.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the connection before the request was complete.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// A request or header line exceeded the line limit.
    #[error("line exceeds {0} bytes")]
    LineTooLong(usize),

    /// A request or header line was not valid UTF-8.
    #[error("request line is not valid UTF-8")]
    InvalidUtf8,

    /// The request line did not have the `METHOD PATH VERSION` shape.
    #[error("malformed request line: {0:?}")]
    MalformedRequestLine(String),

    /// A non-empty header line had no `:`.
    #[error("malformed header line: {0:?}")]
    MalformedHeader(String),

    /// The method is not one of GET, POST, PUT, DELETE.
    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),

    /// The `Content-Length` header was not a non-negative integer.
    #[error("invalid Content-Length: {0:?}")]
    InvalidContentLength(String),

    /// The declared body is larger than [`MAX_BODY_LEN`].
    #[error("request body of {0} bytes exceeds limit")]
    BodyTooLarge(usize),
}

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    /// Canonical upper-case method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl FromStr for Method {
    type Err = HttpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            _ => Err(HttpError::UnsupportedMethod(s.to_string())),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The request headers the server understands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestHeaders {
    pub content_type: Option<String>,
    pub content_length: Option<usize>,
    pub cookie: Option<String>,
    pub accept: Option<String>,
}

/// A parsed request. Immutable once read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    /// Resource path without the query string.
    pub path: String,
    pub query: Option<String>,
    pub version: String,
    pub headers: RequestHeaders,
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Deserializes the JSON body.
    ///
    /// An empty body is read as `{}` so commands whose parameters are all
    /// optional accept bodiless requests.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        if self.body.iter().all(|b| b.is_ascii_whitespace()) {
            return serde_json::from_str("{}");
        }
        serde_json::from_slice(&self.body)
    }
}

/// Reads one complete request from the stream.
pub async fn read_request<S>(stream: &mut ConnectionStream<S>) -> Result<HttpRequest, HttpError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let line = stream.read_line().await?;
    let mut parts = line.split(|c: char| c == ' ' || c == '\t').filter(|p| !p.is_empty());
    let (method, target, version) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(m), Some(t), Some(v), None) => (m, t, v),
        _ => return Err(HttpError::MalformedRequestLine(line.clone())),
    };
    let method: Method = method.parse()?;
    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path.to_string(), Some(query.to_string())),
        None => (target.to_string(), None),
    };
    let version = version.to_string();

    let headers = read_headers(stream).await?;
    let body = match headers.content_length {
        Some(len) if len > MAX_BODY_LEN => return Err(HttpError::BodyTooLarge(len)),
        Some(len) => stream.read_exact(len).await?,
        None => Vec::new(),
    };

    Ok(HttpRequest {
        method,
        path,
        query,
        version,
        headers,
        body,
    })
}

/// Reads header lines up to and including the terminating blank line.
async fn read_headers<S>(stream: &mut ConnectionStream<S>) -> Result<RequestHeaders, HttpError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut headers = RequestHeaders::default();
    loop {
        let line = stream.read_line().await?;
        if line.is_empty() {
            return Ok(headers);
        }
        let Some((name, value)) = line.split_once(':') else {
            return Err(HttpError::MalformedHeader(line));
        };
        let value = value.trim();
        match name.trim().to_ascii_lowercase().as_str() {
            "content-length" => {
                let len = value
                    .parse::<usize>()
                    .map_err(|_| HttpError::InvalidContentLength(value.to_string()))?;
                headers.content_length = Some(len);
            }
            "content-type" => headers.content_type = Some(value.to_string()),
            "cookie" => headers.cookie = Some(value.to_string()),
            "accept" => headers.accept = Some(value.to_string()),
            _ => {}
        }
    }
}

/// A response ready to be written. Serialized exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<&'static str>,
    pub location: Option<String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// A JSON response with the given status code.
    pub fn json(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: Some(JSON_CONTENT_TYPE),
            location: None,
            body: body.into().into_bytes(),
        }
    }

    /// A plain-text response with the given status code.
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: Some(TEXT_CONTENT_TYPE),
            location: None,
            body: body.into().into_bytes(),
        }
    }

    /// `303 See Other` pointing at `location`.
    pub fn see_other(location: impl Into<String>) -> Self {
        Self {
            status: 303,
            content_type: None,
            location: Some(location.into()),
            body: Vec::new(),
        }
    }

    /// Generic failure used when a handler itself breaks.
    pub fn internal_error() -> Self {
        Self::text(500, "Internal Server Error")
    }

    /// Serializes the status line, headers and body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut head = format!("HTTP/1.1 {} {}\r\n", self.status, reason_phrase(self.status));
        if let Some(content_type) = self.content_type {
            head.push_str(&format!("Content-Type: {content_type}\r\n"));
        }
        if let Some(location) = &self.location {
            head.push_str(&format!("Location: {location}\r\n"));
        }
        head.push_str(&format!("Content-Length: {}\r\n", self.body.len()));
        head.push_str("Cache-Control: no-cache\r\n");
        head.push_str("Connection: close\r\n\r\n");

        let mut bytes = head.into_bytes();
        bytes.extend_from_slice(&self.body);
        bytes
    }

    /// Writes the response to `stream`.
    pub async fn write_to<S>(&self, stream: &mut ConnectionStream<S>) -> Result<(), HttpError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        stream.write_all(&self.to_bytes()).await
    }
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        303 => "See Other",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    async fn parse(raw: &[u8]) -> Result<HttpRequest, HttpError> {
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        client.write_all(raw).await.unwrap();
        drop(client);
        let mut stream = ConnectionStream::new(server);
        read_request(&mut stream).await
    }

    #[tokio::test]
    async fn parses_request_with_body() {
        let request = parse(
            b"POST /session/abc/url HTTP/1.1\r\nContent-Type: application/json\r\nContent-Length: 28\r\nHost: device\r\n\r\n{\"url\":\"http://example.com\"}",
        )
        .await
        .unwrap();

        assert_eq!(request.method, Method::Post);
        assert_eq!(request.path, "/session/abc/url");
        assert_eq!(request.version, "HTTP/1.1");
        assert_eq!(request.headers.content_length, Some(28));
        assert_eq!(request.headers.content_type.as_deref(), Some("application/json"));
        assert_eq!(request.body, b"{\"url\":\"http://example.com\"}".to_vec());
    }

    #[tokio::test]
    async fn missing_content_length_means_empty_body() {
        let request = parse(b"GET /status HTTP/1.0\nAccept: */*\n\n").await.unwrap();
        assert_eq!(request.method, Method::Get);
        assert_eq!(request.headers.accept.as_deref(), Some("*/*"));
        assert!(request.body.is_empty());
    }

    #[tokio::test]
    async fn header_names_are_case_insensitive() {
        let request = parse(b"POST /x HTTP/1.1\r\ncontent-length: 2\r\nCOOKIE: a=b\r\n\r\n{}")
            .await
            .unwrap();
        assert_eq!(request.headers.content_length, Some(2));
        assert_eq!(request.headers.cookie.as_deref(), Some("a=b"));
    }

    #[tokio::test]
    async fn query_string_is_split_from_path() {
        let request = parse(b"GET /status?verbose=1 HTTP/1.1\r\n\r\n").await.unwrap();
        assert_eq!(request.path, "/status");
        assert_eq!(request.query.as_deref(), Some("verbose=1"));
    }

    #[tokio::test]
    async fn unknown_method_is_rejected() {
        let err = parse(b"PATCH /status HTTP/1.1\r\n\r\n").await.unwrap_err();
        assert!(matches!(err, HttpError::UnsupportedMethod(m) if m == "PATCH"));
    }

    #[tokio::test]
    async fn lowercase_method_is_accepted() {
        let request = parse(b"get /status HTTP/1.1\r\n\r\n").await.unwrap();
        assert_eq!(request.method, Method::Get);
    }

    #[tokio::test]
    async fn malformed_request_line_is_rejected() {
        let err = parse(b"GET\r\n\r\n").await.unwrap_err();
        assert!(matches!(err, HttpError::MalformedRequestLine(_)));
    }

    #[tokio::test]
    async fn bad_content_length_is_rejected() {
        let err = parse(b"POST /x HTTP/1.1\r\nContent-Length: lots\r\n\r\n")
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::InvalidContentLength(_)));
    }

    #[tokio::test]
    async fn header_without_colon_is_rejected() {
        let err = parse(b"POST /session HTTP/1.1\r\nX-Junk\r\nContent-Length: 2\r\n\r\n{}")
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::MalformedHeader(line) if line == "X-Junk"));
    }

    #[tokio::test]
    async fn truncated_body_reports_closed_connection() {
        let err = parse(b"POST /x HTTP/1.1\r\nContent-Length: 10\r\n\r\n{}")
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::ConnectionClosed));
    }

    #[test]
    fn empty_body_reads_as_empty_object() {
        let request = HttpRequest {
            method: Method::Post,
            path: "/session".into(),
            query: None,
            version: "HTTP/1.1".into(),
            headers: RequestHeaders::default(),
            body: Vec::new(),
        };
        let value: serde_json::Value = request.json().unwrap();
        assert_eq!(value, serde_json::json!({}));
    }

    #[test]
    fn redirect_serialization() {
        let text = String::from_utf8(HttpResponse::see_other("/session/abc").to_bytes()).unwrap();
        assert!(text.starts_with("HTTP/1.1 303 See Other\r\n"));
        assert!(text.contains("Location: /session/abc\r\n"));
        assert!(text.contains("Content-Length: 0\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn json_response_serialization() {
        let text = String::from_utf8(HttpResponse::json(200, "{}").to_bytes()).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Type: application/json;charset=utf-8\r\n"));
        assert!(text.contains("Content-Length: 2\r\n"));
        assert!(text.ends_with("\r\n\r\n{}"));
    }
}
