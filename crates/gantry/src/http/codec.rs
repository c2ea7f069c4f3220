//! Minimal HTTP/1.1 message codec used by the graceful server.
//!
//! One request is read per connection and every response closes the
//! connection, so there is no keep-alive or chunked transfer support.

use std::io::{self, Read, Write};

use thiserror::Error;

const MAX_REQUEST_BYTES: usize = 64 * 1024;
const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Errors raised while reading a request.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Reading from the connection failed.
    #[error("failed to read request: {0}")]
    Io(#[from] io::Error),
    /// The request head or body exceeded the size limit.
    #[error("request exceeds 64 KiB")]
    TooLarge,
    /// The request could not be parsed.
    #[error("malformed request: {0}")]
    Malformed(&'static str),
}

/// A parsed HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    method: String,
    target: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Request {
    /// Builds a request without headers or body, for calling handlers
    /// directly.
    #[must_use]
    pub fn new(method: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            target: target.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Request method, such as `GET`.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Request target as sent, including any query string.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Request target without its query string.
    #[must_use]
    pub fn path(&self) -> &str {
        self.target
            .split_once('?')
            .map_or(self.target.as_str(), |(path, _)| path)
    }

    /// First header with the given name, compared case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Request body; empty unless `Content-Length` was sent.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

/// An HTTP response. `Content-Length` and `Connection: close` are added when
/// it is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Response {
    /// Empty response with the given status code.
    #[must_use]
    pub const fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Plain-text response.
    #[must_use]
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self::new(status)
            .with_header("Content-Type", "text/plain; charset=utf-8")
            .with_body(body.into().into_bytes())
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Replaces the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Status code.
    #[must_use]
    pub const fn status(&self) -> u16 {
        self.status
    }

    /// Response body.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

/// Reads one request. Returns `Ok(None)` when the peer closed the connection
/// without sending anything.
pub(crate) fn read_request(stream: &mut impl Read) -> Result<Option<Request>, CodecError> {
    let mut buffer = Vec::new();
    let mut chunk = [0_u8; 1024];
    let head_end = loop {
        if let Some(position) = find_terminator(&buffer) {
            break position;
        }
        let read = read_chunk_with_retry(stream, &mut chunk)?;
        if read == 0 {
            return if buffer.is_empty() {
                Ok(None)
            } else {
                Err(CodecError::Malformed("connection closed mid-request"))
            };
        }
        buffer.extend_from_slice(&chunk[..read]);
        enforce_request_limit(buffer.len())?;
    };

    let head = std::str::from_utf8(&buffer[..head_end])
        .map_err(|_| CodecError::Malformed("request head is not UTF-8"))?;
    let (method, target, headers) = parse_head(head)?;
    let length = content_length(&headers)?;
    let body_start = head_end + HEAD_TERMINATOR.len();
    enforce_request_limit(body_start.saturating_add(length))?;

    let mut body = buffer.split_off(body_start);
    while body.len() < length {
        let read = read_chunk_with_retry(stream, &mut chunk)?;
        if read == 0 {
            return Err(CodecError::Malformed("connection closed mid-body"));
        }
        body.extend_from_slice(&chunk[..read]);
    }
    body.truncate(length);

    Ok(Some(Request {
        method,
        target,
        headers,
        body,
    }))
}

/// Writes `response` with framing headers and flushes the stream.
pub(crate) fn write_response(stream: &mut impl Write, response: &Response) -> io::Result<()> {
    let mut head = format!(
        "HTTP/1.1 {} {}\r\n",
        response.status,
        reason_phrase(response.status)
    );
    for (name, value) in &response.headers {
        head.push_str(name);
        head.push_str(": ");
        head.push_str(value);
        head.push_str("\r\n");
    }
    head.push_str("Content-Length: ");
    head.push_str(&response.body.len().to_string());
    head.push_str("\r\nConnection: close\r\n\r\n");
    stream.write_all(head.as_bytes())?;
    stream.write_all(&response.body)?;
    stream.flush()
}

type Head = (String, String, Vec<(String, String)>);

fn parse_head(head: &str) -> Result<Head, CodecError> {
    let mut lines = head.split("\r\n");
    let request_line = lines
        .next()
        .ok_or(CodecError::Malformed("missing request line"))?;
    let mut parts = request_line.split_ascii_whitespace();
    let (Some(method), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(CodecError::Malformed("invalid request line"));
    };
    if !version.starts_with("HTTP/1.") {
        return Err(CodecError::Malformed("unsupported HTTP version"));
    }

    let headers = lines
        .map(|line| {
            line.split_once(':')
                .map(|(name, value)| (name.trim().to_owned(), value.trim().to_owned()))
                .ok_or(CodecError::Malformed("invalid header line"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok((method.to_owned(), target.to_owned(), headers))
}

fn content_length(headers: &[(String, String)]) -> Result<usize, CodecError> {
    headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .map_or(Ok(0), |(_, value)| {
            value
                .parse()
                .map_err(|_| CodecError::Malformed("invalid Content-Length"))
        })
}

fn find_terminator(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(HEAD_TERMINATOR.len())
        .position(|window| window == HEAD_TERMINATOR)
}

fn read_chunk_with_retry(stream: &mut impl Read, chunk: &mut [u8]) -> io::Result<usize> {
    loop {
        match stream.read(chunk) {
            Ok(read) => return Ok(read),
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(error),
        }
    }
}

fn enforce_request_limit(size: usize) -> Result<(), CodecError> {
    if size > MAX_REQUEST_BYTES {
        return Err(CodecError::TooLarge);
    }
    Ok(())
}

const fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Content Too Large",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use rstest::rstest;

    use super::*;

    fn parse(raw: &[u8]) -> Result<Option<Request>, CodecError> {
        read_request(&mut Cursor::new(raw.to_vec()))
    }

    #[test]
    fn reads_request_line_headers_and_body() {
        let request = parse(b"POST /jobs?limit=2 HTTP/1.1\r\nHost: x\r\nContent-Length: 5\r\n\r\nhello")
            .expect("parse")
            .expect("request");

        assert_eq!(request.method(), "POST");
        assert_eq!(request.target(), "/jobs?limit=2");
        assert_eq!(request.path(), "/jobs");
        assert_eq!(request.header("host"), Some("x"));
        assert_eq!(request.body(), b"hello");
    }

    #[test]
    fn empty_connection_yields_no_request() {
        assert!(parse(b"").expect("parse").is_none());
    }

    #[rstest]
    #[case::garbage(b"nonsense\r\n\r\n".as_slice())]
    #[case::bad_version(b"GET / SPDY/3\r\n\r\n".as_slice())]
    #[case::bad_header(b"GET / HTTP/1.1\r\nno-colon\r\n\r\n".as_slice())]
    #[case::truncated_head(b"GET / HTTP/1.1\r\nHost".as_slice())]
    #[case::short_body(b"PUT / HTTP/1.1\r\nContent-Length: 9\r\n\r\nabc".as_slice())]
    fn rejects_malformed_requests(#[case] raw: &[u8]) {
        assert!(matches!(parse(raw), Err(CodecError::Malformed(_))));
    }

    #[test]
    fn rejects_oversized_bodies() {
        let raw = format!("PUT / HTTP/1.1\r\nContent-Length: {}\r\n\r\n", MAX_REQUEST_BYTES);
        assert!(matches!(parse(raw.as_bytes()), Err(CodecError::TooLarge)));
    }

    #[rstest]
    #[case::largest_usize(u64::MAX)]
    #[case::just_over_limit(65_537)]
    fn rejects_content_length_beyond_limit_without_reading_body(#[case] length: u64) {
        let raw = format!("POST / HTTP/1.1\r\nContent-Length: {length}\r\n\r\n");
        assert!(matches!(parse(raw.as_bytes()), Err(CodecError::TooLarge)));
    }

    #[test]
    fn writes_framed_response() {
        let mut out = Vec::new();
        let response = Response::text(503, "draining\n").with_header("Retry-After", "5");

        write_response(&mut out, &response).expect("write");

        let text = String::from_utf8(out).expect("utf8");
        assert!(text.starts_with("HTTP/1.1 503 Service Unavailable\r\n"));
        assert!(text.contains("Retry-After: 5\r\n"));
        assert!(text.contains("Content-Length: 9\r\n"));
        assert!(text.contains("Connection: close\r\n\r\ndraining\n"));
    }
}
