//! Request framing: accumulate client bytes until a complete header block.
//!
//! The framer buffers incoming bytes in a bounded buffer until the first
//! empty line following the request line (CRLFCRLF, tolerant of bare LF).
//! Only the header block is framed; no attempt is made to determine or wait
//! for a body. Any bytes already received past the terminator are preserved
//! verbatim as `trailing` and forwarded later without reinterpretation.
//!
//! Exceeding the buffer limit before a terminator is found is a session-
//! fatal error, not a warning.

use bytes::{Bytes, BytesMut};

use super::error::ProxyError;

/// Default bound on the unterminated header buffer: 10 KiB.
pub const DEFAULT_MAX_HEADER_BYTES: usize = 10 * 1024;

/// Maximum number of headers accepted in a request.
const MAX_HEADERS: usize = 64;

/// An immutable parsed request produced once a complete header block arrives.
#[derive(Debug, Clone)]
pub struct ParsedRequest {
    /// HTTP method from the request line, uppercased.
    pub method: String,
    /// Request target exactly as it appeared on the request line.
    pub target: String,
    /// HTTP version from the request line (e.g. `HTTP/1.1`).
    pub version: String,
    /// Headers in arrival order as (name, raw value) pairs.
    pub headers: Vec<(String, String)>,
    /// The raw header block including the terminating empty line.
    pub raw_header: Bytes,
    /// Bytes received past the header terminator (e.g. a request body
    /// already sent in the same read). Never reinterpreted.
    pub trailing: Bytes,
}

impl ParsedRequest {
    /// Look up the first header with the given name, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether this is a CONNECT request.
    pub fn is_connect(&self) -> bool {
        self.method == "CONNECT"
    }
}

/// Outcome of feeding bytes to the framer.
#[derive(Debug)]
pub enum FrameResult {
    /// No terminator seen yet; keep reading.
    Incomplete,
    /// A complete header block was framed and parsed.
    Complete(ParsedRequest),
}

/// Buffers client bytes until a complete request header block is available.
///
/// One framer exists per session. Once `feed` returns
/// [`FrameResult::Complete`] the framer has served its purpose and no
/// further framing of the byte stream occurs.
#[derive(Debug)]
pub struct RequestFramer {
    buf: BytesMut,
    max_bytes: usize,
}

impl RequestFramer {
    /// Create a framer with the given buffer bound.
    pub fn new(max_bytes: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(1024),
            max_bytes,
        }
    }

    /// Feed newly received bytes.
    ///
    /// Returns [`FrameResult::Complete`] once the terminator is present,
    /// [`FrameResult::Incomplete`] while more bytes are needed, or
    /// [`ProxyError::RequestTooLarge`] when the accumulated unterminated
    /// buffer exceeds the bound.
    pub fn feed(&mut self, data: &[u8]) -> Result<FrameResult, ProxyError> {
        self.buf.extend_from_slice(data);

        let Some(header_end) = find_terminator(&self.buf) else {
            if self.buf.len() > self.max_bytes {
                return Err(ProxyError::RequestTooLarge {
                    limit: self.max_bytes,
                });
            }
            return Ok(FrameResult::Incomplete);
        };

        let raw = self.buf.split_to(header_end).freeze();
        let trailing = self.buf.split().freeze();
        let parsed = parse_header_block(raw, trailing)?;
        Ok(FrameResult::Complete(parsed))
    }

    /// Number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

/// Find the end of the header block: the byte index just past the first
/// empty line. Accepts CRLF and bare LF line endings.
fn find_terminator(buf: &[u8]) -> Option<usize> {
    let mut i = 0;
    while i < buf.len() {
        if buf[i] == b'\n' {
            match buf.get(i + 1) {
                Some(b'\n') => return Some(i + 2),
                Some(b'\r') if buf.get(i + 2) == Some(&b'\n') => return Some(i + 3),
                _ => {}
            }
        }
        i += 1;
    }
    None
}

/// Parse a complete header block into a [`ParsedRequest`].
///
/// Parsing begins only once the terminator has been found; a block is never
/// partially parsed.
fn parse_header_block(raw: Bytes, trailing: Bytes) -> Result<ParsedRequest, ProxyError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);

    match req.parse(&raw) {
        Ok(httparse::Status::Complete(_)) => {}
        Ok(httparse::Status::Partial) => {
            // Terminator was found but httparse disagrees; treat as malformed
            return Err(ProxyError::MalformedRequest(
                "incomplete header block".to_string(),
            ));
        }
        Err(e) => return Err(ProxyError::MalformedRequest(e.to_string())),
    }

    let method = req
        .method
        .ok_or_else(|| ProxyError::MalformedRequest("missing method".to_string()))?
        .to_ascii_uppercase();
    let target = req
        .path
        .ok_or_else(|| ProxyError::MalformedRequest("missing request target".to_string()))?
        .to_string();
    let version = match req.version {
        Some(0) => "HTTP/1.0".to_string(),
        _ => "HTTP/1.1".to_string(),
    };
    let headers = req
        .headers
        .iter()
        .map(|h| {
            (
                h.name.to_string(),
                String::from_utf8_lossy(h.value).into_owned(),
            )
        })
        .collect();

    Ok(ParsedRequest {
        method,
        target,
        version,
        headers,
        raw_header: raw,
        trailing,
    })
}
