//! HTTP/1.x dumps of requests and responses
//!
//! A dump is a complete message: start line, headers, an empty line and the
//! framed body. Request lines always carry the absolute URI so a stored
//! request can be reconstructed without any connection context.
//!
//! Response bodies are framed either as a single chunk (when the response
//! declared `Transfer-Encoding: chunked`) or by a `Content-Length` matching
//! the buffered body. Responses that cannot carry a body (replies to `HEAD`,
//! 1xx, 204 and 304) are written without one, so parsing them needs the
//! request they answer.

use bytes::{BufMut, Bytes, BytesMut};
use http::header::{CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri, Version};
use thiserror::Error;

use super::{HttpRequest, HttpResponse};

const CRLF: &[u8] = b"\r\n";
const HEAD_END: &[u8] = b"\r\n\r\n";

/// Errors raised when stored bytes are not a well-formed HTTP message
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedRecordError {
    /// No empty line separates the head from the body
    #[error("message head is not terminated by an empty line")]
    UnterminatedHead,

    #[error("invalid request line: {0:?}")]
    InvalidRequestLine(String),

    #[error("invalid status line: {0:?}")]
    InvalidStatusLine(String),

    #[error("unsupported HTTP version: {0:?}")]
    UnsupportedVersion(String),

    #[error("invalid request method: {0:?}")]
    InvalidMethod(String),

    #[error("invalid request URI: {0:?}")]
    InvalidUri(String),

    #[error("invalid status code: {0:?}")]
    InvalidStatusCode(String),

    #[error("invalid header line: {0:?}")]
    InvalidHeader(String),

    #[error("invalid Content-Length header")]
    InvalidContentLength,

    #[error("invalid chunked body encoding")]
    InvalidChunk,

    /// The body ended before the framing said it would
    #[error("body truncated: expected {expected} bytes, found {actual}")]
    TruncatedBody { expected: usize, actual: usize },
}

/// Writes a request as an HTTP/1.x message with an absolute request target
///
/// A `Host` header is added when the request has none and its URI names an
/// authority. The request is only borrowed; its body stays available to the
/// caller.
pub fn dump_request(request: &HttpRequest) -> Bytes {
    let mut buf = BytesMut::with_capacity(256 + request.body().len());

    buf.put_slice(request.method().as_str().as_bytes());
    buf.put_u8(b' ');
    buf.put_slice(request.uri().to_string().as_bytes());
    buf.put_u8(b' ');
    buf.put_slice(version_str(request.version()).as_bytes());
    buf.put_slice(CRLF);

    if !request.headers().contains_key(HOST) {
        if let Some(authority) = request.uri().authority() {
            write_header(&mut buf, HOST.as_str(), authority.as_str().as_bytes());
        }
    }

    write_framed(&mut buf, request.headers(), request.body(), false);
    buf.freeze()
}

/// Writes a response as an HTTP/1.x message
///
/// `request_method` is the method of the request this response answers; a
/// reply to `HEAD` is written without a body.
pub fn dump_response(response: &HttpResponse, request_method: &Method) -> Bytes {
    let mut buf = BytesMut::with_capacity(256 + response.body().len());
    let status = response.status();

    buf.put_slice(version_str(response.version()).as_bytes());
    buf.put_u8(b' ');
    buf.put_slice(status.as_str().as_bytes());
    if let Some(reason) = status.canonical_reason() {
        buf.put_u8(b' ');
        buf.put_slice(reason.as_bytes());
    }
    buf.put_slice(CRLF);

    let bodiless = is_bodiless(request_method, status);
    write_framed(&mut buf, response.headers(), response.body(), bodiless);
    buf.freeze()
}

/// Parses a dump produced by [`dump_request`]
pub fn parse_request(raw: &[u8]) -> Result<HttpRequest, MalformedRecordError> {
    let (head, rest) = split_head(raw)?;
    let mut lines = head_lines(head);
    let start = lines.next().unwrap_or_default();

    let mut parts = start.splitn(3, |b| *b == b' ');
    let (Some(method), Some(target), Some(version)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(MalformedRecordError::InvalidRequestLine(lossy(start)));
    };

    let method = Method::from_bytes(method)
        .map_err(|_| MalformedRecordError::InvalidMethod(lossy(method)))?;
    let uri = Uri::try_from(target).map_err(|_| MalformedRecordError::InvalidUri(lossy(target)))?;
    let version = parse_version(version)?;
    let headers = parse_headers(lines)?;

    // Requests without framing headers carry no body
    let body = if is_chunked(&headers) {
        decode_chunked(rest)?
    } else if let Some(length) = content_length(&headers)? {
        take_exact(rest, length)?
    } else {
        Bytes::new()
    };

    let mut request = HttpRequest::new(body);
    *request.method_mut() = method;
    *request.uri_mut() = uri;
    *request.version_mut() = version;
    *request.headers_mut() = headers;
    Ok(request)
}

/// Parses a dump produced by [`dump_response`] in the context of its request
pub fn parse_response(
    raw: &[u8],
    request: &HttpRequest,
) -> Result<HttpResponse, MalformedRecordError> {
    let (head, rest) = split_head(raw)?;
    let mut lines = head_lines(head);
    let start = lines.next().unwrap_or_default();

    let mut parts = start.splitn(3, |b| *b == b' ');
    let (Some(version), Some(code)) = (parts.next(), parts.next()) else {
        return Err(MalformedRecordError::InvalidStatusLine(lossy(start)));
    };

    let version = parse_version(version)?;
    let status = StatusCode::from_bytes(code)
        .map_err(|_| MalformedRecordError::InvalidStatusCode(lossy(code)))?;
    let headers = parse_headers(lines)?;

    let body = if is_bodiless(request.method(), status) {
        Bytes::new()
    } else if is_chunked(&headers) {
        decode_chunked(rest)?
    } else if let Some(length) = content_length(&headers)? {
        take_exact(rest, length)?
    } else {
        Bytes::copy_from_slice(rest)
    };

    let mut response = HttpResponse::new(body);
    *response.status_mut() = status;
    *response.version_mut() = version;
    *response.headers_mut() = headers;
    Ok(response)
}

/// Returns whether a response to `method` with `status` never has a body
fn is_bodiless(method: &Method, status: StatusCode) -> bool {
    method == Method::HEAD
        || status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
}

/// Writes headers, the empty line and the framed body
fn write_framed(buf: &mut BytesMut, headers: &HeaderMap, body: &[u8], bodiless: bool) {
    let chunked = is_chunked(headers);
    let fix_length =
        !bodiless && !chunked && (!body.is_empty() || headers.contains_key(CONTENT_LENGTH));

    for (name, value) in headers {
        if fix_length && name == CONTENT_LENGTH {
            continue;
        }
        write_header(buf, name.as_str(), value.as_bytes());
    }
    if fix_length {
        write_header(buf, CONTENT_LENGTH.as_str(), body.len().to_string().as_bytes());
    }
    buf.put_slice(CRLF);

    if bodiless {
        return;
    }
    if chunked {
        if !body.is_empty() {
            buf.put_slice(format!("{:x}", body.len()).as_bytes());
            buf.put_slice(CRLF);
            buf.put_slice(body);
            buf.put_slice(CRLF);
        }
        buf.put_slice(b"0\r\n\r\n");
    } else {
        buf.put_slice(body);
    }
}

fn write_header(buf: &mut BytesMut, name: &str, value: &[u8]) {
    buf.put_slice(name.as_bytes());
    buf.put_slice(b": ");
    buf.put_slice(value);
    buf.put_slice(CRLF);
}

fn version_str(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_2 => "HTTP/2.0",
        Version::HTTP_3 => "HTTP/3.0",
        _ => "HTTP/1.1",
    }
}

fn parse_version(raw: &[u8]) -> Result<Version, MalformedRecordError> {
    match raw {
        b"HTTP/0.9" => Ok(Version::HTTP_09),
        b"HTTP/1.0" => Ok(Version::HTTP_10),
        b"HTTP/1.1" => Ok(Version::HTTP_11),
        b"HTTP/2" | b"HTTP/2.0" => Ok(Version::HTTP_2),
        b"HTTP/3" | b"HTTP/3.0" => Ok(Version::HTTP_3),
        other => Err(MalformedRecordError::UnsupportedVersion(lossy(other))),
    }
}

/// Splits a message into its head (without the final empty line) and body
fn split_head(raw: &[u8]) -> Result<(&[u8], &[u8]), MalformedRecordError> {
    let end = find(raw, HEAD_END).ok_or(MalformedRecordError::UnterminatedHead)?;
    Ok((&raw[..end], &raw[end + HEAD_END.len()..]))
}

fn head_lines(head: &[u8]) -> impl Iterator<Item = &[u8]> {
    head.split(|b| *b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
}

fn parse_headers<'a>(
    lines: impl Iterator<Item = &'a [u8]>,
) -> Result<HeaderMap, MalformedRecordError> {
    let mut headers = HeaderMap::new();
    for line in lines {
        let invalid = || MalformedRecordError::InvalidHeader(lossy(line));

        // Obsolete line folding is not produced by dumps
        if line.first().is_some_and(|b| *b == b' ' || *b == b'\t') {
            return Err(invalid());
        }
        let colon = line.iter().position(|b| *b == b':').ok_or_else(invalid)?;
        let name = HeaderName::from_bytes(&line[..colon]).map_err(|_| invalid())?;
        let value = HeaderValue::from_bytes(trim_whitespace(&line[colon + 1..]))
            .map_err(|_| invalid())?;
        headers.append(name, value);
    }
    Ok(headers)
}

fn is_chunked(headers: &HeaderMap) -> bool {
    headers
        .get_all(TRANSFER_ENCODING)
        .iter()
        .last()
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.rsplit(',').next())
        .is_some_and(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
}

fn content_length(headers: &HeaderMap) -> Result<Option<usize>, MalformedRecordError> {
    let Some(value) = headers.get(CONTENT_LENGTH) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .map(Some)
        .ok_or(MalformedRecordError::InvalidContentLength)
}

fn take_exact(rest: &[u8], length: usize) -> Result<Bytes, MalformedRecordError> {
    if rest.len() < length {
        return Err(MalformedRecordError::TruncatedBody {
            expected: length,
            actual: rest.len(),
        });
    }
    Ok(Bytes::copy_from_slice(&rest[..length]))
}

/// Decodes a chunked body, ignoring chunk extensions and trailers
fn decode_chunked(mut rest: &[u8]) -> Result<Bytes, MalformedRecordError> {
    let mut body = BytesMut::new();
    loop {
        let line_end = find(rest, CRLF).ok_or(MalformedRecordError::InvalidChunk)?;
        let size_field = rest[..line_end]
            .split(|b| *b == b';')
            .next()
            .unwrap_or_default();
        let size = std::str::from_utf8(size_field)
            .ok()
            .and_then(|field| usize::from_str_radix(field.trim(), 16).ok())
            .ok_or(MalformedRecordError::InvalidChunk)?;
        rest = &rest[line_end + CRLF.len()..];

        if size == 0 {
            return Ok(body.freeze());
        }
        let needed = size
            .checked_add(CRLF.len())
            .ok_or(MalformedRecordError::InvalidChunk)?;
        if rest.len() < needed {
            return Err(MalformedRecordError::TruncatedBody {
                expected: size,
                actual: rest.len(),
            });
        }
        body.extend_from_slice(&rest[..size]);
        if &rest[size..needed] != CRLF {
            return Err(MalformedRecordError::InvalidChunk);
        }
        rest = &rest[needed..];
    }
}

fn trim_whitespace(mut value: &[u8]) -> &[u8] {
    while let [b' ' | b'\t', tail @ ..] = value {
        value = tail;
    }
    while let [head @ .., b' ' | b'\t'] = value {
        value = head;
    }
    value
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn lossy(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}
