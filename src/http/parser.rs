use crate::error::ParseError;
use crate::http::request::{Method, Request, RequestBuilder};

/// Size limits applied while parsing.
#[derive(Debug, Clone, Copy)]
pub struct ParseLimits {
    pub max_head_bytes: usize,
    pub max_body_bytes: usize,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self {
            max_head_bytes: 16 * 1024,
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Parses one request from the front of `buf` using default limits.
///
/// Returns the request together with the number of bytes it occupied, or
/// `ParseError::Incomplete` when the buffer does not hold a full request yet.
pub fn parse_http_request(buf: &[u8]) -> Result<(Request, usize), ParseError> {
    parse_http_request_with_limits(buf, ParseLimits::default())
}

pub fn parse_http_request_with_limits(
    buf: &[u8],
    limits: ParseLimits,
) -> Result<(Request, usize), ParseError> {
    // Look for header/body separator
    let headers_end = match find_headers_end(buf) {
        Some(end) => end,
        None if buf.len() > limits.max_head_bytes => {
            return Err(ParseError::HeadTooLarge {
                limit: limits.max_head_bytes,
            });
        }
        None => return Err(ParseError::Incomplete),
    };

    if headers_end > limits.max_head_bytes {
        return Err(ParseError::HeadTooLarge {
            limit: limits.max_head_bytes,
        });
    }

    let header_bytes = &buf[..headers_end];
    let body_bytes = &buf[headers_end + 4..];

    let headers_str = std::str::from_utf8(header_bytes).map_err(|_| ParseError::InvalidRequest)?;

    let mut lines = headers_str.split("\r\n");

    // Request line
    let request_line = lines.next().ok_or(ParseError::InvalidRequest)?;
    let mut parts = request_line.split(' ');

    let method_str = parts.next().ok_or(ParseError::InvalidRequest)?;
    let target = parts.next().ok_or(ParseError::InvalidRequest)?;
    let version = parts.next().ok_or(ParseError::InvalidRequest)?;

    if parts.next().is_some() || target.is_empty() || !version.starts_with("HTTP/") {
        return Err(ParseError::InvalidRequest);
    }

    let method = Method::from_str(method_str).ok_or(ParseError::InvalidMethod)?;

    let mut builder = RequestBuilder::new()
        .method(method)
        .path(target)
        .version(version);

    // Headers
    let mut content_length: Option<usize> = None;

    for line in lines {
        if line.is_empty() {
            continue;
        }

        let (key, value) = line.split_once(':').ok_or(ParseError::InvalidHeader)?;

        if key.is_empty() || key.contains(char::is_whitespace) {
            return Err(ParseError::InvalidHeader);
        }

        let value = value.trim();

        if key.eq_ignore_ascii_case("Content-Length") && content_length.is_none() {
            content_length = Some(
                value
                    .parse::<usize>()
                    .map_err(|_| ParseError::InvalidContentLength)?,
            );
        }

        builder = builder.header(key, value);
    }

    // Body
    let content_length = content_length.unwrap_or(0);

    if content_length > limits.max_body_bytes {
        return Err(ParseError::BodyTooLarge {
            limit: limits.max_body_bytes,
        });
    }

    if body_bytes.len() < content_length {
        return Err(ParseError::Incomplete);
    }

    let request = builder
        .body(body_bytes[..content_length].to_vec())
        .build()
        .map_err(|_| ParseError::InvalidRequest)?;

    let total_consumed = headers_end + 4 + content_length;
    Ok((request, total_consumed))
}

fn find_headers_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}
