//! HTTP header decoder implementation for parsing HTTP request heads
//!
//! This module turns the request line and header section of a request into a
//! [`RequestHead`], and tells the caller how many body bytes follow.
//!
//! # Resumable parsing
//!
//! Bytes usually arrive in several reads. The decoder keeps a [`ParseState`]
//! cursor between calls so that each call only looks at newly arrived bytes:
//!
//! 1. Find the end of the request line and validate it as soon as it is
//!    complete, so that a broken request line is rejected without waiting for
//!    the rest of the head.
//! 2. Scan for the blank line that terminates the header section.
//! 3. Tokenize the whole head once with `httparse`.
//!
//! # Limits
//!
//! All limits come from [`RequestLimits`]: request line length, header section
//! size, number of headers and announced body size. Exceeding any of them is a
//! [`ParseError`], never an endless `Ok(None)`.

use bytes::{Buf, BytesMut};
use http::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{HeaderName, Method, Uri, Version};
use httparse::{Error, Status};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::config::RequestLimits;
use crate::ensure;
use crate::protocol::{Headers, ParseError, RequestHead};

/// Per-request cursor over the receive buffer.
///
/// Offsets are relative to the start of the buffer, which always begins with the
/// request being parsed. The state is reset after every complete head.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct ParseState {
    /// Index of the `\n` ending the request line, once seen
    line_end: Option<usize>,
    /// Bytes before this offset have already been scanned
    scanned: usize,
}

/// Decoder for HTTP request heads implementing the [`Decoder`] trait.
///
/// On success it yields the parsed head and the body length announced by
/// `Content-Length` (`0` when absent).
#[derive(Debug)]
pub struct HeaderDecoder {
    limits: RequestLimits,
    state: ParseState,
}

impl HeaderDecoder {
    pub fn new(limits: RequestLimits) -> Self {
        Self { limits, state: ParseState::default() }
    }

    /// Returns true if part of a request head has been received.
    pub fn in_progress(&self) -> bool {
        self.state.line_end.is_some() || self.state.scanned > 0
    }

    /// Looks for the end of the request line in the bytes not scanned yet.
    ///
    /// Empty lines preceding the request line are dropped from `src`.
    fn find_request_line(&mut self, src: &mut BytesMut) -> Result<Option<usize>, ParseError> {
        loop {
            let Some(offset) = src[self.state.scanned..].iter().position(|b| *b == b'\n') else {
                self.state.scanned = src.len();
                // a trailing `\r` may still turn out to be part of the CRLF
                ensure!(
                    src.len() <= self.limits.max_line_bytes.saturating_add(1),
                    ParseError::too_long_request_line(src.len(), self.limits.max_line_bytes)
                );
                return Ok(None);
            };

            let newline = self.state.scanned + offset;
            let line_len = if newline > 0 && src[newline - 1] == b'\r' { newline - 1 } else { newline };

            if line_len == 0 {
                src.advance(newline + 1);
                self.state = ParseState::default();
                continue;
            }

            ensure!(line_len <= self.limits.max_line_bytes, ParseError::too_long_request_line(line_len, self.limits.max_line_bytes));
            return Ok(Some(newline));
        }
    }

    /// Scans for the blank line ending the header section, returns the head length.
    fn find_head_end(&mut self, src: &[u8]) -> Option<usize> {
        let mut index = self.state.scanned;
        while index < src.len() {
            if src[index] == b'\n' {
                match src.get(index + 1) {
                    None => break,
                    Some(b'\n') => return Some(index + 2),
                    Some(b'\r') => match src.get(index + 2) {
                        None => break,
                        Some(b'\n') => return Some(index + 3),
                        Some(_) => {}
                    },
                    Some(_) => {}
                }
            }
            index += 1;
        }
        self.state.scanned = index;
        None
    }

    fn parse_head(&self, src: &mut BytesMut, head_len: usize) -> Result<(RequestHead, usize), ParseError> {
        let mut parsed_headers = vec![httparse::EMPTY_HEADER; self.limits.max_headers];
        let mut req = httparse::Request::new(&mut parsed_headers);

        let status = req.parse(&src[..head_len]).map_err(|e| match e {
            Error::TooManyHeaders => ParseError::too_many_headers(self.limits.max_headers),
            Error::Version => ParseError::InvalidVersion(None),
            e => ParseError::invalid_header(e),
        })?;

        ensure!(matches!(status, Status::Complete(n) if n == head_len), ParseError::invalid_header("incomplete header section"));

        let version = parse_version(req.version)?;
        let method_token = req.method.ok_or_else(|| ParseError::invalid_request_line("missing method"))?;
        let method = parse_method(method_token)?;
        let target = req.path.ok_or_else(|| ParseError::invalid_request_line("missing request target"))?.to_owned();
        let uri = target.parse::<Uri>().map_err(|_e| ParseError::InvalidUri(target.clone()))?;

        // Record byte ranges now, the header slices borrow `src` which is split below
        let base = src.as_ptr() as usize;
        let mut ranges = Vec::with_capacity(req.headers.len());
        for header in req.headers.iter() {
            let name = HeaderName::from_bytes(header.name.as_bytes()).map_err(ParseError::invalid_header)?;
            let name_start = header.name.as_ptr() as usize - base;
            let name_range = name_start..name_start + header.name.len();
            let value = header.value.trim_ascii();
            let value_range = if value.is_empty() {
                0..0
            } else {
                let start = value.as_ptr() as usize - base;
                start..start + value.len()
            };
            ranges.push((name, name_range, value_range));
        }

        let head_bytes = src.split_to(head_len).freeze();
        let mut headers = Headers::with_capacity(ranges.len());
        for (name, name_range, value_range) in ranges {
            headers.append_received(name, head_bytes.slice(name_range), head_bytes.slice(value_range));
        }

        let body_len = parse_content_length(&headers, self.limits.max_body_bytes)?;
        trace!(head_len, body_len, header_count = headers.len(), "parsed request head");

        Ok((RequestHead { method, target, uri, version, headers }, body_len))
    }
}

impl Default for HeaderDecoder {
    fn default() -> Self {
        Self::new(RequestLimits::default())
    }
}

impl Decoder for HeaderDecoder {
    type Item = (RequestHead, usize);
    type Error = ParseError;

    /// Attempts to decode a request head from the provided bytes buffer.
    ///
    /// # Returns
    ///
    /// - `Ok(Some((head, body_len)))` if a complete head was parsed, its bytes are
    ///   removed from `src`
    /// - `Ok(None)` if more data is needed
    /// - `Err(ParseError)` if the bytes can't form a valid request
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let line_end = match self.state.line_end {
            Some(line_end) => line_end,
            None => {
                let Some(line_end) = self.find_request_line(src)? else {
                    return Ok(None);
                };
                validate_request_line(&src[..=line_end])?;
                self.state = ParseState { line_end: Some(line_end), scanned: line_end };
                line_end
            }
        };

        let Some(head_len) = self.find_head_end(src) else {
            ensure!(src.len() <= self.limits.max_header_bytes, ParseError::too_large_header(src.len(), self.limits.max_header_bytes));
            return Ok(None);
        };
        ensure!(head_len <= self.limits.max_header_bytes, ParseError::too_large_header(head_len, self.limits.max_header_bytes));
        trace!(line_end, head_len, "found end of request head");

        let result = self.parse_head(src, head_len);
        self.state = ParseState::default();
        result.map(Some)
    }
}

/// Checks a complete request line, `line` ends with its `\n`.
fn validate_request_line(line: &[u8]) -> Result<(), ParseError> {
    let mut req = httparse::Request::new(&mut []);
    match req.parse(line) {
        Ok(_) => {
            parse_version(req.version)?;
            parse_method(req.method.unwrap_or_default())?;
            Ok(())
        }
        Err(Error::Version) => Err(ParseError::InvalidVersion(None)),
        Err(e) => Err(ParseError::invalid_request_line(e)),
    }
}

fn parse_version(version: Option<u8>) -> Result<Version, ParseError> {
    match version {
        Some(0) => Ok(Version::HTTP_10),
        Some(1) => Ok(Version::HTTP_11),
        v => Err(ParseError::InvalidVersion(v)),
    }
}

/// Methods are restricted to uppercase ASCII letters.
fn parse_method(token: &str) -> Result<Method, ParseError> {
    ensure!(!token.is_empty() && token.bytes().all(|b| b.is_ascii_uppercase()), ParseError::InvalidMethod(token.to_owned()));
    Method::from_bytes(token.as_bytes()).map_err(|_e| ParseError::InvalidMethod(token.to_owned()))
}

/// Determines the body length of a request.
///
/// `Transfer-Encoding` is not supported at all, so its presence is an error
/// whatever the coding. Repeated `Content-Length` fields must agree.
fn parse_content_length(headers: &Headers, max_body_bytes: usize) -> Result<usize, ParseError> {
    if let Some(te_value) = headers.get(TRANSFER_ENCODING) {
        return Err(ParseError::UnsupportedTransferEncoding(String::from_utf8_lossy(te_value).into_owned()));
    }

    let mut length: Option<u64> = None;
    for value in headers.get_all(CONTENT_LENGTH) {
        let digits = value.trim_ascii();
        ensure!(
            !digits.is_empty() && digits.iter().all(u8::is_ascii_digit),
            ParseError::invalid_content_length(format!("value {} is not a non-negative integer", String::from_utf8_lossy(value)))
        );

        let parsed = std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| ParseError::invalid_content_length("value overflows u64"))?;

        match length {
            Some(previous) if previous != parsed => {
                return Err(ParseError::invalid_content_length(format!("conflicting values {previous} and {parsed}")));
            }
            _ => length = Some(parsed),
        }
    }

    let length = length.unwrap_or(0);
    ensure!(length <= max_body_bytes as u64, ParseError::too_large_body(length, max_body_bytes));
    // fits: bounded by max_body_bytes
    Ok(length as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn crlf(raw: &str) -> BytesMut {
        BytesMut::from(raw.replace('\n', "\r\n").as_str())
    }

    #[test]
    fn test_bytes_mut_lens() {
        let mut bytes = crlf(indoc! {r##"
        GET /index.html HTTP/1.1
        Host: 127.0.0.1:8080
        User-Agent: curl/7.79.1
        Accept: */*

        123"##});

        let result = HeaderDecoder::default().decode(&mut bytes).unwrap();

        assert!(result.is_some());
        assert_eq!(&bytes[..], &b"123"[..]);
    }

    #[test]
    fn from_curl() {
        let mut buf = crlf(indoc! {r##"
        GET /index.html?a=1 HTTP/1.1
        Host: 127.0.0.1:8080
        User-Agent: curl/7.79.1
        Accept: */*

        "##});

        let (head, body_len) = HeaderDecoder::default().decode(&mut buf).unwrap().unwrap();

        assert_eq!(body_len, 0);
        assert!(buf.is_empty());
        assert_eq!(head.method(), &Method::GET);
        assert_eq!(head.version(), Version::HTTP_11);
        assert_eq!(head.target(), "/index.html?a=1");
        assert_eq!(head.uri().path(), "/index.html");
        assert_eq!(head.uri().query(), Some("a=1"));
        assert_eq!(head.headers().len(), 3);
        assert_eq!(head.headers().get_str(http::header::HOST), Some("127.0.0.1:8080"));
        assert_eq!(head.headers().get_str("user-agent"), Some("curl/7.79.1"));
        assert_eq!(head.headers().get_str("ACCEPT"), Some("*/*"));
    }

    #[test]
    fn trims_values_and_keeps_duplicates() {
        let mut buf = BytesMut::from("GET / HTTP/1.0\r\nX-Tag:   first  \r\nx-tag: Second\r\nHost: x\r\n\r\n");

        let (head, _) = HeaderDecoder::default().decode(&mut buf).unwrap().unwrap();

        assert_eq!(head.version(), Version::HTTP_10);
        let tags: Vec<&[u8]> = head.headers().get_all("x-tag").map(|v| &v[..]).collect();
        assert_eq!(tags, [&b"first"[..], &b"Second"[..]]);
        let names: Vec<&str> = head.headers().iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["X-Tag", "x-tag", "Host"]);
    }

    #[test]
    fn keeps_received_name_casing() {
        let mut buf = BytesMut::from("GET / HTTP/1.1\r\nX-Request-ID: 7\r\nHost: x\r\n\r\n");

        let (head, _) = HeaderDecoder::default().decode(&mut buf).unwrap().unwrap();

        let names: Vec<&str> = head.headers().iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["X-Request-ID", "Host"]);
        assert_eq!(head.headers().get_str("x-request-id"), Some("7"));
    }

    #[test]
    fn resumes_across_partial_reads() {
        let raw = b"GET /a HTTP/1.1\r\nHost: x\r\n\r\n";
        let mut decoder = HeaderDecoder::default();
        let mut buf = BytesMut::new();

        for (index, byte) in raw.iter().enumerate() {
            buf.extend_from_slice(&[*byte]);
            let result = decoder.decode(&mut buf).unwrap();
            if index + 1 < raw.len() {
                assert!(result.is_none(), "completed early at byte {index}");
            } else {
                let (head, _) = result.unwrap();
                assert_eq!(head.target(), "/a");
            }
        }
        assert!(!decoder.in_progress());
    }

    #[test]
    fn skips_leading_empty_lines() {
        let mut buf = BytesMut::from("\r\n\r\nGET / HTTP/1.1\r\n\r\n");
        let (head, _) = HeaderDecoder::default().decode(&mut buf).unwrap().unwrap();
        assert_eq!(head.target(), "/");
    }

    #[test]
    fn rejects_request_line_before_head_is_complete() {
        let mut buf = BytesMut::from("GET /\r\n");
        assert!(matches!(HeaderDecoder::default().decode(&mut buf), Err(ParseError::InvalidRequestLine { .. })));

        let mut buf = BytesMut::from("GET / HTTP/2.0\r\n");
        assert!(matches!(HeaderDecoder::default().decode(&mut buf), Err(ParseError::InvalidVersion(_))));

        let mut buf = BytesMut::from("get / HTTP/1.1\r\n");
        assert!(matches!(HeaderDecoder::default().decode(&mut buf), Err(ParseError::InvalidMethod(_))));
    }

    #[test]
    fn accepts_extension_methods() {
        let mut buf = BytesMut::from("PURGE /cache HTTP/1.1\r\n\r\n");
        let (head, _) = HeaderDecoder::default().decode(&mut buf).unwrap().unwrap();
        assert_eq!(head.method().as_str(), "PURGE");
    }

    #[test]
    fn too_long_request_line_is_never_incomplete() {
        let limits = RequestLimits { max_line_bytes: 32, ..RequestLimits::default() };
        let mut decoder = HeaderDecoder::new(limits);
        let mut buf = BytesMut::from("GET /");

        let mut result = decoder.decode(&mut buf);
        while let Ok(None) = result {
            buf.extend_from_slice(b"aaaa");
            result = decoder.decode(&mut buf);
        }
        assert!(matches!(result, Err(ParseError::TooLongRequestLine { max_size: 32, .. })));
    }

    #[test]
    fn unbounded_request_line() {
        let limits = RequestLimits { max_line_bytes: usize::MAX, ..RequestLimits::default() };
        let mut decoder = HeaderDecoder::new(limits);
        let mut buf = BytesMut::from("GET /unbounded HTTP/1.1");

        assert!(decoder.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"\r\n\r\n");
        let (head, _) = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(head.target(), "/unbounded");
    }

    #[test]
    fn too_large_header_section() {
        let limits = RequestLimits { max_line_bytes: 64, max_header_bytes: 64, ..RequestLimits::default() };
        let mut buf = BytesMut::from("GET / HTTP/1.1\r\nX-Long: aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
        assert!(matches!(HeaderDecoder::new(limits).decode(&mut buf), Err(ParseError::TooLargeHeader { max_size: 64, .. })));
    }

    #[test]
    fn too_many_headers() {
        let limits = RequestLimits { max_headers: 2, ..RequestLimits::default() };
        let mut buf = BytesMut::from("GET / HTTP/1.1\r\nA: 1\r\nB: 2\r\nC: 3\r\n\r\n");
        assert!(matches!(HeaderDecoder::new(limits).decode(&mut buf), Err(ParseError::TooManyHeaders { max_num: 2 })));
    }

    #[test]
    fn content_length_rules() {
        let decode = |raw: &str| HeaderDecoder::default().decode(&mut BytesMut::from(raw));

        let (_, body_len) = decode("POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\n").unwrap().unwrap();
        assert_eq!(body_len, 5);

        let (_, body_len) = decode("POST / HTTP/1.1\r\nContent-Length: 5\r\nContent-Length: 5\r\n\r\n").unwrap().unwrap();
        assert_eq!(body_len, 5);

        assert!(matches!(decode("POST / HTTP/1.1\r\nContent-Length: -1\r\n\r\n"), Err(ParseError::InvalidContentLength { .. })));
        assert!(matches!(decode("POST / HTTP/1.1\r\nContent-Length: +5\r\n\r\n"), Err(ParseError::InvalidContentLength { .. })));
        assert!(matches!(decode("POST / HTTP/1.1\r\nContent-Length: abc\r\n\r\n"), Err(ParseError::InvalidContentLength { .. })));
        assert!(matches!(
            decode("POST / HTTP/1.1\r\nContent-Length: 5\r\nContent-Length: 6\r\n\r\n"),
            Err(ParseError::InvalidContentLength { .. })
        ));
        assert!(matches!(
            decode("POST / HTTP/1.1\r\nContent-Length: 99999999999999999999999\r\n\r\n"),
            Err(ParseError::InvalidContentLength { .. })
        ));
        assert!(matches!(
            decode("POST / HTTP/1.1\r\nContent-Length: 2000000\r\n\r\n"),
            Err(ParseError::TooLargeBody { length: 2_000_000, .. })
        ));
    }

    #[test]
    fn rejects_transfer_encoding() {
        let mut buf = BytesMut::from("POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n");
        assert!(matches!(HeaderDecoder::default().decode(&mut buf), Err(ParseError::UnsupportedTransferEncoding(te)) if te == "chunked"));
    }
}
