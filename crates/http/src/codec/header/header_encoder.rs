//! HTTP header encoder implementation for serializing HTTP response heads
//!
//! This module writes the status line and header fields of a response. The
//! `Content-Length` field is always written from the length passed by the
//! caller, any `Content-Length` set on the response is ignored.

use crate::protocol::{Headers, SendError};

use bytes::{BufMut, BytesMut};

use http::StatusCode;
use http::header::CONTENT_LENGTH;
use std::io;
use std::io::Write;
use tokio_util::codec::Encoder;

/// Initial buffer size allocated for header serialization
const INIT_HEADER_SIZE: usize = 1024;

/// Reason phrase written for codes without a standard one.
const UNKNOWN_REASON: &str = "Unknown";

/// Encoder for HTTP response heads implementing the [`Encoder`] trait.
///
/// The item is the status code, the header fields and the content length to
/// announce.
#[derive(Debug)]
pub struct HeaderEncoder;

impl Encoder<(StatusCode, &Headers, usize)> for HeaderEncoder {
    type Error = SendError;

    /// Encodes the response head into the provided bytes buffer.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - the status code is outside `100..=599`
    /// - a header value contains CR or LF
    ///
    /// Nothing is written to `dst` when an error is returned.
    fn encode(&mut self, item: (StatusCode, &Headers, usize), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (status, headers, content_length) = item;

        if !(100..=599).contains(&status.as_u16()) {
            return Err(SendError::InvalidStatus(status.as_u16()));
        }

        // header injection guard, checked before anything is written
        if let Some((name, _)) = headers.iter().find(|(_, value)| value.iter().any(|b| *b == b'\r' || *b == b'\n')) {
            return Err(SendError::invalid_header_value(name));
        }

        dst.reserve(INIT_HEADER_SIZE);
        write!(FastWrite(dst), "HTTP/1.1 {} {}\r\n", status.as_str(), status.canonical_reason().unwrap_or(UNKNOWN_REASON))?;

        for (header_name, header_value) in headers.iter().filter(|(name, _)| !name.eq_ignore_ascii_case(CONTENT_LENGTH.as_str())) {
            dst.put_slice(header_name.as_bytes());
            dst.put_slice(b": ");
            dst.put_slice(header_value);
            dst.put_slice(b"\r\n");
        }

        write!(FastWrite(dst), "{CONTENT_LENGTH}: {content_length}\r\n\r\n")?;
        Ok(())
    }
}

/// Fast writer implementation for writing to BytesMut.
///
/// This avoids an intermediate `String` when formatting the status line and
/// numbers into the bytes buffer.
struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
