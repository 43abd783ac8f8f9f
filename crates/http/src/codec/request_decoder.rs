//! HTTP request decoder module
//!
//! This module decodes complete HTTP requests from a growing byte buffer.
//!
//! # Components
//!
//! - [`RequestDecoder`]: Main decoder that coordinates head and body parsing
//! - Head parsing: Uses [`HeaderDecoder`] for the request line and headers
//! - Body handling: Uses [`LengthDecoder`] for `Content-Length` bodies
//!
//! The decoder is resumable: call it again with the same buffer whenever more
//! bytes arrive. When it returns a request, exactly the bytes of that request
//! have been removed from the front of the buffer, anything after them belongs
//! to the next request.

use std::io;
use std::io::ErrorKind;

use crate::codec::body::LengthDecoder;
use crate::codec::header::HeaderDecoder;
use crate::config::RequestLimits;
use crate::protocol::{ParseError, Request, RequestHead};
use bytes::BytesMut;
use tokio_util::codec::Decoder;

/// A decoder for HTTP requests that handles both head and body
///
/// # State Machine
///
/// The decoder maintains its state through the `pending` field:
/// - `None`: Currently parsing the head
/// - `Some((head, LengthDecoder))`: Head parsed, waiting for the body
#[derive(Debug)]
pub struct RequestDecoder {
    header_decoder: HeaderDecoder,
    pending: Option<(RequestHead, LengthDecoder)>,
}

impl RequestDecoder {
    /// Creates a new `RequestDecoder` with default limits
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_limits(limits: RequestLimits) -> Self {
        Self { header_decoder: HeaderDecoder::new(limits), pending: None }
    }

    /// Returns true if part of a request has been decoded but not yet returned.
    pub fn in_progress(&self) -> bool {
        self.pending.is_some() || self.header_decoder.in_progress()
    }
}

impl Default for RequestDecoder {
    fn default() -> Self {
        Self::with_limits(RequestLimits::default())
    }
}

impl Decoder for RequestDecoder {
    type Item = Request;
    type Error = ParseError;

    /// Attempts to decode an HTTP request from the provided buffer
    ///
    /// # Returns
    ///
    /// - `Ok(Some(request))`: a complete request, its bytes were consumed
    /// - `Ok(None)`: need more data to proceed
    /// - `Err(_)`: the request is malformed
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.pending.is_none() {
            match self.header_decoder.decode(src)? {
                Some((head, body_len)) => self.pending = Some((head, LengthDecoder::new(body_len))),
                None => return Ok(None),
            }
        }

        let Some((_, body_decoder)) = self.pending.as_mut() else {
            return Ok(None);
        };

        match body_decoder.decode(src)? {
            Some(body) => Ok(self.pending.take().map(|(head, _)| head.body(body))),
            None => Ok(None),
        }
    }

    /// Called when the peer closed its write half.
    ///
    /// A request cut in the middle is reported as an I/O error, not as a
    /// malformed request: nothing should be answered.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(request) => Ok(Some(request)),
            None if src.is_empty() && !self.in_progress() => Ok(None),
            None => Err(ParseError::io(io::Error::new(ErrorKind::UnexpectedEof, "connection closed in the middle of a request"))),
        }
    }
}
