//! HTTP response encoder module
//!
//! Serializes a complete [`Response`] into wire bytes: status line, header
//! fields, a computed `Content-Length` and the body.

use crate::codec::header::HeaderEncoder;
use crate::protocol::{Response, SendError};
use bytes::BytesMut;
use tokio_util::codec::Encoder;
use tracing::trace;

#[derive(Debug)]
pub struct ResponseEncoder {
    header_encoder: HeaderEncoder,
}

impl ResponseEncoder {
    pub fn new() -> Self {
        Default::default()
    }
}

impl Default for ResponseEncoder {
    fn default() -> Self {
        Self { header_encoder: HeaderEncoder }
    }
}

impl Encoder<Response> for ResponseEncoder {
    type Error = SendError;

    /// Encodes `item` into `dst`.
    ///
    /// `Content-Length` always announces the body length. A head-only response
    /// (the answer to a `HEAD` request) keeps that length but its body bytes are
    /// not written.
    fn encode(&mut self, item: Response, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (status, headers, body, head_only) = item.into_parts();

        self.header_encoder.encode((status, &headers, body.len()), dst)?;

        if !head_only {
            dst.extend_from_slice(&body);
        }
        trace!(status = status.as_u16(), body_len = body.len(), head_only, "encoded response");
        Ok(())
    }
}
