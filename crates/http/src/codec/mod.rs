//! HTTP codec module for decoding requests and encoding responses
//!
//! Both sides plug into `tokio_util::codec`, so a connection can drive them
//! with `FramedRead` and `FramedWrite`.
//!
//! - [`RequestDecoder`]: resumable request parser, head via the `header`
//!   module and body via the `body` module
//! - [`ResponseEncoder`]: response serializer with computed `Content-Length`
//!
//! # Example
//!
//! ```
//! use lean_http::codec::{RequestDecoder, ResponseEncoder};
//! use lean_http::protocol::Response;
//! use tokio_util::codec::{Decoder, Encoder};
//! use bytes::BytesMut;
//! use http::StatusCode;
//!
//! let mut decoder = RequestDecoder::new();
//! let mut request_buffer = BytesMut::from("POST /submit HTTP/1.1\r\nContent-Length: 5\r\n\r\nhel");
//! assert!(decoder.decode(&mut request_buffer).unwrap().is_none());
//!
//! request_buffer.extend_from_slice(b"lo");
//! let request = decoder.decode(&mut request_buffer).unwrap().unwrap();
//! assert_eq!(&request.body()[..], b"hello");
//!
//! let mut encoder = ResponseEncoder::new();
//! let mut response_buffer = BytesMut::new();
//! encoder.encode(Response::text(StatusCode::OK, "ok"), &mut response_buffer).unwrap();
//! assert!(response_buffer.starts_with(b"HTTP/1.1 200 OK\r\n"));
//! ```

mod body;
mod header;
mod request_decoder;
mod response_encoder;

pub use request_decoder::RequestDecoder;
pub use response_encoder::ResponseEncoder;
