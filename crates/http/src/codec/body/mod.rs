//! Request body framing.
//!
//! Only `Content-Length` framing is supported; a request without it has an
//! empty body. See [`LengthDecoder`].

mod length_decoder;

pub use length_decoder::LengthDecoder;
