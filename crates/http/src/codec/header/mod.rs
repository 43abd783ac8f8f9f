//! HTTP head processing: request head decoding and response head encoding.
//!
//! - [`HeaderDecoder`]: parses the request line and header fields, enforcing
//!   the configured size limits, and resolves the body length
//! - [`HeaderEncoder`]: writes the status line and header fields of a response,
//!   refusing values that would inject extra lines

mod header_decoder;
mod header_encoder;

pub use header_decoder::HeaderDecoder;
pub use header_encoder::HeaderEncoder;
