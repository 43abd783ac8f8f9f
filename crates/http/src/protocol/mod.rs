//! Core HTTP protocol types.
//!
//! - **Headers** ([`Headers`]): ordered, case-insensitive header fields
//! - **Requests** ([`Request`], [`RequestHead`]): immutable parsed requests
//! - **Responses** ([`Response`]): values handed back by a handler
//! - **Errors** ([`HttpError`], [`ParseError`], [`SendError`])
//!
//! The protocol types are plain values, all I/O happens in the
//! [`connection`](crate::connection) module through the [`codec`](crate::codec).

mod header;
pub use header::Headers;

mod request;
pub use request::Request;
pub use request::RequestHead;

mod response;
pub use response::Response;

mod error;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;
