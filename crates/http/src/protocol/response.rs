//! HTTP response type.
//!
//! A [`Response`] stays mutable until it is handed to the encoder. Header values
//! are raw bytes, the encoder refuses to write any value containing CR or LF.
//! `Content-Length` is always computed by the encoder from the body.

use bytes::Bytes;
use http::header::{CONNECTION, CONTENT_TYPE};
use http::{HeaderName, StatusCode};

use crate::protocol::Headers;

#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Bytes,
    head_only: bool,
}

impl Response {
    /// Creates a response with no header and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self { status, headers: Headers::new(), body: Bytes::new(), head_only: false }
    }

    /// Creates a `text/plain` response.
    pub fn text(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self::new(status).header(CONTENT_TYPE, "text/plain; charset=utf-8").with_body(body)
    }

    /// Appends a header field.
    pub fn header(mut self, name: HeaderName, value: impl Into<Bytes>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Marks the response as having no body on the wire, as for an answer to `HEAD`.
    ///
    /// The encoder still announces the body length in `Content-Length`.
    pub fn head_only(mut self) -> Self {
        self.head_only = true;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn status_mut(&mut self) -> &mut StatusCode {
        &mut self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = body.into();
    }

    pub fn is_head_only(&self) -> bool {
        self.head_only
    }

    pub fn set_head_only(&mut self, head_only: bool) {
        self.head_only = head_only;
    }

    /// Returns true if the response asks for the connection to be closed.
    pub fn wants_close(&self) -> bool {
        self.headers.contains_token(CONNECTION, "close")
    }

    pub(crate) fn into_parts(self) -> (StatusCode, Headers, Bytes, bool) {
        (self.status, self.headers, self.body, self.head_only)
    }
}

impl From<StatusCode> for Response {
    fn from(status: StatusCode) -> Self {
        Response::new(status)
    }
}
