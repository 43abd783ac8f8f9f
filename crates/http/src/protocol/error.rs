use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request error: {source}")]
    RequestError {
        #[from]
        source: ParseError,
    },

    #[error("response error: {source}")]
    ResponseError {
        #[from]
        source: SendError,
    },
}

impl HttpError {
    /// Returns true if the error came from the underlying socket rather than the protocol.
    pub fn is_io(&self) -> bool {
        matches!(self, HttpError::RequestError { source: ParseError::Io { .. } } | HttpError::ResponseError { source: SendError::Io { .. } })
    }
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("request line too long, current: {current_size} exceed the limit {max_size}")]
    TooLongRequestLine { current_size: usize, max_size: usize },

    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    #[error("body size too large, content-length: {length} exceed the limit {max_size}")]
    TooLargeBody { length: u64, max_size: usize },

    #[error("invalid request line: {reason}")]
    InvalidRequestLine { reason: String },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid http version: {0:?}")]
    InvalidVersion(Option<u8>),

    #[error("invalid http method: {0}")]
    InvalidMethod(String),

    #[error("invalid http uri: {0}")]
    InvalidUri(String),

    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    #[error("unsupported transfer-encoding: {0}")]
    UnsupportedTransferEncoding(String),

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn too_long_request_line(current_size: usize, max_size: usize) -> Self {
        Self::TooLongRequestLine { current_size, max_size }
    }

    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn too_large_body(length: u64, max_size: usize) -> Self {
        Self::TooLargeBody { length, max_size }
    }

    pub fn invalid_request_line<S: ToString>(str: S) -> Self {
        Self::InvalidRequestLine { reason: str.to_string() }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(str: S) -> Self {
        Self::InvalidContentLength { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }

    /// Returns true if the bytes received so far can't be a valid request.
    ///
    /// Only malformed requests are answered with `400 Bad Request`, an I/O error
    /// closes the connection silently.
    pub fn is_malformed(&self) -> bool {
        !matches!(self, ParseError::Io { .. })
    }
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("invalid status code {0}, expected 100..=599")]
    InvalidStatus(u16),

    #[error("invalid value for header {name}: CR or LF is not allowed")]
    InvalidHeaderValue { name: String },

    #[error("write timed out")]
    Timeout,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_header_value<S: ToString>(name: S) -> Self {
        Self::InvalidHeaderValue { name: name.to_string() }
    }
}
