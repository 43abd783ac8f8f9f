//! HTTP request types.
//!
//! The decoder produces a [`RequestHead`] once the header section is parsed and
//! attaches the body with [`RequestHead::body`] when the last body byte arrives.
//! The resulting [`Request`] is immutable.

use bytes::Bytes;
use http::header::CONNECTION;
use http::{Method, Uri, Version};

use crate::protocol::Headers;

/// The request line and header fields of a request.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub(crate) method: Method,
    pub(crate) target: String,
    pub(crate) uri: Uri,
    pub(crate) version: Version,
    pub(crate) headers: Headers,
}

impl RequestHead {
    /// Attaches a body to this head, converting it into a full [`Request`].
    pub fn body(self, body: Bytes) -> Request {
        Request { head: self, body }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The request target exactly as it appeared on the request line.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Whether the client allows the connection to stay open after this request.
    ///
    /// Only HTTP/1.1 requests without `Connection: close` qualify.
    pub fn keep_alive(&self) -> bool {
        self.version == Version::HTTP_11 && !self.headers.contains_token(CONNECTION, "close")
    }
}

/// A complete HTTP request: head plus a fully received body.
#[derive(Debug, Clone)]
pub struct Request {
    head: RequestHead,
    body: Bytes,
}

impl Request {
    pub fn head(&self) -> &RequestHead {
        &self.head
    }

    pub fn method(&self) -> &Method {
        self.head.method()
    }

    pub fn target(&self) -> &str {
        self.head.target()
    }

    pub fn uri(&self) -> &Uri {
        self.head.uri()
    }

    /// The path component of the target.
    pub fn path(&self) -> &str {
        self.head.uri().path()
    }

    pub fn query(&self) -> Option<&str> {
        self.head.uri().query()
    }

    pub fn version(&self) -> Version {
        self.head.version()
    }

    pub fn headers(&self) -> &Headers {
        self.head.headers()
    }

    /// The body, empty when the request had no `Content-Length`.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn keep_alive(&self) -> bool {
        self.head.keep_alive()
    }

    pub fn into_parts(self) -> (RequestHead, Bytes) {
        (self.head, self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderName;

    fn head(version: Version, connection: Option<&'static str>) -> RequestHead {
        let mut headers = Headers::new();
        headers.append(HeaderName::from_static("host"), "example.com");
        if let Some(value) = connection {
            headers.append(CONNECTION, value);
        }
        RequestHead { method: Method::POST, target: "/items?id=1".to_owned(), uri: Uri::from_static("/items?id=1"), version, headers }
    }

    #[test]
    fn request_exposes_its_head() {
        let request = head(Version::HTTP_11, None).body(Bytes::from_static(b"payload"));

        assert_eq!(request.head().method(), &Method::POST);
        assert_eq!(request.head().target(), "/items?id=1");
        assert_eq!(request.path(), "/items");
        assert_eq!(request.query(), Some("id=1"));
        assert_eq!(request.headers().get_str("Host"), Some("example.com"));

        let (head, body) = request.into_parts();
        assert_eq!(head.uri().path(), "/items");
        assert_eq!(&body[..], b"payload");
    }

    #[test]
    fn keep_alive_rules() {
        assert!(head(Version::HTTP_11, None).keep_alive());
        assert!(head(Version::HTTP_11, Some("keep-alive")).keep_alive());
        assert!(!head(Version::HTTP_11, Some("Close")).keep_alive());
        assert!(!head(Version::HTTP_11, Some("upgrade, close")).keep_alive());
        assert!(!head(Version::HTTP_10, None).keep_alive());
        assert!(!head(Version::HTTP_10, Some("keep-alive")).keep_alive());
    }
}
