//! HTTP connection handling module
//!
//! An [`HttpConnection`] owns one accepted stream and serves its requests one
//! after the other:
//!
//! - reads with an idle timeout, closing silently when it fires
//! - answers malformed requests with `400 Bad Request` and closes
//! - answers handler failures and panics with `500 Internal Server Error` and closes
//! - keeps HTTP/1.1 connections alive unless either side asks to close, the
//!   request limit is reached or shutdown started

mod http_connection;

pub use http_connection::HttpConnection;
