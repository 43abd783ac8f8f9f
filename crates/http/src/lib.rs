//! A small concurrent HTTP/1.1 server core
//!
//! This crate accepts TCP connections, bounds how many of them are served at
//! the same time, parses HTTP/1.1 requests and writes responses produced by an
//! application [`handler::Handler`]. It is built on top of tokio.
//!
//! # Example
//!
//! ```no_run
//! use http::StatusCode;
//! use lean_http::config::ListenerConfig;
//! use lean_http::handler::make_handler;
//! use lean_http::protocol::{Request, Response};
//! use lean_http::server::Server;
//! use std::error::Error;
//! use tracing::info;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn Error>> {
//!     let config = ListenerConfig::default().with_port(8080);
//!     let listener = Server::new(config, make_handler(hello_world)).bind().await?;
//!     info!(address = %listener.local_addr(), "serving");
//!
//!     listener.serve(async { tokio::signal::ctrl_c().await.unwrap_or_default() }).await;
//!     Ok(())
//! }
//!
//! async fn hello_world(request: Request) -> Result<Response, Box<dyn Error + Send + Sync>> {
//!     info!(path = request.path(), "request");
//!     Ok(Response::text(StatusCode::OK, "Hello World!\r\n"))
//! }
//! ```
//!
//! # Architecture
//!
//! - [`server`]: listening socket, accept loop and graceful shutdown
//! - [`limiter`]: bounded number of active connections with a wait queue
//! - [`connection`]: per-connection lifecycle and keep-alive
//! - [`codec`]: request decoding and response encoding
//! - [`protocol`]: request, response and error types
//! - [`handler`]: the application callback
//! - [`config`]: listener configuration and request size limits
//!
//! ## Error Handling
//!
//! - [`protocol::ParseError`]: malformed request or read failure
//! - [`protocol::SendError`]: invalid response or write failure
//! - [`protocol::HttpError`]: either of the above, returned by a connection
//! - [`server::ServerError`]: bind and configuration failures, fatal at startup
//!
//! # Limitations
//!
//! - HTTP/1.1 and HTTP/1.0 only, no TLS
//! - Bodies are delimited by `Content-Length`, `Transfer-Encoding` is rejected
//! - Bodies are buffered in memory up to the configured limit

pub mod codec;
pub mod config;
pub mod connection;
pub mod handler;
pub mod limiter;
pub mod protocol;
pub mod server;

mod utils;
pub(crate) use utils::ensure;
