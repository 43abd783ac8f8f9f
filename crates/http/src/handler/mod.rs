//! The application callback invoked for every complete request.
//!
//! A [`Handler`] maps a [`Request`] to a [`Response`]. It may fail: an `Err`
//! (or a panic) is answered with `500 Internal Server Error` and the connection
//! is closed. Plain async functions become handlers through [`make_handler`].
//!
//! ```
//! use lean_http::handler::make_handler;
//! use lean_http::protocol::{Request, Response};
//! use http::StatusCode;
//! use std::convert::Infallible;
//!
//! async fn hello(request: Request) -> Result<Response, Infallible> {
//!     Ok(Response::text(StatusCode::OK, format!("hello {}", request.path())))
//! }
//!
//! let handler = make_handler(hello);
//! # let _ = handler;
//! ```

use std::error::Error;

use crate::protocol::{Request, Response};

/// Boxed error returned by handlers.
pub type HandlerError = Box<dyn Error + Send + Sync>;

#[trait_variant::make(Handler: Send)]
pub trait LocalHandler {
    type Error: Into<HandlerError>;

    async fn call(&self, req: Request) -> Result<Response, Self::Error>;
}

#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

impl<F, Fut, Err> Handler for HandlerFn<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response, Err>> + Send,
    Err: Into<HandlerError>,
{
    type Error = Err;

    async fn call(&self, req: Request) -> Result<Response, Self::Error> {
        (self.f)(req).await
    }
}

pub fn make_handler<F, Fut, Err>(f: F) -> HandlerFn<F>
where
    F: Fn(Request) -> Fut,
    Fut: Future<Output = Result<Response, Err>>,
    Err: Into<HandlerError>,
{
    HandlerFn { f }
}
