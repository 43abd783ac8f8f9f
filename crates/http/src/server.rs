//! Listening socket, accept loop and graceful shutdown.
//!
//! [`Server::bind`] opens the socket and returns a [`Listener`]. The listener
//! accepts connections until the shutdown future completes, asking the
//! [`ConcurrencyLimiter`] before starting each connection:
//!
//! - admitted connections are served right away in their own task
//! - queued connections wait in their own task, the accept loop keeps going
//! - rejected connections are closed without a single byte written
//!
//! On shutdown the socket is closed, idle connections close at once and busy
//! ones get `shutdown_grace_period` to finish their current response before
//! being aborted.
//!
//! ```no_run
//! use lean_http::config::ListenerConfig;
//! use lean_http::handler::make_handler;
//! use lean_http::protocol::{Request, Response};
//! use lean_http::server::Server;
//! use http::StatusCode;
//! use std::convert::Infallible;
//!
//! async fn hello(_request: Request) -> Result<Response, Infallible> {
//!     Ok(Response::text(StatusCode::OK, "hello"))
//! }
//!
//! # async fn run() -> Result<(), lean_http::server::ServerError> {
//! let listener = Server::new(ListenerConfig::default(), make_handler(hello)).bind().await?;
//! listener.serve(async { tokio::signal::ctrl_c().await.unwrap_or_default() }).await;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::select;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::config::{ConfigError, ListenerConfig};
use crate::connection::HttpConnection;
use crate::handler::Handler;
use crate::limiter::{Admission, ConcurrencyLimiter};

/// Pause after a failed `accept`, so exhausted file descriptors don't spin the loop
const ACCEPT_BACKOFF: Duration = Duration::from_millis(10);

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("invalid configuration: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("bind {addr} error: {source}")]
    Bind { addr: SocketAddr, source: io::Error },
}

/// A configured server, not yet bound.
pub struct Server<H> {
    config: ListenerConfig,
    handler: Arc<H>,
}

impl<H> fmt::Debug for Server<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server").field("config", &self.config).finish_non_exhaustive()
    }
}

impl<H> Server<H>
where
    H: Handler + Sync + 'static,
{
    pub fn new(config: ListenerConfig, handler: H) -> Self {
        Self { config, handler: Arc::new(handler) }
    }

    /// Validates the configuration and binds the listening socket.
    ///
    /// A bind failure is reported, never retried.
    pub async fn bind(self) -> Result<Listener<H>, ServerError> {
        self.config.validate()?;

        let addr = self.config.socket_addr();
        let tcp_listener = bind_socket(addr, self.config.backlog).map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = tcp_listener.local_addr().map_err(|source| ServerError::Bind { addr, source })?;
        info!(%local_addr, backlog = self.config.backlog, max_connections = self.config.max_connections, "start listening");

        let limiter = ConcurrencyLimiter::new(self.config.max_connections, self.config.max_pending_connections);
        Ok(Listener { tcp_listener, local_addr, config: Arc::new(self.config), handler: self.handler, limiter })
    }
}

fn bind_socket(addr: SocketAddr, backlog: u32) -> io::Result<TcpListener> {
    let socket = if addr.is_ipv4() { TcpSocket::new_v4()? } else { TcpSocket::new_v6()? };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(backlog)
}

/// A bound socket ready to serve connections.
pub struct Listener<H> {
    tcp_listener: TcpListener,
    local_addr: SocketAddr,
    config: Arc<ListenerConfig>,
    handler: Arc<H>,
    limiter: ConcurrencyLimiter,
}

impl<H> fmt::Debug for Listener<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("local_addr", &self.local_addr)
            .field("config", &self.config)
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}

impl<H> Listener<H>
where
    H: Handler + Sync + 'static,
{
    /// The bound address, with the actual port when `0` was configured.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    /// Accepts connections until `shutdown` completes, then drains them.
    pub async fn serve<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let Listener { tcp_listener, local_addr, config, handler, limiter } = self;
        let token = CancellationToken::new();
        let mut tasks = JoinSet::new();
        let mut shutdown = std::pin::pin!(shutdown);

        loop {
            select! {
                biased;
                () = &mut shutdown => break,
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => log_join(joined),
                accepted = tcp_listener.accept() => match accepted {
                    Ok((tcp_stream, peer)) => {
                        let admission = limiter.admit();
                        if let Admission::Rejected = admission {
                            warn!(%peer, active = limiter.active(), queued = limiter.queued(), "too many connections, dropping");
                            continue;
                        }

                        let connection = serve_connection(tcp_stream, peer, admission, Arc::clone(&config), Arc::clone(&handler), token.clone());
                        tasks.spawn(connection.instrument(info_span!("connection", %peer)));
                    }
                    Err(e) => {
                        warn!(cause = %e, "failed to accept");
                        sleep(ACCEPT_BACKOFF).await;
                    }
                },
            }
        }

        drop(tcp_listener);
        info!(%local_addr, connections = tasks.len(), "shutdown started, stop accepting");
        token.cancel();

        let drain = async {
            while let Some(joined) = tasks.join_next().await {
                log_join(joined);
            }
        };
        if timeout(config.shutdown_grace_period, drain).await.is_err() {
            warn!(remaining = tasks.len(), "grace period elapsed, aborting connections");
            tasks.shutdown().await;
        }
        info!(%local_addr, "server stopped");
    }
}

async fn serve_connection<H>(
    tcp_stream: TcpStream,
    peer: SocketAddr,
    admission: Admission,
    config: Arc<ListenerConfig>,
    handler: Arc<H>,
    token: CancellationToken,
) where
    H: Handler + Sync + 'static,
{
    let _permit = match admission {
        Admission::Ready(permit) => permit,
        Admission::Queued(queued) => select! {
            acquired = queued.acquire() => match acquired {
                Ok(permit) => permit,
                Err(e) => {
                    debug!(cause = %e, "limiter closed while waiting for a slot");
                    return;
                }
            },
            () = token.cancelled() => {
                debug!("shutdown while waiting for a slot");
                return;
            }
        },
        Admission::Rejected => return,
    };

    if let Err(e) = tcp_stream.set_nodelay(true) {
        debug!(cause = %e, "can't set TCP_NODELAY");
    }

    let (reader, writer) = tcp_stream.into_split();
    let connection = HttpConnection::new(reader, writer, &config).with_peer(peer).with_shutdown(token);
    match connection.process(handler).await {
        Ok(()) => debug!("finished process, connection shutdown"),
        Err(e) if e.is_io() => debug!(cause = %e, "connection closed on io error"),
        Err(e) => warn!(cause = %e, "connection closed on error"),
    }
}

fn log_join(joined: Result<(), JoinError>) {
    if let Err(e) = joined
        && e.is_panic()
    {
        error!(cause = %e, "connection task panicked");
    }
}
