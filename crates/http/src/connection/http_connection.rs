use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use futures::{FutureExt, SinkExt};
use http::header::CONNECTION;
use http::{Method, StatusCode};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::select;
use tokio::time::timeout;
use tokio_util::codec::{Decoder, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::codec::{RequestDecoder, ResponseEncoder};
use crate::config::ListenerConfig;
use crate::handler::{Handler, HandlerError};
use crate::protocol::{HttpError, ParseError, Request, Response, SendError};

/// Initial capacity of the receive buffer
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Spare capacity below which the receive buffer is grown before a read
const MIN_READ_SPACE: usize = 1024;

/// Lifecycle of a connection.
///
/// ```text
/// Reading -> Processing -> Writing -> (keep-alive) Reading
///                                  -> Closing -> Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    Reading,
    Processing,
    Writing,
    Closing,
    Closed,
}

/// How a read phase ended, errors aside.
#[derive(Debug)]
enum ReadOutcome {
    Request(Request),
    /// The peer closed the connection between requests
    Closed,
    /// No byte arrived within the read timeout
    TimedOut { partial: bool },
    /// Shutdown started while the connection was idle
    Shutdown,
}

/// An HTTP connection that owns one accepted stream end-to-end
///
/// `HttpConnection` reads requests with an idle timeout, hands each complete
/// request to the [`Handler`], writes the response and then either waits for
/// the next request (keep-alive) or closes. Requests are served strictly one
/// after the other: the next request is parsed only once the previous response
/// has been written.
///
/// # Type Parameters
///
/// * `R`: The async readable stream type
/// * `W`: The async writable stream type
#[derive(Debug)]
pub struct HttpConnection<R, W> {
    reader: R,
    read_buf: BytesMut,
    decoder: RequestDecoder,
    framed_write: FramedWrite<W, ResponseEncoder>,
    read_timeout: Duration,
    write_timeout: Duration,
    max_requests: usize,
    shutdown: CancellationToken,
    peer: Option<SocketAddr>,
    created_at: Instant,
    served: usize,
    state: ConnectionState,
}

impl<R, W> HttpConnection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W, config: &ListenerConfig) -> Self {
        Self {
            reader,
            read_buf: BytesMut::with_capacity(READ_BUFFER_SIZE),
            decoder: RequestDecoder::with_limits(config.limits),
            framed_write: FramedWrite::new(writer, ResponseEncoder::new()),
            read_timeout: config.read_timeout,
            write_timeout: config.write_timeout,
            max_requests: config.max_requests_per_connection,
            shutdown: CancellationToken::new(),
            peer: None,
            created_at: Instant::now(),
            served: 0,
            state: ConnectionState::Reading,
        }
    }

    /// Records the remote address, used in logs.
    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    /// Installs the token signalling graceful shutdown.
    ///
    /// Once cancelled, an idle connection closes right away and a busy one
    /// closes after its current response.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Serves requests until the connection closes.
    ///
    /// Returns `Ok` when the connection ended normally: keep-alive finished,
    /// peer closed, idle timeout or shutdown. Returns `Err` for malformed
    /// requests (after answering `400`) and I/O failures.
    pub async fn process<H>(mut self, handler: Arc<H>) -> Result<(), HttpError>
    where
        H: Handler,
    {
        let result = self.serve(&handler).await;
        self.close().await;
        result
    }

    async fn serve<H>(&mut self, handler: &Arc<H>) -> Result<(), HttpError>
    where
        H: Handler,
    {
        loop {
            self.transition(ConnectionState::Reading);

            let request = match self.read_request().await {
                Ok(ReadOutcome::Request(request)) => request,
                Ok(ReadOutcome::Closed) => {
                    debug!(peer = ?self.peer, "peer closed connection");
                    return Ok(());
                }
                Ok(ReadOutcome::TimedOut { partial: false }) => {
                    debug!(peer = ?self.peer, "idle timeout, closing connection");
                    return Ok(());
                }
                Ok(ReadOutcome::TimedOut { partial: true }) => {
                    warn!(peer = ?self.peer, buffered = self.read_buf.len(), "read timed out in the middle of a request");
                    return Ok(());
                }
                Ok(ReadOutcome::Shutdown) => {
                    debug!(peer = ?self.peer, "shutting down idle connection");
                    return Ok(());
                }
                Err(e) if e.is_malformed() => {
                    warn!(peer = ?self.peer, cause = %e, "malformed request");
                    self.transition(ConnectionState::Writing);
                    if let Err(send_error) = self.send_response(error_response(StatusCode::BAD_REQUEST)).await {
                        debug!(cause = %send_error, "can't send bad request response");
                    }
                    return Err(e.into());
                }
                Err(e) => return Err(e.into()),
            };

            self.transition(ConnectionState::Processing);
            self.served += 1;

            let is_head = request.method() == Method::HEAD;
            let client_keep_alive = request.keep_alive();
            trace!(method = %request.method(), target = request.target(), "dispatching request");

            let (mut response, handler_ok) = match AssertUnwindSafe(handler.call(request)).catch_unwind().await {
                Ok(Ok(response)) => (response, true),
                Ok(Err(e)) => {
                    let e: HandlerError = e.into();
                    error!(peer = ?self.peer, cause = %e, "handle request error");
                    (error_response(StatusCode::INTERNAL_SERVER_ERROR), false)
                }
                Err(_panic) => {
                    error!(peer = ?self.peer, "request handler panicked");
                    (error_response(StatusCode::INTERNAL_SERVER_ERROR), false)
                }
            };

            let keep_alive = handler_ok
                && client_keep_alive
                && !response.wants_close()
                && self.served < self.max_requests
                && !self.shutdown.is_cancelled();

            if !keep_alive && !response.wants_close() {
                response.headers_mut().insert(CONNECTION, "close");
            }
            if is_head {
                response.set_head_only(true);
            }

            self.transition(ConnectionState::Writing);
            let status = response.status();
            match self.send_response(response).await {
                Ok(()) => debug!(status = status.as_u16(), keep_alive, "response sent"),
                Err(e @ (SendError::InvalidStatus(_) | SendError::InvalidHeaderValue { .. })) => {
                    error!(peer = ?self.peer, cause = %e, "handler returned an invalid response");
                    self.send_response(error_response(StatusCode::INTERNAL_SERVER_ERROR)).await?;
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }

            if !keep_alive {
                return Ok(());
            }
        }
    }

    /// Reads until a complete request is buffered.
    ///
    /// Every single read is bounded by the read timeout.
    async fn read_request(&mut self) -> Result<ReadOutcome, ParseError> {
        loop {
            if let Some(request) = self.decoder.decode(&mut self.read_buf)? {
                return Ok(ReadOutcome::Request(request));
            }

            let idle = self.read_buf.is_empty() && !self.decoder.in_progress();
            if self.read_buf.capacity() - self.read_buf.len() < MIN_READ_SPACE {
                self.read_buf.reserve(READ_BUFFER_SIZE);
            }

            let read_result = select! {
                biased;
                _ = self.shutdown.cancelled(), if idle => return Ok(ReadOutcome::Shutdown),
                read_result = timeout(self.read_timeout, self.reader.read_buf(&mut self.read_buf)) => read_result,
            };

            match read_result {
                Err(_elapsed) => return Ok(ReadOutcome::TimedOut { partial: !idle }),
                Ok(Ok(0)) => {
                    return match self.decoder.decode_eof(&mut self.read_buf)? {
                        Some(request) => Ok(ReadOutcome::Request(request)),
                        None => Ok(ReadOutcome::Closed),
                    };
                }
                Ok(Ok(n)) => trace!(read = n, buffered = self.read_buf.len(), "read bytes"),
                Ok(Err(e)) => return Err(ParseError::io(e)),
            }
        }
    }

    async fn send_response(&mut self, response: Response) -> Result<(), SendError> {
        match timeout(self.write_timeout, self.framed_write.send(response)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(SendError::Timeout),
        }
    }

    async fn close(&mut self) {
        self.transition(ConnectionState::Closing);
        let writer = self.framed_write.get_mut();
        match timeout(self.write_timeout, writer.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(cause = %e, "shutdown write half failed"),
            Err(_elapsed) => debug!("shutdown write half timed out"),
        }
        self.transition(ConnectionState::Closed);
        debug!(peer = ?self.peer, requests = self.served, elapsed_ms = self.created_at.elapsed().as_millis() as u64, "connection closed");
    }

    fn transition(&mut self, next: ConnectionState) {
        trace!(from = ?self.state, to = ?next, "connection state");
        self.state = next;
    }
}

fn error_response(status_code: StatusCode) -> Response {
    Response::new(status_code).header(CONNECTION, "close")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RequestLimits;
    use crate::handler::make_handler;
    use http::HeaderName;
    use tokio::io::{DuplexStream, ReadHalf, WriteHalf, duplex, split};
    use tokio::task::JoinHandle;

    async fn app(request: Request) -> Result<Response, HandlerError> {
        match request.path() {
            "/fail" => Err("boom".into()),
            "/panic" => panic!("handler panic"),
            "/bad-header" => Ok(Response::new(StatusCode::OK).header(HeaderName::from_static("x-bad"), "a\r\nb")),
            "/close" => Ok(Response::text(StatusCode::OK, "bye").header(CONNECTION, "close")),
            "/echo" => Ok(Response::new(StatusCode::OK).with_body(request.body().clone())),
            "/large" => Ok(Response::new(StatusCode::OK).with_body(vec![b'x'; 1024 * 1024])),
            "/slow" => {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(Response::text(StatusCode::OK, "late"))
            }
            "/" => Ok(Response::text(StatusCode::OK, "hello")),
            _ => Ok(Response::text(StatusCode::NOT_FOUND, "not found")),
        }
    }

    fn test_config() -> ListenerConfig {
        ListenerConfig::default().with_read_timeout(Duration::from_millis(200)).with_write_timeout(Duration::from_millis(200))
    }

    fn spawn_connection(config: ListenerConfig) -> (DuplexStream, JoinHandle<Result<(), HttpError>>) {
        spawn_with_token(config, CancellationToken::new())
    }

    fn spawn_with_token(config: ListenerConfig, token: CancellationToken) -> (DuplexStream, JoinHandle<Result<(), HttpError>>) {
        spawn_with_pipe(config, token, 64 * 1024)
    }

    /// `max_buf` bounds the bytes in flight in each direction.
    fn spawn_with_pipe(config: ListenerConfig, token: CancellationToken, max_buf: usize) -> (DuplexStream, JoinHandle<Result<(), HttpError>>) {
        let (client, server) = duplex(max_buf);
        let (reader, writer): (ReadHalf<DuplexStream>, WriteHalf<DuplexStream>) = split(server);
        let connection = HttpConnection::new(reader, writer, &config).with_shutdown(token);
        let handler = Arc::new(make_handler(app));
        let task = tokio::spawn(connection.process(handler));
        (client, task)
    }

    /// Reads exactly one response, returns its head and body.
    async fn read_response(client: &mut DuplexStream) -> (String, Vec<u8>) {
        let mut head = Vec::new();
        while !head.ends_with(b"\r\n\r\n") {
            head.push(client.read_u8().await.unwrap());
        }
        let head = String::from_utf8(head).unwrap();
        let length: usize = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length: "))
            .map(|value| value.parse().unwrap())
            .unwrap();

        let mut body = vec![0; length];
        client.read_exact(&mut body).await.unwrap();
        (head, body)
    }

    async fn read_rest(client: &mut DuplexStream) -> Vec<u8> {
        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        rest
    }

    #[tokio::test]
    async fn keep_alive_serves_sequential_requests() {
        let (mut client, task) = spawn_connection(test_config());

        client.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").await.unwrap();
        let (head, body) = read_response(&mut client).await;
        assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(!head.contains("connection: close"));
        assert_eq!(body, b"hello");

        client.write_all(b"GET /missing HTTP/1.1\r\nHost: x\r\n\r\n").await.unwrap();
        let (head, _) = read_response(&mut client).await;
        assert!(head.starts_with("HTTP/1.1 404 Not Found\r\n"));

        client.shutdown().await.unwrap();
        assert!(read_rest(&mut client).await.is_empty());
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn malformed_request_gets_400_and_close() {
        let (mut client, task) = spawn_connection(test_config());

        client.write_all(b"GET /\r\n\r\n").await.unwrap();
        let response = read_rest(&mut client).await;

        assert_eq!(&response[..], &b"HTTP/1.1 400 Bad Request\r\nconnection: close\r\ncontent-length: 0\r\n\r\n"[..]);
        assert!(matches!(task.await.unwrap(), Err(HttpError::RequestError { .. })));
    }

    #[tokio::test]
    async fn body_reaches_handler_exactly() {
        let (mut client, task) = spawn_connection(test_config());

        client.write_all(b"POST /echo HTTP/1.1\r\nContent-Length: 5\r\n\r\nhel").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        client.write_all(b"lo").await.unwrap();

        let (_, body) = read_response(&mut client).await;
        assert_eq!(body, b"hello");

        drop(client);
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn handler_error_gets_500_and_close() {
        for path in ["/fail", "/panic", "/bad-header"] {
            let (mut client, task) = spawn_connection(test_config());

            client.write_all(format!("GET {path} HTTP/1.1\r\n\r\n").as_bytes()).await.unwrap();
            let response = read_rest(&mut client).await;

            assert_eq!(
                &response[..],
                &b"HTTP/1.1 500 Internal Server Error\r\nconnection: close\r\ncontent-length: 0\r\n\r\n"[..],
                "path {path}"
            );
            assert!(task.await.unwrap().is_ok());
        }
    }

    #[tokio::test]
    async fn stalled_reader_hits_write_timeout() {
        let config = test_config().with_write_timeout(Duration::from_millis(100));
        let (mut client, task) = spawn_with_pipe(config, CancellationToken::new(), 64);

        // the client never reads, the 1 MiB body can't get through a 64 byte pipe
        client.write_all(b"GET /large HTTP/1.1\r\n\r\n").await.unwrap();

        let result = timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
        assert!(matches!(result, Err(HttpError::ResponseError { source: SendError::Timeout })), "{result:?}");
        drop(client);
    }

    #[tokio::test]
    async fn client_gone_before_response() {
        let (mut client, task) = spawn_connection(test_config());

        client.write_all(b"GET /slow HTTP/1.1\r\n\r\n").await.unwrap();
        drop(client);

        let result = timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
        assert!(matches!(result, Err(ref e) if e.is_io()), "{result:?}");
    }

    #[tokio::test]
    async fn close_requested_by_either_side() {
        let (mut client, _task) = spawn_connection(test_config());
        client.write_all(b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n").await.unwrap();
        let response = String::from_utf8(read_rest(&mut client).await).unwrap();
        assert!(response.contains("connection: close\r\n"));
        assert!(response.ends_with("hello"));

        let (mut client, _task) = spawn_connection(test_config());
        client.write_all(b"GET /close HTTP/1.1\r\n\r\n").await.unwrap();
        let response = String::from_utf8(read_rest(&mut client).await).unwrap();
        assert_eq!(response.matches("connection: close").count(), 1);
        assert!(response.ends_with("bye"));
    }

    #[tokio::test]
    async fn http_10_is_not_kept_alive() {
        let (mut client, task) = spawn_connection(test_config());
        client.write_all(b"GET / HTTP/1.0\r\n\r\n").await.unwrap();

        let response = String::from_utf8(read_rest(&mut client).await).unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.contains("connection: close\r\n"));
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn max_requests_per_connection() {
        let (mut client, task) = spawn_connection(test_config().with_max_requests_per_connection(2));

        client.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
        let (head, _) = read_response(&mut client).await;
        assert!(!head.contains("connection: close"));

        client.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
        let (head, _) = read_response(&mut client).await;
        assert!(head.contains("connection: close"));

        assert!(read_rest(&mut client).await.is_empty());
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn head_request_omits_body() {
        let (mut client, _task) = spawn_connection(test_config());
        client.write_all(b"HEAD / HTTP/1.1\r\nConnection: close\r\n\r\n").await.unwrap();

        let response = String::from_utf8(read_rest(&mut client).await).unwrap();
        assert!(response.contains("content-length: 5\r\n"));
        assert!(response.ends_with("\r\n\r\n"));
    }

    #[tokio::test]
    async fn idle_timeout_closes_silently() {
        let (mut client, task) = spawn_connection(test_config().with_read_timeout(Duration::from_millis(50)));

        assert!(read_rest(&mut client).await.is_empty());
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn partial_request_timeout_closes_without_response() {
        let (mut client, task) = spawn_connection(test_config().with_read_timeout(Duration::from_millis(50)));

        client.write_all(b"GET / HTTP/1.1\r\nHost:").await.unwrap();
        assert!(read_rest(&mut client).await.is_empty());
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn eof_in_the_middle_closes_without_response() {
        let (mut client, task) = spawn_connection(test_config());

        client.write_all(b"POST /echo HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc").await.unwrap();
        client.shutdown().await.unwrap();

        assert!(read_rest(&mut client).await.is_empty());
        let error = task.await.unwrap().unwrap_err();
        assert!(error.is_io());
    }

    #[tokio::test]
    async fn oversized_request_line_gets_400() {
        let limits = RequestLimits { max_line_bytes: 64, max_header_bytes: 128, ..RequestLimits::default() };
        let (mut client, task) = spawn_connection(test_config().with_limits(limits));

        let long_target = "a".repeat(200);
        client.write_all(format!("GET /{long_target} HTTP/1.1\r\n\r\n").as_bytes()).await.unwrap();

        let response = String::from_utf8(read_rest(&mut client).await).unwrap();
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(task.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn shutdown_closes_idle_connection() {
        let token = CancellationToken::new();
        let (mut client, task) = spawn_with_token(test_config().with_read_timeout(Duration::from_secs(30)), token.clone());

        client.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
        let (head, _) = read_response(&mut client).await;
        assert!(!head.contains("connection: close"));

        token.cancel();
        assert!(read_rest(&mut client).await.is_empty());
        assert!(task.await.unwrap().is_ok());
    }
}
