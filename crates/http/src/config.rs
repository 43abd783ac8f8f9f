//! Listener and request-size configuration.
//!
//! Every value has a default, so `ListenerConfig::default()` is enough to run a
//! server. Both structs implement `serde::Deserialize` with `#[serde(default)]`,
//! which lets an embedding program load a partial configuration from JSON or
//! TOML. Durations are expressed in milliseconds (`*_ms` keys).
//!
//! ```
//! use lean_http::config::ListenerConfig;
//! use std::time::Duration;
//!
//! let config = ListenerConfig::default()
//!     .with_port(3000)
//!     .with_max_connections(64)
//!     .with_read_timeout(Duration::from_secs(5));
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.socket_addr().port(), 3000);
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::ensure;

/// Size limits applied by the request decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RequestLimits {
    /// Maximum length of the request line, CRLF excluded
    pub max_line_bytes: usize,
    /// Maximum size of the whole header section, request line and blank line included
    pub max_header_bytes: usize,
    /// Maximum number of header fields
    pub max_headers: usize,
    /// Maximum accepted `Content-Length`
    pub max_body_bytes: usize,
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self { max_line_bytes: 8 * 1024, max_header_bytes: 8 * 1024, max_headers: 64, max_body_bytes: 1024 * 1024 }
    }
}

/// Immutable server configuration, created once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Address to bind
    pub address: IpAddr,
    /// Port to bind, `0` lets the OS pick one
    pub port: u16,
    /// Length of the OS accept queue
    pub backlog: u32,
    /// Maximum number of connections processed at the same time
    pub max_connections: usize,
    /// Maximum number of accepted connections waiting for a free slot
    pub max_pending_connections: usize,
    /// Idle timeout for each read on a connection
    #[serde(rename = "read_timeout_ms", deserialize_with = "millis")]
    pub read_timeout: Duration,
    /// Timeout for writing one response
    #[serde(rename = "write_timeout_ms", deserialize_with = "millis")]
    pub write_timeout: Duration,
    /// How long in-flight connections may run after shutdown starts
    #[serde(rename = "shutdown_grace_period_ms", deserialize_with = "millis")]
    pub shutdown_grace_period: Duration,
    /// Requests served on one keep-alive connection before it is closed
    pub max_requests_per_connection: usize,
    pub limits: RequestLimits,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 8080,
            backlog: 1024,
            max_connections: 256,
            max_pending_connections: 128,
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
            shutdown_grace_period: Duration::from_secs(10),
            max_requests_per_connection: 100,
            limits: RequestLimits::default(),
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("max_line_bytes ({line}) must not exceed max_header_bytes ({header})")]
    LineLargerThanHeader { line: usize, header: usize },
}

impl ListenerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    /// Checks that no limit would make the server unable to serve anything.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(self.backlog > 0, ConfigError::Zero { field: "backlog" });
        ensure!(self.max_connections > 0, ConfigError::Zero { field: "max_connections" });
        ensure!(!self.read_timeout.is_zero(), ConfigError::Zero { field: "read_timeout" });
        ensure!(!self.write_timeout.is_zero(), ConfigError::Zero { field: "write_timeout" });
        ensure!(self.max_requests_per_connection > 0, ConfigError::Zero { field: "max_requests_per_connection" });
        ensure!(self.limits.max_line_bytes > 0, ConfigError::Zero { field: "max_line_bytes" });
        ensure!(self.limits.max_headers > 0, ConfigError::Zero { field: "max_headers" });
        ensure!(
            self.limits.max_line_bytes <= self.limits.max_header_bytes,
            ConfigError::LineLargerThanHeader { line: self.limits.max_line_bytes, header: self.limits.max_header_bytes }
        );
        Ok(())
    }

    pub fn with_address(mut self, address: IpAddr) -> Self {
        self.address = address;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_backlog(mut self, backlog: u32) -> Self {
        self.backlog = backlog;
        self
    }

    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_max_pending_connections(mut self, max_pending_connections: usize) -> Self {
        self.max_pending_connections = max_pending_connections;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn with_shutdown_grace_period(mut self, grace_period: Duration) -> Self {
        self.shutdown_grace_period = grace_period;
        self
    }

    pub fn with_max_requests_per_connection(mut self, max_requests: usize) -> Self {
        self.max_requests_per_connection = max_requests;
        self
    }

    pub fn with_limits(mut self, limits: RequestLimits) -> Self {
        self.limits = limits;
        self
    }
}

fn millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        let config = ListenerConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.socket_addr(), "127.0.0.1:8080".parse().unwrap());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let json = r#"{
            "address": "0.0.0.0",
            "port": 9000,
            "read_timeout_ms": 1500,
            "limits": { "max_headers": 16 }
        }"#;

        let config: ListenerConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.socket_addr(), "0.0.0.0:9000".parse().unwrap());
        assert_eq!(config.read_timeout, Duration::from_millis(1500));
        assert_eq!(config.write_timeout, ListenerConfig::default().write_timeout);
        assert_eq!(config.limits.max_headers, 16);
        assert_eq!(config.limits.max_line_bytes, RequestLimits::default().max_line_bytes);
    }

    #[test]
    fn rejects_zero_limits() {
        let config = ListenerConfig::default().with_max_connections(0);
        assert_eq!(config.validate(), Err(ConfigError::Zero { field: "max_connections" }));

        let config = ListenerConfig::default().with_read_timeout(Duration::ZERO);
        assert_eq!(config.validate(), Err(ConfigError::Zero { field: "read_timeout" }));

        let limits = RequestLimits { max_line_bytes: 10_000, max_header_bytes: 1_000, ..RequestLimits::default() };
        let config = ListenerConfig::default().with_limits(limits);
        assert_eq!(config.validate(), Err(ConfigError::LineLargerThanHeader { line: 10_000, header: 1_000 }));
    }
}
