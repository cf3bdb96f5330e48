//! Validated configuration for servers, clients and connection pools.
//!
//! Every config is assembled by a builder whose setters apply in call
//! order, so the last write to a field wins. Nothing is validated until
//! `build()`, which is the only way to obtain a config other than its
//! default.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use crate::head::HeadLimits;
use crate::{Error, Result};

/// When responses should be compressed.
///
/// Only the decision is made here; applying a codec is left to the handler,
/// which finds the outcome under [`COMPRESS_KEY`](crate::server::COMPRESS_KEY)
/// in the request context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Never compress.
    Disabled,
    /// Compress whenever the client accepts gzip.
    Always,
    /// Compress when the client accepts gzip and the body is at least this
    /// many bytes, or of unknown length.
    MinSize(u64),
}

impl Default for Compression {
    fn default() -> Self {
        Compression::Disabled
    }
}

impl Compression {
    /// Decide for a request carrying `accept_encoding` and a body of `len`.
    pub fn should_compress(&self, accept_encoding: Option<&str>, len: Option<u64>) -> bool {
        let accepts_gzip = accept_encoding
            .map(|value| {
                value.split(',').any(|coding| {
                    let mut parts = coding.split(';');
                    let name = parts.next().unwrap_or("").trim();
                    let refused = parts.any(|p| {
                        let p = p.trim();
                        p == "q=0" || p == "q=0.0" || p == "q=0.00" || p == "q=0.000"
                    });
                    !refused && (name.eq_ignore_ascii_case("gzip") || name == "*")
                })
            })
            .unwrap_or(false);

        match self {
            Compression::Disabled => false,
            Compression::Always => accepts_gzip,
            Compression::MinSize(min) => accepts_gzip && len.map_or(true, |len| len >= *min),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    host: String,
    port: u16,
    headers_timeout: Option<Duration>,
    max_initial_line_length: usize,
    max_header_size: usize,
    compression: Compression,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            headers_timeout: Some(Duration::from_secs(60)),
            max_initial_line_length: 4096,
            max_header_size: 8192,
            compression: Compression::Disabled,
        }
    }
}

impl ServerConfig {
    /// Start from the defaults.
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder {
            config: ServerConfig::default(),
        }
    }

    /// The host to bind.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The port to bind; 0 asks the OS for a free one.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// How long a client may take to send a complete request head.
    pub fn headers_timeout(&self) -> Option<Duration> {
        self.headers_timeout
    }

    /// Longest accepted request line, CRLF excluded.
    pub fn max_initial_line_length(&self) -> usize {
        self.max_initial_line_length
    }

    /// Largest accepted header section.
    pub fn max_header_size(&self) -> usize {
        self.max_header_size
    }

    /// The compression policy.
    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub(crate) fn head_limits(&self) -> HeadLimits {
        HeadLimits {
            initial_line: self.max_initial_line_length,
            headers: self.max_header_size,
        }
    }
}

impl fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HttpServer: listening on {}:{}", self.host, self.port)?;
        match self.compression {
            Compression::Disabled => Ok(()),
            Compression::Always => write!(f, ", gzip"),
            Compression::MinSize(n) => write!(f, ", gzip over {} bytes", n),
        }
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug, Clone)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    /// Set the host to bind.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the port to bind.
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set host and port at once.
    pub fn address(mut self, addr: SocketAddr) -> Self {
        self.config.host = addr.ip().to_string();
        self.config.port = addr.port();
        self
    }

    /// Bound the time to receive a request head. `None` waits forever.
    pub fn headers_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.headers_timeout = timeout;
        self
    }

    /// Set the longest accepted request line.
    pub fn max_initial_line_length(mut self, len: usize) -> Self {
        self.config.max_initial_line_length = len;
        self
    }

    /// Set the largest accepted header section.
    pub fn max_header_size(mut self, size: usize) -> Self {
        self.config.max_header_size = size;
        self
    }

    /// Set the compression policy.
    pub fn compression(mut self, compression: Compression) -> Self {
        self.config.compression = compression;
        self
    }

    /// Validate and build.
    pub fn build(self) -> Result<ServerConfig> {
        let config = self.config;
        if config.host.is_empty() {
            return Err(Error::IllegalState("server host must not be empty"));
        }
        if config.max_initial_line_length == 0 || config.max_header_size == 0 {
            return Err(Error::IllegalState("head size limits must be positive"));
        }
        Ok(config)
    }
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    connect_timeout: Option<Duration>,
    response_timeout: Option<Duration>,
    max_head_length: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Some(Duration::from_secs(30)),
            response_timeout: None,
            max_head_length: 8 * 1024,
        }
    }
}

impl ClientConfig {
    /// Start from the defaults.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: ClientConfig::default(),
        }
    }

    /// How long dialing a new connection may take.
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }

    /// How long to wait for a response head once the request is sent.
    pub fn response_timeout(&self) -> Option<Duration> {
        self.response_timeout
    }

    /// Largest accepted response head.
    pub fn max_head_length(&self) -> usize {
        self.max_head_length
    }

    pub(crate) fn head_limits(&self) -> HeadLimits {
        HeadLimits {
            initial_line: self.max_head_length,
            headers: self.max_head_length,
        }
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Clone)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Bound the time to dial. `None` waits forever.
    pub fn connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Bound the time to receive a response head. `None` waits forever.
    pub fn response_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.response_timeout = timeout;
        self
    }

    /// Set the largest accepted response head.
    pub fn max_head_length(mut self, len: usize) -> Self {
        self.config.max_head_length = len;
        self
    }

    /// Validate and build.
    pub fn build(self) -> Result<ClientConfig> {
        if self.config.max_head_length == 0 {
            return Err(Error::IllegalState("max head length must be positive"));
        }
        Ok(self.config)
    }
}

/// What [`Pool::acquire`](crate::client::Pool::acquire) does when every
/// connection to an address is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exhausted {
    /// Wait for a release, up to the acquire timeout.
    Wait,
    /// Dial an extra connection that is closed instead of pooled on release.
    Overflow,
}

/// Connection pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    max_connections_per_host: usize,
    idle_timeout: Option<Duration>,
    acquire_timeout: Duration,
    on_exhausted: Exhausted,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections_per_host: 16,
            idle_timeout: Some(Duration::from_secs(90)),
            acquire_timeout: Duration::from_secs(45),
            on_exhausted: Exhausted::Wait,
        }
    }
}

impl PoolConfig {
    /// Start from the defaults.
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder {
            config: PoolConfig::default(),
        }
    }

    /// A pool holding at most `max` connections per address.
    pub fn fixed(max: usize) -> Result<PoolConfig> {
        Self::builder().max_connections_per_host(max).build()
    }

    /// Connections per address, leased or idle.
    pub fn max_connections_per_host(&self) -> usize {
        self.max_connections_per_host
    }

    /// How long a connection may sit idle before it is discarded.
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }

    /// How long `acquire` waits for a free slot under [`Exhausted::Wait`].
    pub fn acquire_timeout(&self) -> Duration {
        self.acquire_timeout
    }

    /// The policy applied when an address is at capacity.
    pub fn on_exhausted(&self) -> Exhausted {
        self.on_exhausted
    }
}

/// Builder for [`PoolConfig`].
#[derive(Debug, Clone)]
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl PoolConfigBuilder {
    /// Set the per-address capacity.
    pub fn max_connections_per_host(mut self, max: usize) -> Self {
        self.config.max_connections_per_host = max;
        self
    }

    /// Set the idle timeout. `None` keeps idle connections indefinitely.
    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// Set the acquire timeout.
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.config.acquire_timeout = timeout;
        self
    }

    /// Set the exhaustion policy.
    pub fn on_exhausted(mut self, policy: Exhausted) -> Self {
        self.config.on_exhausted = policy;
        self
    }

    /// Validate and build.
    pub fn build(self) -> Result<PoolConfig> {
        if self.config.max_connections_per_host == 0 {
            return Err(Error::IllegalState("pool capacity must be at least 1"));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_display() {
        let config = ServerConfig::builder()
            .host("foo")
            .port(123)
            .compression(Compression::MinSize(987))
            .build()
            .unwrap();
        assert_eq!(
            config.to_string(),
            "HttpServer: listening on foo:123, gzip over 987 bytes"
        );

        let config = ServerConfig::builder()
            .host("foo")
            .port(123)
            .compression(Compression::Always)
            .build()
            .unwrap();
        assert_eq!(config.to_string(), "HttpServer: listening on foo:123, gzip");
    }

    #[test]
    fn last_write_wins() {
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let config = ServerConfig::builder()
            .port(1)
            .address(addr)
            .port(2)
            .build()
            .unwrap();
        assert_eq!(config.host(), "127.0.0.1");
        assert_eq!(config.port(), 2);

        let config = ServerConfig::builder().port(2).address(addr).build().unwrap();
        assert_eq!(config.port(), 9000);
    }

    #[test]
    fn invalid_configs_are_rejected() {
        assert!(ServerConfig::builder().host("").build().is_err());
        assert!(ServerConfig::builder().max_header_size(0).build().is_err());
        assert!(ClientConfig::builder().max_head_length(0).build().is_err());
        assert!(PoolConfig::fixed(0).is_err());
        assert_eq!(PoolConfig::fixed(1).unwrap().max_connections_per_host(), 1);
    }

    #[test]
    fn compression_decision() {
        let gzip = Some("deflate, gzip");
        assert!(!Compression::Disabled.should_compress(gzip, Some(10_000)));
        assert!(Compression::Always.should_compress(gzip, Some(1)));
        assert!(!Compression::Always.should_compress(Some("br"), Some(1)));
        assert!(!Compression::Always.should_compress(Some("gzip;q=0"), None));
        assert!(!Compression::Always.should_compress(None, None));

        let min = Compression::MinSize(100);
        assert!(!min.should_compress(gzip, Some(99)));
        assert!(min.should_compress(gzip, Some(100)));
        assert!(min.should_compress(gzip, None));
    }
}
