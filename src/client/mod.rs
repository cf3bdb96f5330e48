//! Process HTTP connections on the client.

use std::fmt;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_lite::stream::Stream;
use futures_lite::{ready, StreamExt};
use http_types::headers::HeaderName;
use http_types::{Method, StatusCode, Version};
use log::trace;

use crate::future::timeout;
use crate::inbound::BodyFraming;
use crate::{Body, BodyStream, ClientConfig, Error, Headers, PoolConfig, Request, Result};

mod connection;
mod decode;
mod encode;
mod pool;

pub use connection::Connection;
pub use pool::{Lease, Pool};

/// Sends requests to one remote address, reusing pooled connections.
#[derive(Debug, Clone)]
pub struct Client {
    addr: SocketAddr,
    pool: Option<Arc<Pool>>,
    config: ClientConfig,
}

impl Client {
    /// A client with a private pool using the default [`PoolConfig`].
    pub fn new(addr: SocketAddr) -> Self {
        Self::with_pool(addr, Arc::new(Pool::new(PoolConfig::default())))
    }

    /// A client drawing connections from a shared pool.
    pub fn with_pool(addr: SocketAddr, pool: Arc<Pool>) -> Self {
        Self {
            addr,
            pool: Some(pool),
            config: ClientConfig::default(),
        }
    }

    /// A client that dials a fresh connection for every request and closes
    /// it once the response is done.
    pub fn without_pool(addr: SocketAddr) -> Self {
        Self {
            addr,
            pool: None,
            config: ClientConfig::default(),
        }
    }

    /// Replace the client configuration.
    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// The remote address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The pool in use, if any.
    pub fn pool(&self) -> Option<&Arc<Pool>> {
        self.pool.as_ref()
    }

    /// Send `req` and wait for the response head.
    ///
    /// The response body is streamed; the connection goes back to the pool
    /// once it has been read to the end.
    pub async fn send(&self, mut req: Request) -> Result<ClientResponse> {
        let lease = match &self.pool {
            Some(pool) => {
                pool.acquire_with(self.addr, self.config.connect_timeout(), None)
                    .await?
            }
            None => Lease::unpooled(
                Connection::dial(self.addr, self.config.connect_timeout()).await?,
            ),
        };
        let conn = lease
            .connection()
            .ok_or(Error::IllegalState("lease without connection"))?;
        let connection_id = conn.id();
        let method = req.method();
        let keep_alive = req.keep_alive();
        let context = req.context().clone();

        let mut writer = conn.writer();
        encode::encode(&mut writer, &mut req, &self.addr.to_string()).await?;

        let head = timeout(
            self.config.response_timeout(),
            decode::decode(conn.inbound(), method, &self.config),
        )
        .await
        .map_err(|_| Error::Timeout("response head"))??;
        trace!(
            "{} {} -> {} on connection {}",
            method,
            req.uri(),
            head.status,
            connection_id
        );

        let reusable = keep_alive && head.keep_alive();
        let known_empty = head.framing == BodyFraming::Empty;
        let body = ResponseBody::new(head.body.subscribe(&context), lease, reusable, known_empty);
        Ok(ClientResponse {
            status: head.status,
            version: head.version,
            headers: head.headers,
            connection_id,
            body,
        })
    }

    /// Send a GET request for `path`.
    pub async fn get(&self, path: &str) -> Result<ClientResponse> {
        self.send(Request::new(Method::Get, path)).await
    }

    /// Send a HEAD request for `path`.
    pub async fn head(&self, path: &str) -> Result<ClientResponse> {
        self.send(Request::new(Method::Head, path)).await
    }

    /// Send a POST request with `body` to `path`.
    pub async fn post(&self, path: &str, body: impl Into<Body>) -> Result<ClientResponse> {
        let mut req = Request::new(Method::Post, path);
        req.set_body(body);
        self.send(req).await
    }
}

/// A response whose body is still on the wire.
#[derive(Debug)]
pub struct ClientResponse {
    status: StatusCode,
    version: Version,
    headers: Headers,
    connection_id: u64,
    body: ResponseBody,
}

impl ClientResponse {
    /// The status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The protocol version the server answered with.
    pub fn version(&self) -> Version {
        self.version
    }

    /// The response headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// The first value of header `name`.
    pub fn header(&self, name: impl Into<HeaderName>) -> Option<&str> {
        self.headers.get(name)
    }

    /// The id of the connection that carried the exchange.
    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    /// Read the whole body.
    pub async fn body_bytes(self) -> Result<Bytes> {
        let mut body = self.body;
        let mut out = Vec::new();
        while let Some(chunk) = body.next().await {
            out.extend_from_slice(&chunk?);
        }
        Ok(out.into())
    }

    /// Read the whole body as UTF-8 text.
    pub async fn body_string(self) -> Result<String> {
        let bytes = self.body_bytes().await?;
        String::from_utf8(bytes.to_vec()).map_err(|_| Error::protocol("body is not valid utf-8"))
    }

    /// Take the body as a stream of buffers.
    pub fn into_body(self) -> ResponseBody {
        self.body
    }
}

/// The body of a [`ClientResponse`].
///
/// Owns the connection lease: reading to the end releases the connection to
/// its pool, dropping early or hitting an error closes it.
pub struct ResponseBody {
    stream: BodyStream,
    lease: Option<Lease>,
    reusable: bool,
}

impl ResponseBody {
    fn new(stream: BodyStream, lease: Lease, reusable: bool, known_empty: bool) -> Self {
        if known_empty {
            lease.release(reusable);
            return Self {
                stream: BodyStream::done(),
                lease: None,
                reusable,
            };
        }
        Self {
            stream,
            lease: Some(lease),
            reusable,
        }
    }
}

impl Stream for ResponseBody {
    type Item = Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let item = ready!(Pin::new(&mut self.stream).poll_next(cx));
        match &item {
            Some(Ok(_)) => {}
            Some(Err(_)) => drop(self.lease.take()),
            None => {
                let reusable = self.reusable;
                if let Some(lease) = self.lease.take() {
                    lease.release(reusable);
                }
            }
        }
        Poll::Ready(item)
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseBody")
            .field("lease", &self.lease)
            .field("reusable", &self.reusable)
            .finish()
    }
}
