//! Streaming async HTTP/1.1 server and pooled client.
//!
//! At its core HTTP is a stateful RPC protocol, where a client and server
//! communicate with one another by encoding and decoding messages between them.
//!
//! - `client` encodes HTTP requests, and decodes HTTP responses.
//! - `server` decodes HTTP requests, and encodes HTTP responses.
//!
//! ```txt
//!   encode            decode
//!        \            /
//!        -> request  ->
//! client                server
//!        <- response <-
//!        /            \
//!   decode            encode
//! ```
//!
//! Bodies are lazy streams of [`bytes::Bytes`] buffers in both directions:
//! nothing is produced until the other side asks for it, and nothing is
//! buffered whole. How a response body is delimited on the wire (chunked,
//! a fixed `content-length`, or closing the connection) is fixed once per
//! response by [`framing::decide`], before the first byte goes out.
//!
//! Connections are kept alive between exchanges. On the server, whatever a
//! handler left unread of a request body is drained before the next request
//! is read; on the client, a connection returns to its [`client::Pool`]
//! only once its response body has been read to the end.
//!
//! # Example
//!
//! ```no_run
//! use h1_transport::client::Client;
//! use h1_transport::server::Server;
//! use h1_transport::{Request, Response, Router, ServerConfig};
//! use http_types::StatusCode;
//!
//! # fn main() -> h1_transport::Result<()> {
//! async_global_executor::block_on(async {
//!     let config = ServerConfig::builder().host("127.0.0.1").port(0).build()?;
//!     let router = Router::new().get("/hello", |_req: Request| async {
//!         Ok(Response::new(StatusCode::Ok).with_body("hello world"))
//!     });
//!     let server = Server::bind(config, router)?;
//!
//!     let client = Client::new(server.local_addr());
//!     let res = client.get("/hello").await?;
//!     assert_eq!(res.body_string().await?, "hello world");
//!
//!     server.shutdown().await;
//!     Ok(())
//! })
//! # }
//! ```

#![forbid(unsafe_code, future_incompatible)]
#![deny(rust_2018_idioms)]
#![deny(missing_debug_implementations, nonstandard_style)]
#![warn(missing_docs, unreachable_pub)]

/// The maximum amount of headers parsed on the server and the client.
const MAX_HEADERS: usize = 128;

mod body;
mod chunked;
mod config;
mod context;
mod error;
mod future;
mod handler;
mod head;
mod headers;
mod inbound;
mod request;
mod response;
mod router;

pub mod client;
pub mod framing;
pub mod server;

pub use body::{Body, BodySender, BodyStream};
pub use config::{
    ClientConfig, ClientConfigBuilder, Compression, Exhausted, PoolConfig, PoolConfigBuilder,
    ServerConfig, ServerConfigBuilder,
};
pub use context::Context;
pub use error::{Error, ErrorKind, HeadLimit, Result};
pub use handler::Handler;
pub use headers::Headers;
pub use request::Request;
pub use response::Response;
pub use router::Router;
