//! Process HTTP connections on the server.

use bytes::Bytes;
use futures_lite::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use http_types::headers::{ACCEPT_ENCODING, CONNECTION};
use http_types::{StatusCode, Version};
use log::{debug, error, trace, warn};

use crate::future::timeout;
use crate::inbound::{self, Inbound};
use crate::{Error, ErrorKind, Handler, Response, Result, ServerConfig};

mod decode;
mod encode;
mod listener;

use decode::{decode, Decoded};
use encode::{encode, reject};
pub use listener::Server;

/// Context key under which the server stores, as a `bool`, whether the
/// client accepts gzip and the configured
/// [`Compression`](crate::Compression) policy would compress a response of
/// unknown length.
pub const COMPRESS_KEY: &str = "h1-transport.compress";

const CONTINUE_RESPONSE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";

/// Accept a new incoming HTTP/1.1 connection.
///
/// Supports `KeepAlive` requests by default.
pub async fn accept<RW, H>(io: RW, handler: &H) -> Result<()>
where
    RW: AsyncRead + AsyncWrite + Clone + Send + Sync + Unpin + 'static,
    H: Handler + ?Sized,
{
    accept_with_config(io, handler, &ServerConfig::default()).await
}

/// Accept a new incoming HTTP/1.1 connection.
///
/// Exchanges run strictly one after another. The loop ends with `Ok(())`
/// when the client goes away between requests or the connection is closed
/// on purpose, and with the classified error when an exchange fails; the
/// connection is closed in every case.
pub async fn accept_with_config<RW, H>(io: RW, handler: &H, config: &ServerConfig) -> Result<()>
where
    RW: AsyncRead + AsyncWrite + Clone + Send + Sync + Unpin + 'static,
    H: Handler + ?Sized,
{
    let shared = Inbound::shared(io.clone());
    let mut writer = io;

    loop {
        let decoded = match timeout(config.headers_timeout(), decode(&shared, config)).await {
            Ok(Ok(Some(decoded))) => decoded,
            Ok(Ok(None)) => {
                trace!("client closed the connection");
                return Ok(());
            }
            Ok(Err(err)) => return reject_head(&mut writer, err).await,
            Err(_) => {
                debug!("no request head within the headers timeout, closing");
                writer.close().await.ok();
                return Err(Error::Timeout("request head"));
            }
        };

        let Decoded {
            mut request,
            expects_continue,
        } = decoded;
        let method = request.method();
        let version = request.version();
        let keep_alive = request.keep_alive();
        trace!("{} {} {}", method, request.uri(), version);

        let compress = config
            .compression()
            .should_compress(request.header(ACCEPT_ENCODING), None);
        let cx = request.context().put(COMPRESS_KEY, compress);
        request.set_context(cx.clone());

        if expects_continue {
            writer.write_all(CONTINUE_RESPONSE).await?;
            writer.flush().await?;
        }

        let mut res = match handler.call(request).await {
            Ok(res) => res,
            Err(err) => {
                error!("handler failed: {}", err);
                internal_error()
            }
        };

        // HTTP/1.0 peers cannot read chunked bodies, and only stay open
        // when the response says so
        if version == Version::Http1_0 && !res.is_committed() {
            res.set_chunked_transfer(false)?;
            if keep_alive {
                res.insert_header(CONNECTION, "keep-alive")?;
            }
        }

        let mut decision = match res.commit(method, keep_alive) {
            Ok(decision) => decision,
            Err(err) => {
                error!("cannot frame response: {}", err);
                res = internal_error();
                res.commit(method, keep_alive)?
            }
        };

        let mut body = res.take_body().subscribe(&cx);
        if decision.writes_body() {
            body = match body.primed().await {
                Ok(body) => body,
                Err(err) => {
                    error!("response body failed before its head was sent: {}", err);
                    res = internal_error();
                    decision = res.commit(method, keep_alive)?;
                    res.take_body().subscribe(&cx)
                }
            };
        }

        if let Err(err) = encode(&mut writer, res.status(), res.headers(), decision, body).await {
            warn!("closing connection after a failed response: {}", err);
            writer.close().await.ok();
            return Err(err);
        }

        if decision.closes() || !keep_alive {
            trace!("closing connection as framed");
            writer.close().await?;
            return Ok(());
        }

        if let Err(err) = inbound::drain(&shared).await {
            debug!("failed to drain request body: {}", err);
            writer.close().await.ok();
            return Err(err);
        }
    }
}

fn internal_error() -> Response {
    Response::new(StatusCode::InternalServerError).with_body(Bytes::new())
}

/// Answer a request head that could not be decoded, close, and hand back
/// the error.
async fn reject_head<RW>(io: &mut RW, err: Error) -> Result<()>
where
    RW: AsyncRead + AsyncWrite + Unpin,
{
    let status = match err.kind() {
        ErrorKind::TooLarge => StatusCode::PayloadTooLarge,
        ErrorKind::Protocol => StatusCode::BadRequest,
        _ => {
            trace!("connection lost while reading a request head: {}", err);
            io.close().await.ok();
            return Err(err);
        }
    };
    warn!("rejecting request with {}: {}", u16::from(status), err);
    reject(io, status).await.ok();
    io.close().await.ok();
    Err(err)
}
