use futures_lite::io::{AsyncWrite, AsyncWriteExt};
use futures_lite::StreamExt;
use http_types::headers::{CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use log::trace;

use crate::chunked::ChunkedEncoder;
use crate::{Error, Request, Result};

/// Write `req` to `writer`.
///
/// A body of known length goes out with `content-length`, a body without
/// producer with no framing field at all, anything else chunked. The body
/// is subscribed with the request's own context.
pub(crate) async fn encode<W>(writer: &mut W, req: &mut Request, host: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let body = req.take_body();
    let len = body.len();
    let chunked = len.is_none() && body.has_producer();

    let headers = req.headers_mut();
    headers.remove(CONTENT_LENGTH);
    headers.remove(TRANSFER_ENCODING);
    if !headers.contains(HOST) {
        headers.insert(HOST, host);
    }
    match len {
        Some(n) => headers.insert(CONTENT_LENGTH, n),
        None if chunked => headers.insert(TRANSFER_ENCODING, "chunked"),
        None => {}
    }

    let mut head = Vec::with_capacity(256);
    std::io::Write::write_fmt(
        &mut head,
        format_args!("{} {} HTTP/1.1\r\n", req.method(), req.uri()),
    )?;
    for (name, value) in req.headers().iter() {
        std::io::Write::write_fmt(&mut head, format_args!("{}: {}\r\n", name, value))?;
    }
    std::io::Write::write_fmt(&mut head, format_args!("\r\n"))?;
    writer.write_all(&head).await?;

    let mut stream = body.subscribe(req.context());
    if chunked {
        let mut encoder = ChunkedEncoder::new(writer);
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(chunk) => encoder.send(&chunk).await?,
                Err(err) => {
                    encoder.abort(err.kind()).await?;
                    return Err(err);
                }
            }
        }
        encoder.finish().await?;
    } else {
        let expected = len.unwrap_or(0);
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            written += chunk.len() as u64;
            if written > expected {
                return Err(Error::LengthMismatch {
                    expected,
                    actual: written,
                });
            }
            writer.write_all(&chunk).await?;
        }
        writer.flush().await?;
        if written != expected {
            return Err(Error::LengthMismatch {
                expected,
                actual: written,
            });
        }
    }

    trace!("sent {} {}", req.method(), req.uri());
    Ok(())
}
