//! Write responses to the wire.

use std::time::Duration;

use futures_lite::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use futures_lite::StreamExt;
use http_types::StatusCode;
use log::{error, trace};

use crate::chunked::ChunkedEncoder;
use crate::framing::{Decision, Framing};
use crate::future::timeout;
use crate::{BodyStream, Error, Headers, Result};

/// How long a rejected connection is read from before it is closed.
const LINGER: Duration = Duration::from_secs(1);

/// Serialize the status line and headers.
pub(crate) fn encode_head(status: StatusCode, headers: &Headers) -> std::io::Result<Vec<u8>> {
    let mut head = Vec::with_capacity(256);
    std::io::Write::write_fmt(
        &mut head,
        format_args!(
            "HTTP/1.1 {} {}\r\n",
            u16::from(status),
            reason(status)
        ),
    )?;
    for (name, value) in headers.iter() {
        std::io::Write::write_fmt(&mut head, format_args!("{}: {}\r\n", name, value))?;
    }
    std::io::Write::write_fmt(&mut head, format_args!("\r\n"))?;
    Ok(head)
}

/// The reason phrase sent for `status`.
fn reason(status: StatusCode) -> &'static str {
    match status {
        // http-types 2.x spells this one "Modified"
        StatusCode::NotModified => "Not Modified",
        _ => status.canonical_reason(),
    }
}

/// Write a committed response: head first, then the body as `decision`
/// allows.
///
/// Any error means the connection can no longer be trusted and must be
/// closed by the caller. A body failure under chunked framing still
/// terminates the chunked coding, tagging the last-chunk with a trailer.
pub(crate) async fn encode<W>(
    writer: &mut W,
    status: StatusCode,
    headers: &Headers,
    decision: Decision,
    mut body: BodyStream,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let head = encode_head(status, headers)?;
    writer.write_all(&head).await?;

    if !decision.writes_body() {
        if decision.writes_terminator() {
            ChunkedEncoder::new(writer).finish().await?;
        } else {
            writer.flush().await?;
        }
        return Ok(());
    }

    match decision.framing() {
        Framing::Chunked => {
            let mut encoder = ChunkedEncoder::new(writer);
            while let Some(chunk) = body.next().await {
                match chunk {
                    Ok(chunk) => encoder.send(&chunk).await?,
                    Err(err) => {
                        error!(
                            "body failed after {} bytes, aborting chunked stream: {}",
                            encoder.bytes_written(),
                            err
                        );
                        encoder.abort(err.kind()).await?;
                        return Err(err);
                    }
                }
            }
            encoder.finish().await?;
        }
        Framing::ContentLength(expected) => {
            let mut written = 0u64;
            while let Some(chunk) = body.next().await {
                let chunk = chunk?;
                let actual = written + chunk.len() as u64;
                if actual > expected {
                    error!(
                        "body longer than its content-length: {} > {}",
                        actual, expected
                    );
                    writer.flush().await?;
                    return Err(Error::LengthMismatch { expected, actual });
                }
                writer.write_all(&chunk).await?;
                written = actual;
            }
            writer.flush().await?;
            if written != expected {
                error!(
                    "body shorter than its content-length: {} < {}",
                    written, expected
                );
                return Err(Error::LengthMismatch {
                    expected,
                    actual: written,
                });
            }
        }
        Framing::Close => {
            while let Some(chunk) = body.next().await {
                writer.write_all(&chunk?).await?;
                writer.flush().await?;
            }
        }
    }

    trace!("wrote {} response", u16::from(status));
    Ok(())
}

/// Answer a head the server refuses to process, then close.
///
/// The peer may still be sending; reading for a short while before the
/// caller closes keeps its TCP stack from discarding the response.
pub(crate) async fn reject<RW>(io: &mut RW, status: StatusCode) -> Result<()>
where
    RW: AsyncRead + AsyncWrite + Unpin,
{
    let mut headers = Headers::new();
    headers.insert("content-length", 0);
    headers.insert("connection", "close");
    let head = encode_head(status, &headers)?;
    io.write_all(&head).await?;
    io.flush().await?;

    let mut sink = [0u8; 1024];
    let _ = timeout(Some(LINGER), async {
        while let Ok(n) = io.read(&mut sink).await {
            if n == 0 {
                break;
            }
        }
    })
    .await;
    Ok(())
}
