use futures_lite::io::{AsyncWrite, AsyncWriteExt};

use super::ABORT_TRAILER;
use crate::ErrorKind;

/// An encoder for chunked encoding.
///
/// Every buffer handed to [`send`](ChunkedEncoder::send) becomes exactly one
/// chunk on the wire.
#[derive(Debug)]
pub(crate) struct ChunkedEncoder<'a, W> {
    writer: &'a mut W,
    bytes_written: u64,
}

impl<'a, W: AsyncWrite + Unpin> ChunkedEncoder<'a, W> {
    /// Create a new instance.
    pub(crate) fn new(writer: &'a mut W) -> Self {
        Self {
            writer,
            bytes_written: 0,
        }
    }

    /// Payload bytes written so far, framing excluded.
    pub(crate) fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Write one chunk and flush it.
    ///
    /// An empty buffer would read as the last-chunk, so it is skipped.
    pub(crate) async fn send(&mut self, buf: &[u8]) -> std::io::Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        let mut frame = Vec::with_capacity(buf.len() + 12);
        frame.extend_from_slice(format!("{:X}\r\n", buf.len()).as_bytes());
        frame.extend_from_slice(buf);
        frame.extend_from_slice(b"\r\n");
        self.writer.write_all(&frame).await?;
        self.writer.flush().await?;
        self.bytes_written += buf.len() as u64;
        Ok(())
    }

    /// Write the last-chunk and an empty trailer section.
    pub(crate) async fn finish(self) -> std::io::Result<()> {
        self.writer.write_all(b"0\r\n\r\n").await?;
        self.writer.flush().await
    }

    /// End the body with a trailer telling the peer the producer failed.
    pub(crate) async fn abort(self, kind: ErrorKind) -> std::io::Result<()> {
        let tail = format!("0\r\n{}: {}\r\n\r\n", ABORT_TRAILER, kind);
        self.writer.write_all(tail.as_bytes()).await?;
        self.writer.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_lite::future::block_on;

    #[test]
    fn one_chunk_per_send() {
        let mut out = Vec::new();
        block_on(async {
            let mut encoder = ChunkedEncoder::new(&mut out);
            encoder.send(b"hello").await.unwrap();
            encoder.send(b"").await.unwrap();
            encoder.send(&[b'x'; 26]).await.unwrap();
            assert_eq!(encoder.bytes_written(), 31);
            encoder.finish().await.unwrap();
        });
        let expected = format!("5\r\nhello\r\n1A\r\n{}\r\n0\r\n\r\n", "x".repeat(26));
        assert_eq!(String::from_utf8(out).unwrap(), expected);
    }

    #[test]
    fn abort_writes_trailer() {
        let mut out = Vec::new();
        block_on(async {
            let mut encoder = ChunkedEncoder::new(&mut out);
            encoder.send(b"ok").await.unwrap();
            encoder.abort(ErrorKind::Handler).await.unwrap();
        });
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "2\r\nok\r\n0\r\nx-stream-error: handler\r\n\r\n"
        );
    }
}
