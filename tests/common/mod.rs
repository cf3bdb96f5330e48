#![allow(dead_code)]

use std::fmt::{self, Debug, Display};
use std::io;
use std::pin::Pin;
use std::sync::RwLock;
use std::task::{Context, Poll, Waker};

use async_dup::Arc;
use futures_lite::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use h1_transport::{server, Handler, Result, ServerConfig};

/// Feed `raw` (with `\n` line endings) to a server connection, close the
/// client's write half, and return everything the server wrote along with
/// how the connection ended.
pub async fn run<H: Handler>(raw: &str, handler: H) -> (String, Result<()>) {
    run_with_config(raw, handler, &ServerConfig::default()).await
}

pub async fn run_with_config<H: Handler>(
    raw: &str,
    handler: H,
    config: &ServerConfig,
) -> (String, Result<()>) {
    let (mut client, server) = TestIO::new();
    client
        .write_all(raw.replace("\n", "\r\n").as_bytes())
        .await
        .unwrap();
    client.close();

    let res = server::accept_with_config(server, &handler, config).await;
    (client.read.to_string(), res)
}

/// An in-memory duplex: what one end writes, the other end reads.
#[derive(Default, Clone, Debug)]
pub struct TestIO {
    pub read: Arc<CloseableCursor>,
    pub write: Arc<CloseableCursor>,
}

#[derive(Default)]
pub struct CloseableCursor {
    data: RwLock<Vec<u8>>,
    cursor: RwLock<usize>,
    waker: RwLock<Option<Waker>>,
    closed: RwLock<bool>,
}

impl CloseableCursor {
    fn len(&self) -> usize {
        self.data.read().unwrap().len()
    }

    fn cursor(&self) -> usize {
        *self.cursor.read().unwrap()
    }

    fn current(&self) -> bool {
        self.len() == self.cursor()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.read().unwrap()
    }

    fn close(&self) {
        *self.closed.write().unwrap() = true;
        if let Some(waker) = self.waker.write().unwrap().take() {
            waker.wake();
        }
    }
}

impl Display for CloseableCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = &*self.data.read().unwrap();
        let s = std::str::from_utf8(data).unwrap_or("not utf8");
        write!(f, "{}", s)
    }
}

impl Debug for CloseableCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloseableCursor")
            .field(
                "data",
                &std::str::from_utf8(&self.data.read().unwrap()).unwrap_or("not utf8"),
            )
            .field("closed", &*self.closed.read().unwrap())
            .field("cursor", &*self.cursor.read().unwrap())
            .finish()
    }
}

impl TestIO {
    pub fn new() -> (TestIO, TestIO) {
        let client = Arc::new(CloseableCursor::default());
        let server = Arc::new(CloseableCursor::default());

        (
            TestIO {
                read: client.clone(),
                write: server.clone(),
            },
            TestIO {
                read: server,
                write: client,
            },
        )
    }

    pub fn all_read(&self) -> bool {
        self.write.current()
    }

    pub fn close(&mut self) {
        CloseableCursor::close(&self.write);
    }
}

impl AsyncRead for &CloseableCursor {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        let len = self.len();
        let cursor = self.cursor();
        if cursor < len {
            let data = &*self.data.read().unwrap();
            let bytes_to_copy = buf.len().min(len - cursor);
            buf[..bytes_to_copy].copy_from_slice(&data[cursor..cursor + bytes_to_copy]);
            *self.cursor.write().unwrap() += bytes_to_copy;
            Poll::Ready(Ok(bytes_to_copy))
        } else if *self.closed.read().unwrap() {
            Poll::Ready(Ok(0))
        } else {
            *self.waker.write().unwrap() = Some(cx.waker().clone());
            Poll::Pending
        }
    }
}

impl AsyncWrite for &CloseableCursor {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if *self.closed.read().unwrap() {
            Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()))
        } else {
            self.data.write().unwrap().extend_from_slice(buf);
            if let Some(waker) = self.waker.write().unwrap().take() {
                waker.wake();
            }
            Poll::Ready(Ok(buf.len()))
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        CloseableCursor::close(*self);
        Poll::Ready(Ok(()))
    }
}

impl AsyncRead for TestIO {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut &*self.read).poll_read(cx, buf)
    }
}

impl AsyncWrite for TestIO {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut &*self.write).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut &*self.write).poll_flush(cx)
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut &*self.write).poll_close(cx)
    }
}
