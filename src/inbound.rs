//! The read half of a connection, shared between the exchange loop and the
//! body handed to user code.
//!
//! One buffered reader lives for the whole connection, so bytes that arrive
//! early (a pipelined request, the next response) are never lost between
//! exchanges. Each armed body gets a sequence number; a body handle whose
//! number no longer matches reads as ended.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_lite::io::{AsyncBufRead, AsyncRead, BufReader};
use futures_lite::stream::Stream;
use futures_lite::{future, ready};

use crate::chunked::ChunkedDecoder;
use crate::head::{HeadLimits, HeadReader};
use crate::{Body, Error, Result};

/// How the body following a head is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BodyFraming {
    Empty,
    Fixed(u64),
    Chunked,
    /// Ends when the peer closes the connection.
    UntilEof,
}

#[derive(Debug)]
enum State {
    Fixed { remaining: u64 },
    Chunked(ChunkedDecoder),
    UntilEof,
    Done,
}

pub(crate) type SharedInbound<R> = async_dup::Arc<async_dup::Mutex<Inbound<R>>>;

#[derive(Debug)]
pub(crate) struct Inbound<R> {
    reader: BufReader<R>,
    state: State,
    seq: u64,
    broken: bool,
}

impl<R: AsyncRead + Unpin> Inbound<R> {
    pub(crate) fn shared(io: R) -> SharedInbound<R> {
        async_dup::Arc::new(async_dup::Mutex::new(Inbound {
            reader: BufReader::new(io),
            state: State::Done,
            seq: 0,
            broken: false,
        }))
    }

    /// Start reading a new body. Handles to earlier bodies go stale.
    pub(crate) fn arm(&mut self, framing: BodyFraming) -> u64 {
        self.seq += 1;
        self.state = match framing {
            BodyFraming::Empty | BodyFraming::Fixed(0) => State::Done,
            BodyFraming::Fixed(remaining) => State::Fixed { remaining },
            BodyFraming::Chunked => State::Chunked(ChunkedDecoder::new()),
            BodyFraming::UntilEof => State::UntilEof,
        };
        self.seq
    }

    /// Whether the current body was read to its end without error.
    pub(crate) fn is_done(&self) -> bool {
        matches!(self.state, State::Done) && !self.broken
    }

    /// Whether the connection carries no unread bytes past a finished body.
    pub(crate) fn is_idle(&self) -> bool {
        self.is_done() && self.reader.buffer().is_empty()
    }

    pub(crate) fn poll_head(
        &mut self,
        head: &mut HeadReader,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<Vec<u8>>>> {
        let res = ready!(head.poll_head(&mut self.reader, cx));
        if res.is_err() {
            self.broken = true;
        }
        Poll::Ready(res)
    }

    pub(crate) fn poll_chunk(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<Bytes>>> {
        let res = ready!(self.poll_chunk_inner(cx));
        match &res {
            Some(Ok(_)) => {}
            Some(Err(_)) => {
                self.broken = true;
                self.state = State::Done;
            }
            None => self.state = State::Done,
        }
        Poll::Ready(res)
    }

    fn poll_chunk_inner(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<Bytes>>> {
        match &mut self.state {
            State::Done => Poll::Ready(None),
            State::Chunked(decoder) => decoder.poll_chunk(&mut self.reader, cx),
            State::Fixed { remaining } => {
                let buf = ready!(Pin::new(&mut self.reader).poll_fill_buf(cx))?;
                if buf.is_empty() {
                    return Poll::Ready(Some(Err(Error::unexpected_eof())));
                }
                let n = (buf.len() as u64).min(*remaining) as usize;
                let chunk = Bytes::copy_from_slice(&buf[..n]);
                Pin::new(&mut self.reader).consume(n);
                *remaining -= n as u64;
                if *remaining == 0 {
                    self.state = State::Done;
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            State::UntilEof => {
                let buf = ready!(Pin::new(&mut self.reader).poll_fill_buf(cx))?;
                if buf.is_empty() {
                    return Poll::Ready(None);
                }
                let chunk = Bytes::copy_from_slice(buf);
                let n = chunk.len();
                Pin::new(&mut self.reader).consume(n);
                Poll::Ready(Some(Ok(chunk)))
            }
        }
    }

    /// Discard whatever is left of the current body.
    pub(crate) fn poll_drain(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        if self.broken {
            return Poll::Ready(Err(Error::IllegalState("connection broken by a body error")));
        }
        loop {
            match ready!(self.poll_chunk(cx)) {
                Some(Ok(_)) => continue,
                Some(Err(err)) => return Poll::Ready(Err(err)),
                None => return Poll::Ready(Ok(())),
            }
        }
    }
}

/// Read the next head from a shared inbound half.
pub(crate) async fn read_head<R>(
    shared: &SharedInbound<R>,
    limits: HeadLimits,
) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut head = HeadReader::new(limits);
    future::poll_fn(|cx| shared.lock().poll_head(&mut head, cx)).await
}

/// Read and discard the rest of the current body.
pub(crate) async fn drain<R>(shared: &SharedInbound<R>) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    future::poll_fn(|cx| shared.lock().poll_drain(cx)).await
}

/// Arm a body on `shared` and return it as a [`Body`] handle.
pub(crate) fn body<R>(shared: &SharedInbound<R>, framing: BodyFraming) -> Body
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let seq = shared.lock().arm(framing);
    let len = match framing {
        BodyFraming::Empty => return Body::from_bytes(Bytes::new()),
        BodyFraming::Fixed(n) => Some(n),
        BodyFraming::Chunked | BodyFraming::UntilEof => None,
    };
    let incoming = Incoming {
        shared: shared.clone(),
        seq,
    };
    Body::from_boxed(Box::pin(incoming), len)
}

/// A body being read off a connection.
#[derive(Debug)]
pub(crate) struct Incoming<R> {
    shared: SharedInbound<R>,
    seq: u64,
}

impl<R: AsyncRead + Unpin> Stream for Incoming<R> {
    type Item = Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut inbound = self.shared.lock();
        if inbound.seq != self.seq {
            return Poll::Ready(None);
        }
        inbound.poll_chunk(cx)
    }
}
