use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_lite::io::AsyncBufRead;
use futures_lite::ready;

use super::ABORT_TRAILER;
use crate::head::{poll_line, Line};
use crate::{Error, Result};

/// Longest chunk-size or trailer line we accept.
const MAX_LINE: usize = 4 * 1024;
/// Largest trailer section we accept.
const MAX_TRAILERS: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Reading a chunk-size line.
    Size,
    /// Inside a chunk.
    Data { remaining: u64 },
    /// Expecting the CRLF that closes a chunk.
    DataEnd,
    /// After the last chunk, reading trailer fields.
    Trailers { read: usize },
    Done,
}

/// Decodes a chunked body one buffer at a time.
///
/// Each poll yields at most the bytes of a single chunk, so chunk
/// boundaries chosen by the sender are never merged.
#[derive(Debug)]
pub(crate) struct ChunkedDecoder {
    state: State,
    line: Vec<u8>,
    aborted: Option<String>,
}

impl ChunkedDecoder {
    pub(crate) fn new() -> Self {
        Self {
            state: State::Size,
            line: Vec::new(),
            aborted: None,
        }
    }

    pub(crate) fn poll_chunk<R>(
        &mut self,
        reader: &mut R,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Bytes>>>
    where
        R: AsyncBufRead + Unpin,
    {
        loop {
            match self.state {
                State::Size => {
                    ready!(self.poll_expect_line(reader, cx, "chunk size"))?;
                    let size = match httparse::parse_chunk_size(&self.line) {
                        Ok(httparse::Status::Complete((_, size))) => size,
                        _ => return Poll::Ready(Some(Err(Error::protocol("invalid chunk size")))),
                    };
                    self.line.clear();
                    self.state = if size == 0 {
                        State::Trailers { read: 0 }
                    } else {
                        State::Data { remaining: size }
                    };
                }
                State::Data { remaining } => {
                    let buf = ready!(Pin::new(&mut *reader).poll_fill_buf(cx))?;
                    if buf.is_empty() {
                        return Poll::Ready(Some(Err(Error::unexpected_eof())));
                    }
                    let n = (buf.len() as u64).min(remaining) as usize;
                    let chunk = Bytes::copy_from_slice(&buf[..n]);
                    Pin::new(&mut *reader).consume(n);
                    let remaining = remaining - n as u64;
                    self.state = if remaining == 0 {
                        State::DataEnd
                    } else {
                        State::Data { remaining }
                    };
                    return Poll::Ready(Some(Ok(chunk)));
                }
                State::DataEnd => {
                    ready!(self.poll_expect_line(reader, cx, "chunk terminator"))?;
                    if !is_blank(&self.line) {
                        return Poll::Ready(Some(Err(Error::protocol("missing CRLF after chunk"))));
                    }
                    self.line.clear();
                    self.state = State::Size;
                }
                State::Trailers { read } => {
                    ready!(self.poll_expect_line(reader, cx, "trailer"))?;
                    let read = read + self.line.len();
                    if read > MAX_TRAILERS {
                        return Poll::Ready(Some(Err(Error::protocol("trailer section too large"))));
                    }
                    if is_blank(&self.line) {
                        self.line.clear();
                        self.state = State::Done;
                        if let Some(reason) = self.aborted.take() {
                            return Poll::Ready(Some(Err(Error::Disconnect(format!(
                                "peer aborted the body: {}",
                                reason
                            )))));
                        }
                    } else {
                        self.record_trailer()?;
                        self.line.clear();
                        self.state = State::Trailers { read };
                    }
                }
                State::Done => return Poll::Ready(None),
            }
        }
    }

    fn poll_expect_line<R>(
        &mut self,
        reader: &mut R,
        cx: &mut Context<'_>,
        what: &str,
    ) -> Poll<Result<()>>
    where
        R: AsyncBufRead + Unpin,
    {
        Poll::Ready(match ready!(poll_line(reader, cx, &mut self.line, MAX_LINE))? {
            Line::Complete => Ok(()),
            Line::Eof => Err(Error::unexpected_eof()),
            Line::TooLong => Err(Error::protocol(format!("{} line too long", what))),
        })
    }

    fn record_trailer(&mut self) -> Result<()> {
        let line = std::str::from_utf8(&self.line)?;
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| Error::protocol("malformed trailer field"))?;
        if name.trim().eq_ignore_ascii_case(ABORT_TRAILER) {
            self.aborted = Some(value.trim().to_string());
        }
        Ok(())
    }
}

fn is_blank(line: &[u8]) -> bool {
    line == b"\r\n" || line == b"\n"
}
