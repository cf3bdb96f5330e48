//! Line-oriented reading of message heads.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_lite::io::AsyncBufRead;
use futures_lite::ready;

use crate::error::HeadLimit;
use crate::{Error, Result};

const LF: u8 = b'\n';

/// How a call to [`poll_line`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Line {
    /// `line` holds a full line, terminator included.
    Complete,
    /// The stream ended before any byte of the line.
    Eof,
    /// The line content grew past the limit.
    TooLong,
}

/// Append bytes to `line` up to and including the next LF.
///
/// Resumable: bytes gathered before a `Pending` stay in `line`. `limit`
/// bounds the line content, the CRLF terminator excluded.
pub(crate) fn poll_line<R>(
    reader: &mut R,
    cx: &mut Context<'_>,
    line: &mut Vec<u8>,
    limit: usize,
) -> Poll<Result<Line>>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let buf = ready!(Pin::new(&mut *reader).poll_fill_buf(cx))?;
        if buf.is_empty() {
            return Poll::Ready(if line.is_empty() {
                Ok(Line::Eof)
            } else {
                Err(Error::unexpected_eof())
            });
        }

        match buf.iter().position(|b| *b == LF) {
            Some(idx) => {
                line.extend_from_slice(&buf[..=idx]);
                Pin::new(&mut *reader).consume(idx + 1);
                let status = if content_len(line) > limit {
                    Line::TooLong
                } else {
                    Line::Complete
                };
                return Poll::Ready(Ok(status));
            }
            None => {
                let n = buf.len();
                line.extend_from_slice(buf);
                Pin::new(&mut *reader).consume(n);
                // a trailing CR may still belong to the terminator
                if line.len() > limit + 1 {
                    return Poll::Ready(Ok(Line::TooLong));
                }
            }
        }
    }
}

fn content_len(line: &[u8]) -> usize {
    let mut len = line.len();
    if line.ends_with(b"\n") {
        len -= 1;
    }
    if line[..len].ends_with(b"\r") {
        len -= 1;
    }
    len
}

/// Size limits applied while reading a head.
#[derive(Debug, Clone, Copy)]
pub(crate) struct HeadLimits {
    /// Bytes allowed on the request or status line, CRLF excluded.
    pub(crate) initial_line: usize,
    /// Bytes allowed for all header lines together, CRLFs included.
    pub(crate) headers: usize,
}

/// Gathers one message head, up to and including the empty line.
#[derive(Debug)]
pub(crate) struct HeadReader {
    limits: HeadLimits,
    head: Vec<u8>,
    line: Vec<u8>,
    header_bytes: usize,
    started: bool,
}

impl HeadReader {
    pub(crate) fn new(limits: HeadLimits) -> Self {
        Self {
            limits,
            head: Vec::new(),
            line: Vec::new(),
            header_bytes: 0,
            started: false,
        }
    }

    /// Returns `Ok(None)` when the stream ends cleanly before a new head.
    pub(crate) fn poll_head<R>(
        &mut self,
        reader: &mut R,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<Vec<u8>>>>
    where
        R: AsyncBufRead + Unpin,
    {
        loop {
            let limit = if self.started {
                self.limits.headers.saturating_sub(self.header_bytes)
            } else {
                self.limits.initial_line
            };

            match ready!(poll_line(reader, cx, &mut self.line, limit))? {
                Line::Eof if !self.started => return Poll::Ready(Ok(None)),
                Line::Eof => return Poll::Ready(Err(Error::unexpected_eof())),
                Line::TooLong if !self.started => {
                    return Poll::Ready(Err(Error::TooLarge(HeadLimit::InitialLine)))
                }
                Line::TooLong => return Poll::Ready(Err(Error::TooLarge(HeadLimit::Headers))),
                Line::Complete => {}
            }

            let blank = content_len(&self.line) == 0;
            if !self.started {
                // stray CRLFs between pipelined messages
                if blank {
                    self.line.clear();
                    continue;
                }
                self.started = true;
            } else if !blank {
                self.header_bytes += self.line.len();
                if self.header_bytes > self.limits.headers {
                    return Poll::Ready(Err(Error::TooLarge(HeadLimit::Headers)));
                }
            }

            self.head.append(&mut self.line);
            if blank {
                return Poll::Ready(Ok(Some(std::mem::take(&mut self.head))));
            }
        }
    }
}
