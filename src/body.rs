//! Lazy, single-use message bodies.
//!
//! A [`Body`] describes how to produce a sequence of buffers. Nothing is
//! produced until the body is [subscribed](Body::subscribe), which consumes
//! it, so a body can be read at most once. The resulting [`BodyStream`] is
//! pull-based: the producer only runs when the consumer polls for the next
//! buffer.

use std::fmt;
use std::pin::Pin;
use std::task::{self, Poll};

use bytes::{Bytes, BytesMut};
use futures_lite::stream::{self, Stream, StreamExt};

use crate::context::Context;
use crate::{Error, Result};

type Deferred = Box<dyn FnOnce(&Context) -> Body + Send + 'static>;
type Scope = Box<dyn FnOnce(Context) -> Context + Send + 'static>;

enum Kind {
    /// No producer at all.
    Empty,
    Full(Bytes),
    Stream(stream::Boxed<Result<Bytes>>),
    Deferred(Deferred),
    Scoped { inner: Box<Body>, scope: Scope },
}

/// A streaming HTTP body.
pub struct Body {
    kind: Kind,
    len: Option<u64>,
}

impl Body {
    /// A body without any producer. Its length is unknown.
    pub fn empty() -> Self {
        Self {
            kind: Kind::Empty,
            len: None,
        }
    }

    /// A body holding one buffer of known length.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        Self {
            len: Some(bytes.len() as u64),
            kind: Kind::Full(bytes),
        }
    }

    /// A body produced by a stream of buffers. Its length is unknown.
    pub fn from_stream<S, B, E>(stream: S) -> Self
    where
        S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
        B: Into<Bytes>,
        E: Into<Error>,
    {
        let stream = stream.map(|item| item.map(Into::into).map_err(Into::into));
        Self {
            kind: Kind::Stream(stream.boxed()),
            len: None,
        }
    }

    pub(crate) fn from_boxed(stream: stream::Boxed<Result<Bytes>>, len: Option<u64>) -> Self {
        Self {
            kind: Kind::Stream(stream),
            len,
        }
    }

    /// A body fed through a bounded channel.
    ///
    /// The sender waits whenever `capacity` buffers are queued and not yet
    /// pulled by the consumer. Dropping the sender ends the body.
    pub fn channel(capacity: usize) -> (BodySender, Body) {
        let (tx, rx) = async_channel::bounded(capacity.max(1));
        (BodySender { tx }, Body::from_boxed(rx.boxed(), None))
    }

    /// A body whose producer is built when the body is subscribed, from the
    /// context the subscriber supplies.
    pub fn deferred<F>(f: F) -> Self
    where
        F: FnOnce(&Context) -> Body + Send + 'static,
    {
        Self {
            kind: Kind::Deferred(Box::new(f)),
            len: None,
        }
    }

    /// Rewrite the context that stages above this one will see.
    ///
    /// When the returned body is subscribed with context `c`, the wrapped
    /// body is subscribed with `scope(c)`.
    pub fn with_context<F>(self, scope: F) -> Self
    where
        F: FnOnce(Context) -> Context + Send + 'static,
    {
        let len = self.len;
        Self {
            kind: Kind::Scoped {
                inner: Box::new(self),
                scope: Box::new(scope),
            },
            len,
        }
    }

    /// The body length, if known before the body is produced.
    pub fn len(&self) -> Option<u64> {
        self.len
    }

    /// Whether this body has a producer at all.
    ///
    /// `Body::empty()` has none; `Body::from("")` has one that yields nothing.
    pub fn has_producer(&self) -> bool {
        !matches!(self.kind, Kind::Empty)
    }

    /// Start producing, consuming the body.
    pub fn subscribe(self, cx: &Context) -> BodyStream {
        let inner = match self.kind {
            Kind::Empty => Inner::Done,
            Kind::Full(bytes) => Inner::Full(bytes),
            Kind::Stream(stream) => Inner::Stream(stream),
            Kind::Deferred(f) => return f(cx).subscribe(cx),
            Kind::Scoped { inner, scope } => {
                let cx = scope(cx.clone());
                return inner.subscribe(&cx);
            }
        };
        BodyStream { inner }
    }

    /// Collect the whole body with an empty context.
    pub async fn into_bytes(self) -> Result<Bytes> {
        self.subscribe(&Context::new()).collect_bytes().await
    }

    /// Collect the whole body as UTF-8 text with an empty context.
    pub async fn into_string(self) -> Result<String> {
        let bytes = self.into_bytes().await?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| Error::protocol("body is not valid utf-8"))
    }
}

impl Default for Body {
    fn default() -> Self {
        Body::empty()
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            Kind::Empty => "Empty",
            Kind::Full(_) => "Full",
            Kind::Stream(_) => "Stream",
            Kind::Deferred(_) => "Deferred",
            Kind::Scoped { .. } => "Scoped",
        };
        f.debug_struct("Body")
            .field("kind", &kind)
            .field("len", &self.len)
            .finish()
    }
}

impl From<&'static str> for Body {
    fn from(s: &'static str) -> Self {
        Body::from_bytes(Bytes::from_static(s.as_bytes()))
    }
}

impl From<&'static [u8]> for Body {
    fn from(s: &'static [u8]) -> Self {
        Body::from_bytes(Bytes::from_static(s))
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Body::from_bytes(s)
    }
}

impl From<Vec<u8>> for Body {
    fn from(v: Vec<u8>) -> Self {
        Body::from_bytes(v)
    }
}

impl From<Bytes> for Body {
    fn from(b: Bytes) -> Self {
        Body::from_bytes(b)
    }
}

enum Inner {
    Done,
    Full(Bytes),
    Stream(stream::Boxed<Result<Bytes>>),
}

/// A subscribed body: a stream of buffers ending with `None`.
///
/// Dropping it before the end cancels the producer.
pub struct BodyStream {
    inner: Inner,
}

impl BodyStream {
    pub(crate) fn done() -> Self {
        Self { inner: Inner::Done }
    }

    /// Wait for the first buffer of a streamed body, so a producer that
    /// fails at once is seen before anything goes on the wire.
    pub(crate) async fn primed(mut self) -> Result<BodyStream> {
        if !matches!(self.inner, Inner::Stream(_)) {
            return Ok(self);
        }
        match self.next().await {
            None => Ok(Self::done()),
            Some(Err(err)) => Err(err),
            Some(Ok(first)) => {
                let rest = stream::once(Ok(first)).chain(self);
                Ok(Self {
                    inner: Inner::Stream(rest.boxed()),
                })
            }
        }
    }

    /// Drain every remaining buffer into one.
    pub async fn collect_bytes(mut self) -> Result<Bytes> {
        let mut out = BytesMut::new();
        while let Some(chunk) = self.next().await {
            out.extend_from_slice(&chunk?);
        }
        Ok(out.freeze())
    }
}

impl Stream for BodyStream {
    type Item = Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut task::Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        match &mut this.inner {
            Inner::Done => Poll::Ready(None),
            Inner::Full(bytes) => {
                let bytes = std::mem::take(bytes);
                this.inner = Inner::Done;
                if bytes.is_empty() {
                    Poll::Ready(None)
                } else {
                    Poll::Ready(Some(Ok(bytes)))
                }
            }
            Inner::Stream(stream) => match stream.as_mut().poll_next(cx) {
                Poll::Ready(None) => {
                    this.inner = Inner::Done;
                    Poll::Ready(None)
                }
                other => other,
            },
        }
    }
}

impl fmt::Debug for BodyStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.inner {
            Inner::Done => "Done",
            Inner::Full(_) => "Full",
            Inner::Stream(_) => "Stream",
        };
        f.debug_struct("BodyStream").field("state", &state).finish()
    }
}

/// The producing half of [`Body::channel`].
#[derive(Debug, Clone)]
pub struct BodySender {
    tx: async_channel::Sender<Result<Bytes>>,
}

impl BodySender {
    /// Queue one buffer, waiting while the channel is full.
    ///
    /// Fails with a disconnect error once the consumer went away.
    pub async fn send(&self, chunk: impl Into<Bytes>) -> Result<()> {
        self.tx
            .send(Ok(chunk.into()))
            .await
            .map_err(|_| Error::Disconnect("body consumer dropped".into()))
    }

    /// Fail the body. The consumer sees `err` after the buffers already sent.
    pub async fn abort(self, err: Error) {
        let _ = self.tx.send(Err(err)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_lite::future::block_on;

    #[test]
    fn full_body_has_known_length() {
        let body = Body::from("hello");
        assert_eq!(body.len(), Some(5));
        assert!(body.has_producer());
        assert_eq!(block_on(body.into_string()).unwrap(), "hello");
    }

    #[test]
    fn empty_body_has_no_producer() {
        let body = Body::empty();
        assert_eq!(body.len(), None);
        assert!(!body.has_producer());
        assert!(block_on(body.into_bytes()).unwrap().is_empty());
    }

    #[test]
    fn stream_body_is_lazy() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = pulled.clone();
        let chunks = stream::iter(0..3).map(move |n| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Error>(n.to_string())
        });
        let body = Body::from_stream(chunks);
        assert_eq!(pulled.load(Ordering::SeqCst), 0);

        let mut stream = body.subscribe(&Context::new());
        block_on(async {
            assert_eq!(stream.next().await.unwrap().unwrap(), "0");
        });
        assert_eq!(pulled.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stream_errors_surface_after_buffers() {
        let chunks = stream::iter(vec![Ok("a"), Err(Error::handler("nope"))]);
        let mut stream = Body::from_stream(chunks).subscribe(&Context::new());
        block_on(async {
            assert_eq!(stream.next().await.unwrap().unwrap(), "a");
            let err = stream.next().await.unwrap().unwrap_err();
            assert_eq!(err.kind(), crate::ErrorKind::Handler);
        });
    }

    #[test]
    fn primed_body_keeps_its_first_buffer() {
        block_on(async {
            let body = Body::from_stream(stream::iter(vec![Ok::<_, Error>("a"), Ok("b")]));
            let primed = body.subscribe(&Context::new()).primed().await.unwrap();
            assert_eq!(primed.collect_bytes().await.unwrap(), "ab");
        });
    }

    #[test]
    fn primed_body_surfaces_an_immediate_failure() {
        block_on(async {
            let body = Body::from_stream(stream::iter(vec![Err::<&str, _>(Error::handler("no"))]));
            let err = body.subscribe(&Context::new()).primed().await.unwrap_err();
            assert_eq!(err.kind(), crate::ErrorKind::Handler);
        });
    }

    #[test]
    fn deferred_sees_scoped_context() {
        let body = Body::deferred(|cx| {
            let greeting = cx.get::<&str>("greeting").copied().unwrap_or("none");
            Body::from(greeting)
        })
        .with_context(|cx| cx.put("greeting", "hi"));

        let out = block_on(body.subscribe(&Context::new()).collect_bytes()).unwrap();
        assert_eq!(out, "hi");
    }

    #[test]
    fn outer_scope_reaches_inner_producer() {
        let body = Body::deferred(|cx| {
            let a = cx.get::<u8>("a").copied().unwrap_or(0);
            let b = cx.get::<u8>("b").copied().unwrap_or(0);
            Body::from(format!("{}{}", a, b))
        })
        .with_context(|cx| cx.put("b", 2u8))
        .with_context(|cx| cx.put("a", 1u8).put("b", 9u8));

        let out = block_on(body.subscribe(&Context::new()).collect_bytes()).unwrap();
        // the stage closest to the producer ran last, so its write wins
        assert_eq!(out, "12");
    }

    #[test]
    fn channel_applies_backpressure() {
        block_on(async {
            let (tx, body) = Body::channel(1);
            tx.send("one").await.unwrap();
            assert!(futures_lite::future::poll_once(tx.send("two")).await.is_none());

            let mut stream = body.subscribe(&Context::new());
            assert_eq!(stream.next().await.unwrap().unwrap(), "one");
            drop(tx);
            assert!(stream.next().await.is_none());
        });
    }
}
