use std::error::Error;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use async_io::Timer;
use pin_project::pin_project;

/// Await `f`, giving up once `dur` has passed. `None` waits forever.
pub(crate) async fn timeout<F, T>(dur: Option<Duration>, f: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    match dur {
        Some(dur) => TimeoutFuture::new(f, dur).await,
        None => Ok(f.await),
    }
}

/// A future that times out after a duration of time.
#[pin_project]
#[derive(Debug)]
pub(crate) struct TimeoutFuture<F> {
    #[pin]
    future: F,
    #[pin]
    delay: Timer,
}

impl<F> TimeoutFuture<F> {
    pub(crate) fn new(future: F, dur: Duration) -> TimeoutFuture<F> {
        TimeoutFuture {
            future,
            delay: Timer::after(dur),
        }
    }
}

impl<F: Future> Future for TimeoutFuture<F> {
    type Output = Result<F::Output, TimeoutError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        match this.future.poll(cx) {
            Poll::Ready(v) => Poll::Ready(Ok(v)),
            Poll::Pending => match this.delay.poll(cx) {
                Poll::Ready(_) => Poll::Ready(Err(TimeoutError { _private: () })),
                Poll::Pending => Poll::Pending,
            },
        }
    }
}

/// An error returned when a future times out.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct TimeoutError {
    _private: (),
}

impl Error for TimeoutError {}

impl fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        "future has timed out".fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_lite::future::{self, block_on};

    #[test]
    fn pending_future_times_out() {
        let res = block_on(timeout(
            Some(Duration::from_millis(10)),
            future::pending::<()>(),
        ));
        assert!(res.is_err());
    }

    #[test]
    fn ready_future_wins() {
        let res = block_on(timeout(Some(Duration::from_secs(5)), future::ready(7)));
        assert_eq!(res, Ok(7));
        assert_eq!(block_on(timeout(None, future::ready(1))), Ok(1));
    }
}
