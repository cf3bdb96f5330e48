use std::future::Future;

use futures_lite::future::Boxed;

use crate::{Request, Response, Result};

/// Turns a request into a response.
///
/// Implemented for every `Fn(Request) -> impl Future<Output = Result<Response>>`,
/// so plain async closures can be passed wherever a handler is expected.
/// An `Err` is answered with a 500 as long as nothing was written yet.
pub trait Handler: Send + Sync + 'static {
    /// Handle one exchange.
    fn call(&self, req: Request) -> Boxed<Result<Response>>;
}

impl<F, Fut> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    fn call(&self, req: Request) -> Boxed<Result<Response>> {
        Box::pin(self(req))
    }
}
