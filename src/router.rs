//! First-match request dispatch.

use std::fmt;

use bytes::Bytes;
use futures_lite::future::{self, Boxed};
use http_types::{Method, StatusCode};
use log::trace;

use crate::{Handler, Request, Response, Result};

type Predicate = Box<dyn Fn(&Request) -> bool + Send + Sync + 'static>;

/// Routes requests to the first handler whose predicate matches.
///
/// ```
/// use h1_transport::{Response, Router};
/// use http_types::StatusCode;
///
/// let router = Router::new()
///     .get("/hello", |_req| async { Ok(Response::new(StatusCode::Ok).with_body("hi")) })
///     .route(|req| req.path().starts_with("/static/"), |_req| async {
///         Ok(Response::new(StatusCode::Forbidden))
///     });
/// # drop(router);
/// ```
#[derive(Default)]
pub struct Router {
    routes: Vec<(Predicate, Box<dyn Handler>)>,
}

impl Router {
    /// Create a router without routes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for every request `predicate` accepts.
    ///
    /// Routes are tried in registration order.
    pub fn route<P, H>(mut self, predicate: P, handler: H) -> Self
    where
        P: Fn(&Request) -> bool + Send + Sync + 'static,
        H: Handler,
    {
        self.routes.push((Box::new(predicate), Box::new(handler)));
        self
    }

    /// Register `handler` for GET and HEAD requests on `path`.
    pub fn get<H: Handler>(self, path: impl Into<String>, handler: H) -> Self {
        let path = path.into();
        self.route(
            move |req| matches!(req.method(), Method::Get | Method::Head) && req.path() == path,
            handler,
        )
    }

    /// Register `handler` for POST requests on `path`.
    pub fn post<H: Handler>(self, path: impl Into<String>, handler: H) -> Self {
        self.method(Method::Post, path.into(), handler)
    }

    /// Register `handler` for PUT requests on `path`.
    pub fn put<H: Handler>(self, path: impl Into<String>, handler: H) -> Self {
        self.method(Method::Put, path.into(), handler)
    }

    /// Register `handler` for DELETE requests on `path`.
    pub fn delete<H: Handler>(self, path: impl Into<String>, handler: H) -> Self {
        self.method(Method::Delete, path.into(), handler)
    }

    fn method<H: Handler>(self, method: Method, path: String, handler: H) -> Self {
        self.route(
            move |req| req.method() == method && req.path() == path,
            handler,
        )
    }

    /// The handler of the first route matching `req`.
    pub fn dispatch(&self, req: &Request) -> Option<&dyn Handler> {
        self.routes
            .iter()
            .find(|(predicate, _)| predicate(req))
            .map(|(_, handler)| handler.as_ref())
    }
}

impl Handler for Router {
    fn call(&self, req: Request) -> Boxed<Result<Response>> {
        match self.dispatch(&req) {
            Some(handler) => handler.call(req),
            None => {
                trace!("no route for {} {}", req.method(), req.uri());
                let res = Response::new(StatusCode::NotFound).with_body(Bytes::new());
                Box::pin(future::ready(Ok(res)))
            }
        }
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes.len())
            .finish()
    }
}
