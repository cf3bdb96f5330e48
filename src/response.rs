use http_types::headers::{HeaderName, CONNECTION, CONTENT_LENGTH};
use http_types::{Method, StatusCode};

use crate::framing::{self, Decision};
use crate::{Body, Error, Headers, Result};

const COMMITTED: &str = "response head is already committed";

/// A response produced by a [`Handler`](crate::Handler).
///
/// Status and headers stay mutable until the response is committed, at
/// which point its [`Decision`] is fixed and every further change to the
/// head fails with [`ErrorKind::IllegalState`](crate::ErrorKind::IllegalState).
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Body,
    chunked: bool,
    decision: Option<Decision>,
}

impl Response {
    /// Create a response with an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Body::empty(),
            chunked: true,
            decision: None,
        }
    }

    /// Builder-style body setter for freshly created responses.
    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// The status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Change the status code.
    pub fn set_status(&mut self, status: StatusCode) -> Result<()> {
        self.ensure_open()?;
        self.status = status;
        Ok(())
    }

    /// The response headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// The first value of header `name`.
    pub fn header(&self, name: impl Into<HeaderName>) -> Option<&str> {
        self.headers.get(name)
    }

    /// Set header `name`, replacing earlier values.
    pub fn insert_header(&mut self, name: impl Into<HeaderName>, value: impl ToString) -> Result<()> {
        self.ensure_open()?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// Add a value for header `name`.
    pub fn append_header(&mut self, name: impl Into<HeaderName>, value: impl ToString) -> Result<()> {
        self.ensure_open()?;
        self.headers.append(name, value);
        Ok(())
    }

    /// Remove header `name`, returning whether it was present.
    pub fn remove_header(&mut self, name: impl Into<HeaderName>) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.headers.remove(name))
    }

    /// Declare the exact body length.
    pub fn set_content_length(&mut self, len: u64) -> Result<()> {
        self.insert_header(CONTENT_LENGTH, len)
    }

    /// Allow or forbid chunked transfer. Enabled by default.
    pub fn set_chunked_transfer(&mut self, chunked: bool) -> Result<()> {
        self.ensure_open()?;
        self.chunked = chunked;
        Ok(())
    }

    /// Whether chunked transfer is allowed.
    pub fn chunked_transfer(&self) -> bool {
        self.chunked
    }

    /// Replace the body.
    pub fn set_body(&mut self, body: impl Into<Body>) -> Result<()> {
        self.ensure_open()?;
        self.body = body.into();
        Ok(())
    }

    pub(crate) fn take_body(&mut self) -> Body {
        std::mem::take(&mut self.body)
    }

    /// Fix the framing for a reply to a `method` request.
    ///
    /// Only the first call computes the decision; later calls return it
    /// unchanged. Framing fields in the headers are rewritten to match, and
    /// `connection: close` is added when the exchange will not be kept alive.
    pub fn commit(&mut self, method: Method, keep_alive: bool) -> Result<Decision> {
        if let Some(decision) = self.decision {
            return Ok(decision);
        }
        let decision = framing::decide(
            method,
            self.status,
            &self.headers,
            self.chunked,
            self.body.len(),
        )?;
        decision.apply(&mut self.headers);
        if !keep_alive {
            self.headers.insert(CONNECTION, "close");
        }
        self.decision = Some(decision);
        Ok(decision)
    }

    /// The committed decision, if any.
    pub fn decision(&self) -> Option<Decision> {
        self.decision
    }

    /// Whether the head has been committed.
    pub fn is_committed(&self) -> bool {
        self.decision.is_some()
    }

    fn ensure_open(&self) -> Result<()> {
        match self.decision {
            Some(_) => Err(Error::IllegalState(COMMITTED)),
            None => Ok(()),
        }
    }
}

impl From<StatusCode> for Response {
    fn from(status: StatusCode) -> Self {
        Response::new(status)
    }
}
