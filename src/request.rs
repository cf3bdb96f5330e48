use http_types::headers::{HeaderName, CONNECTION};
use http_types::{Method, Version};

use crate::{Body, Context, Headers, Result};

/// An HTTP request, either decoded by the server or about to be sent by the
/// client.
#[derive(Debug)]
pub struct Request {
    method: Method,
    uri: String,
    version: Version,
    headers: Headers,
    body: Body,
    context: Context,
}

impl Request {
    /// Create an HTTP/1.1 request without headers or body.
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            version: Version::Http1_1,
            headers: Headers::new(),
            body: Body::empty(),
            context: Context::new(),
        }
    }

    /// The request method.
    pub fn method(&self) -> Method {
        self.method
    }

    /// The request target as it appeared on the request line.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// The request target without its query string.
    pub fn path(&self) -> &str {
        match self.uri.find('?') {
            Some(idx) => &self.uri[..idx],
            None => &self.uri,
        }
    }

    /// The protocol version.
    pub fn version(&self) -> Version {
        self.version
    }

    pub(crate) fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    /// The request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Mutable access to the request headers.
    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// The first value of header `name`.
    pub fn header(&self, name: impl Into<HeaderName>) -> Option<&str> {
        self.headers.get(name)
    }

    /// Set header `name`, replacing earlier values.
    pub fn insert_header(&mut self, name: impl Into<HeaderName>, value: impl ToString) {
        self.headers.insert(name, value);
    }

    /// Replace the body.
    pub fn set_body(&mut self, body: impl Into<Body>) {
        self.body = body.into();
    }

    /// Take the body out, leaving an empty one behind.
    pub fn take_body(&mut self) -> Body {
        std::mem::take(&mut self.body)
    }

    /// Read the whole body as UTF-8, subscribing with this request's context.
    pub async fn body_string(&mut self) -> Result<String> {
        let bytes = self.take_body().subscribe(&self.context).collect_bytes().await?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| crate::Error::Protocol("body is not valid utf-8".into()))
    }

    /// The context attached to this exchange.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Replace the attached context.
    pub fn set_context(&mut self, context: Context) {
        self.context = context;
    }

    /// Builder-style [`set_context`](Request::set_context).
    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    /// Whether the connection may carry another exchange after this one.
    ///
    /// HTTP/1.1 defaults to keep-alive unless `connection: close` is sent;
    /// HTTP/1.0 requires an explicit `connection: keep-alive`.
    pub fn keep_alive(&self) -> bool {
        match self.version {
            Version::Http1_0 => self.headers.has_token(CONNECTION, "keep-alive"),
            _ => !self.headers.has_token(CONNECTION, "close"),
        }
    }

    /// Ask for the connection to be kept open, or closed, after this exchange.
    pub fn set_keep_alive(&mut self, keep_alive: bool) {
        if keep_alive {
            if self.headers.has_token(CONNECTION, "close") {
                self.headers.remove(CONNECTION);
            }
            if self.version == Version::Http1_0 {
                self.headers.insert(CONNECTION, "keep-alive");
            }
        } else {
            self.headers.insert(CONNECTION, "close");
        }
    }
}
