//! Decode a request head and arm its body on the server.

use std::str::FromStr;

use futures_lite::io::AsyncRead;
use http_types::headers::{CONTENT_LENGTH, EXPECT, TRANSFER_ENCODING};
use http_types::{Method, Version};

use crate::inbound::{self, BodyFraming, SharedInbound};
use crate::{Error, Headers, Request, Result, ServerConfig, MAX_HEADERS};

/// The number returned from httparse when the request is HTTP 1.1
const HTTP_1_1_VERSION: u8 = 1;

const CONTINUE_HEADER_VALUE: &str = "100-continue";

/// A decoded request plus what the connection loop needs to know about it.
#[derive(Debug)]
pub(crate) struct Decoded {
    pub(crate) request: Request,
    /// The client waits for `100 Continue` before sending its body.
    pub(crate) expects_continue: bool,
}

/// Decode an HTTP request on the server.
///
/// Returns `Ok(None)` when the client closed the connection between
/// requests.
pub(crate) async fn decode<R>(
    shared: &SharedInbound<R>,
    config: &ServerConfig,
) -> Result<Option<Decoded>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let head = match inbound::read_head(shared, config.head_limits()).await? {
        Some(head) => head,
        None => return Ok(None),
    };

    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut httparse_req = httparse::Request::new(&mut headers);
    let status = httparse_req.parse(&head)?;
    if status.is_partial() {
        return Err(Error::protocol("malformed HTTP head"));
    }

    let method = httparse_req
        .method
        .ok_or_else(|| Error::protocol("no method found"))?;
    let method = Method::from_str(method)
        .map_err(|_| Error::protocol(format!("unsupported method {}", method)))?;
    let uri = httparse_req
        .path
        .ok_or_else(|| Error::protocol("no request target found"))?;
    let version = match httparse_req.version {
        Some(HTTP_1_1_VERSION) => Version::Http1_1,
        Some(0) => Version::Http1_0,
        _ => return Err(Error::protocol("unsupported HTTP version")),
    };

    let mut req = Request::new(method, uri);
    req.set_version(version);
    for header in httparse_req.headers.iter() {
        req.headers_mut()
            .append(header.name, std::str::from_utf8(header.value)?);
    }

    let framing = body_framing(req.headers())?;
    let expects_continue = framing != BodyFraming::Empty
        && version == Version::Http1_1
        && req
            .header(EXPECT)
            .map_or(false, |v| v.eq_ignore_ascii_case(CONTINUE_HEADER_VALUE));

    let body = inbound::body(shared, framing);
    req.set_body(body);

    Ok(Some(Decoded {
        request: req,
        expects_continue,
    }))
}

/// How the request body is delimited.
fn body_framing(headers: &Headers) -> Result<BodyFraming> {
    let content_length = headers.get(CONTENT_LENGTH);
    let transfer_encoding = headers.last(TRANSFER_ENCODING);

    if content_length.is_some() && transfer_encoding.is_some() {
        return Err(Error::protocol(
            "both content-length and transfer-encoding are present",
        ));
    }

    if let Some(encoding) = transfer_encoding {
        let last = encoding.rsplit(',').next().unwrap_or("").trim();
        if last.eq_ignore_ascii_case("chunked") {
            return Ok(BodyFraming::Chunked);
        }
        return Err(Error::protocol(format!(
            "unsupported transfer-encoding {}",
            encoding
        )));
    }

    let values = headers.get_all(CONTENT_LENGTH);
    match values.split_first() {
        None => Ok(BodyFraming::Empty),
        Some((first, rest)) => {
            if rest.iter().any(|v| v.trim() != first.trim()) {
                return Err(Error::protocol("conflicting content-length values"));
            }
            let len = first
                .trim()
                .parse::<u64>()
                .map_err(|_| Error::protocol("invalid content-length"))?;
            Ok(BodyFraming::Fixed(len))
        }
    }
}
