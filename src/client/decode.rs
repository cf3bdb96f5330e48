use std::convert::TryFrom;

use futures_lite::io::AsyncRead;
use http_types::headers::{CONNECTION, CONTENT_LENGTH, TRANSFER_ENCODING};
use http_types::{Method, StatusCode, Version};
use log::trace;

use crate::inbound::{self, BodyFraming, SharedInbound};
use crate::{Body, ClientConfig, Error, Headers, Result, MAX_HEADERS};

/// A decoded response head with its body armed on the connection.
#[derive(Debug)]
pub(crate) struct ResponseHead {
    pub(crate) status: StatusCode,
    pub(crate) version: Version,
    pub(crate) headers: Headers,
    pub(crate) framing: BodyFraming,
    pub(crate) body: Body,
}

impl ResponseHead {
    /// Whether the server lets the connection carry another exchange.
    pub(crate) fn keep_alive(&self) -> bool {
        if self.framing == BodyFraming::UntilEof {
            return false;
        }
        match self.version {
            Version::Http1_0 => self.headers.has_token(CONNECTION, "keep-alive"),
            _ => !self.headers.has_token(CONNECTION, "close"),
        }
    }
}

/// Decode the response to a `method` request.
///
/// Interim 1xx responses are skipped, except `101 Switching Protocols`.
pub(crate) async fn decode<R>(
    shared: &SharedInbound<R>,
    method: Method,
    config: &ClientConfig,
) -> Result<ResponseHead>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    loop {
        let head = inbound::read_head(shared, config.head_limits())
            .await?
            .ok_or_else(|| Error::Disconnect("connection closed before a response arrived".into()))?;

        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut httparse_res = httparse::Response::new(&mut headers);
        let status = httparse_res.parse(&head)?;
        if status.is_partial() {
            return Err(Error::protocol("malformed HTTP head"));
        }

        let code = httparse_res
            .code
            .ok_or_else(|| Error::protocol("no status code found"))?;
        if (100..200).contains(&code) && code != 101 {
            trace!("skipping interim {} response", code);
            continue;
        }
        let status = StatusCode::try_from(code)
            .map_err(|_| Error::protocol(format!("unknown status code {}", code)))?;
        let version = match httparse_res.version {
            Some(1) => Version::Http1_1,
            Some(0) => Version::Http1_0,
            _ => return Err(Error::protocol("unsupported HTTP version")),
        };

        let mut fields = Headers::new();
        for header in httparse_res.headers.iter() {
            fields.append(header.name, std::str::from_utf8(header.value)?);
        }

        let framing = body_framing(method, status, &fields)?;
        let body = inbound::body(shared, framing);
        return Ok(ResponseHead {
            status,
            version,
            headers: fields,
            framing,
            body,
        });
    }
}

fn body_framing(method: Method, status: StatusCode, headers: &Headers) -> Result<BodyFraming> {
    if method == Method::Head
        || status.is_informational()
        || status == StatusCode::NoContent
        || status == StatusCode::NotModified
    {
        return Ok(BodyFraming::Empty);
    }

    if let Some(encoding) = headers.last(TRANSFER_ENCODING) {
        let last = encoding.rsplit(',').next().unwrap_or("").trim();
        if last.eq_ignore_ascii_case("chunked") {
            return Ok(BodyFraming::Chunked);
        }
        return Ok(BodyFraming::UntilEof);
    }

    match headers.get(CONTENT_LENGTH) {
        Some(len) => {
            let len = len
                .trim()
                .parse::<u64>()
                .map_err(|_| Error::protocol("invalid content-length"))?;
            Ok(BodyFraming::Fixed(len))
        }
        None => Ok(BodyFraming::UntilEof),
    }
}
