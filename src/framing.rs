//! Choosing how a response body is delimited on the wire.

use http_types::headers::{CONNECTION, CONTENT_LENGTH, TRANSFER_ENCODING};
use http_types::{Method, StatusCode};

use crate::{Error, Headers, Result};

/// The wire strategy signalling where a response body ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// `transfer-encoding: chunked`.
    Chunked,
    /// A fixed `content-length`.
    ContentLength(u64),
    /// The body ends when the server closes the connection.
    Close,
}

/// The outcome of [`decide`]: the framing plus what may go on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    framing: Framing,
    headers: bool,
    body: bool,
    terminator: bool,
}

impl Decision {
    /// The chosen framing.
    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Whether body bytes are written at all.
    pub fn writes_body(&self) -> bool {
        self.body
    }

    /// Whether a chunked last-chunk is written.
    pub(crate) fn writes_terminator(&self) -> bool {
        self.terminator
    }

    /// Whether the connection must be closed once the response is written.
    pub fn closes(&self) -> bool {
        self.framing == Framing::Close
    }

    /// Strip stale framing fields from `headers` and write the chosen ones.
    pub fn apply(&self, headers: &mut Headers) {
        headers.remove(CONTENT_LENGTH);
        headers.remove(TRANSFER_ENCODING);
        if !self.headers {
            return;
        }
        match self.framing {
            Framing::ContentLength(n) => headers.insert(CONTENT_LENGTH, n),
            Framing::Chunked => headers.insert(TRANSFER_ENCODING, "chunked"),
            Framing::Close => headers.insert(CONNECTION, "close"),
        }
    }
}

/// Whether `status` forbids a body and any framing signal.
fn is_bodiless(status: StatusCode) -> bool {
    status.is_informational()
        || status == StatusCode::NoContent
        || status == StatusCode::NotModified
}

/// Decide the framing of a response.
///
/// Rules in priority order:
///
/// 1. 1xx, 204 and 304 responses carry no body and no framing fields.
/// 2. 205 carries `transfer-encoding: chunked` with no data chunks.
/// 3. An explicit `content-length` is honoured verbatim.
/// 4. With chunked transfer disabled, a known length becomes
///    `content-length`, an unknown one means closing the connection.
/// 5. Everything else is chunked.
///
/// A HEAD request gets the same decision a GET would, minus the body.
pub fn decide(
    method: Method,
    status: StatusCode,
    headers: &Headers,
    chunked: bool,
    body_len: Option<u64>,
) -> Result<Decision> {
    let head = method == Method::Head;

    if is_bodiless(status) {
        return Ok(Decision {
            framing: Framing::ContentLength(0),
            headers: false,
            body: false,
            terminator: false,
        });
    }

    if status == StatusCode::ResetContent {
        return Ok(Decision {
            framing: Framing::Chunked,
            headers: true,
            body: false,
            terminator: !head,
        });
    }

    let framing = if let Some(value) = headers.last(CONTENT_LENGTH) {
        let n = value
            .trim()
            .parse::<u64>()
            .map_err(|_| Error::IllegalState("content-length is not a valid length"))?;
        Framing::ContentLength(n)
    } else if !chunked {
        match body_len {
            Some(n) => Framing::ContentLength(n),
            None => Framing::Close,
        }
    } else {
        Framing::Chunked
    };

    Ok(Decision {
        framing,
        headers: true,
        body: !head,
        terminator: !head,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decide_for(method: Method, status: StatusCode, chunked: bool, len: Option<u64>) -> Decision {
        decide(method, status, &Headers::new(), chunked, len).unwrap()
    }

    fn applied(decision: Decision) -> Vec<(String, String)> {
        let mut headers = Headers::new();
        headers.insert("content-length", 99);
        headers.insert("transfer-encoding", "gzip");
        decision.apply(&mut headers);
        headers
            .iter()
            .map(|(n, v)| (n.as_str().to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn no_content_statuses_have_no_framing() {
        for status in &[StatusCode::NoContent, StatusCode::NotModified, StatusCode::Continue] {
            let d = decide_for(Method::Get, *status, true, Some(5));
            assert_eq!(d.framing(), Framing::ContentLength(0));
            assert!(!d.writes_body());
            assert!(applied(d).is_empty());
        }
    }

    #[test]
    fn reset_content_is_chunked_without_data() {
        let d = decide_for(Method::Get, StatusCode::ResetContent, true, Some(5));
        assert_eq!(d.framing(), Framing::Chunked);
        assert!(!d.writes_body());
        assert!(d.writes_terminator());
        assert_eq!(
            applied(d),
            vec![("transfer-encoding".to_string(), "chunked".to_string())]
        );
    }

    #[test]
    fn explicit_content_length_wins() {
        let mut headers = Headers::new();
        headers.insert("Content-Length", "2");
        let d = decide(Method::Get, StatusCode::Ok, &headers, true, None).unwrap();
        assert_eq!(d.framing(), Framing::ContentLength(2));

        let mut headers = Headers::new();
        headers.insert("Content-Length", "two");
        let err = decide(Method::Get, StatusCode::Ok, &headers, true, None).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::IllegalState);
    }

    #[test]
    fn chunked_disabled() {
        let known = decide_for(Method::Get, StatusCode::Ok, false, Some(3));
        assert_eq!(known.framing(), Framing::ContentLength(3));

        let unknown = decide_for(Method::Get, StatusCode::Ok, false, None);
        assert_eq!(unknown.framing(), Framing::Close);
        assert!(unknown.closes());
        assert_eq!(
            applied(unknown),
            vec![("connection".to_string(), "close".to_string())]
        );
    }

    #[test]
    fn chunked_even_with_known_length() {
        let d = decide_for(Method::Get, StatusCode::Ok, true, Some(3));
        assert_eq!(d.framing(), Framing::Chunked);
    }

    #[test]
    fn head_mirrors_get() {
        for &(chunked, len) in &[(true, None), (true, Some(3)), (false, None), (false, Some(3))] {
            let get = decide_for(Method::Get, StatusCode::Ok, chunked, len);
            let head = decide_for(Method::Head, StatusCode::Ok, chunked, len);
            assert_eq!(get.framing(), head.framing());
            assert_eq!(applied(get), applied(head));
            assert!(get.writes_body());
            assert!(!head.writes_body());
            assert!(!head.writes_terminator());
        }
    }
}
