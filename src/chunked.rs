//! Chunked transfer coding, see
//! https://tools.ietf.org/html/rfc7230#section-4.1

mod decoder;
mod encoder;

pub(crate) use decoder::ChunkedDecoder;
pub(crate) use encoder::ChunkedEncoder;

/// Trailer field naming why a chunked body was cut short by its producer.
pub(crate) const ABORT_TRAILER: &str = "x-stream-error";
