use std::error::Error as StdError;
use std::fmt;
use std::io;

/// A specialized `Result` for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Which part of a message head exceeded its configured limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadLimit {
    /// The request or status line.
    InitialLine,
    /// The header section.
    Headers,
}

/// The classified reason behind an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The peer sent something that is not valid HTTP/1.x.
    Protocol,
    /// A message head exceeded a size limit.
    TooLarge,
    /// A deadline passed (head read, connect, pool acquisition).
    Timeout,
    /// The peer went away, or aborted a body, before the exchange finished.
    Disconnect,
    /// A body did not match the length promised for it.
    Mismatch,
    /// An operation was attempted in a state that no longer allows it.
    IllegalState,
    /// A user handler or body producer failed.
    Handler,
    /// Any other I/O failure.
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Protocol => "protocol",
            ErrorKind::TooLarge => "too-large",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Disconnect => "disconnect",
            ErrorKind::Mismatch => "mismatch",
            ErrorKind::IllegalState => "illegal-state",
            ErrorKind::Handler => "handler",
            ErrorKind::Io => "io",
        };
        f.write_str(s)
    }
}

/// Errors raised while serving or issuing HTTP exchanges.
#[derive(Debug)]
pub enum Error {
    /// Malformed message head or body framing.
    Protocol(String),
    /// Oversized request line or header section.
    TooLarge(HeadLimit),
    /// A deadline passed while waiting on the named operation.
    Timeout(&'static str),
    /// The peer disconnected or aborted the stream.
    Disconnect(String),
    /// A body carried a different number of bytes than declared.
    LengthMismatch {
        /// Bytes promised by the framing decision.
        expected: u64,
        /// Bytes the producer actually offered.
        actual: u64,
    },
    /// The operation is not allowed anymore, e.g. mutating committed headers.
    IllegalState(&'static str),
    /// A handler or body producer failed.
    Handler(Box<dyn StdError + Send + Sync + 'static>),
    /// An unclassified I/O error.
    Io(io::Error),
}

impl Error {
    /// Wrap a user error raised by a handler or a body producer.
    pub fn handler<E>(error: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        Error::Handler(error.into())
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Protocol(_) => ErrorKind::Protocol,
            Error::TooLarge(_) => ErrorKind::TooLarge,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::Disconnect(_) => ErrorKind::Disconnect,
            Error::LengthMismatch { .. } => ErrorKind::Mismatch,
            Error::IllegalState(_) => ErrorKind::IllegalState,
            Error::Handler(_) => ErrorKind::Handler,
            Error::Io(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }

    pub(crate) fn unexpected_eof() -> Self {
        Error::Disconnect("connection closed before the message was complete".into())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Protocol(msg) => write!(f, "protocol error: {}", msg),
            Error::TooLarge(HeadLimit::InitialLine) => {
                write!(f, "initial line exceeds the configured maximum length")
            }
            Error::TooLarge(HeadLimit::Headers) => {
                write!(f, "header section exceeds the configured maximum size")
            }
            Error::Timeout(what) => write!(f, "timed out: {}", what),
            Error::Disconnect(msg) => write!(f, "peer disconnected: {}", msg),
            Error::LengthMismatch { expected, actual } => write!(
                f,
                "body length mismatch: declared {} bytes, producer offered {}",
                expected, actual
            ),
            Error::IllegalState(msg) => write!(f, "illegal state: {}", msg),
            Error::Handler(err) => write!(f, "handler failed: {}", err),
            Error::Io(err) => write!(f, "i/o error: {}", err),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Handler(err) => Some(&**err),
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => Error::Disconnect(err.to_string()),
            io::ErrorKind::TimedOut => Error::Timeout("i/o"),
            _ => Error::Io(err),
        }
    }
}

impl From<httparse::Error> for Error {
    fn from(err: httparse::Error) -> Self {
        Error::Protocol(err.to_string())
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(err: std::str::Utf8Error) -> Self {
        Error::Protocol(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_classified() {
        let eof: Error = io::Error::from(io::ErrorKind::UnexpectedEof).into();
        assert_eq!(eof.kind(), ErrorKind::Disconnect);

        let reset: Error = io::Error::from(io::ErrorKind::ConnectionReset).into();
        assert_eq!(reset.kind(), ErrorKind::Disconnect);

        let timeout: Error = io::Error::from(io::ErrorKind::TimedOut).into();
        assert_eq!(timeout.kind(), ErrorKind::Timeout);

        let other: Error = io::Error::from(io::ErrorKind::PermissionDenied).into();
        assert_eq!(other.kind(), ErrorKind::Io);
    }

    #[test]
    fn handler_errors_keep_their_source() {
        let err = Error::handler("boom");
        assert_eq!(err.kind(), ErrorKind::Handler);
        assert_eq!(err.to_string(), "handler failed: boom");
        assert!(err.source().is_some());
    }
}
