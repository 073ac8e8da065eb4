//! Error types for taskq.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum Error {
    /// No route is registered for the task's UTD.
    #[error("unsupported task UTD: {0}")]
    Unsupported(String),

    /// The UTD could not be parsed.
    #[error("malformed task UTD: {0}")]
    Malformed(String),

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("invalid request")]
    InvalidRequest,

    /// A managed message arrived without an identifier.
    #[error("missing identifier")]
    MissingIdent,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Worklog: no such entry or task.
    #[error("not found: {0}")]
    NotFound(String),

    /// Worklog: an entry with the same (task, sequence) already exists.
    #[error("sequence conflict: {0}")]
    Conflict(String),

    /// The executor is not running; returned when the consumer loop exits.
    #[error("not running")]
    Stopped,

    #[error("operation canceled")]
    Canceled,

    /// Broker receive timed out; the consumer loop retries on this.
    #[error("receive timed out")]
    Timeout,

    /// The broker or consumer has shut down; terminates the stream.
    #[error("queue is closed")]
    Closed,

    /// Marker wrapper: the cause is safe to retry. Downstream scanners
    /// re-enqueue entries recorded with this set.
    #[error("{0} (recoverable)")]
    Recoverable(#[source] Box<Error>),

    /// A handler returned an error that is neither a routing miss nor a
    /// cancellation.
    #[error("handler error: {0}")]
    Handler(#[source] Box<Error>),

    /// A handler panicked; carries the panic payload text.
    #[error("task panicked: {0}")]
    Panic(String),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("i/o error: {0}")]
    Io(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Wrap an error as recoverable, marking its cause safe to retry.
    pub fn recoverable(err: Error) -> Error {
        Error::Recoverable(Box::new(err))
    }

    /// A recoverable error for a temporarily unavailable dependency.
    pub fn service_unavailable(msg: impl Into<String>) -> Error {
        Error::recoverable(Error::Other(msg.into()))
    }

    /// True if this error, or any error it wraps, is marked recoverable.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Recoverable(_) => true,
            Error::Handler(cause) => cause.is_recoverable(),
            _ => false,
        }
    }

    /// True if this error, or any error it wraps, is a cancellation.
    pub fn is_canceled(&self) -> bool {
        match self {
            Error::Canceled => true,
            Error::Recoverable(cause) | Error::Handler(cause) => cause.is_canceled(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Encoding(err.to_string())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_marker_survives_handler_wrapping() {
        let err = Error::Handler(Box::new(Error::recoverable(Error::Other(
            "backend down".to_string(),
        ))));
        assert!(err.is_recoverable());
        assert!(!err.is_canceled());
    }

    #[test]
    fn cancellation_detected_through_wrappers() {
        let err = Error::Handler(Box::new(Error::Canceled));
        assert!(err.is_canceled());
        assert!(!Error::Other("nope".to_string()).is_canceled());
    }
}
