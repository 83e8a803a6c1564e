use std::time::Duration;
use thiserror::Error;

/// Errors raised by the transport layer.
#[derive(Debug, Error)]
pub enum NetError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),
    #[error("unexpected payload kind: expected {expected}, got {actual}")]
    UnexpectedKind { expected: String, actual: String },
    #[error("no reply from {addr} within {timeout:?}")]
    Timeout { addr: String, timeout: Duration },
    #[error("connection to {0} closed")]
    Closed(String),
    #[error("unable to resolve {0}")]
    Unresolved(String),
    #[error("invalid address {0}")]
    InvalidAddress(String),
}
