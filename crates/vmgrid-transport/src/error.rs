//! Transport error types.

use std::time::Duration;

use http::StatusCode;
use thiserror::Error;

/// Result type alias for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors raised while delivering a call or reading the event stream.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect to {address} failed: {reason}")]
    Connect { address: String, reason: String },

    #[error("http error: {0}")]
    Http(#[from] hyper::Error),

    #[error("invalid request: {0}")]
    Request(#[from] http::Error),

    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    #[error("unexpected status: expected {expected}, got {actual}")]
    UnexpectedStatus {
        expected: StatusCode,
        actual: StatusCode,
    },

    #[error("codec error: {0}")]
    Codec(#[from] vmgrid_proto::ProtoError),

    #[error("no framework id: scheduler is not subscribed")]
    NotSubscribed,

    #[error("event stream closed")]
    StreamClosed,
}
