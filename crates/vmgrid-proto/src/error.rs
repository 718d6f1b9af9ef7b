//! Codec error types.

use thiserror::Error;

/// Result type alias for codec operations.
pub type ProtoResult<T> = Result<T, ProtoError>;

/// Errors produced while encoding or decoding protocol messages.
#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("protobuf decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("invalid record length header: {0:?}")]
    InvalidRecordLength(String),

    #[error("record of {0} bytes exceeds frame limit")]
    RecordTooLarge(usize),

    #[error("unsupported task operation: {0}")]
    UnsupportedOperation(String),

    #[error("event is missing required body: {0}")]
    MissingBody(&'static str),
}
