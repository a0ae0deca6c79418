use std::time::Duration;

use federa_codec::ObjectId;

use crate::service::ServiceError;

/// Errors raised by federations and the runtime.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Connection-level error.
    #[error("transport error: {0}")]
    Transport(#[from] federa_transport::TransportError),

    /// Encoding or decoding error.
    #[error("codec error: {0}")]
    Codec(#[from] federa_codec::CodecError),

    /// A service request was rejected.
    #[error("service rejected: {0}")]
    Service(#[from] ServiceError),

    /// No connection is attached.
    #[error("no session: {0}")]
    NoSession(String),

    #[error("federation not found: {0}")]
    FederationNotFound(String),

    #[error("object not found: {0}")]
    ObjectNotFound(ObjectId),

    /// A configuration value could not be used.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Request timed out.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
