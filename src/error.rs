use std::io;
use thiserror::Error;

/// Boxed error type used for upstream body errors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error produced while streaming a response body through the middleware.
///
/// Upstream failures and encoder failures stay distinct so that a consumer
/// can tell an aborted producer from a broken compressor.
#[derive(Debug, Error)]
pub enum Error {
    /// The wrapped body itself failed. The original error is kept untouched.
    #[error("response body error: {0}")]
    Body(#[source] BoxError),
    /// The compression engine failed.
    #[error("compression failed: {0}")]
    Encode(#[source] io::Error),
}

impl Error {
    /// Returns the upstream body error, if this is one.
    pub fn into_body_error(self) -> Option<BoxError> {
        match self {
            Error::Body(e) => Some(e),
            Error::Encode(_) => None,
        }
    }

    /// Whether this error came from the compression engine.
    pub fn is_encode(&self) -> bool {
        matches!(self, Error::Encode(_))
    }
}

/// Invalid configuration, reported when the configuration is built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// An `include` entry is empty or carries media type parameters.
    #[error("invalid include content-type prefix {0:?}")]
    InvalidInclude(String),
}

/// Returned to a streaming producer once the consumer has dropped the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("response body was dropped by the consumer")]
pub struct BodyClosed;
