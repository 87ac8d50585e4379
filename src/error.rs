//! Error types.

use thiserror::Error;

/// Errors produced by the mock registry and its transport boundary.
///
/// A lookup that finds no mock is not an error; see [`crate::MockRegistry::lookup`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MockPlugError {
    /// The request URI could not be decomposed into scheme, host, port, path and query.
    #[error("invalid request descriptor {uri:?}: {reason}")]
    InvalidRequestDescriptor { uri: String, reason: String },

    /// No mock matched and the transport policy does not allow falling through.
    #[error("no mock registered for {verb} {uri}")]
    UnmatchedRequest { verb: String, uri: String },

    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A fallback transport failed.
    #[error("transport error: {0}")]
    Transport(String),
}

impl MockPlugError {
    pub(crate) fn invalid_uri(uri: &str, reason: impl Into<String>) -> Self {
        Self::InvalidRequestDescriptor {
            uri: uri.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result alias for registry operations.
pub type Result<T> = std::result::Result<T, MockPlugError>;
