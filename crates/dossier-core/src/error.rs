//! Error taxonomy shared by the ingestion and retrieval pipelines.
//!
//! The four variants map onto the four recovery strategies the pipelines
//! use: configuration and validation problems are rejected before any
//! external call, external-service failures are recovered per batch or per
//! namespace, and data-integrity violations are surfaced loudly instead of
//! producing silently-wrong results (a dimension mismatch, for example,
//! would otherwise just return zero matches).

use thiserror::Error;

/// Pipeline error. Application code wraps this in `anyhow::Error`, so
/// callers can downcast to recover the category.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid deployment configuration (credentials, model or
    /// index settings). Raised before any external call; never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A request was rejected before any external call was made
    /// (missing query, unknown document, empty text, missing scope).
    #[error("validation error: {0}")]
    Validation(String),

    /// An embedding or vector-index call failed after retries were
    /// exhausted.
    #[error("{service} error: {message}")]
    ExternalService {
        service: &'static str,
        message: String,
    },

    /// An invariant the pipelines rely on was violated: embedding dimension
    /// mismatch, chunk/vector count mismatch, or stale vectors surviving a
    /// delete.
    #[error("data integrity error: {0}")]
    DataIntegrity(String),
}

impl Error {
    /// Shorthand for an [`Error::ExternalService`] with a displayable cause.
    pub fn external(service: &'static str, cause: impl std::fmt::Display) -> Self {
        Error::ExternalService {
            service,
            message: cause.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
