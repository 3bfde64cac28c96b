//! Crate-level error types.

use thiserror::Error;

use crate::config::ConfigError;
use crate::revocation::RevocationError;
use crate::saml::artifact::ArtifactError;
use crate::session::SessionError;
use crate::validation::ValidationError;

/// Result type for trust-core operations.
pub type TrustResult<T> = Result<T, TrustError>;

/// Top-level error for the SP trust core.
///
/// Each variant maps to one failure class: validation and session errors
/// propagate to the caller synchronously, revocation errors are absorbed by
/// the checker's circuit breaker, configuration errors are fatal at startup.
#[derive(Debug, Error)]
pub enum TrustError {
    /// Assertion violates a protocol invariant. Not retryable.
    #[error("Assertion validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Session storage failure, including replay detection.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Malformed or untrusted artifact.
    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    /// CRL fetch, parse, or verification failure.
    #[error("Revocation check error: {0}")]
    Revocation(#[from] RevocationError),

    /// Missing or inconsistent configuration. Fatal at startup.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}
