//! Trust core for a SAML 2.0 Service Provider.
//!
//! This crate decides whether an inbound, already-signature-verified
//! assertion is acceptable and keeps the surrounding security state:
//! - Ordered rule-based assertion validation (basic and extended profiles)
//! - Replay-protected session storage with sliding idle expiration
//! - SAML artifact decoding and source-id resolution
//! - CRL-driven certificate revocation checking behind a circuit breaker
//! - NSIS assurance-level comparisons
//!
//! HTTP bindings, XML parsing, and XML signature verification live in
//! external collaborators; this crate consumes parsed inputs only.

pub mod config;
pub mod error;
pub mod revocation;
pub mod saml;
pub mod session;
pub mod validation;

pub use config::{BreakerConfig, RevocationConfig, TrustConfig};
pub use error::{TrustError, TrustResult};
pub use revocation::{
    CircuitBreakerState, CrlFetcher, CrlSource, IdpCertificate, IdpMetadata, RevocationChecker,
    RevocationError,
};
pub use saml::artifact::{Artifact, ArtifactError};
pub use saml::assertion::{
    Assertion, Attribute, AttributeStatement, AuthnStatement, AuthzDecisionStatement,
    SubjectConfirmation,
};
pub use saml::assurance::AssuranceLevel;
pub use session::{
    AuthenticatedContext, InMemorySessionStore, PostgresSessionStore, SessionError, SessionRecord,
    SessionStore, SessionStoreRegistry,
};
pub use validation::{AssertionValidator, ValidationContext, ValidationError};
