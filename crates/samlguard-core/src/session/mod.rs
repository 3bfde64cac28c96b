//! Session tracking for validated assertions.
//!
//! The store enforces replay protection (at most one live session per
//! assertion ID or session index) and sliding idle expiration.

mod factory;
mod store;
mod types;

pub use factory::SessionStoreRegistry;
pub use store::{InMemorySessionStore, PostgresSessionStore, SessionStore};
pub use types::{SessionError, SessionRecord};

use crate::saml::assertion::Assertion;
use crate::saml::assurance::AssuranceLevel;

/// Request-scoped view of the authenticated identity.
///
/// Built once per request from the session store and passed explicitly to
/// downstream code; there is deliberately no ambient or thread-local
/// "current assertion".
#[derive(Debug, Clone)]
pub struct AuthenticatedContext {
    pub session_id: String,
    pub assertion: Assertion,
    pub assurance_level: AssuranceLevel,
}

impl AuthenticatedContext {
    #[must_use]
    pub fn new(session_id: impl Into<String>, assertion: Assertion) -> Self {
        let assurance_level = assertion.assurance_level(AssuranceLevel::None);
        Self {
            session_id: session_id.into(),
            assertion,
            assurance_level,
        }
    }

    /// Whether this session satisfies a required assurance level, either via
    /// the NSIS level or the legacy numeric attribute.
    #[must_use]
    pub fn satisfies(&self, required: AssuranceLevel) -> bool {
        if required.equal_or_lesser(Some(self.assurance_level)) {
            return true;
        }
        self.assertion
            .attribute_values(crate::saml::LEGACY_ASSURANCE_ATTRIBUTE)
            .next()
            .and_then(|v| v.trim().parse::<i32>().ok())
            .is_some_and(|level| required.satisfied_by_legacy(level))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::saml::assertion::{Attribute, AttributeStatement};
    use crate::saml::{LEGACY_ASSURANCE_ATTRIBUTE, NSIS_LOA_ATTRIBUTE};

    #[test]
    fn satisfies_via_nsis_level() {
        let assertion = Assertion::new("_c1").with_attribute_statement(AttributeStatement {
            attributes: vec![Attribute {
                name: NSIS_LOA_ATTRIBUTE.into(),
                values: vec!["High".into()],
            }],
        });
        let ctx = AuthenticatedContext::new("sess-1", assertion);
        assert!(ctx.satisfies(AssuranceLevel::Substantial));
        assert!(ctx.satisfies(AssuranceLevel::High));
    }

    #[test]
    fn satisfies_via_legacy_integer() {
        let assertion = Assertion::new("_c2").with_attribute_statement(AttributeStatement {
            attributes: vec![Attribute {
                name: LEGACY_ASSURANCE_ATTRIBUTE.into(),
                values: vec!["3".into()],
            }],
        });
        let ctx = AuthenticatedContext::new("sess-1", assertion);
        assert!(ctx.satisfies(AssuranceLevel::Substantial));
        assert!(!ctx.satisfies(AssuranceLevel::High));
    }

    #[test]
    fn no_level_satisfies_nothing() {
        let ctx = AuthenticatedContext::new("sess-1", Assertion::new("_c3"));
        assert!(!ctx.satisfies(AssuranceLevel::Low));
    }
}
