//! Parsed SAML assertion model.
//!
//! Assertions arrive here already parsed and signature-verified by the XML
//! layer. Structural cardinality (exactly one authn statement, exactly one
//! attribute statement, no authz-decision statements) is enforced by the
//! validator, not by construction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{LEGACY_ASSURANCE_ATTRIBUTE, NSIS_LOA_ATTRIBUTE};
use crate::saml::assurance::AssuranceLevel;

/// A parsed SAML 2.0 assertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assertion {
    /// Unique assertion identifier, the primary replay-protection key.
    pub id: String,

    /// Entity ID of the issuing Identity Provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    /// Subject name identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_name_id: Option<String>,

    /// Timestamp when the assertion was issued.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_instant: Option<DateTime<Utc>>,

    /// Conditions window start.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions_not_before: Option<DateTime<Utc>>,

    /// Conditions window end.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions_not_on_or_after: Option<DateTime<Utc>>,

    /// Audience restriction entity IDs.
    #[serde(default)]
    pub audiences: Vec<String>,

    /// Bearer subject confirmation data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_confirmation: Option<SubjectConfirmation>,

    /// Authentication statements. Exactly one is expected.
    #[serde(default)]
    pub authn_statements: Vec<AuthnStatement>,

    /// Attribute statements. Exactly one is expected.
    #[serde(default)]
    pub attribute_statements: Vec<AttributeStatement>,

    /// Authorization-decision statements. None are allowed.
    #[serde(default)]
    pub authz_decision_statements: Vec<AuthzDecisionStatement>,
}

/// Bearer subject-confirmation data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectConfirmation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_on_or_after: Option<DateTime<Utc>>,

    /// Assertion-consumer URL the assertion was addressed to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
}

/// Authentication statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthnStatement {
    pub authn_instant: DateTime<Utc>,

    /// IdP-assigned correlator for this authenticated session; the secondary
    /// replay-protection key and the handle for IdP-initiated logout.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_index: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_not_on_or_after: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub authn_context_class_ref: Option<String>,
}

/// Attribute statement: named, multi-valued attributes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttributeStatement {
    pub attributes: Vec<Attribute>,
}

/// A single SAML attribute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub values: Vec<String>,
}

/// Authorization-decision statement. The extended validation profile rejects
/// assertions carrying any of these; only the fields needed for logging are
/// modeled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthzDecisionStatement {
    pub resource: String,
    pub decision: String,
}

impl Assertion {
    /// Creates an empty assertion shell with the given ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            issuer: None,
            subject_name_id: None,
            issue_instant: None,
            conditions_not_before: None,
            conditions_not_on_or_after: None,
            audiences: Vec::new(),
            subject_confirmation: None,
            authn_statements: Vec::new(),
            attribute_statements: Vec::new(),
            authz_decision_statements: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    #[must_use]
    pub fn with_subject_name_id(mut self, name_id: impl Into<String>) -> Self {
        self.subject_name_id = Some(name_id.into());
        self
    }

    #[must_use]
    pub fn with_issue_instant(mut self, instant: DateTime<Utc>) -> Self {
        self.issue_instant = Some(instant);
        self
    }

    #[must_use]
    pub fn with_conditions(
        mut self,
        not_before: Option<DateTime<Utc>>,
        not_on_or_after: Option<DateTime<Utc>>,
    ) -> Self {
        self.conditions_not_before = not_before;
        self.conditions_not_on_or_after = not_on_or_after;
        self
    }

    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audiences.push(audience.into());
        self
    }

    #[must_use]
    pub fn with_subject_confirmation(mut self, confirmation: SubjectConfirmation) -> Self {
        self.subject_confirmation = Some(confirmation);
        self
    }

    #[must_use]
    pub fn with_authn_statement(mut self, statement: AuthnStatement) -> Self {
        self.authn_statements.push(statement);
        self
    }

    #[must_use]
    pub fn with_attribute_statement(mut self, statement: AttributeStatement) -> Self {
        self.attribute_statements.push(statement);
        self
    }

    #[must_use]
    pub fn with_authz_decision_statement(mut self, statement: AuthzDecisionStatement) -> Self {
        self.authz_decision_statements.push(statement);
        self
    }

    /// Session index from the first authentication statement, if any.
    #[must_use]
    pub fn session_index(&self) -> Option<&str> {
        self.authn_statements
            .first()
            .and_then(|s| s.session_index.as_deref())
    }

    /// Session expiry from the first authentication statement, if any.
    #[must_use]
    pub fn session_not_on_or_after(&self) -> Option<DateTime<Utc>> {
        self.authn_statements
            .first()
            .and_then(|s| s.session_not_on_or_after)
    }

    /// Values of a named attribute across all attribute statements.
    pub fn attribute_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.attribute_statements
            .iter()
            .flat_map(|s| s.attributes.iter())
            .filter(move |a| a.name == name)
            .flat_map(|a| a.values.iter().map(String::as_str))
    }

    /// Derive the assurance level carried by this assertion.
    ///
    /// Prefers the NSIS LoA attribute; falls back to the legacy numeric
    /// assurance-level attribute when only that is present.
    #[must_use]
    pub fn assurance_level(&self, default: AssuranceLevel) -> AssuranceLevel {
        if let Some(value) = self.attribute_values(NSIS_LOA_ATTRIBUTE).next() {
            return AssuranceLevel::from_attribute_value(
                value,
                AssuranceLevel::from_url(value, default),
            );
        }
        if let Some(value) = self.attribute_values(LEGACY_ASSURANCE_ATTRIBUTE).next() {
            if let Ok(level) = value.trim().parse::<i32>() {
                for candidate in [
                    AssuranceLevel::High,
                    AssuranceLevel::Substantial,
                    AssuranceLevel::Low,
                ] {
                    if level >= candidate.legacy_level() {
                        return candidate;
                    }
                }
            }
        }
        default
    }
}
