//! Ordered rule-based assertion validation.
//!
//! Two profiles share a common rule prefix: the basic profile checks
//! structure, audience, and the conditions window (rules 1-6); the extended
//! profile adds bearer-confirmation, statement-cardinality, recipient, and
//! session-expiry checks (rules 7-13). Rules run in a fixed order and the
//! first failure determines the reported reason.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use crate::saml::assertion::Assertion;

/// Assertion validation failure. Not retryable; the reason string is for
/// server-side audit logs, never for end users.
#[derive(Debug, Error)]
#[error("{rule}: {reason}")]
pub struct ValidationError {
    /// Name of the rule that failed.
    pub rule: &'static str,
    /// Human-readable, non-sensitive reason.
    pub reason: String,
}

impl ValidationError {
    fn new(rule: &'static str, reason: impl Into<String>) -> Self {
        Self {
            rule,
            reason: reason.into(),
        }
    }
}

/// Inputs a validation run checks the assertion against.
#[derive(Debug, Clone)]
pub struct ValidationContext<'a> {
    /// Entity ID of this Service Provider.
    pub sp_entity_id: &'a str,

    /// Assertion-consumer URL the assertion must be addressed to.
    pub assertion_consumer_url: &'a str,

    /// Clock-skew tolerance widening the valid window on both ends.
    pub clock_skew: Duration,

    /// Evaluation time. Injectable for tests; `Utc::now()` in production.
    pub now: DateTime<Utc>,
}

impl<'a> ValidationContext<'a> {
    #[must_use]
    pub fn new(sp_entity_id: &'a str, assertion_consumer_url: &'a str, skew_minutes: i64) -> Self {
        Self {
            sp_entity_id,
            assertion_consumer_url,
            clock_skew: Duration::minutes(skew_minutes),
            now: Utc::now(),
        }
    }

    #[must_use]
    pub fn at_time(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// A NotOnOrAfter deadline is still live while `deadline + skew > now`.
    fn not_expired(&self, deadline: DateTime<Utc>) -> bool {
        deadline + self.clock_skew > self.now
    }

    /// A NotBefore start is already in effect while `start - skew < now`.
    fn in_effect(&self, start: DateTime<Utc>) -> bool {
        start - self.clock_skew < self.now
    }
}

type RuleFn = fn(&Assertion, &ValidationContext<'_>) -> Result<(), ValidationError>;

#[derive(Clone, Copy)]
struct Rule {
    name: &'static str,
    check: RuleFn,
}

/// Rules 1-6, shared by both profiles.
const BASIC_RULES: &[Rule] = &[
    Rule { name: "issue-instant", check: check_issue_instant },
    Rule { name: "issuer", check: check_issuer },
    Rule { name: "subject-name-id", check: check_subject_name_id },
    Rule { name: "audience", check: check_audience },
    Rule { name: "conditions-not-on-or-after", check: check_conditions_not_on_or_after },
    Rule { name: "conditions-not-before", check: check_conditions_not_before },
];

/// Rules 7-13, extended profile only.
const EXTENDED_RULES: &[Rule] = &[
    Rule { name: "confirmation-not-on-or-after", check: check_confirmation_not_on_or_after },
    Rule { name: "authn-statement-cardinality", check: check_authn_statement_cardinality },
    Rule { name: "session-index", check: check_session_index },
    Rule { name: "attribute-statement-cardinality", check: check_attribute_statement_cardinality },
    Rule { name: "authz-decision-statements", check: check_authz_decision_statements },
    Rule { name: "confirmation-recipient", check: check_confirmation_recipient },
    Rule { name: "session-not-on-or-after", check: check_session_not_on_or_after },
];

/// Validates assertions against an ordered rule list.
pub struct AssertionValidator {
    rules: Vec<Rule>,
    profile: &'static str,
}

impl AssertionValidator {
    /// Basic profile: structural and conditions-window rules only.
    #[must_use]
    pub fn basic() -> Self {
        Self {
            rules: BASIC_RULES.to_vec(),
            profile: "basic",
        }
    }

    /// Extended profile: basic rules plus bearer-confirmation, statement
    /// cardinality, recipient, and session-expiry rules.
    #[must_use]
    pub fn extended() -> Self {
        let mut rules = BASIC_RULES.to_vec();
        rules.extend_from_slice(EXTENDED_RULES);
        Self {
            rules,
            profile: "extended",
        }
    }

    /// Run the rule list in order. The first failing rule determines the
    /// reported reason; there is no partial success and no side effect.
    pub fn validate(
        &self,
        assertion: &Assertion,
        ctx: &ValidationContext<'_>,
    ) -> Result<(), ValidationError> {
        for rule in &self.rules {
            if let Err(err) = (rule.check)(assertion, ctx) {
                warn!(
                    assertion_id = %assertion.id,
                    rule = rule.name,
                    reason = %err.reason,
                    "Assertion rejected"
                );
                return Err(err);
            }
        }
        debug!(
            assertion_id = %assertion.id,
            profile = self.profile,
            "Assertion validated"
        );
        Ok(())
    }
}

fn check_issue_instant(a: &Assertion, _: &ValidationContext<'_>) -> Result<(), ValidationError> {
    if a.issue_instant.is_none() {
        return Err(ValidationError::new("issue-instant", "Issue instant is missing"));
    }
    Ok(())
}

fn check_issuer(a: &Assertion, _: &ValidationContext<'_>) -> Result<(), ValidationError> {
    match a.issuer.as_deref() {
        Some(issuer) if !issuer.trim().is_empty() => Ok(()),
        _ => Err(ValidationError::new("issuer", "Issuer is missing or empty")),
    }
}

fn check_subject_name_id(a: &Assertion, _: &ValidationContext<'_>) -> Result<(), ValidationError> {
    if a.subject_name_id.is_none() {
        return Err(ValidationError::new(
            "subject-name-id",
            "Subject name identifier is missing",
        ));
    }
    Ok(())
}

fn check_audience(a: &Assertion, ctx: &ValidationContext<'_>) -> Result<(), ValidationError> {
    if !a.audiences.iter().any(|aud| aud == ctx.sp_entity_id) {
        return Err(ValidationError::new(
            "audience",
            "Audience does not include the service provider entity ID",
        ));
    }
    Ok(())
}

fn check_conditions_not_on_or_after(
    a: &Assertion,
    ctx: &ValidationContext<'_>,
) -> Result<(), ValidationError> {
    let deadline = a.conditions_not_on_or_after.ok_or_else(|| {
        ValidationError::new(
            "conditions-not-on-or-after",
            "Conditions NotOnOrAfter is missing",
        )
    })?;
    if !ctx.not_expired(deadline) {
        return Err(ValidationError::new(
            "conditions-not-on-or-after",
            "Conditions NotOnOrAfter has passed",
        ));
    }
    Ok(())
}

fn check_conditions_not_before(
    a: &Assertion,
    ctx: &ValidationContext<'_>,
) -> Result<(), ValidationError> {
    let start = a.conditions_not_before.ok_or_else(|| {
        ValidationError::new("conditions-not-before", "Conditions NotBefore is missing")
    })?;
    if !ctx.in_effect(start) {
        return Err(ValidationError::new(
            "conditions-not-before",
            "Conditions NotBefore is in the future",
        ));
    }
    Ok(())
}

fn check_confirmation_not_on_or_after(
    a: &Assertion,
    ctx: &ValidationContext<'_>,
) -> Result<(), ValidationError> {
    let deadline = a
        .subject_confirmation
        .as_ref()
        .and_then(|c| c.not_on_or_after)
        .ok_or_else(|| {
            ValidationError::new(
                "confirmation-not-on-or-after",
                "Subject confirmation NotOnOrAfter is missing",
            )
        })?;
    if !ctx.not_expired(deadline) {
        return Err(ValidationError::new(
            "confirmation-not-on-or-after",
            "Subject confirmation NotOnOrAfter has passed",
        ));
    }
    Ok(())
}

fn check_authn_statement_cardinality(
    a: &Assertion,
    _: &ValidationContext<'_>,
) -> Result<(), ValidationError> {
    if a.authn_statements.len() != 1 {
        return Err(ValidationError::new(
            "authn-statement-cardinality",
            format!(
                "Assertion must contain exactly one authentication statement, found {}",
                a.authn_statements.len()
            ),
        ));
    }
    Ok(())
}

fn check_session_index(a: &Assertion, _: &ValidationContext<'_>) -> Result<(), ValidationError> {
    match a.session_index() {
        Some(index) if !index.trim().is_empty() => Ok(()),
        _ => Err(ValidationError::new(
            "session-index",
            "Authentication statement has no session index",
        )),
    }
}

fn check_attribute_statement_cardinality(
    a: &Assertion,
    _: &ValidationContext<'_>,
) -> Result<(), ValidationError> {
    if a.attribute_statements.len() != 1 {
        return Err(ValidationError::new(
            "attribute-statement-cardinality",
            format!(
                "Assertion must contain exactly one attribute statement, found {}",
                a.attribute_statements.len()
            ),
        ));
    }
    Ok(())
}

fn check_authz_decision_statements(
    a: &Assertion,
    _: &ValidationContext<'_>,
) -> Result<(), ValidationError> {
    if !a.authz_decision_statements.is_empty() {
        return Err(ValidationError::new(
            "authz-decision-statements",
            "Assertion must not contain authorization decision statements",
        ));
    }
    Ok(())
}

fn check_confirmation_recipient(
    a: &Assertion,
    ctx: &ValidationContext<'_>,
) -> Result<(), ValidationError> {
    let recipient = a
        .subject_confirmation
        .as_ref()
        .and_then(|c| c.recipient.as_deref());
    if recipient != Some(ctx.assertion_consumer_url) {
        return Err(ValidationError::new(
            "confirmation-recipient",
            "Subject confirmation recipient does not match the assertion consumer URL",
        ));
    }
    Ok(())
}

fn check_session_not_on_or_after(
    a: &Assertion,
    ctx: &ValidationContext<'_>,
) -> Result<(), ValidationError> {
    // Optional field: only checked when present.
    if let Some(deadline) = a.session_not_on_or_after() {
        if !ctx.not_expired(deadline) {
            return Err(ValidationError::new(
                "session-not-on-or-after",
                "Session NotOnOrAfter has passed",
            ));
        }
    }
    Ok(())
}
