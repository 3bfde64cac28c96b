//! Session record and error types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::saml::assertion::Assertion;
use crate::saml::assurance::AssuranceLevel;

/// A validated assertion bound to a local session.
///
/// Created when an assertion passes validation and is stored;
/// `last_accessed_at` is refreshed on every successful read; the record is
/// destroyed on logout or once idle longer than the configured threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Unique identifier for this record.
    pub id: Uuid,

    /// Local session identifier (the SP's own session cookie value).
    pub session_id: String,

    /// Assertion identifier, primary replay-protection key.
    pub assertion_id: String,

    /// IdP session index, secondary replay-protection key.
    pub session_index: Option<String>,

    /// The validated assertion itself.
    pub assertion: Assertion,

    /// Assurance level derived from the assertion's attributes.
    pub assurance_level: AssuranceLevel,

    pub created_at: DateTime<Utc>,

    /// Sliding-window timestamp; refreshed on every successful read.
    pub last_accessed_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Build a record from a validated assertion.
    #[must_use]
    pub fn new(session_id: impl Into<String>, assertion: Assertion) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            session_id: session_id.into(),
            assertion_id: assertion.id.clone(),
            session_index: assertion.session_index().map(str::to_owned),
            assurance_level: assertion.assurance_level(AssuranceLevel::None),
            assertion,
            created_at: now,
            last_accessed_at: now,
        }
    }

    /// True when the record has been idle longer than `max_idle_secs` or the
    /// assertion's own session expiry has passed.
    #[must_use]
    pub fn is_expired(&self, max_idle_secs: u64, now: DateTime<Utc>) -> bool {
        let idle_cutoff = now - chrono::Duration::seconds(max_idle_secs as i64);
        if self.last_accessed_at < idle_cutoff {
            return true;
        }
        self.assertion
            .session_not_on_or_after()
            .is_some_and(|deadline| deadline <= now)
    }
}

/// Session storage errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The assertion ID or session index is already bound to a live record.
    /// A security event: callers must audit-log and never retry.
    #[error("Replay detected: {key} {value} is already bound to a live session")]
    Replayed { key: &'static str, value: String },

    /// Backend fault.
    #[error("Session storage error: {0}")]
    Storage(String),
}
