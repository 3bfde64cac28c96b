//! Replay-protected session storage.
//!
//! Two backends satisfy the same contract: an in-memory store guarding the
//! replay-check-then-insert sequence with a single write lock, and a
//! PostgreSQL store relying on unique indexes surfaced as typed replay
//! errors. Selection happens through [`super::factory::SessionStoreRegistry`].

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::types::{SessionError, SessionRecord};
use crate::saml::assertion::Assertion;

/// Storage contract for validated assertions bound to local sessions.
///
/// The replay-key check and the insert must be atomic per key: two requests
/// storing the same assertion concurrently yield exactly one success and one
/// [`SessionError::Replayed`].
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Bind a validated assertion to a local session.
    ///
    /// Fails with a replay error when the assertion ID or session index is
    /// already live under any session. On success any pre-existing record
    /// for `session_id` is atomically replaced (re-login). `None` is a
    /// logged no-op.
    async fn store_assertion(
        &self,
        session_id: &str,
        assertion: Option<Assertion>,
    ) -> Result<(), SessionError>;

    /// Stored assertion for a local session, refreshing its last-access
    /// timestamp.
    async fn get_assertion(&self, session_id: &str) -> Result<Option<Assertion>, SessionError>;

    /// Stored assertion keyed by IdP session index, for IdP-initiated logout
    /// correlation. Refreshes the last-access timestamp.
    async fn get_assertion_by_index(
        &self,
        session_index: &str,
    ) -> Result<Option<Assertion>, SessionError>;

    /// Reverse lookup from session index to local session identifier.
    async fn related_session_id(
        &self,
        session_index: &str,
    ) -> Result<Option<String>, SessionError>;

    /// Remove the binding for a session. Idempotent; absent sessions are not
    /// an error.
    async fn log_out(&self, session_id: &str) -> Result<(), SessionError>;

    /// Remove only the record matching this assertion, plus any secondary
    /// session sharing its session index.
    async fn log_out_assertion(
        &self,
        session_id: &str,
        assertion: &Assertion,
    ) -> Result<(), SessionError>;

    /// True iff a live, non-expired record exists. Expiry covers both the
    /// idle threshold and the assertion's own session deadline.
    async fn is_logged_in(&self, session_id: &str, max_idle_secs: u64)
        -> Result<bool, SessionError>;

    /// Delete every record idle longer than `max_idle_secs`. Invoked by an
    /// external scheduler. Returns the number of records deleted.
    async fn cleanup(&self, max_idle_secs: u64) -> Result<u64, SessionError>;
}

#[derive(Debug, Default)]
struct Maps {
    records: HashMap<String, SessionRecord>,
    by_assertion_id: HashMap<String, String>,
    by_session_index: HashMap<String, String>,
}

impl Maps {
    fn remove_session(&mut self, session_id: &str) -> Option<SessionRecord> {
        let record = self.records.remove(session_id)?;
        self.by_assertion_id.remove(&record.assertion_id);
        if let Some(index) = &record.session_index {
            self.by_session_index.remove(index);
        }
        Some(record)
    }
}

/// In-memory session store.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    inner: Arc<RwLock<Maps>>,
}

impl InMemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn store_assertion(
        &self,
        session_id: &str,
        assertion: Option<Assertion>,
    ) -> Result<(), SessionError> {
        let Some(assertion) = assertion else {
            debug!(session_id = %session_id, "No assertion to store, skipping");
            return Ok(());
        };

        // One write guard covers the replay check and the insert.
        let mut maps = self.inner.write().await;

        if maps.by_assertion_id.contains_key(&assertion.id) {
            warn!(
                session_id = %session_id,
                assertion_id = %assertion.id,
                "Replay detected: assertion ID already live"
            );
            return Err(SessionError::Replayed {
                key: "assertion ID",
                value: assertion.id.clone(),
            });
        }
        if let Some(index) = assertion.session_index() {
            if maps.by_session_index.contains_key(index) {
                warn!(
                    session_id = %session_id,
                    session_index = %index,
                    "Replay detected: session index already live"
                );
                return Err(SessionError::Replayed {
                    key: "session index",
                    value: index.to_owned(),
                });
            }
        }

        // Re-login overwrite: drop any previous record for this session.
        maps.remove_session(session_id);

        let record = SessionRecord::new(session_id, assertion);
        maps.by_assertion_id
            .insert(record.assertion_id.clone(), session_id.to_owned());
        if let Some(index) = &record.session_index {
            maps.by_session_index.insert(index.clone(), session_id.to_owned());
        }
        info!(
            session_id = %session_id,
            assertion_id = %record.assertion_id,
            assurance_level = %record.assurance_level,
            "Stored validated assertion"
        );
        maps.records.insert(session_id.to_owned(), record);
        Ok(())
    }

    async fn get_assertion(&self, session_id: &str) -> Result<Option<Assertion>, SessionError> {
        let mut maps = self.inner.write().await;
        Ok(maps.records.get_mut(session_id).map(|record| {
            record.last_accessed_at = Utc::now();
            record.assertion.clone()
        }))
    }

    async fn get_assertion_by_index(
        &self,
        session_index: &str,
    ) -> Result<Option<Assertion>, SessionError> {
        let mut maps = self.inner.write().await;
        let Some(session_id) = maps.by_session_index.get(session_index).cloned() else {
            return Ok(None);
        };
        Ok(maps.records.get_mut(&session_id).map(|record| {
            record.last_accessed_at = Utc::now();
            record.assertion.clone()
        }))
    }

    async fn related_session_id(
        &self,
        session_index: &str,
    ) -> Result<Option<String>, SessionError> {
        let maps = self.inner.read().await;
        Ok(maps.by_session_index.get(session_index).cloned())
    }

    async fn log_out(&self, session_id: &str) -> Result<(), SessionError> {
        let mut maps = self.inner.write().await;
        if maps.remove_session(session_id).is_some() {
            info!(session_id = %session_id, "Session logged out");
        }
        Ok(())
    }

    async fn log_out_assertion(
        &self,
        session_id: &str,
        assertion: &Assertion,
    ) -> Result<(), SessionError> {
        let mut maps = self.inner.write().await;

        let matches = maps
            .records
            .get(session_id)
            .is_some_and(|r| r.assertion_id == assertion.id);
        if matches {
            maps.remove_session(session_id);
            info!(
                session_id = %session_id,
                assertion_id = %assertion.id,
                "Session logged out"
            );
        }

        // A secondary session sharing this assertion's session index goes too.
        if let Some(index) = assertion.session_index() {
            if let Some(other) = maps.by_session_index.get(index).cloned() {
                maps.remove_session(&other);
                info!(
                    session_id = %other,
                    session_index = %index,
                    "Secondary session logged out"
                );
            }
        }
        Ok(())
    }

    async fn is_logged_in(
        &self,
        session_id: &str,
        max_idle_secs: u64,
    ) -> Result<bool, SessionError> {
        let maps = self.inner.read().await;
        Ok(maps
            .records
            .get(session_id)
            .is_some_and(|r| !r.is_expired(max_idle_secs, Utc::now())))
    }

    async fn cleanup(&self, max_idle_secs: u64) -> Result<u64, SessionError> {
        let mut maps = self.inner.write().await;
        let now = Utc::now();
        let expired: Vec<String> = maps
            .records
            .values()
            .filter(|r| r.is_expired(max_idle_secs, now))
            .map(|r| r.session_id.clone())
            .collect();
        let deleted = expired.len() as u64;
        for session_id in expired {
            maps.remove_session(&session_id);
        }
        if deleted > 0 {
            debug!(deleted = deleted, "Cleaned up expired sessions");
        }
        Ok(deleted)
    }
}

/// PostgreSQL-backed session store.
///
/// Replay protection rests on a row-locked check inside the store
/// transaction, backed by unique indexes over `assertion_id` and
/// `session_index`; `ON CONFLICT DO NOTHING RETURNING id` catches the
/// residual race between the check and the insert.
///
/// Expected schema:
///
/// ```sql
/// CREATE TABLE sp_sessions (
///     id               UUID PRIMARY KEY,
///     session_id       TEXT NOT NULL UNIQUE,
///     assertion_id     TEXT NOT NULL UNIQUE,
///     session_index    TEXT UNIQUE,
///     assertion        JSONB NOT NULL,
///     assurance_level  INTEGER NOT NULL,
///     created_at       TIMESTAMPTZ NOT NULL,
///     last_accessed_at TIMESTAMPTZ NOT NULL
/// );
/// ```
pub struct PostgresSessionStore {
    pool: PgPool,
}

impl PostgresSessionStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PostgresSessionStore {
    async fn store_assertion(
        &self,
        session_id: &str,
        assertion: Option<Assertion>,
    ) -> Result<(), SessionError> {
        let Some(assertion) = assertion else {
            debug!(session_id = %session_id, "No assertion to store, skipping");
            return Ok(());
        };

        let record = SessionRecord::new(session_id, assertion);
        let assertion_json = serde_json::to_value(&record.assertion)
            .map_err(|e| SessionError::Storage(e.to_string()))?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| SessionError::Storage(e.to_string()))?;

        // Replay check first, under a row lock: a live record with this
        // assertion ID or session index is a replay no matter which session
        // owns it, including this one.
        let live: Option<(String, Option<String>)> = sqlx::query_as(
            r"
            SELECT assertion_id, session_index
            FROM sp_sessions
            WHERE assertion_id = $1 OR session_index = $2
            FOR UPDATE
            ",
        )
        .bind(&record.assertion_id)
        .bind(&record.session_index)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| SessionError::Storage(e.to_string()))?;

        if let Some((live_assertion_id, live_index)) = live {
            tx.rollback()
                .await
                .map_err(|e| SessionError::Storage(e.to_string()))?;
            let (key, value) = if live_assertion_id == record.assertion_id {
                ("assertion ID", record.assertion_id.clone())
            } else {
                ("session index", live_index.unwrap_or_default())
            };
            warn!(
                session_id = %session_id,
                key = key,
                value = %value,
                "Replay detected"
            );
            return Err(SessionError::Replayed { key, value });
        }

        // Re-login overwrite happens in the same transaction as the insert.
        sqlx::query("DELETE FROM sp_sessions WHERE session_id = $1")
            .bind(session_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| SessionError::Storage(e.to_string()))?;

        let row = sqlx::query(
            r"
            INSERT INTO sp_sessions
                (id, session_id, assertion_id, session_index, assertion,
                 assurance_level, created_at, last_accessed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT DO NOTHING
            RETURNING id
            ",
        )
        .bind(record.id)
        .bind(&record.session_id)
        .bind(&record.assertion_id)
        .bind(&record.session_index)
        .bind(&assertion_json)
        .bind(record.assurance_level.legacy_level())
        .bind(record.created_at)
        .bind(record.last_accessed_at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| SessionError::Storage(e.to_string()))?;

        if row.is_none() {
            // A unique index fired: a concurrent store won the race between
            // the locked check and this insert.
            tx.rollback()
                .await
                .map_err(|e| SessionError::Storage(e.to_string()))?;
            warn!(
                session_id = %session_id,
                assertion_id = %record.assertion_id,
                "Replay detected"
            );
            return Err(SessionError::Replayed {
                key: "assertion ID",
                value: record.assertion_id.clone(),
            });
        }

        tx.commit()
            .await
            .map_err(|e| SessionError::Storage(e.to_string()))?;

        info!(
            session_id = %session_id,
            assertion_id = %record.assertion_id,
            "Stored validated assertion"
        );
        Ok(())
    }

    async fn get_assertion(&self, session_id: &str) -> Result<Option<Assertion>, SessionError> {
        let row = sqlx::query(
            r"
            UPDATE sp_sessions
            SET last_accessed_at = NOW()
            WHERE session_id = $1
            RETURNING assertion
            ",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SessionError::Storage(e.to_string()))?;

        row.map(|r| {
            serde_json::from_value(r.get("assertion"))
                .map_err(|e| SessionError::Storage(e.to_string()))
        })
        .transpose()
    }

    async fn get_assertion_by_index(
        &self,
        session_index: &str,
    ) -> Result<Option<Assertion>, SessionError> {
        let row = sqlx::query(
            r"
            UPDATE sp_sessions
            SET last_accessed_at = NOW()
            WHERE session_index = $1
            RETURNING assertion
            ",
        )
        .bind(session_index)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SessionError::Storage(e.to_string()))?;

        row.map(|r| {
            serde_json::from_value(r.get("assertion"))
                .map_err(|e| SessionError::Storage(e.to_string()))
        })
        .transpose()
    }

    async fn related_session_id(
        &self,
        session_index: &str,
    ) -> Result<Option<String>, SessionError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT session_id FROM sp_sessions WHERE session_index = $1")
                .bind(session_index)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| SessionError::Storage(e.to_string()))?;
        Ok(row.map(|(session_id,)| session_id))
    }

    async fn log_out(&self, session_id: &str) -> Result<(), SessionError> {
        let result = sqlx::query("DELETE FROM sp_sessions WHERE session_id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(|e| SessionError::Storage(e.to_string()))?;
        if result.rows_affected() > 0 {
            info!(session_id = %session_id, "Session logged out");
        }
        Ok(())
    }

    async fn log_out_assertion(
        &self,
        session_id: &str,
        assertion: &Assertion,
    ) -> Result<(), SessionError> {
        sqlx::query(
            r"
            DELETE FROM sp_sessions
            WHERE (session_id = $1 AND assertion_id = $2)
               OR session_index = $3
            ",
        )
        .bind(session_id)
        .bind(&assertion.id)
        .bind(assertion.session_index())
        .execute(&self.pool)
        .await
        .map_err(|e| SessionError::Storage(e.to_string()))?;
        info!(
            session_id = %session_id,
            assertion_id = %assertion.id,
            "Session logged out"
        );
        Ok(())
    }

    async fn is_logged_in(
        &self,
        session_id: &str,
        max_idle_secs: u64,
    ) -> Result<bool, SessionError> {
        let row = sqlx::query(
            r"
            SELECT assertion, last_accessed_at
            FROM sp_sessions
            WHERE session_id = $1
              AND last_accessed_at > NOW() - make_interval(secs => $2)
            ",
        )
        .bind(session_id)
        .bind(max_idle_secs as f64)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SessionError::Storage(e.to_string()))?;

        let Some(row) = row else {
            return Ok(false);
        };
        let assertion: Assertion = serde_json::from_value(row.get("assertion"))
            .map_err(|e| SessionError::Storage(e.to_string()))?;
        Ok(assertion
            .session_not_on_or_after()
            .is_none_or(|deadline| deadline > Utc::now()))
    }

    async fn cleanup(&self, max_idle_secs: u64) -> Result<u64, SessionError> {
        let result = sqlx::query(
            "DELETE FROM sp_sessions WHERE last_accessed_at < NOW() - make_interval(secs => $1)",
        )
        .bind(max_idle_secs as f64)
        .execute(&self.pool)
        .await
        .map_err(|e| SessionError::Storage(e.to_string()))?;

        let deleted = result.rows_affected();
        if deleted > 0 {
            info!(deleted = deleted, "Cleaned up expired sessions");
        }
        Ok(deleted)
    }
}
