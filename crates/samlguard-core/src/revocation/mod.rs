//! Certificate revocation checking.
//!
//! Fetches the CRLs configured for each metadata entity, optionally verifies
//! their issuer signature against a trust store, and recomputes the entity's
//! valid-certificate set as metadata certificates minus revoked serials.
//! Each CRL source sits behind its own circuit breaker so a failing endpoint
//! cannot stall authentication; the cached valid set is swapped atomically
//! and read concurrently by credential-trust decisions.
//!
//! Failure policy: a transient fetch or parse failure fails open (the last
//! known valid set stays in use), a CRL signature-verification failure fails
//! closed (every certificate of the entity is marked invalid). Each source's
//! last fetched revocation set is remembered, so a source that is briefly
//! down or breaker-skipped keeps its revocations in force while sibling
//! sources refresh.

mod circuit_breaker;
mod fetcher;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerState};
pub use fetcher::{CrlFetcher, CrlSource, HttpCrlFetcher};

use chrono::{DateTime, Utc};
use openssl::x509::{X509Crl, X509};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::TrustConfig;

/// Revocation-check failures. Absorbed by the circuit breaker and logged;
/// never surfaced on the authentication hot path.
#[derive(Debug, Error)]
pub enum RevocationError {
    #[error("CRL fetch failed: {0}")]
    Fetch(String),

    #[error("CRL parse failed: {0}")]
    Parse(String),

    #[error("CRL signature verification failed: {0}")]
    SignatureInvalid(String),

    #[error("Trust store error: {0}")]
    TrustStore(String),

    #[error("Certificate parse failed: {0}")]
    Certificate(String),
}

/// An IdP signing/encryption certificate taken from metadata.
#[derive(Debug, Clone)]
pub struct IdpCertificate {
    /// PEM-encoded certificate.
    pub pem: String,
    /// Uppercase-hex serial number, the key CRLs revoke by.
    pub serial: String,
}

impl IdpCertificate {
    /// Parse a PEM certificate and extract its serial number.
    pub fn from_pem(pem: &str) -> Result<Self, RevocationError> {
        let cert = X509::from_pem(pem.as_bytes())
            .map_err(|e| RevocationError::Certificate(e.to_string()))?;
        let serial = cert
            .serial_number()
            .to_bn()
            .and_then(|bn| bn.to_hex_str().map(|s| s.to_string()))
            .map_err(|e| RevocationError::Certificate(e.to_string()))?;
        Ok(Self {
            pem: pem.to_owned(),
            serial,
        })
    }
}

/// Already-parsed metadata for one Identity Provider entity.
#[derive(Debug, Clone)]
pub struct IdpMetadata {
    pub entity_id: String,
    pub certificates: Vec<IdpCertificate>,
    pub crl_sources: Vec<CrlSource>,
}

#[derive(Debug, Default, Clone)]
struct EntityState {
    valid_serials: HashSet<String>,
    last_checked: Option<DateTime<Utc>>,
}

/// CRL-driven revocation checker with per-source circuit breakers.
pub struct RevocationChecker {
    fetcher: Arc<dyn CrlFetcher>,
    config: TrustConfig,
    trust_store: Option<Vec<X509>>,
    breakers: Mutex<HashMap<CrlSource, CircuitBreaker>>,
    source_revocations: Mutex<HashMap<CrlSource, HashSet<String>>>,
    states: RwLock<HashMap<String, EntityState>>,
    running: RwLock<bool>,
}

impl RevocationChecker {
    /// Build a checker. Loads the trust-store PEM bundle, when configured,
    /// once at startup.
    pub fn new(fetcher: Arc<dyn CrlFetcher>, config: TrustConfig) -> Result<Self, RevocationError> {
        let trust_store = match &config.revocation.trust_store {
            Some(path) => {
                let bytes = std::fs::read(path).map_err(|e| {
                    RevocationError::TrustStore(format!("{}: {e}", path.display()))
                })?;
                let certs = X509::stack_from_pem(&bytes)
                    .map_err(|e| RevocationError::TrustStore(e.to_string()))?;
                if certs.is_empty() {
                    return Err(RevocationError::TrustStore(format!(
                        "{} contains no certificates",
                        path.display()
                    )));
                }
                info!(
                    path = %path.display(),
                    certificates = certs.len(),
                    "Loaded CRL trust store"
                );
                Some(certs)
            }
            None => None,
        };
        Ok(Self {
            fetcher,
            config,
            trust_store,
            breakers: Mutex::new(HashMap::new()),
            source_revocations: Mutex::new(HashMap::new()),
            states: RwLock::new(HashMap::new()),
            running: RwLock::new(false),
        })
    }

    /// Checker with the production HTTP/file fetcher.
    pub fn with_http_fetcher(config: TrustConfig) -> Result<Self, RevocationError> {
        let fetcher = HttpCrlFetcher::new(Duration::from_secs(
            config.revocation.fetch_timeout_secs,
        ))?;
        Self::new(Arc::new(fetcher), config)
    }

    /// Run the configured CRL checks for one metadata entity and recompute
    /// its valid-certificate set.
    ///
    /// Returns the size of the resulting valid set. Per-source failures are
    /// absorbed: an open breaker or a transient failure leaves the last
    /// known set in place, while a signature-verification failure empties it.
    pub async fn check_certificates(&self, metadata: &IdpMetadata) -> usize {
        let mut revoked: HashSet<String> = HashSet::new();
        let mut fresh_sources = 0usize;
        let mut signature_failed = false;

        for source in &metadata.crl_sources {
            let allowed = {
                let mut breakers = self.breakers.lock().await;
                breakers
                    .entry(source.clone())
                    .or_insert_with(|| CircuitBreaker::new(&self.config.breaker))
                    .should_allow_check()
            };
            if !allowed {
                debug!(
                    entity_id = %metadata.entity_id,
                    source = %source,
                    "CRL source skipped, circuit open"
                );
                self.extend_with_cached(source, &mut revoked).await;
                continue;
            }

            match self.fetch_and_parse(source).await {
                Ok(serials) => {
                    self.record_outcome(source, true).await;
                    debug!(
                        entity_id = %metadata.entity_id,
                        source = %source,
                        revoked = serials.len(),
                        "CRL checked"
                    );
                    self.source_revocations
                        .lock()
                        .await
                        .insert(source.clone(), serials.clone());
                    revoked.extend(serials);
                    fresh_sources += 1;
                }
                Err(RevocationError::SignatureInvalid(reason)) => {
                    self.record_outcome(source, false).await;
                    warn!(
                        entity_id = %metadata.entity_id,
                        source = %source,
                        reason = %reason,
                        "CRL signature verification failed, invalidating all entity certificates"
                    );
                    signature_failed = true;
                }
                Err(err) => {
                    self.record_outcome(source, false).await;
                    warn!(
                        entity_id = %metadata.entity_id,
                        source = %source,
                        error = %err,
                        "CRL check failed, retaining last known revocations"
                    );
                    self.extend_with_cached(source, &mut revoked).await;
                }
            }
        }

        let mut states = self.states.write().await;
        let state = states.entry(metadata.entity_id.clone()).or_default();

        if signature_failed {
            // Fail closed: an unverifiable CRL may hide revocations.
            // `last_checked` stays at the last successful check.
            state.valid_serials = HashSet::new();
            return 0;
        }

        if fresh_sources == 0 && !metadata.crl_sources.is_empty() {
            // Fail open: nothing fresh, keep what we knew. Entities never
            // validated before simply stay invalid.
            return state.valid_serials.len();
        }

        let valid: HashSet<String> = metadata
            .certificates
            .iter()
            .map(|c| c.serial.clone())
            .filter(|serial| !revoked.contains(serial))
            .collect();
        info!(
            entity_id = %metadata.entity_id,
            valid = valid.len(),
            revoked = metadata.certificates.len() - valid.len(),
            "Recomputed valid certificate set"
        );
        state.valid_serials = valid;
        state.last_checked = Some(Utc::now());
        state.valid_serials.len()
    }

    /// Current valid-certificate serials for an entity. Unknown entities
    /// yield an empty set: a certificate never validated is not trusted.
    pub async fn valid_certificates(&self, entity_id: &str) -> HashSet<String> {
        let states = self.states.read().await;
        states
            .get(entity_id)
            .map(|s| s.valid_serials.clone())
            .unwrap_or_default()
    }

    /// Whether a specific certificate serial is currently trusted.
    pub async fn is_certificate_valid(&self, entity_id: &str, serial: &str) -> bool {
        let states = self.states.read().await;
        states
            .get(entity_id)
            .is_some_and(|s| s.valid_serials.contains(serial))
    }

    /// Timestamp of the last successful check for an entity.
    pub async fn last_checked(&self, entity_id: &str) -> Option<DateTime<Utc>> {
        let states = self.states.read().await;
        states.get(entity_id).and_then(|s| s.last_checked)
    }

    /// Breaker state for a CRL source, mainly for health reporting.
    pub async fn breaker_state(&self, source: &CrlSource) -> Option<CircuitBreakerState> {
        let breakers = self.breakers.lock().await;
        breakers.get(source).map(CircuitBreaker::state)
    }

    /// Periodically re-run `check_certificates` for all entities until
    /// [`stop`](Self::stop) is called. Runs off the authentication hot path;
    /// the caller spawns this on its runtime.
    pub async fn run_periodic(&self, metadata: &[IdpMetadata], interval: Duration) {
        *self.running.write().await = true;
        info!(
            interval_secs = interval.as_secs(),
            entities = metadata.len(),
            "Revocation checker started"
        );
        while *self.running.read().await {
            tokio::time::sleep(interval).await;
            if !*self.running.read().await {
                break;
            }
            for entity in metadata {
                self.check_certificates(entity).await;
            }
        }
        info!("Revocation checker stopped");
    }

    /// Stop the periodic loop.
    pub async fn stop(&self) {
        *self.running.write().await = false;
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// Union the source's last fetched revocations into `revoked`, so an
    /// unavailable source cannot silently un-revoke its certificates.
    async fn extend_with_cached(&self, source: &CrlSource, revoked: &mut HashSet<String>) {
        if let Some(cached) = self.source_revocations.lock().await.get(source) {
            revoked.extend(cached.iter().cloned());
        }
    }

    async fn record_outcome(&self, source: &CrlSource, success: bool) {
        let mut breakers = self.breakers.lock().await;
        if let Some(breaker) = breakers.get_mut(source) {
            if success {
                breaker.record_success();
            } else {
                breaker.record_failure();
            }
        }
    }

    async fn fetch_and_parse(&self, source: &CrlSource) -> Result<HashSet<String>, RevocationError> {
        let bytes = self.fetcher.fetch(source).await?;
        let crl = parse_crl(&bytes)?;

        if let Some(trust_store) = &self.trust_store {
            let verified = trust_store.iter().any(|cert| {
                cert.public_key()
                    .and_then(|key| crl.verify(&key))
                    .unwrap_or(false)
            });
            if !verified {
                return Err(RevocationError::SignatureInvalid(
                    "no trust-store certificate verifies this CRL".into(),
                ));
            }
        }

        let mut serials = HashSet::new();
        if let Some(revoked) = crl.get_revoked() {
            for entry in revoked {
                let serial = entry
                    .serial_number()
                    .to_bn()
                    .and_then(|bn| bn.to_hex_str().map(|s| s.to_string()))
                    .map_err(|e| RevocationError::Parse(e.to_string()))?;
                serials.insert(serial);
            }
        }
        Ok(serials)
    }
}

fn parse_crl(bytes: &[u8]) -> Result<X509Crl, RevocationError> {
    X509Crl::from_pem(bytes)
        .or_else(|_| X509Crl::from_der(bytes))
        .map_err(|e| RevocationError::Parse(e.to_string()))
}
