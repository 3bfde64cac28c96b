//! Revocation checker suite, driven by a scripted fetcher and real
//! openssl-generated CRL fixtures (serial 1001 revoked, 1002 not).

use async_trait::async_trait;
use samlguard_core::{
    BreakerConfig, CircuitBreakerState, CrlFetcher, CrlSource, IdpCertificate, IdpMetadata,
    RevocationChecker, RevocationError, TrustConfig,
};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

const ENTITY_ID: &str = "https://idp.example";
const REVOKED_SERIAL: &str = "1001";
const VALID_SERIAL: &str = "1002";

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn read_fixture(name: &str) -> Vec<u8> {
    std::fs::read(fixture(name)).unwrap()
}

fn metadata() -> IdpMetadata {
    let cert_a = String::from_utf8(read_fixture("cert_a.pem")).unwrap();
    let cert_b = String::from_utf8(read_fixture("cert_b.pem")).unwrap();
    IdpMetadata {
        entity_id: ENTITY_ID.into(),
        certificates: vec![
            IdpCertificate::from_pem(&cert_a).unwrap(),
            IdpCertificate::from_pem(&cert_b).unwrap(),
        ],
        crl_sources: vec![CrlSource::Url("https://idp.example/crl.pem".into())],
    }
}

enum Step {
    Serve(Vec<u8>),
    Fail,
}

/// Scripted fetcher counting calls; an exhausted script keeps failing.
struct MockFetcher {
    script: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
}

impl MockFetcher {
    fn new(script: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CrlFetcher for MockFetcher {
    async fn fetch(&self, _source: &CrlSource) -> Result<Vec<u8>, RevocationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().await.pop_front() {
            Some(Step::Serve(bytes)) => Ok(bytes),
            Some(Step::Fail) | None => Err(RevocationError::Fetch("connection refused".into())),
        }
    }
}

fn config(failure_threshold: u32, open_secs: u64, trust_store: Option<PathBuf>) -> TrustConfig {
    let mut config = TrustConfig {
        breaker: BreakerConfig {
            failure_threshold,
            window_secs: 60,
            open_secs,
        },
        ..TrustConfig::default()
    };
    config.revocation.trust_store = trust_store;
    config
}

#[tokio::test]
async fn revoked_serial_is_excluded_from_valid_set() {
    let fetcher = MockFetcher::new(vec![Step::Serve(read_fixture("revoked.crl.pem"))]);
    let checker = RevocationChecker::new(fetcher.clone(), config(5, 60, None)).unwrap();

    let valid = checker.check_certificates(&metadata()).await;
    assert_eq!(valid, 1);
    assert!(checker.is_certificate_valid(ENTITY_ID, VALID_SERIAL).await);
    assert!(!checker.is_certificate_valid(ENTITY_ID, REVOKED_SERIAL).await);
    assert!(checker.last_checked(ENTITY_ID).await.is_some());
}

#[tokio::test]
async fn breaker_opens_past_threshold_and_stops_fetching() {
    let fetcher = MockFetcher::new(vec![]);
    let checker = RevocationChecker::new(fetcher.clone(), config(2, 3600, None)).unwrap();
    let metadata = metadata();

    for _ in 0..5 {
        checker.check_certificates(&metadata).await;
    }

    // Two failures opened the circuit; the remaining checks never reached
    // the fetcher.
    assert_eq!(fetcher.call_count(), 2);
    assert_eq!(
        checker
            .breaker_state(&metadata.crl_sources[0])
            .await,
        Some(CircuitBreakerState::Open)
    );
    // Never validated, so nothing is trusted.
    assert!(checker.valid_certificates(ENTITY_ID).await.is_empty());
}

#[tokio::test]
async fn fetch_failure_retains_last_known_valid_set() {
    let fetcher = MockFetcher::new(vec![Step::Serve(read_fixture("revoked.crl.pem")), Step::Fail]);
    let checker = RevocationChecker::new(fetcher.clone(), config(5, 60, None)).unwrap();
    let metadata = metadata();

    assert_eq!(checker.check_certificates(&metadata).await, 1);

    // Second run fails transiently: the previous set stays in use.
    assert_eq!(checker.check_certificates(&metadata).await, 1);
    assert!(checker.is_certificate_valid(ENTITY_ID, VALID_SERIAL).await);
}

#[tokio::test]
async fn transient_failure_on_one_source_keeps_its_revocations() {
    // Two sources for one entity: the first revokes serial 1001, the second
    // revokes nothing. Sources are fetched in metadata order.
    let fetcher = MockFetcher::new(vec![
        Step::Serve(read_fixture("revoked.crl.pem")),
        Step::Serve(read_fixture("empty.crl.pem")),
        Step::Fail,
        Step::Serve(read_fixture("empty.crl.pem")),
    ]);
    let checker = RevocationChecker::new(fetcher.clone(), config(5, 60, None)).unwrap();
    let mut metadata = metadata();
    metadata
        .crl_sources
        .push(CrlSource::Url("https://idp.example/crl-backup.pem".into()));

    assert_eq!(checker.check_certificates(&metadata).await, 1);
    assert!(!checker.is_certificate_valid(ENTITY_ID, REVOKED_SERIAL).await);

    // First source briefly down while the second stays fresh: its
    // previously fetched revocations must stay in force.
    assert_eq!(checker.check_certificates(&metadata).await, 1);
    assert!(!checker.is_certificate_valid(ENTITY_ID, REVOKED_SERIAL).await);
    assert!(checker.is_certificate_valid(ENTITY_ID, VALID_SERIAL).await);
    assert_eq!(fetcher.call_count(), 4);
}

#[tokio::test]
async fn crl_verified_against_configured_trust_store() {
    let fetcher = MockFetcher::new(vec![Step::Serve(read_fixture("revoked.crl.pem"))]);
    let checker =
        RevocationChecker::new(fetcher.clone(), config(5, 60, Some(fixture("ca.pem")))).unwrap();

    assert_eq!(checker.check_certificates(&metadata()).await, 1);
    assert!(checker.is_certificate_valid(ENTITY_ID, VALID_SERIAL).await);
}

#[tokio::test]
async fn signature_verification_failure_fails_closed() {
    // cert_b is not the CRL issuer, so verification cannot succeed.
    let fetcher = MockFetcher::new(vec![Step::Serve(read_fixture("revoked.crl.pem"))]);
    let checker =
        RevocationChecker::new(fetcher.clone(), config(5, 60, Some(fixture("cert_b.pem"))))
            .unwrap();

    assert_eq!(checker.check_certificates(&metadata()).await, 0);
    assert!(checker.valid_certificates(ENTITY_ID).await.is_empty());
    assert!(!checker.is_certificate_valid(ENTITY_ID, VALID_SERIAL).await);
    // A failed check is not a successful one.
    assert!(checker.last_checked(ENTITY_ID).await.is_none());
}

#[tokio::test]
async fn probe_after_cooldown_recovers_the_source() {
    // Zero cooldown: the circuit goes half-open on the next check.
    let fetcher = MockFetcher::new(vec![
        Step::Fail,
        Step::Serve(read_fixture("revoked.crl.pem")),
    ]);
    let checker = RevocationChecker::new(fetcher.clone(), config(1, 0, None)).unwrap();
    let metadata = metadata();

    assert_eq!(checker.check_certificates(&metadata).await, 0);
    assert_eq!(checker.check_certificates(&metadata).await, 1);
    assert_eq!(
        checker
            .breaker_state(&metadata.crl_sources[0])
            .await,
        Some(CircuitBreakerState::Closed)
    );
}

#[tokio::test]
async fn entity_without_crl_sources_trusts_all_metadata_certificates() {
    let fetcher = MockFetcher::new(vec![]);
    let checker = RevocationChecker::new(fetcher.clone(), config(5, 60, None)).unwrap();

    let mut entity = metadata();
    entity.crl_sources.clear();
    assert_eq!(checker.check_certificates(&entity).await, 2);
    assert_eq!(fetcher.call_count(), 0);
}

#[tokio::test]
async fn unknown_entity_is_untrusted() {
    let fetcher = MockFetcher::new(vec![]);
    let checker = RevocationChecker::new(fetcher, config(5, 60, None)).unwrap();

    assert!(checker.valid_certificates("https://never-seen.example").await.is_empty());
    assert!(
        !checker
            .is_certificate_valid("https://never-seen.example", VALID_SERIAL)
            .await
    );
    assert!(checker.last_checked("https://never-seen.example").await.is_none());
}
