//! CRL retrieval.

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use super::RevocationError;

/// Where a CRL for a metadata entity is published.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CrlSource {
    Url(String),
    File(PathBuf),
}

impl std::fmt::Display for CrlSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Url(url) => f.write_str(url),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Retrieves raw CRL bytes from a source. Implementations must honor a
/// bounded timeout; a timeout surfaces as a [`RevocationError`] counted by
/// the circuit breaker, never as a hard per-request error.
#[async_trait]
pub trait CrlFetcher: Send + Sync {
    async fn fetch(&self, source: &CrlSource) -> Result<Vec<u8>, RevocationError>;
}

/// Production fetcher: HTTP(S) via `reqwest`, local files via `tokio::fs`.
pub struct HttpCrlFetcher {
    client: reqwest::Client,
}

impl HttpCrlFetcher {
    pub fn new(timeout: Duration) -> Result<Self, RevocationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RevocationError::Fetch(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CrlFetcher for HttpCrlFetcher {
    async fn fetch(&self, source: &CrlSource) -> Result<Vec<u8>, RevocationError> {
        match source {
            CrlSource::Url(url) => {
                debug!(url = %url, "Fetching CRL");
                let response = self
                    .client
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| RevocationError::Fetch(e.to_string()))?;
                if !response.status().is_success() {
                    return Err(RevocationError::Fetch(format!(
                        "CRL endpoint returned {}",
                        response.status()
                    )));
                }
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| RevocationError::Fetch(e.to_string()))?;
                Ok(bytes.to_vec())
            }
            CrlSource::File(path) => {
                debug!(path = %path.display(), "Reading CRL file");
                tokio::fs::read(path)
                    .await
                    .map_err(|e| RevocationError::Fetch(e.to_string()))
            }
        }
    }
}
