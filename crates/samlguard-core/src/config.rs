//! Configuration for the SP trust core.
//!
//! Plain structs with `Default` impls; the embedding application loads
//! values from its own configuration layer and calls [`TrustConfig::validate`]
//! once at startup.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration error. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing mandatory setting: {0}")]
    Missing(&'static str),

    #[error("Invalid setting {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Circuit-breaker thresholds for the revocation checker.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures within the window before the circuit opens.
    pub failure_threshold: u32,

    /// Rolling window for counting failures (seconds).
    pub window_secs: u64,

    /// How long the circuit stays open before a probe is allowed (seconds).
    pub open_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            window_secs: 300,
            open_secs: 60,
        }
    }
}

/// Revocation-checker settings.
#[derive(Debug, Clone)]
pub struct RevocationConfig {
    /// Interval between scheduled CRL checks (seconds).
    pub check_interval_secs: u64,

    /// Bounded timeout for a single CRL fetch (seconds).
    pub fetch_timeout_secs: u64,

    /// Optional PEM bundle of CRL-issuer certificates. When set, every
    /// fetched CRL must verify against one of them; verification failure
    /// invalidates all certificates of the affected entity.
    pub trust_store: Option<PathBuf>,
}

impl Default for RevocationConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 86_400,
            fetch_timeout_secs: 30,
            trust_store: None,
        }
    }
}

/// Top-level trust-core configuration.
#[derive(Debug, Clone)]
pub struct TrustConfig {
    /// Clock-skew tolerance applied to assertion time windows (minutes).
    pub clock_skew_minutes: i64,

    /// Idle threshold after which a session record is eligible for cleanup
    /// (seconds).
    pub session_max_idle_secs: u64,

    pub breaker: BreakerConfig,

    pub revocation: RevocationConfig,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            clock_skew_minutes: 5,
            session_max_idle_secs: 3600,
            breaker: BreakerConfig::default(),
            revocation: RevocationConfig::default(),
        }
    }
}

impl TrustConfig {
    /// Validate settings once at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.clock_skew_minutes < 0 {
            return Err(ConfigError::Invalid {
                name: "clock_skew_minutes",
                reason: format!("must be >= 0, got {}", self.clock_skew_minutes),
            });
        }
        if self.session_max_idle_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "session_max_idle_secs",
                reason: "must be > 0".into(),
            });
        }
        if self.breaker.failure_threshold == 0 {
            return Err(ConfigError::Invalid {
                name: "breaker.failure_threshold",
                reason: "must be > 0".into(),
            });
        }
        if self.breaker.window_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "breaker.window_secs",
                reason: "must be > 0".into(),
            });
        }
        if self.revocation.fetch_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "revocation.fetch_timeout_secs",
                reason: "must be > 0".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = TrustConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.clock_skew_minutes, 5);
        assert_eq!(config.breaker.failure_threshold, 5);
    }

    #[test]
    fn rejects_negative_skew() {
        let config = TrustConfig {
            clock_skew_minutes: -1,
            ..TrustConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { name: "clock_skew_minutes", .. })
        ));
    }

    #[test]
    fn rejects_zero_breaker_threshold() {
        let mut config = TrustConfig::default();
        config.breaker.failure_threshold = 0;
        assert!(config.validate().is_err());
    }
}
