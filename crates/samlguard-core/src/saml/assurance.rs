//! NSIS assurance levels.
//!
//! Ordered authentication-strength classification. `None` means no level is
//! known; every named level carries a canonical NSIS URL and a legacy numeric
//! assurance-level integer kept for backward-compatible comparisons.

use serde::{Deserialize, Serialize};

/// Ranked NSIS level of assurance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AssuranceLevel {
    None = 0,
    Low = 1,
    Substantial = 2,
    High = 3,
}

impl AssuranceLevel {
    /// Canonical NSIS URL for this level. `None` has no URL.
    #[must_use]
    pub fn url(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Low => Some("https://data.gov.dk/concept/core/nsis/loa/Low"),
            Self::Substantial => Some("https://data.gov.dk/concept/core/nsis/loa/Substantial"),
            Self::High => Some("https://data.gov.dk/concept/core/nsis/loa/High"),
        }
    }

    /// Short name for this level.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Low => "Low",
            Self::Substantial => "Substantial",
            Self::High => "High",
        }
    }

    /// Legacy numeric assurance level used before NSIS URLs existed.
    #[must_use]
    pub fn legacy_level(self) -> i32 {
        match self {
            Self::None => 0,
            Self::Low => 2,
            Self::Substantial => 3,
            Self::High => 4,
        }
    }

    /// True iff this rank is less than or equal to `other`'s rank.
    ///
    /// False when `other` is absent: an existing session with no known level
    /// never satisfies a required one.
    #[must_use]
    pub fn equal_or_lesser(self, other: Option<Self>) -> bool {
        other.is_some_and(|o| self as u8 <= o as u8)
    }

    /// True iff this rank is strictly greater than `other`'s rank.
    ///
    /// True when `other` is absent: any level exceeds "no level".
    #[must_use]
    pub fn is_greater(self, other: Option<Self>) -> bool {
        other.is_none_or(|o| self as u8 > o as u8)
    }

    /// True when a session carrying only the legacy numeric attribute
    /// satisfies this required level.
    #[must_use]
    pub fn satisfied_by_legacy(self, session_level: i32) -> bool {
        session_level >= self.legacy_level()
    }

    /// Look up a level by canonical URL suffix.
    ///
    /// Unmatched or empty input returns `default`; callers that need to
    /// distinguish "not found" from "found and equals default" pass a
    /// distinguishable sentinel.
    #[must_use]
    pub fn from_url(url: &str, default: Self) -> Self {
        let trimmed = url.trim().trim_end_matches('/');
        for level in [Self::Low, Self::Substantial, Self::High] {
            let suffix = format!("/{}", level.name());
            if Some(trimmed) == level.url() || trimmed.ends_with(&suffix) {
                return level;
            }
        }
        default
    }

    /// Look up a level by its short name.
    #[must_use]
    pub fn from_attribute_value(name: &str, default: Self) -> Self {
        match name.trim() {
            "Low" => Self::Low,
            "Substantial" => Self::Substantial,
            "High" => Self::High,
            _ => default,
        }
    }
}

impl std::fmt::Display for AssuranceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
