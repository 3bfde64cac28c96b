//! SAML value types: parsed assertions, artifacts, assurance levels.

pub mod artifact;
pub mod assertion;
pub mod assurance;

/// Attribute name carrying the NSIS level of assurance.
pub const NSIS_LOA_ATTRIBUTE: &str = "https://data.gov.dk/concept/core/nsis/loa";

/// Legacy attribute name carrying the numeric assurance level.
pub const LEGACY_ASSURANCE_ATTRIBUTE: &str = "dk:gov:saml:attribute:AssuranceLevel";
