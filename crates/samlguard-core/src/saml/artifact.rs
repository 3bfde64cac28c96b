//! SAML 2.0 artifact codec.
//!
//! Type 0x0004 artifacts have a fixed 44-byte layout: 2-byte type code,
//! 2-byte big-endian endpoint index, 20-byte SHA-1 digest of the issuer's
//! entity ID, 20 random bytes of message handle.

use base64::{engine::general_purpose::STANDARD, Engine};
use rand::rngs::OsRng;
use rand::RngCore;
use sha1::{Digest, Sha1};
use thiserror::Error;

/// Only artifact type this codec supports.
pub const ARTIFACT_TYPE_CODE: u16 = 0x0004;

const SOURCE_ID_LEN: usize = 20;
const MESSAGE_HANDLE_LEN: usize = 20;
const ARTIFACT_LEN: usize = 4 + SOURCE_ID_LEN + MESSAGE_HANDLE_LEN;

/// Artifact decode/validation errors. Structural, never retryable.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Invalid artifact encoding: {0}")]
    Encoding(String),

    #[error("Invalid artifact length: expected {ARTIFACT_LEN} bytes, got {0}")]
    Length(usize),

    #[error("Unsupported artifact type code: 0x{0:04x}")]
    UnsupportedType(u16),

    #[error("Artifact source ID does not match any trusted issuer")]
    UnknownSourceId,
}

/// A decoded type-0x0004 SAML artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    type_code: u16,
    endpoint_index: u16,
    source_id: [u8; SOURCE_ID_LEN],
    message_handle: [u8; MESSAGE_HANDLE_LEN],
}

impl Artifact {
    /// Decode a base64 artifact parameter value.
    pub fn decode(text: &str) -> Result<Self, ArtifactError> {
        let raw = STANDARD
            .decode(text.trim())
            .map_err(|e| ArtifactError::Encoding(e.to_string()))?;
        if raw.len() != ARTIFACT_LEN {
            return Err(ArtifactError::Length(raw.len()));
        }

        let type_code = u16::from_be_bytes([raw[0], raw[1]]);
        if type_code != ARTIFACT_TYPE_CODE {
            return Err(ArtifactError::UnsupportedType(type_code));
        }

        let mut source_id = [0u8; SOURCE_ID_LEN];
        source_id.copy_from_slice(&raw[4..4 + SOURCE_ID_LEN]);
        let mut message_handle = [0u8; MESSAGE_HANDLE_LEN];
        message_handle.copy_from_slice(&raw[4 + SOURCE_ID_LEN..]);

        Ok(Self {
            type_code,
            endpoint_index: u16::from_be_bytes([raw[2], raw[3]]),
            source_id,
            message_handle,
        })
    }

    /// Encode a fresh artifact referencing `entity_id` with a random
    /// message handle.
    #[must_use]
    pub fn encode(endpoint_index: u16, entity_id: &str) -> String {
        let mut raw = Vec::with_capacity(ARTIFACT_LEN);
        raw.extend_from_slice(&ARTIFACT_TYPE_CODE.to_be_bytes());
        raw.extend_from_slice(&endpoint_index.to_be_bytes());
        raw.extend_from_slice(&source_id_for(entity_id));

        let mut handle = [0u8; MESSAGE_HANDLE_LEN];
        OsRng.fill_bytes(&mut handle);
        raw.extend_from_slice(&handle);

        STANDARD.encode(raw)
    }

    /// Big-endian endpoint index as an integer.
    #[must_use]
    pub fn endpoint_index(&self) -> u16 {
        self.endpoint_index
    }

    #[must_use]
    pub fn source_id(&self) -> &[u8; SOURCE_ID_LEN] {
        &self.source_id
    }

    #[must_use]
    pub fn message_handle(&self) -> &[u8; MESSAGE_HANDLE_LEN] {
        &self.message_handle
    }

    /// Resolve the issuer this artifact references.
    ///
    /// Compares the SHA-1 digest of each candidate entity ID byte-for-byte
    /// against the artifact's source ID and returns the first match. Fails
    /// when the artifact was not issued by any trusted party.
    pub fn resolve_issuer<'a, I>(&self, candidates: I) -> Result<&'a str, ArtifactError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        candidates
            .into_iter()
            .find(|entity_id| source_id_for(entity_id) == self.source_id)
            .ok_or(ArtifactError::UnknownSourceId)
    }
}

fn source_id_for(entity_id: &str) -> [u8; SOURCE_ID_LEN] {
    let digest = Sha1::digest(entity_id.as_bytes());
    let mut out = [0u8; SOURCE_ID_LEN];
    out.copy_from_slice(&digest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_base64() {
        assert!(matches!(
            Artifact::decode("!!not base64!!"),
            Err(ArtifactError::Encoding(_))
        ));
    }

    #[test]
    fn rejects_wrong_length() {
        let short = STANDARD.encode([0u8; 10]);
        assert!(matches!(
            Artifact::decode(&short),
            Err(ArtifactError::Length(10))
        ));
    }

    #[test]
    fn rejects_unsupported_type_code() {
        let mut raw = vec![0x00, 0x02];
        raw.extend_from_slice(&[0u8; 42]);
        let text = STANDARD.encode(raw);
        assert!(matches!(
            Artifact::decode(&text),
            Err(ArtifactError::UnsupportedType(0x0002))
        ));
    }

    #[test]
    fn endpoint_index_is_big_endian() {
        let text = Artifact::encode(0x0102, "https://idp.example");
        let artifact = Artifact::decode(&text).unwrap();
        assert_eq!(artifact.endpoint_index(), 0x0102);
    }

    #[test]
    fn message_handles_are_unique() {
        let a = Artifact::decode(&Artifact::encode(1, "https://idp.example")).unwrap();
        let b = Artifact::decode(&Artifact::encode(1, "https://idp.example")).unwrap();
        assert_ne!(a.message_handle(), b.message_handle());
        assert_eq!(a.source_id(), b.source_id());
    }
}
