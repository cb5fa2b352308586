//! Identity types for SIMCHA entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Entity identifier using UUIDv7 for timestamp-sortable IDs.
/// UUIDv7 embeds a Unix timestamp, making IDs naturally sortable by creation time.
pub type EntityId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// SHA-256 content hash for recorded-clip deduplication and integrity.
pub type ContentHash = [u8; 32];

/// Raw audio content for recorded caller input.
pub type RawContent = Vec<u8>;

/// Generate a new UUIDv7 EntityId (timestamp-sortable).
pub fn new_entity_id() -> EntityId {
    Uuid::now_v7()
}

/// Compute SHA-256 hash of content.
pub fn compute_content_hash(content: &[u8]) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// A national identity number as keyed in over the phone.
///
/// Always exactly nine ASCII digits. Construction goes through [`NationalId::parse`]
/// so a malformed value cannot exist past the input boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NationalId(String);

impl NationalId {
    /// Required digit count for a national ID.
    pub const DIGITS: usize = 9;

    /// Parse a raw digit string into a national ID.
    pub fn parse(raw: &str) -> Result<Self, NationalIdParseError> {
        if raw.len() == Self::DIGITS && raw.bytes().all(|b| b.is_ascii_digit()) {
            Ok(NationalId(raw.to_string()))
        } else {
            Err(NationalIdParseError(raw.to_string()))
        }
    }

    /// The underlying digit string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NationalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NationalId {
    type Err = NationalIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NationalId::parse(s)
    }
}

/// Error for invalid national ID strings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid national id (expected 9 digits): {0:?}")]
pub struct NationalIdParseError(pub String);
