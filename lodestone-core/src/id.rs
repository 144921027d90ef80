//! Unique identifier type for Lodestone entities.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A unique identifier for libraries, documents and chunks.
///
/// Uses UUIDv4 for globally unique, collision-resistant ids. The `Ord`
/// impl is part of the public contract: ranking ties are broken by
/// ascending id, so result ordering is stable across runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LodestoneId(Uuid);

impl LodestoneId {
    /// Create a new random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an id from a UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Parse from the canonical 36-character hyphenated form.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for LodestoneId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LodestoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for LodestoneId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<LodestoneId> for Uuid {
    fn from(id: LodestoneId) -> Self {
        id.0
    }
}

impl std::str::FromStr for LodestoneId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
