//! Entity records for libraries, documents and chunks.
//!
//! Ownership is modeled as maps keyed by id with a child id-set on the
//! parent; children store the parent id as a plain value, never a
//! back-reference.

use crate::config::IndexParams;
use crate::id::LodestoneId;
use crate::value::Metadata;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// The kind of nearest-neighbor index backing a library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    /// Exact brute-force scan
    Linear,
    /// Inverted-file index with k-means clustering
    Ivf,
    /// Navigable small-world graph
    Nsw,
}

impl std::fmt::Display for IndexKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IndexKind::Linear => "linear",
            IndexKind::Ivf => "ivf",
            IndexKind::Nsw => "nsw",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for IndexKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linear" => Ok(IndexKind::Linear),
            "ivf" => Ok(IndexKind::Ivf),
            "nsw" => Ok(IndexKind::Nsw),
            other => Err(format!("unknown index kind: {other}")),
        }
    }
}

/// A named collection with one index; the unit of isolation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Library {
    pub id: LodestoneId,
    pub name: String,
    pub index_kind: IndexKind,
    /// Per-library index parameter overrides, immutable after creation.
    pub index_params: IndexParams,
    pub metadata: Metadata,
    pub document_ids: HashSet<LodestoneId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_built_at: Option<DateTime<Utc>>,
}

/// A grouping of chunks under one library.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: LodestoneId,
    pub library_id: LodestoneId,
    pub metadata: Metadata,
    pub chunk_ids: HashSet<LodestoneId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A text unit with metadata; the atomic search target.
///
/// The embedding vector is not stored here: it lives in the library's
/// index, which owns the vector table and the metadata snapshot filters
/// evaluate against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: LodestoneId,
    pub document_id: LodestoneId,
    pub library_id: LodestoneId,
    pub text: String,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for chunk creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkInput {
    pub text: String,
    #[serde(default)]
    pub metadata: Option<Metadata>,
    /// Parent document; a fresh document is created when absent.
    #[serde(default)]
    pub document_id: Option<LodestoneId>,
    /// Metadata for the auto-created document.
    #[serde(default)]
    pub document_metadata: Option<Metadata>,
}

/// Partial update for a chunk. An empty patch is rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkPatch {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

impl ChunkPatch {
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.metadata.is_none()
    }
}

/// Partial update for a library. An empty patch is rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LibraryPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

impl LibraryPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.metadata.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_kind_roundtrip() {
        for kind in [IndexKind::Linear, IndexKind::Ivf, IndexKind::Nsw] {
            let s = kind.to_string();
            assert_eq!(s.parse::<IndexKind>().unwrap(), kind);
        }
        assert!("hnsw".parse::<IndexKind>().is_err());
    }

    #[test]
    fn test_index_kind_serde() {
        let json = serde_json::to_string(&IndexKind::Ivf).unwrap();
        assert_eq!(json, r#""ivf""#);
        let kind: IndexKind = serde_json::from_str(r#""nsw""#).unwrap();
        assert_eq!(kind, IndexKind::Nsw);
    }

    #[test]
    fn test_patch_emptiness() {
        assert!(ChunkPatch::default().is_empty());
        assert!(LibraryPatch::default().is_empty());
        let patch = ChunkPatch {
            text: Some("hello".into()),
            metadata: None,
        };
        assert!(!patch.is_empty());
    }
}
