//! Nearest-neighbor indexes for Lodestone.
//!
//! Three interchangeable implementations behind one [`VectorIndex`]
//! contract:
//!
//! - [`LinearIndex`]: exact brute-force cosine scan, the ground truth
//! - [`IvfIndex`]: inverted-file index with k-means clustering
//! - [`NswIndex`]: incremental navigable small-world graph
//!
//! Indexes are synchronous and single-writer: the engine serializes
//! writes through a per-library lock, so no index suspends or blocks
//! internally. Scores are cosine similarities over unit vectors and
//! result ordering is always (score descending, id ascending).

pub mod ivf;
pub mod linear;
pub mod math;
pub mod nsw;

use lodestone_core::{IndexConfig, IndexKind, LodestoneId, Metadata, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

pub use ivf::IvfIndex;
pub use linear::LinearIndex;
pub use nsw::NswIndex;

/// A ranked candidate returned by [`VectorIndex::query`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredPoint {
    pub id: LodestoneId,
    pub score: f32,
}

impl ScoredPoint {
    pub fn new(id: LodestoneId, score: f32) -> Self {
        Self { id, score }
    }

    /// Ranking order: score descending, id ascending. `Less` means
    /// "ranks earlier". Stable tie-breaks are a public behavior.
    pub fn ranking_cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Heap entry ordered so the greatest element is the worst-ranked
/// candidate; `BinaryHeap::pop` then evicts the right one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Ranked(pub ScoredPoint);

impl Eq for Ranked {}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.ranking_cmp(&other.0)
    }
}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Bounded top-k accumulator used by every index's query path.
pub(crate) struct TopK {
    k: usize,
    heap: BinaryHeap<Ranked>,
}

impl TopK {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k + 1),
        }
    }

    pub fn push(&mut self, point: ScoredPoint) {
        if self.k == 0 {
            return;
        }
        self.heap.push(Ranked(point));
        if self.heap.len() > self.k {
            self.heap.pop();
        }
    }

    /// Drain into a ranked vec (score descending, id ascending).
    pub fn into_sorted(self) -> Vec<ScoredPoint> {
        let mut out: Vec<ScoredPoint> = self.heap.into_iter().map(|r| r.0).collect();
        out.sort_by(ScoredPoint::ranking_cmp);
        out
    }
}

/// Introspection snapshot of an index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    pub kind: IndexKind,
    pub size: usize,
    pub dimension: Option<usize>,
    /// IVF only: inserts staged ahead of the next build
    pub buffered: usize,
    /// IVF only: centroid count after the last build
    pub centroids: usize,
}

/// Common contract implemented by all indexes.
///
/// `add`/`update`/`remove` keep the structure incrementally correct;
/// `build` is the IVF train step and a no-op elsewhere; `query` returns
/// up to `k` candidates by descending cosine with no metadata filtering.
pub trait VectorIndex: Send + Sync {
    /// Which implementation this is.
    fn kind(&self) -> IndexKind;

    /// Insert a vector with its metadata snapshot. Re-adding an existing
    /// id removes the old entry first. The first successful add fixes
    /// the index dimension.
    fn add(&mut self, id: LodestoneId, vector: Vec<f32>, metadata: Metadata) -> Result<()>;

    /// Re-link an entry in place. A new vector re-positions the entry
    /// (the NSW graph re-inserts); a metadata-only change refreshes the
    /// snapshot without touching topology.
    fn update(
        &mut self,
        id: LodestoneId,
        vector: Option<Vec<f32>>,
        metadata: Option<Metadata>,
    ) -> Result<()>;

    /// Remove an entry. Unknown ids are a no-op.
    fn remove(&mut self, id: LodestoneId);

    /// Consolidate the index. Callable repeatedly; expensive only for IVF.
    fn build(&mut self) -> Result<()>;

    /// Top-`k` candidates by descending cosine, ties by ascending id.
    fn query(&self, query: &[f32], k: usize) -> Vec<ScoredPoint>;

    /// Metadata snapshot as of the entry's last add/update.
    fn metadata(&self, id: &LodestoneId) -> Option<&Metadata>;

    /// Whether the index holds this id.
    fn contains(&self, id: &LodestoneId) -> bool {
        self.metadata(id).is_some()
    }

    /// Vector dimension, fixed by the first insert.
    fn dimension(&self) -> Option<usize>;

    /// Number of indexed entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Introspection snapshot.
    fn stats(&self) -> IndexStats;
}

/// Build an index instance for a library.
pub fn build_index(kind: IndexKind, config: &IndexConfig) -> Box<dyn VectorIndex> {
    match kind {
        IndexKind::Linear => Box::new(LinearIndex::new()),
        IndexKind::Ivf => Box::new(IvfIndex::new(config)),
        IndexKind::Nsw => Box::new(NswIndex::new(config)),
    }
}
