//! Exact brute-force index.
//!
//! A dense table of (id, vector) pairs scanned in full per query. O(nD)
//! per query, trivially correct; the ground truth the approximate
//! indexes are measured against.

use crate::math;
use crate::{IndexStats, ScoredPoint, TopK, VectorIndex};
use lodestone_core::{Error, IndexKind, LodestoneId, Metadata, Result};
use std::collections::HashMap;

/// Dense linear-scan index.
#[derive(Debug, Default)]
pub struct LinearIndex {
    entries: Vec<(LodestoneId, Vec<f32>)>,
    positions: HashMap<LodestoneId, usize>,
    snapshots: HashMap<LodestoneId, Metadata>,
    dimension: Option<usize>,
}

impl LinearIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_dimension(&mut self, vector: &[f32]) -> Result<()> {
        match self.dimension {
            Some(expected) if expected != vector.len() => Err(Error::DimensionMismatch {
                expected,
                got: vector.len(),
            }),
            Some(_) => Ok(()),
            None => {
                self.dimension = Some(vector.len());
                Ok(())
            }
        }
    }
}

impl VectorIndex for LinearIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Linear
    }

    fn add(&mut self, id: LodestoneId, mut vector: Vec<f32>, metadata: Metadata) -> Result<()> {
        math::normalize(&mut vector)?;
        self.check_dimension(&vector)?;
        if self.positions.contains_key(&id) {
            self.remove(id);
        }
        self.positions.insert(id, self.entries.len());
        self.entries.push((id, vector));
        self.snapshots.insert(id, metadata);
        Ok(())
    }

    fn update(
        &mut self,
        id: LodestoneId,
        vector: Option<Vec<f32>>,
        metadata: Option<Metadata>,
    ) -> Result<()> {
        let pos = *self
            .positions
            .get(&id)
            .ok_or_else(|| Error::not_found("chunk", id))?;
        if let Some(mut vector) = vector {
            math::normalize(&mut vector)?;
            self.check_dimension(&vector)?;
            self.entries[pos].1 = vector;
        }
        if let Some(metadata) = metadata {
            self.snapshots.insert(id, metadata);
        }
        Ok(())
    }

    fn remove(&mut self, id: LodestoneId) {
        let Some(pos) = self.positions.remove(&id) else {
            return;
        };
        self.entries.swap_remove(pos);
        if let Some((moved, _)) = self.entries.get(pos) {
            self.positions.insert(*moved, pos);
        }
        self.snapshots.remove(&id);
    }

    fn build(&mut self) -> Result<()> {
        Ok(())
    }

    fn query(&self, query: &[f32], k: usize) -> Vec<ScoredPoint> {
        if k == 0 || self.entries.is_empty() {
            return Vec::new();
        }
        if self.dimension.is_some_and(|d| d != query.len()) {
            return Vec::new();
        }
        let mut topk = TopK::new(k);
        for (id, vector) in &self.entries {
            topk.push(ScoredPoint::new(*id, math::dot(query, vector)));
        }
        topk.into_sorted()
    }

    fn metadata(&self, id: &LodestoneId) -> Option<&Metadata> {
        self.snapshots.get(id)
    }

    fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn stats(&self) -> IndexStats {
        IndexStats {
            kind: IndexKind::Linear,
            size: self.entries.len(),
            dimension: self.dimension,
            buffered: 0,
            centroids: 0,
        }
    }
}
