//! Inverted-file index with k-means clustering.
//!
//! Inserts land in an unclustered buffer until [`VectorIndex::build`]
//! trains centroids (k-means++ init, Lloyd refinement) and distributes
//! every vector into per-centroid inverted lists. Queries probe the
//! `n_probes` nearest centroids and always scan the buffer too, so the
//! window between insert and rebuild degrades recall gracefully instead
//! of dropping entries.

use crate::math;
use crate::{IndexStats, ScoredPoint, TopK, VectorIndex};
use lodestone_core::{Error, IndexConfig, IndexKind, LodestoneId, Metadata, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Where an entry currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Buffer(usize),
    List { list: usize, offset: usize },
}

/// Inverted-file index.
pub struct IvfIndex {
    config: IndexConfig,
    /// Inserts staged ahead of the next build.
    buffer: Vec<(LodestoneId, Vec<f32>)>,
    /// One inverted list per centroid.
    lists: Vec<Vec<(LodestoneId, Vec<f32>)>>,
    /// Unit-norm centroids; empty until the first build.
    centroids: Vec<Vec<f32>>,
    /// Sparse lookup avoiding list scans on remove/update.
    slots: HashMap<LodestoneId, Slot>,
    snapshots: HashMap<LodestoneId, Metadata>,
    dimension: Option<usize>,
    rng: StdRng,
}

impl IvfIndex {
    pub fn new(config: &IndexConfig) -> Self {
        Self {
            rng: StdRng::seed_from_u64(config.seed),
            config: config.clone(),
            buffer: Vec::new(),
            lists: Vec::new(),
            centroids: Vec::new(),
            slots: HashMap::new(),
            snapshots: HashMap::new(),
            dimension: None,
        }
    }

    /// Whether the index has been trained.
    pub fn is_built(&self) -> bool {
        !self.centroids.is_empty()
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

    fn push_to_buffer(&mut self, id: LodestoneId, vector: Vec<f32>) {
        self.slots.insert(id, Slot::Buffer(self.buffer.len()));
        self.buffer.push((id, vector));
    }

    /// Number of clusters to train, clamped to the population.
    fn target_clusters(&self, n: usize) -> usize {
        let k = self
            .config
            .ivf_n_clusters
            .unwrap_or_else(|| (n as f32 * self.config.ivf_cluster_ratio).round() as usize);
        k.clamp(1, n)
    }

    /// k-means++ seeding: first centroid uniform, every next one with
    /// probability proportional to squared distance to the nearest
    /// chosen centroid. Returns `None` when the data is degenerate
    /// (all remaining mass at distance zero).
    fn seed_centroids(&mut self, points: &[(LodestoneId, Vec<f32>)], k: usize) -> Option<Vec<Vec<f32>>> {
        let first = self.rng.random_range(0..points.len());
        let mut centroids = vec![points[first].1.clone()];

        let mut nearest_sq: Vec<f64> = points
            .iter()
            .map(|(_, v)| math::squared_distance(v, &centroids[0]) as f64)
            .collect();

        while centroids.len() < k {
            let total: f64 = nearest_sq.iter().sum();
            if total <= 0.0 {
                return None;
            }
            let mut target = self.rng.random::<f64>() * total;
            let mut chosen = points.len() - 1;
            for (i, d) in nearest_sq.iter().enumerate() {
                target -= d;
                if target <= 0.0 {
                    chosen = i;
                    break;
                }
            }
            let centroid = points[chosen].1.clone();
            for (i, (_, v)) in points.iter().enumerate() {
                let d = math::squared_distance(v, &centroid) as f64;
                if d < nearest_sq[i] {
                    nearest_sq[i] = d;
                }
            }
            centroids.push(centroid);
        }
        Some(centroids)
    }

    /// Lloyd refinement until `max_iter` or summed centroid shift drops
    /// below tolerance. Empty clusters are re-seeded to the point
    /// farthest from its current centroid.
    fn refine(
        &self,
        points: &[(LodestoneId, Vec<f32>)],
        mut centroids: Vec<Vec<f32>>,
    ) -> Vec<Vec<f32>> {
        let dimension = self.dimension.unwrap_or(0);
        let k = centroids.len();

        for iteration in 0..self.config.ivf_max_iter {
            let assignments: Vec<usize> = points
                .iter()
                .map(|(_, v)| nearest_by_distance(v, &centroids))
                .collect();

            let mut sums = vec![vec![0.0f32; dimension]; k];
            let mut counts = vec![0usize; k];
            for ((_, v), &cluster) in points.iter().zip(assignments.iter()) {
                for (acc, x) in sums[cluster].iter_mut().zip(v.iter()) {
                    *acc += x;
                }
                counts[cluster] += 1;
            }

            let mut shift = 0.0f32;
            for cluster in 0..k {
                if counts[cluster] == 0 {
                    // Re-seed to the point farthest from its centroid.
                    let mut far_idx = 0usize;
                    let mut far_d = -1.0f32;
                    for (i, (_, v)) in points.iter().enumerate() {
                        let d = math::squared_distance(v, &centroids[assignments[i]]);
                        if d > far_d {
                            far_d = d;
                            far_idx = i;
                        }
                    }
                    let v = points[far_idx].1.clone();
                    shift += math::squared_distance(&v, &centroids[cluster]).sqrt();
                    centroids[cluster] = v;
                    continue;
                }
                let mut mean = sums[cluster].clone();
                for x in mean.iter_mut() {
                    *x /= counts[cluster] as f32;
                }
                shift += math::squared_distance(&mean, &centroids[cluster]).sqrt();
                centroids[cluster] = mean;
            }

            if shift < self.config.ivf_tolerance {
                debug!(iteration, shift, "k-means converged");
                break;
            }
        }
        centroids
    }

    /// Collapse to one centroid over all points. The escape hatch for
    /// degenerate data where k-means cannot spread seeds.
    fn single_cluster(&mut self, points: Vec<(LodestoneId, Vec<f32>)>) -> Result<()> {
        let dimension = self.dimension.unwrap_or(0);
        let centroid = math::mean_centroid(points.iter().map(|(_, v)| v.as_slice()), dimension)
            .unwrap_or_else(|_| points[0].1.clone());
        self.centroids = vec![centroid];
        self.lists = vec![points];
        self.buffer.clear();
        self.reindex_slots();
        Ok(())
    }

    fn reindex_slots(&mut self) {
        self.slots.clear();
        for (list, entries) in self.lists.iter().enumerate() {
            for (offset, (id, _)) in entries.iter().enumerate() {
                self.slots.insert(*id, Slot::List { list, offset });
            }
        }
        for (offset, (id, _)) in self.buffer.iter().enumerate() {
            self.slots.insert(*id, Slot::Buffer(offset));
        }
    }

    fn scan_all<'a>(&'a self) -> impl Iterator<Item = &'a (LodestoneId, Vec<f32>)> {
        self.buffer.iter().chain(self.lists.iter().flatten())
    }
}

/// Index of the nearest centroid by Euclidean distance; valid during
/// training where centroids are un-normalized means.
fn nearest_by_distance(point: &[f32], centroids: &[Vec<f32>]) -> usize {
    let mut best = 0;
    let mut best_d = f32::INFINITY;
    for (i, c) in centroids.iter().enumerate() {
        let d = math::squared_distance(point, c);
        if d < best_d {
            best_d = d;
            best = i;
        }
    }
    best
}

/// Index of the nearest unit-norm centroid by cosine.
fn nearest_by_cosine(point: &[f32], centroids: &[Vec<f32>]) -> usize {
    let mut best = 0;
    let mut best_score = f32::NEG_INFINITY;
    for (i, c) in centroids.iter().enumerate() {
        let score = math::dot(point, c);
        if score > best_score {
            best_score = score;
            best = i;
        }
    }
    best
}

impl VectorIndex for IvfIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Ivf
    }

    fn add(&mut self, id: LodestoneId, mut vector: Vec<f32>, metadata: Metadata) -> Result<()> {
        math::normalize(&mut vector)?;
        self.check_dimension(&vector)?;
        if self.slots.contains_key(&id) {
            self.remove(id);
        }
        self.push_to_buffer(id, vector);
        self.snapshots.insert(id, metadata);
        Ok(())
    }

    fn update(
        &mut self,
        id: LodestoneId,
        vector: Option<Vec<f32>>,
        metadata: Option<Metadata>,
    ) -> Result<()> {
        if !self.slots.contains_key(&id) {
            return Err(Error::not_found("chunk", id));
        }
        if let Some(mut vector) = vector {
            math::normalize(&mut vector)?;
            self.check_dimension(&vector)?;
            // Re-position through the buffer; the next build re-clusters.
            self.remove_entry(id);
            self.push_to_buffer(id, vector);
        }
        if let Some(metadata) = metadata {
            self.snapshots.insert(id, metadata);
        }
        Ok(())
    }

    fn remove(&mut self, id: LodestoneId) {
        self.remove_entry(id);
        self.snapshots.remove(&id);
    }

    fn build(&mut self) -> Result<()> {
        let mut points: Vec<(LodestoneId, Vec<f32>)> = std::mem::take(&mut self.buffer);
        for list in std::mem::take(&mut self.lists) {
            points.extend(list);
        }
        if points.is_empty() {
            self.centroids.clear();
            self.slots.clear();
            return Ok(());
        }

        let k = self.target_clusters(points.len());
        debug!(size = points.len(), clusters = k, "training IVF index");

        let Some(seeded) = self.seed_centroids(&points, k) else {
            warn!("degenerate vector set, falling back to a single cluster");
            return self.single_cluster(points);
        };

        let mut centroids = self.refine(&points, seeded);

        // Unit-norm centroids so probe scoring is a dot product. A mean
        // can cancel to zero; re-seed such centroids from the data.
        for (i, centroid) in centroids.iter_mut().enumerate() {
            if math::normalize(centroid).is_err() {
                let fallback = points[i % points.len()].1.clone();
                *centroid = fallback;
            }
        }

        let mut lists: Vec<Vec<(LodestoneId, Vec<f32>)>> = vec![Vec::new(); centroids.len()];
        for (id, vector) in points {
            let cluster = nearest_by_cosine(&vector, &centroids);
            lists[cluster].push((id, vector));
        }

        self.centroids = centroids;
        self.lists = lists;
        self.reindex_slots();
        Ok(())
    }

    fn query(&self, query: &[f32], k: usize) -> Vec<ScoredPoint> {
        if k == 0 || self.slots.is_empty() {
            return Vec::new();
        }
        if self.dimension.is_some_and(|d| d != query.len()) {
            return Vec::new();
        }
        let mut topk = TopK::new(k);

        if !self.is_built() {
            // Never trained: exact scan keeps results correct.
            for (id, vector) in self.scan_all() {
                topk.push(ScoredPoint::new(*id, math::dot(query, vector)));
            }
            return topk.into_sorted();
        }

        let mut ranked: Vec<(usize, f32)> = self
            .centroids
            .iter()
            .enumerate()
            .map(|(i, c)| (i, math::dot(query, c)))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let probes = self.config.ivf_n_probes.clamp(1, self.centroids.len());
        for &(list, _) in ranked.iter().take(probes) {
            for (id, vector) in &self.lists[list] {
                topk.push(ScoredPoint::new(*id, math::dot(query, vector)));
            }
        }
        // The buffer is always probed; staged inserts stay searchable.
        for (id, vector) in &self.buffer {
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
        self.slots.len()
    }

    fn stats(&self) -> IndexStats {
        IndexStats {
            kind: IndexKind::Ivf,
            size: self.slots.len(),
            dimension: self.dimension,
            buffered: self.buffer.len(),
            centroids: self.centroids.len(),
        }
    }
}

impl IvfIndex {
    /// Remove an entry from its slot, repairing the slot displaced by
    /// the swap. Leaves the metadata snapshot alone.
    fn remove_entry(&mut self, id: LodestoneId) {
        let Some(slot) = self.slots.remove(&id) else {
            return;
        };
        match slot {
            Slot::Buffer(offset) => {
                self.buffer.swap_remove(offset);
                if let Some((moved, _)) = self.buffer.get(offset) {
                    self.slots.insert(*moved, Slot::Buffer(offset));
                }
            }
            Slot::List { list, offset } => {
                self.lists[list].swap_remove(offset);
                if let Some((moved, _)) = self.lists[list].get(offset) {
                    self.slots.insert(*moved, Slot::List { list, offset });
                }
            }
        }
    }
}
