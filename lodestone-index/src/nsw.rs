//! Incremental navigable small-world graph.
//!
//! Every node keeps at most `m` scored neighbors. Inserts beam-search
//! the existing graph for candidates, then keep only diverse ones: a
//! candidate is accepted when it is closer to the new vector than to
//! any neighbor already accepted, which prunes redundant same-cluster
//! links and preserves long-range connectivity. The graph is always
//! query-ready, so `build` is a no-op.

use crate::math;
use crate::{IndexStats, Ranked, ScoredPoint, VectorIndex};
use lodestone_core::{Error, IndexConfig, IndexKind, LodestoneId, Metadata, Result};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet};
use tracing::debug;

#[derive(Debug)]
struct Node {
    vector: Vec<f32>,
    /// Scored adjacency, best neighbor first.
    neighbors: Vec<(LodestoneId, f32)>,
}

/// Navigable small-world graph index.
pub struct NswIndex {
    m: usize,
    ef_construction: usize,
    ef_search: usize,
    nodes: HashMap<LodestoneId, Node>,
    snapshots: HashMap<LodestoneId, Metadata>,
    /// Search start; stable across inserts, reseeded to the smallest
    /// remaining id when the current entry is deleted.
    entry_point: Option<LodestoneId>,
    dimension: Option<usize>,
}

impl NswIndex {
    pub fn new(config: &IndexConfig) -> Self {
        Self {
            m: config.nsw_m.max(1),
            ef_construction: config.nsw_ef_construction.max(1),
            ef_search: config.nsw_ef_search.max(1),
            nodes: HashMap::new(),
            snapshots: HashMap::new(),
            entry_point: None,
            dimension: None,
        }
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

    /// Greedy beam search from the entry point. Returns up to `ef`
    /// nodes nearest to `query`, best first.
    fn beam_search(&self, query: &[f32], ef: usize) -> Vec<ScoredPoint> {
        let Some(entry) = self.entry_point else {
            return Vec::new();
        };
        let entry_score = math::dot(query, &self.nodes[&entry].vector);
        let seed = ScoredPoint::new(entry, entry_score);

        let mut visited: HashSet<LodestoneId> = HashSet::new();
        visited.insert(entry);
        // Frontier pops the best unexpanded candidate; results evict
        // their worst once `ef` is reached.
        let mut frontier: BinaryHeap<Reverse<Ranked>> = BinaryHeap::new();
        let mut results: BinaryHeap<Ranked> = BinaryHeap::new();
        frontier.push(Reverse(Ranked(seed)));
        results.push(Ranked(seed));

        while let Some(Reverse(Ranked(candidate))) = frontier.pop() {
            if results.len() >= ef {
                let worst = match results.peek() {
                    Some(entry) => entry.0,
                    None => break,
                };
                if candidate.ranking_cmp(&worst) == Ordering::Greater {
                    break;
                }
            }
            let Some(node) = self.nodes.get(&candidate.id) else {
                continue;
            };
            for (neighbor, _) in &node.neighbors {
                if !visited.insert(*neighbor) {
                    continue;
                }
                let Some(neighbor_node) = self.nodes.get(neighbor) else {
                    continue;
                };
                let point = ScoredPoint::new(*neighbor, math::dot(query, &neighbor_node.vector));
                if results.len() < ef {
                    results.push(Ranked(point));
                    frontier.push(Reverse(Ranked(point)));
                } else if results
                    .peek()
                    .is_some_and(|worst| point.ranking_cmp(&worst.0) == Ordering::Less)
                {
                    results.pop();
                    results.push(Ranked(point));
                    frontier.push(Reverse(Ranked(point)));
                }
            }
        }

        let mut out: Vec<ScoredPoint> = results.into_iter().map(|r| r.0).collect();
        out.sort_by(ScoredPoint::ranking_cmp);
        out
    }

    /// Diversity heuristic: walk candidates best-first and accept one
    /// only when it is closer to the anchor its scores were computed
    /// against than to every neighbor accepted so far.
    fn select_diverse(
        &self,
        candidates: &[ScoredPoint],
        limit: usize,
    ) -> Vec<(LodestoneId, f32)> {
        let mut selected: Vec<(LodestoneId, f32)> = Vec::new();
        for candidate in candidates {
            if selected.len() >= limit {
                break;
            }
            let Some(candidate_node) = self.nodes.get(&candidate.id) else {
                continue;
            };
            let diverse = selected.iter().all(|(accepted, _)| {
                let accepted_vec = &self.nodes[accepted].vector;
                candidate.score > math::dot(&candidate_node.vector, accepted_vec)
            });
            if diverse {
                selected.push((candidate.id, candidate.score));
            }
        }
        selected
    }

    /// Re-apply the selection heuristic to a node whose adjacency
    /// overflowed `m`, keeping the best-diversified subset.
    fn trim_neighbors(&mut self, id: LodestoneId) {
        let candidates: Vec<ScoredPoint> = {
            let node = &self.nodes[&id];
            let mut points: Vec<ScoredPoint> = node
                .neighbors
                .iter()
                .map(|(nid, score)| ScoredPoint::new(*nid, *score))
                .collect();
            points.sort_by(ScoredPoint::ranking_cmp);
            points
        };
        let trimmed = self.select_diverse(&candidates, self.m);
        if let Some(node) = self.nodes.get_mut(&id) {
            node.neighbors = trimmed;
        }
    }

    fn sort_adjacency(neighbors: &mut [(LodestoneId, f32)]) {
        neighbors.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    }
}

impl VectorIndex for NswIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Nsw
    }

    fn add(&mut self, id: LodestoneId, mut vector: Vec<f32>, metadata: Metadata) -> Result<()> {
        math::normalize(&mut vector)?;
        self.check_dimension(&vector)?;
        if self.nodes.contains_key(&id) {
            self.remove(id);
        }

        if self.nodes.is_empty() {
            self.nodes.insert(
                id,
                Node {
                    vector,
                    neighbors: Vec::new(),
                },
            );
            self.entry_point = Some(id);
            self.snapshots.insert(id, metadata);
            return Ok(());
        }

        let candidates = self.beam_search(&vector, self.ef_construction);
        let selected = self.select_diverse(&candidates, self.m);
        debug!(%id, links = selected.len(), "linking node into graph");

        self.nodes.insert(
            id,
            Node {
                vector,
                neighbors: selected.clone(),
            },
        );

        for (neighbor, score) in selected {
            let Some(node) = self.nodes.get_mut(&neighbor) else {
                continue;
            };
            node.neighbors.push((id, score));
            Self::sort_adjacency(&mut node.neighbors);
            if node.neighbors.len() > self.m {
                self.trim_neighbors(neighbor);
            }
        }

        self.snapshots.insert(id, metadata);
        Ok(())
    }

    fn update(
        &mut self,
        id: LodestoneId,
        vector: Option<Vec<f32>>,
        metadata: Option<Metadata>,
    ) -> Result<()> {
        if !self.nodes.contains_key(&id) {
            return Err(Error::not_found("chunk", id));
        }
        match vector {
            Some(mut vector) => {
                // Validate before touching the graph so a bad vector
                // cannot drop the node.
                math::normalize(&mut vector)?;
                self.check_dimension(&vector)?;
                // Topology must reflect the new position: re-insert.
                let snapshot = metadata
                    .or_else(|| self.snapshots.get(&id).cloned())
                    .unwrap_or_default();
                self.remove(id);
                self.add(id, vector, snapshot)
            }
            None => {
                if let Some(metadata) = metadata {
                    self.snapshots.insert(id, metadata);
                }
                Ok(())
            }
        }
    }

    fn remove(&mut self, id: LodestoneId) {
        if self.nodes.remove(&id).is_none() {
            return;
        }
        // Trimming can leave asymmetric edges, so sweep every node.
        for node in self.nodes.values_mut() {
            node.neighbors.retain(|(neighbor, _)| *neighbor != id);
        }
        self.snapshots.remove(&id);
        if self.entry_point == Some(id) {
            self.entry_point = self.nodes.keys().min().copied();
        }
    }

    fn build(&mut self) -> Result<()> {
        Ok(())
    }

    fn query(&self, query: &[f32], k: usize) -> Vec<ScoredPoint> {
        if k == 0 || self.nodes.is_empty() {
            return Vec::new();
        }
        if self.dimension.is_some_and(|d| d != query.len()) {
            return Vec::new();
        }
        let mut results = self.beam_search(query, self.ef_search.max(k));
        results.truncate(k);
        results
    }

    fn metadata(&self, id: &LodestoneId) -> Option<&Metadata> {
        self.snapshots.get(id)
    }

    fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    fn len(&self) -> usize {
        self.nodes.len()
    }

    fn stats(&self) -> IndexStats {
        IndexStats {
            kind: IndexKind::Nsw,
            size: self.nodes.len(),
            dimension: self.dimension,
            buffered: 0,
            centroids: 0,
        }
    }
}
