//! Edge store: weighted directed adjacency plus co-activation statistics
//!
//! Outgoing edges are kept per node for fast spreading lookups. Weights are
//! clamped to `[0, weight_max]` on every write and an edge whose weight falls
//! to the prune threshold is deleted rather than left as graph noise.

use std::collections::HashMap;

use crate::types::{canonical_pair, CoActivationRecord, Edge, NodeId};

/// Counts produced by one decay pass over a shard's edges
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EdgeDecayCounts {
    pub decayed: usize,
    pub pruned: usize,
}

/// Adjacency storage for one user shard
#[derive(Debug, Default)]
pub struct EdgeStore {
    /// src -> (dst -> weight)
    outgoing: HashMap<NodeId, HashMap<NodeId, f32>>,
    /// Canonical (a, b) pair -> statistics
    co_activations: HashMap<(NodeId, NodeId), CoActivationRecord>,
}

impl EdgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current weight of src -> dst, 0.0 when the edge does not exist.
    pub fn get_weight(&self, src: &str, dst: &str) -> f32 {
        self.outgoing
            .get(src)
            .and_then(|edges| edges.get(dst))
            .copied()
            .unwrap_or(0.0)
    }

    /// Set src -> dst to `new_weight` clamped to `[0, weight_max]`.
    ///
    /// Weights at or below `prune_threshold` delete the edge. Returns the
    /// weight actually stored (0.0 when pruned).
    pub fn upsert_weight(
        &mut self,
        src: &str,
        dst: &str,
        new_weight: f32,
        weight_max: f32,
        prune_threshold: f32,
    ) -> f32 {
        let clamped = new_weight.clamp(0.0, weight_max);
        if clamped <= prune_threshold {
            if let Some(edges) = self.outgoing.get_mut(src) {
                edges.remove(dst);
                if edges.is_empty() {
                    self.outgoing.remove(src);
                }
            }
            return 0.0;
        }
        self.outgoing
            .entry(src.to_string())
            .or_default()
            .insert(dst.to_string(), clamped);
        clamped
    }

    /// All outgoing edges of a node, unordered.
    pub fn neighbors(&self, node_id: &str) -> Vec<Edge> {
        self.outgoing
            .get(node_id)
            .map(|edges| {
                edges
                    .iter()
                    .map(|(dst, &weight)| Edge {
                        src: node_id.to_string(),
                        dst: dst.clone(),
                        weight,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The `m` strongest outgoing edges of a node, descending by weight.
    pub fn top_edges(&self, node_id: &str, m: usize) -> Vec<Edge> {
        let mut edges = self.neighbors(node_id);
        edges.sort_by(|a, b| b.weight.total_cmp(&a.weight));
        edges.truncate(m);
        edges
    }

    /// Drop the weakest outgoing edges beyond `m`. Returns how many were cut.
    pub fn enforce_top_m(&mut self, node_id: &str, m: usize) -> usize {
        let Some(edges) = self.outgoing.get_mut(node_id) else {
            return 0;
        };
        if edges.len() <= m {
            return 0;
        }
        let mut by_weight: Vec<(NodeId, f32)> =
            edges.iter().map(|(dst, &w)| (dst.clone(), w)).collect();
        by_weight.sort_by(|a, b| b.1.total_cmp(&a.1));

        let cut: Vec<NodeId> = by_weight.split_off(m).into_iter().map(|(dst, _)| dst).collect();
        for dst in &cut {
            edges.remove(dst);
        }
        cut.len()
    }

    /// Remove every edge and co-activation record touching a node.
    ///
    /// Returns the number of edges removed (outgoing plus incoming).
    pub fn remove_node(&mut self, node_id: &str) -> usize {
        let mut removed = self
            .outgoing
            .remove(node_id)
            .map(|edges| edges.len())
            .unwrap_or(0);

        self.outgoing.retain(|_, edges| {
            if edges.remove(node_id).is_some() {
                removed += 1;
            }
            !edges.is_empty()
        });

        self.co_activations
            .retain(|(a, b), _| a != node_id && b != node_id);

        removed
    }

    /// Record one co-activation observation for an unordered pair.
    ///
    /// Returns the updated observation count.
    pub fn record_co_activation(
        &mut self,
        a: &str,
        b: &str,
        activation_a: f32,
        activation_b: f32,
    ) -> u32 {
        let key = canonical_pair(a.to_string(), b.to_string());
        let record = self
            .co_activations
            .entry(key.clone())
            .or_insert_with(|| CoActivationRecord::new(key.0.clone(), key.1.clone()));
        // The record is canonical; map the activations to its ordering
        if key.0 == a {
            record.update(activation_a, activation_b);
        } else {
            record.update(activation_b, activation_a);
        }
        record.count
    }

    /// Co-activation statistics for a pair, in either argument order.
    pub fn co_activation(&self, a: &str, b: &str) -> Option<&CoActivationRecord> {
        let key = canonical_pair(a.to_string(), b.to_string());
        self.co_activations.get(&key)
    }

    /// Multiply every edge by a per-edge factor and prune the result.
    ///
    /// `rate_for(src, dst)` returns the effective decay rate for that edge;
    /// the new weight is `w * (1 - rate)`.
    pub fn decay<F>(&mut self, prune_threshold: f32, mut rate_for: F) -> EdgeDecayCounts
    where
        F: FnMut(&str, &str) -> f32,
    {
        let mut counts = EdgeDecayCounts::default();
        self.outgoing.retain(|src, edges| {
            edges.retain(|dst, weight| {
                *weight *= 1.0 - rate_for(src, dst);
                counts.decayed += 1;
                if *weight <= prune_threshold {
                    counts.pruned += 1;
                    false
                } else {
                    true
                }
            });
            !edges.is_empty()
        });
        counts
    }

    /// Total directed edge count.
    pub fn edge_count(&self) -> usize {
        self.outgoing.values().map(|edges| edges.len()).sum()
    }

    /// Number of tracked co-activation pairs.
    pub fn pair_count(&self) -> usize {
        self.co_activations.len()
    }

    /// Number of nodes with at least one outgoing edge.
    pub fn source_count(&self) -> usize {
        self.outgoing.len()
    }

    /// Distinct neighbors of a node across both edge directions.
    pub fn distinct_neighbors(&self, node_id: &str) -> usize {
        let mut neighbors: std::collections::HashSet<&str> = self
            .outgoing
            .get(node_id)
            .map(|edges| edges.keys().map(String::as_str).collect())
            .unwrap_or_default();
        for (src, edges) in &self.outgoing {
            if src != node_id && edges.contains_key(node_id) {
                neighbors.insert(src.as_str());
            }
        }
        neighbors.len()
    }
}
