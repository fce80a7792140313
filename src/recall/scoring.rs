//! Multi-signal recall scoring with diversity-aware selection
//!
//! Five signals fuse into one score per candidate: semantic similarity,
//! graph activation, recency, importance, and trust. Selection is greedy
//! MMR: after each pick the remaining candidates are re-penalized for
//! redundancy against what was already chosen, so the returned set is both
//! relevant and diverse instead of a stack of near-duplicates.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

use crate::config::{NeuralMemoryConfig, ScoringConfig};
use crate::index::cosine_similarity;
use crate::store::UserShard;
use crate::types::{ActivationState, NodeId, RecallResult, ScoreComponents};

pub struct RecallScorer {
    scoring: ScoringConfig,
    /// alpha..epsilon renormalized to sum to 1.0
    weights: [f32; 5],
}

struct Candidate {
    node_id: NodeId,
    embedding: Vec<f32>,
    base_score: f32,
    components: ScoreComponents,
}

impl RecallScorer {
    pub fn new(config: &NeuralMemoryConfig) -> Self {
        Self {
            scoring: config.scoring.clone(),
            weights: config.scoring_weights_normalized(),
        }
    }

    /// Score candidates and pick up to `top_k` of them, MMR style.
    ///
    /// `semantic` carries the vector-index hits (node id, similarity);
    /// `activations` the spreading result. Nodes reached only through the
    /// graph get their semantic signal from a local cosine against the
    /// stored embedding. Missing nodes are skipped. An empty candidate set
    /// produces an empty result, never an error.
    pub fn select(
        &self,
        shard: &UserShard,
        query: &[f32],
        semantic: &[(NodeId, f32)],
        activations: &HashMap<NodeId, ActivationState>,
        top_k: usize,
        now: DateTime<Utc>,
    ) -> Vec<RecallResult> {
        let similarity_by_id: HashMap<&str, f32> = semantic
            .iter()
            .map(|(id, sim)| (id.as_str(), *sim))
            .collect();

        let mut candidate_ids: HashSet<&str> =
            similarity_by_id.keys().copied().collect();
        candidate_ids.extend(activations.keys().map(String::as_str));

        let [alpha, beta, gamma, delta, epsilon] = self.weights;

        let mut candidates: Vec<Candidate> = Vec::with_capacity(candidate_ids.len());
        for node_id in candidate_ids {
            let Some(node) = shard.nodes.get(node_id) else {
                continue;
            };

            let semantic_score = similarity_by_id
                .get(node_id)
                .copied()
                .unwrap_or_else(|| cosine_similarity(query, &node.embedding))
                .max(0.0);
            let graph_score = activations
                .get(node_id)
                .map(|state| state.activation)
                .unwrap_or(0.0);
            let age_days =
                (now - node.created_at).num_seconds().max(0) as f32 / 86_400.0;
            let recency = (-age_days / self.scoring.recency_tau_days).exp();

            let components = ScoreComponents {
                semantic: semantic_score,
                graph: graph_score,
                recency,
                importance: node.importance,
                trust: node.confidence,
                redundancy_penalty: 0.0,
            };
            let base_score = alpha * components.semantic
                + beta * components.graph
                + gamma * components.recency
                + delta * components.importance
                + epsilon * components.trust;

            candidates.push(Candidate {
                node_id: node.id.clone(),
                embedding: node.embedding.clone(),
                base_score,
                components,
            });
        }

        self.mmr_select(shard, candidates, top_k)
    }

    /// Greedy selection: highest adjusted score first, then re-penalize the
    /// rest against the growing selected set.
    fn mmr_select(
        &self,
        shard: &UserShard,
        mut candidates: Vec<Candidate>,
        top_k: usize,
    ) -> Vec<RecallResult> {
        let mut selected: Vec<RecallResult> = Vec::with_capacity(top_k.min(candidates.len()));
        let mut selected_embeddings: Vec<Vec<f32>> = Vec::new();

        while selected.len() < top_k && !candidates.is_empty() {
            let mut best_idx = 0;
            let mut best_value = f32::NEG_INFINITY;
            let mut best_penalty = 0.0;

            for (idx, candidate) in candidates.iter().enumerate() {
                let redundancy = selected_embeddings
                    .iter()
                    .map(|emb| cosine_similarity(&candidate.embedding, emb))
                    .fold(0.0f32, f32::max);
                let penalty = self.scoring.zeta * redundancy;
                let value = candidate.base_score - penalty;
                if value > best_value {
                    best_value = value;
                    best_idx = idx;
                    best_penalty = penalty;
                }
            }

            let winner = candidates.swap_remove(best_idx);
            let Some(node) = shard.nodes.get(&winner.node_id) else {
                continue;
            };
            let mut components = winner.components;
            components.redundancy_penalty = best_penalty;

            selected_embeddings.push(winner.embedding);
            selected.push(RecallResult {
                node: node.clone(),
                score: (winner.base_score - best_penalty).max(0.0),
                components,
            });
        }

        selected
    }
}
