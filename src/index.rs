//! External embedding and vector-search seams
//!
//! The engine never computes embeddings and never owns a vector database; it
//! consumes both through the traits here. [`InMemoryIndex`] is the reference
//! implementation used by tests and benches - a brute-force cosine scan,
//! keyed per user so shard isolation holds at the index layer too.

use dashmap::DashMap;
use std::collections::HashMap;

use crate::error::Result;
use crate::types::{NodeId, UserId};

/// Text-to-vector embedding provider, assumed deterministic per model version.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
    fn dimensions(&self) -> usize;
}

/// Vector similarity search over a user's nodes.
///
/// Implementations must never return results across users.
pub trait VectorIndex: Send + Sync {
    /// Add or replace a node's embedding.
    fn add(&self, user_id: &str, node_id: &str, embedding: &[f32]) -> Result<()>;

    /// Remove a node's embedding; absent entries are a no-op.
    fn remove(&self, user_id: &str, node_id: &str) -> Result<()>;

    /// Drop every embedding belonging to a user.
    fn remove_user(&self, user_id: &str) -> Result<()>;

    /// The `k` most similar nodes to the query, as (node_id, similarity)
    /// pairs sorted by descending similarity.
    fn search(&self, user_id: &str, query: &[f32], k: usize) -> Result<Vec<(NodeId, f32)>>;
}

/// Cosine similarity between two vectors, 0.0 for mismatched or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a.sqrt() * norm_b.sqrt())
    }
}

/// Brute-force in-memory vector index
#[derive(Debug, Default)]
pub struct InMemoryIndex {
    vectors: DashMap<UserId, HashMap<NodeId, Vec<f32>>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VectorIndex for InMemoryIndex {
    fn add(&self, user_id: &str, node_id: &str, embedding: &[f32]) -> Result<()> {
        self.vectors
            .entry(user_id.to_string())
            .or_default()
            .insert(node_id.to_string(), embedding.to_vec());
        Ok(())
    }

    fn remove(&self, user_id: &str, node_id: &str) -> Result<()> {
        if let Some(mut user_vectors) = self.vectors.get_mut(user_id) {
            user_vectors.remove(node_id);
        }
        Ok(())
    }

    fn remove_user(&self, user_id: &str) -> Result<()> {
        self.vectors.remove(user_id);
        Ok(())
    }

    fn search(&self, user_id: &str, query: &[f32], k: usize) -> Result<Vec<(NodeId, f32)>> {
        let Some(user_vectors) = self.vectors.get(user_id) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<(NodeId, f32)> = user_vectors
            .iter()
            .map(|(id, vec)| (id.clone(), cosine_similarity(query, vec)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);
        Ok(scored)
    }
}
