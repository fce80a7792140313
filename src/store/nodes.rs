//! Node store for one user shard
//!
//! Keyed storage of [`MemoryNode`] with boundary validation. The first node
//! ingested into a shard fixes the embedding dimensionality; later nodes
//! must match it.

use std::collections::HashMap;

use crate::error::{MemoryError, Result};
use crate::types::{MemoryNode, NodeFilter, NodeId, NodeTier};

#[derive(Debug, Default)]
pub struct NodeStore {
    nodes: HashMap<NodeId, MemoryNode>,
    /// Embedding dimensionality, established by the first insert
    dimensions: Option<usize>,
}

impl NodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert a node after validating the data-model invariants.
    pub fn put(&mut self, node: MemoryNode) -> Result<()> {
        node.validate()?;
        match self.dimensions {
            Some(dims) if node.embedding.len() != dims => {
                return Err(MemoryError::validation(format!(
                    "embedding has {} dimensions, shard expects {}",
                    node.embedding.len(),
                    dims
                )));
            }
            None => self.dimensions = Some(node.embedding.len()),
            _ => {}
        }
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    pub fn get(&self, node_id: &str) -> Option<&MemoryNode> {
        self.nodes.get(node_id)
    }

    pub fn get_mut(&mut self, node_id: &str) -> Option<&mut MemoryNode> {
        self.nodes.get_mut(node_id)
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.nodes.contains_key(node_id)
    }

    /// Remove a node. Absent ids are a no-op returning `None`.
    pub fn remove(&mut self, node_id: &str) -> Option<MemoryNode> {
        self.nodes.remove(node_id)
    }

    /// Nodes matching the filter, unordered.
    pub fn list(&self, filter: &NodeFilter) -> Vec<&MemoryNode> {
        self.nodes.values().filter(|n| filter.matches(n)).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MemoryNode> {
        self.nodes.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.keys()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Pick the eviction victim when the shard is over capacity: the
    /// lowest-importance short-term node, falling back to the lowest-
    /// importance node overall when everything is long-term.
    pub fn eviction_candidate(&self) -> Option<NodeId> {
        let weakest = |tier_filter: Option<NodeTier>| {
            self.nodes
                .values()
                .filter(|n| tier_filter.map_or(true, |t| n.tier == t))
                .min_by(|a, b| {
                    a.importance
                        .total_cmp(&b.importance)
                        .then_with(|| a.created_at.cmp(&b.created_at))
                })
                .map(|n| n.id.clone())
        };
        weakest(Some(NodeTier::ShortTerm)).or_else(|| weakest(None))
    }
}
