//! Sharded storage: one isolated graph per user
//!
//! Every operation reaches nodes and edges through a shard handle keyed by
//! `user_id`, which makes cross-user queries structurally impossible rather
//! than merely filtered. Writers serialize per shard behind a `RwLock` while
//! separate shards proceed fully in parallel.

mod edges;
mod nodes;

pub use edges::{EdgeDecayCounts, EdgeStore};
pub use nodes::NodeStore;

use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::types::{HebbianUpdate, MemoryStats, NodeTier, UserId};

/// All state owned by a single user
#[derive(Debug, Default)]
pub struct UserShard {
    pub nodes: NodeStore,
    pub edges: EdgeStore,
    /// Ring buffer of recent Hebbian weight changes, newest last
    audit_log: VecDeque<HebbianUpdate>,
}

impl UserShard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an audit record, dropping the oldest beyond `capacity`.
    pub fn push_audit(&mut self, update: HebbianUpdate, capacity: usize) {
        if capacity == 0 {
            return;
        }
        if self.audit_log.len() >= capacity {
            self.audit_log.pop_front();
        }
        self.audit_log.push_back(update);
    }

    /// The most recent Hebbian updates, newest first, at most `limit`.
    pub fn recent_updates(&self, limit: usize) -> Vec<HebbianUpdate> {
        self.audit_log.iter().rev().take(limit).cloned().collect()
    }

    pub fn stats(&self) -> MemoryStats {
        let node_count = self.nodes.len();
        let edge_count = self.edges.edge_count();
        let sources = self.edges.source_count();
        MemoryStats {
            node_count,
            edge_count,
            co_activation_pairs: self.edges.pair_count(),
            long_term_count: self
                .nodes
                .iter()
                .filter(|n| n.tier == NodeTier::LongTerm)
                .count(),
            avg_out_degree: if sources > 0 {
                edge_count as f32 / sources as f32
            } else {
                0.0
            },
        }
    }
}

/// Handle to a user's shard
pub type ShardHandle = Arc<RwLock<UserShard>>;

/// The per-user shard map
#[derive(Debug, Default)]
pub struct ShardedStore {
    shards: DashMap<UserId, ShardHandle>,
}

impl ShardedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shard for a user, if it exists.
    pub fn shard(&self, user_id: &str) -> Option<ShardHandle> {
        self.shards.get(user_id).map(|entry| entry.value().clone())
    }

    /// The shard for a user, creating an empty one on first touch.
    pub fn shard_or_create(&self, user_id: &str) -> ShardHandle {
        self.shards
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(UserShard::new())))
            .value()
            .clone()
    }

    /// Drop a user's entire shard. Returns whether one existed.
    pub fn remove_shard(&self, user_id: &str) -> bool {
        self.shards.remove(user_id).is_some()
    }

    /// Snapshot of all user ids with a shard.
    pub fn user_ids(&self) -> Vec<UserId> {
        self.shards.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }
}
