//! Background decay, pruning, and consolidation
//!
//! The decay cycle runs on its own timer, independent of recall traffic.
//! Each cycle: promote qualifying nodes to long-term, decay every edge,
//! prune edges below the threshold, fade short-term node importance, and
//! prune short-term nodes that faded to noise. Failures are logged and
//! isolated per shard - decay is best-effort, never a correctness
//! dependency for the recall or learning paths.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info};

use crate::config::{DecayConfig, NeuralMemoryConfig};
use crate::error::Result;
use crate::index::VectorIndex;
use crate::store::{ShardedStore, UserShard};
use crate::types::{NodeId, NodeTier};

/// Outcome of one full decay cycle across all shards
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecayCycleReport {
    pub shards_processed: usize,
    pub shards_failed: usize,
    pub edges_decayed: usize,
    pub edges_pruned: usize,
    pub nodes_faded: usize,
    pub nodes_pruned: usize,
    pub nodes_consolidated: usize,
}

/// Per-shard counts folded into the cycle report
#[derive(Debug, Clone, Copy, Default)]
struct ShardCounts {
    edges_decayed: usize,
    edges_pruned: usize,
    nodes_faded: usize,
    nodes_pruned: usize,
    nodes_consolidated: usize,
}

pub struct DecayEngine {
    decay: DecayConfig,
    top_m_edges: usize,
}

impl DecayEngine {
    pub fn new(config: &NeuralMemoryConfig) -> Self {
        Self {
            decay: config.decay.clone(),
            top_m_edges: config.learning.top_m_edges,
        }
    }

    /// Run one decay cycle over every shard.
    pub fn run_cycle(&self, store: &ShardedStore, index: &dyn VectorIndex) -> DecayCycleReport {
        let mut report = DecayCycleReport::default();

        for user_id in store.user_ids() {
            let Some(shard) = store.shard(&user_id) else {
                continue;
            };
            let mut guard = shard.write();
            match self.run_shard(&user_id, &mut guard, index) {
                Ok(counts) => {
                    report.shards_processed += 1;
                    report.edges_decayed += counts.edges_decayed;
                    report.edges_pruned += counts.edges_pruned;
                    report.nodes_faded += counts.nodes_faded;
                    report.nodes_pruned += counts.nodes_pruned;
                    report.nodes_consolidated += counts.nodes_consolidated;
                }
                Err(e) => {
                    // One user's bad state must not halt the others
                    report.shards_failed += 1;
                    error!(%user_id, error = %e, "decay cycle failed for shard");
                }
            }
        }

        debug!(
            shards = report.shards_processed,
            edges_pruned = report.edges_pruned,
            nodes_pruned = report.nodes_pruned,
            consolidated = report.nodes_consolidated,
            "decay cycle complete"
        );
        report
    }

    fn run_shard(
        &self,
        user_id: &str,
        shard: &mut UserShard,
        index: &dyn VectorIndex,
    ) -> Result<ShardCounts> {
        let mut counts = ShardCounts::default();

        // Consolidation first, so a node earning long-term status this cycle
        // is already exempt from the fade below
        let promoted: Vec<NodeId> = shard
            .nodes
            .iter()
            .filter(|node| {
                node.tier == NodeTier::ShortTerm
                    && node.use_count >= self.decay.consolidation_use_count_min
                    && node.importance >= self.decay.consolidation_importance_min
                    && self.diversity(&shard.edges, &node.id) >= self.decay.consolidation_diversity_min
            })
            .map(|node| node.id.clone())
            .collect();
        for node_id in &promoted {
            if let Some(node) = shard.nodes.get_mut(node_id) {
                node.tier = NodeTier::LongTerm;
                counts.nodes_consolidated += 1;
            }
        }

        // Split borrows: edge decay consults node tiers while mutating edges
        let UserShard { nodes, edges, .. } = shard;
        let base_rate = self.decay.decay_rate;
        let long_term_rate = base_rate * self.decay.long_term_decay_factor;
        let edge_counts = edges.decay(self.decay.prune_threshold, |src, dst| {
            let both_long_term = matches!(
                (nodes.get(src), nodes.get(dst)),
                (Some(a), Some(b))
                    if a.tier == NodeTier::LongTerm && b.tier == NodeTier::LongTerm
            );
            if both_long_term {
                long_term_rate
            } else {
                base_rate
            }
        });
        counts.edges_decayed = edge_counts.decayed;
        counts.edges_pruned = edge_counts.pruned;

        // Short-term importance fades; long-term nodes hold steady
        let ids: Vec<NodeId> = shard.nodes.ids().cloned().collect();
        for node_id in &ids {
            if let Some(node) = shard.nodes.get_mut(node_id) {
                if node.tier == NodeTier::ShortTerm {
                    node.importance *= 1.0 - self.decay.decay_rate;
                    counts.nodes_faded += 1;
                }
            }
        }

        // Never-recalled short-term nodes that faded below the floor are noise
        let doomed: Vec<NodeId> = shard
            .nodes
            .iter()
            .filter(|node| {
                node.tier == NodeTier::ShortTerm
                    && node.use_count == 0
                    && node.importance < self.decay.node_prune_floor
            })
            .map(|node| node.id.clone())
            .collect();
        for node_id in &doomed {
            shard.nodes.remove(node_id);
            shard.edges.remove_node(node_id);
            index.remove(user_id, node_id)?;
            counts.nodes_pruned += 1;
        }

        Ok(counts)
    }

    /// Neighbor diversity in [0, 1]: distinct neighbors over the edge budget.
    fn diversity(&self, edges: &crate::store::EdgeStore, node_id: &str) -> f32 {
        let distinct = edges.distinct_neighbors(node_id) as f32;
        (distinct / self.top_m_edges as f32).min(1.0)
    }
}

/// Commands for the decay daemon
#[derive(Debug)]
enum DaemonCommand {
    RunNow,
    Stop,
}

/// Handle to the background decay task
pub struct DecayDaemon {
    sender: mpsc::Sender<DaemonCommand>,
    handle: JoinHandle<()>,
}

impl DecayDaemon {
    /// Spawn the daemon (requires a tokio runtime).
    pub fn start(
        store: Arc<ShardedStore>,
        index: Arc<dyn VectorIndex>,
        engine: DecayEngine,
        interval_secs: u64,
    ) -> Self {
        let (sender, mut receiver) = mpsc::channel::<DaemonCommand>(8);

        let handle = tokio::spawn(async move {
            let mut timer = interval(Duration::from_secs(interval_secs.max(1)));
            // The first tick fires immediately; consume it so the initial
            // cycle waits a full interval
            timer.tick().await;

            loop {
                tokio::select! {
                    cmd = receiver.recv() => {
                        match cmd {
                            Some(DaemonCommand::RunNow) => {
                                engine.run_cycle(&store, index.as_ref());
                            }
                            Some(DaemonCommand::Stop) | None => break,
                        }
                    }
                    _ = timer.tick() => {
                        engine.run_cycle(&store, index.as_ref());
                    }
                }
            }

            info!("decay daemon stopped");
        });

        Self { sender, handle }
    }

    /// Trigger an immediate cycle without waiting for the timer.
    pub async fn run_now(&self) {
        let _ = self.sender.send(DaemonCommand::RunNow).await;
    }

    /// Stop the daemon and wait for it to wind down.
    pub async fn stop(self) {
        let _ = self.sender.send(DaemonCommand::Stop).await;
        let _ = self.handle.await;
    }
}
