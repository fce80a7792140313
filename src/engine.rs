//! The engine facade
//!
//! [`NeuralMemory`] wires the stores, the Hebbian learning pipeline, the
//! activation spreader, the recall scorer, and the decay machinery behind
//! one API surface. The request path (`ingest`, `recall`,
//! `record_co_activation`, `forget`) is synchronous; learning and decay run
//! as background tokio tasks started with [`NeuralMemory::start_background`].

use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::NeuralMemoryConfig;
use crate::decay::{DecayCycleReport, DecayDaemon, DecayEngine};
use crate::error::{MemoryError, Result};
use crate::index::VectorIndex;
use crate::learning::{apply_events, CoActivationQueue, HebbianLearner, HebbianWorker};
use crate::recall::{ActivationSpreader, RecallScorer};
use crate::store::ShardedStore;
use crate::types::{
    CoActivationEvent, Edge, HebbianUpdate, MemoryNode, MemoryStats, NodeFilter, NodeId,
    RecallResult,
};

/// The neural associative memory engine
pub struct NeuralMemory {
    config: NeuralMemoryConfig,
    store: Arc<ShardedStore>,
    index: Arc<dyn VectorIndex>,
    queue: CoActivationQueue,
    learner: Arc<HebbianLearner>,
    spreader: ActivationSpreader,
    scorer: RecallScorer,
}

impl NeuralMemory {
    /// Build an engine over an external vector index.
    ///
    /// The configuration is validated once here; out-of-range tunables fail
    /// construction instead of surfacing later as silent clamps.
    pub fn new(config: NeuralMemoryConfig, index: Arc<dyn VectorIndex>) -> Result<Self> {
        config.validate()?;
        let learner = Arc::new(HebbianLearner::new(&config));
        let spreader = ActivationSpreader::new(&config);
        let scorer = RecallScorer::new(&config);
        let queue = CoActivationQueue::new(config.learning.queue_capacity);
        Ok(Self {
            config,
            store: Arc::new(ShardedStore::new()),
            index,
            queue,
            learner,
            spreader,
            scorer,
        })
    }

    pub fn config(&self) -> &NeuralMemoryConfig {
        &self.config
    }

    /// Store a node in its user's shard and register it with the index.
    ///
    /// Over-capacity shards evict their weakest short-term node first and
    /// log the eviction; the ingest itself still succeeds.
    pub fn ingest(&self, node: MemoryNode) -> Result<NodeId> {
        node.validate()?;
        let node_id = node.id.clone();
        let user_id = node.user_id.clone();
        let embedding = node.embedding.clone();

        let shard = self.store.shard_or_create(&user_id);
        {
            let mut shard = shard.write();
            if shard.nodes.len() >= self.config.limits.max_nodes_per_user
                && !shard.nodes.contains(&node_id)
            {
                match shard.nodes.eviction_candidate() {
                    Some(victim) => {
                        shard.nodes.remove(&victim);
                        shard.edges.remove_node(&victim);
                        self.index.remove(&user_id, &victim)?;
                        warn!(%user_id, %victim, "shard at capacity; evicted weakest node");
                    }
                    None => {
                        return Err(MemoryError::Capacity(format!(
                            "shard for {user_id} is full and nothing is evictable"
                        )));
                    }
                }
            }
            shard.nodes.put(node)?;
        }

        self.index.add(&user_id, &node_id, &embedding)?;
        debug!(%user_id, %node_id, "ingested node");
        Ok(node_id)
    }

    /// Ranked, diversity-aware recall for one user.
    ///
    /// Unknown users and empty candidate sets return an empty list - recall
    /// sits on a best-effort conversational path and must not fail it. Side
    /// effects (use counts, importance drift, co-activation scheduling) only
    /// happen after the full scoring pass succeeds.
    pub fn recall(
        &self,
        user_id: &str,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<RecallResult>> {
        if query_embedding.is_empty() {
            return Err(MemoryError::validation("query embedding must not be empty"));
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let Some(shard) = self.store.shard(user_id) else {
            debug!(user_id, "recall for unknown user; returning empty");
            return Ok(Vec::new());
        };

        let semantic = self
            .index
            .search(user_id, query_embedding, self.config.scoring.max_candidates_k)?;

        let now = Utc::now();
        let mut results = {
            let shard = shard.read();
            // Semantic matches seed the graph; a perfect match seeds at 1.0
            let seeds = semantic
                .iter()
                .filter(|(id, _)| shard.nodes.contains(id))
                .map(|(id, sim)| (id.clone(), sim.clamp(0.0, 1.0)))
                .collect();
            let activations = self.spreader.spread(&shard.edges, &seeds);
            self.scorer
                .select(&shard, query_embedding, &semantic, &activations, top_k, now)
        };

        if results.is_empty() {
            return Ok(results);
        }

        // Full pass succeeded: apply usage side effects under the write lock
        {
            let mut shard = shard.write();
            let ema = self.config.scoring.importance_ema_alpha;
            for result in &mut results {
                if let Some(node) = shard.nodes.get_mut(&result.node.id) {
                    node.use_count += 1;
                    node.importance += ema * (1.0 - node.importance);
                    node.last_recalled_at = Some(now);
                    // Returned copies reflect the post-recall state
                    result.node.use_count = node.use_count;
                    result.node.importance = node.importance;
                    result.node.last_recalled_at = node.last_recalled_at;
                }
            }
        }

        // Every returned pair co-activated; feed the learner asynchronously
        for i in 0..results.len() {
            for j in (i + 1)..results.len() {
                let event = CoActivationEvent::new(
                    user_id,
                    results[i].node.id.clone(),
                    results[j].node.id.clone(),
                    results[i].score.clamp(0.0, 1.0),
                    results[j].score.clamp(0.0, 1.0),
                );
                if self.queue.publish(event).is_err() {
                    debug!(user_id, "co-activation queue closed; skipping feedback");
                }
            }
        }

        Ok(results)
    }

    /// Queue an externally observed co-activation between two nodes.
    pub fn record_co_activation(
        &self,
        user_id: &str,
        node_a: &str,
        node_b: &str,
        activation_a: f32,
        activation_b: f32,
    ) -> Result<()> {
        self.queue.publish(CoActivationEvent::new(
            user_id,
            node_a,
            node_b,
            activation_a.clamp(0.0, 1.0),
            activation_b.clamp(0.0, 1.0),
        ))
    }

    /// Purge a node and every edge touching it. Idempotent: forgetting an
    /// unknown node or user is a successful no-op.
    pub fn forget(&self, user_id: &str, node_id: &str) -> Result<()> {
        let Some(shard) = self.store.shard(user_id) else {
            return Ok(());
        };
        {
            let mut shard = shard.write();
            shard.nodes.remove(node_id);
            shard.edges.remove_node(node_id);
        }
        self.index.remove(user_id, node_id)?;
        info!(user_id, node_id, "forgot node");
        Ok(())
    }

    /// Delete a user's entire shard and index entries.
    pub fn purge_user(&self, user_id: &str) -> Result<()> {
        self.store.remove_shard(user_id);
        self.index.remove_user(user_id)?;
        info!(user_id, "purged user shard");
        Ok(())
    }

    /// Fetch one node.
    pub fn get(&self, user_id: &str, node_id: &str) -> Result<MemoryNode> {
        self.store
            .shard(user_id)
            .and_then(|shard| shard.read().nodes.get(node_id).cloned())
            .ok_or_else(|| MemoryError::not_found(node_id))
    }

    /// A user's nodes matching the filter; empty for unknown users.
    pub fn list(&self, user_id: &str, filter: &NodeFilter) -> Vec<MemoryNode> {
        self.store
            .shard(user_id)
            .map(|shard| {
                shard
                    .read()
                    .nodes
                    .list(filter)
                    .into_iter()
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Shard statistics; zeroed for unknown users.
    pub fn stats(&self, user_id: &str) -> MemoryStats {
        self.store
            .shard(user_id)
            .map(|shard| shard.read().stats())
            .unwrap_or_default()
    }

    /// Current weight of a directed edge, 0.0 when absent.
    pub fn edge_weight(&self, user_id: &str, src: &str, dst: &str) -> f32 {
        self.store
            .shard(user_id)
            .map(|shard| shard.read().edges.get_weight(src, dst))
            .unwrap_or(0.0)
    }

    /// The strongest outgoing associations of a node.
    pub fn top_edges(&self, user_id: &str, node_id: &str, m: usize) -> Vec<Edge> {
        self.store
            .shard(user_id)
            .map(|shard| shard.read().edges.top_edges(node_id, m))
            .unwrap_or_default()
    }

    /// The most recent Hebbian weight changes in a user's shard.
    pub fn recent_updates(&self, user_id: &str, limit: usize) -> Vec<HebbianUpdate> {
        self.store
            .shard(user_id)
            .map(|shard| shard.read().recent_updates(limit))
            .unwrap_or_default()
    }

    /// Apply every queued co-activation event inline.
    ///
    /// Deterministic alternative to waiting for the background worker;
    /// returns the number of weight updates applied.
    pub fn flush(&self) -> usize {
        let events = self.queue.drain();
        if events.is_empty() {
            return 0;
        }
        apply_events(&self.store, &self.learner, events)
    }

    /// Run one decay cycle inline across all shards.
    pub fn run_decay_cycle(&self) -> DecayCycleReport {
        DecayEngine::new(&self.config).run_cycle(&self.store, self.index.as_ref())
    }

    /// Spawn the Hebbian worker and decay daemon (requires a tokio runtime).
    pub fn start_background(&self) -> BackgroundTasks {
        let worker = HebbianWorker::new(
            self.store.clone(),
            self.learner.clone(),
            self.queue.clone(),
            self.config.learning.batch_update_size,
            self.config.learning.async_update_delay_ms,
        );
        let worker_handle = tokio::spawn(worker.run());
        let daemon = DecayDaemon::start(
            self.store.clone(),
            self.index.clone(),
            DecayEngine::new(&self.config),
            self.config.decay.background_interval_secs,
        );
        BackgroundTasks {
            queue: self.queue.clone(),
            worker_handle,
            daemon,
        }
    }
}

/// Handles to the background tasks, used for orderly shutdown
pub struct BackgroundTasks {
    queue: CoActivationQueue,
    worker_handle: JoinHandle<()>,
    daemon: DecayDaemon,
}

impl BackgroundTasks {
    /// Close the queue, let the worker drain, and stop the decay daemon.
    ///
    /// After shutdown the engine no longer accepts co-activation events.
    pub async fn shutdown(self) {
        self.queue.close();
        let _ = self.worker_handle.await;
        self.daemon.stop().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::InMemoryIndex;
    use crate::types::{NodeKind, NodeSource};

    fn engine() -> NeuralMemory {
        let mut config = NeuralMemoryConfig::default();
        config.learning.min_co_activation_count = 1;
        NeuralMemory::new(config, Arc::new(InMemoryIndex::new())).unwrap()
    }

    fn node(user: &str, id: &str, embedding: Vec<f32>) -> MemoryNode {
        let mut n = MemoryNode::new(user, NodeKind::Fact, id, embedding, NodeSource::User);
        n.id = id.to_string();
        n
    }

    #[test]
    fn invalid_config_fails_construction() {
        let mut config = NeuralMemoryConfig::default();
        config.spreading.spread_hops = 9;
        assert!(NeuralMemory::new(config, Arc::new(InMemoryIndex::new())).is_err());
    }

    #[test]
    fn ingest_rejects_invalid_nodes() {
        let engine = engine();
        let bad = node("u1", "a", vec![]);
        assert!(engine.ingest(bad).is_err());
    }

    #[test]
    fn recall_unknown_user_is_empty() {
        let engine = engine();
        let results = engine.recall("nobody", &[1.0, 0.0], 5).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn recall_empty_query_is_validation_error() {
        let engine = engine();
        assert!(engine.recall("u1", &[], 5).is_err());
    }

    #[test]
    fn recall_increments_use_count() {
        let engine = engine();
        engine.ingest(node("u1", "a", vec![1.0, 0.0])).unwrap();

        let results = engine.recall("u1", &[1.0, 0.0], 5).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].node.use_count, 1);
        assert!(results[0].node.importance > 0.5);

        // The stored node advanced too
        assert_eq!(engine.get("u1", "a").unwrap().use_count, 1);
    }

    #[test]
    fn recall_schedules_pairwise_co_activation() {
        let engine = engine();
        engine.ingest(node("u1", "a", vec![1.0, 0.0])).unwrap();
        engine.ingest(node("u1", "b", vec![0.9, 0.1])).unwrap();

        engine.recall("u1", &[1.0, 0.0], 5).unwrap();
        let applied = engine.flush();
        assert!(applied > 0);

        let stats = engine.stats("u1");
        assert!(stats.edge_count > 0);
        assert_eq!(stats.co_activation_pairs, 1);
    }

    #[test]
    fn users_are_isolated() {
        let engine = engine();
        engine.ingest(node("u1", "a", vec![1.0, 0.0])).unwrap();
        engine.ingest(node("u2", "b", vec![1.0, 0.0])).unwrap();

        let results = engine.recall("u1", &[1.0, 0.0], 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].node.id, "a");
        assert!(engine.get("u1", "b").is_err());
    }

    #[test]
    fn capacity_evicts_weakest_short_term() {
        let mut config = NeuralMemoryConfig::default();
        config.limits.max_nodes_per_user = 2;
        let engine = NeuralMemory::new(config, Arc::new(InMemoryIndex::new())).unwrap();

        let mut weak = node("u1", "weak", vec![1.0, 0.0]);
        weak.importance = 0.1;
        engine.ingest(weak).unwrap();
        let mut mid = node("u1", "mid", vec![0.9, 0.1]);
        mid.importance = 0.5;
        engine.ingest(mid).unwrap();
        engine.ingest(node("u1", "new", vec![0.8, 0.2])).unwrap();

        assert_eq!(engine.stats("u1").node_count, 2);
        assert!(engine.get("u1", "weak").is_err());
        assert!(engine.get("u1", "new").is_ok());
    }

    #[test]
    fn forget_is_idempotent_and_cascades() {
        let engine = engine();
        engine.ingest(node("u1", "a", vec![1.0, 0.0])).unwrap();
        engine.ingest(node("u1", "b", vec![0.9, 0.1])).unwrap();
        engine.record_co_activation("u1", "a", "b", 0.9, 0.9).unwrap();
        engine.flush();
        assert!(engine.stats("u1").edge_count > 0);

        engine.forget("u1", "a").unwrap();
        assert!(engine.get("u1", "a").is_err());
        assert_eq!(engine.stats("u1").edge_count, 0);

        // Again, and for users that never existed
        engine.forget("u1", "a").unwrap();
        engine.forget("ghost", "a").unwrap();
    }

    #[test]
    fn purge_user_removes_shard_and_index() {
        let engine = engine();
        engine.ingest(node("u1", "a", vec![1.0, 0.0])).unwrap();
        engine.purge_user("u1").unwrap();

        assert_eq!(engine.stats("u1").node_count, 0);
        assert!(engine.recall("u1", &[1.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn pending_events_for_forgotten_node_are_noops() {
        let engine = engine();
        engine.ingest(node("u1", "a", vec![1.0, 0.0])).unwrap();
        engine.ingest(node("u1", "b", vec![0.9, 0.1])).unwrap();

        engine.record_co_activation("u1", "a", "b", 0.9, 0.9).unwrap();
        engine.forget("u1", "b").unwrap();

        // The queued event references a node that no longer exists
        let applied = engine.flush();
        assert_eq!(applied, 0);
        assert_eq!(engine.stats("u1").edge_count, 0);
    }

    #[test]
    fn audit_trail_records_weight_changes() {
        let engine = engine();
        engine.ingest(node("u1", "a", vec![1.0, 0.0])).unwrap();
        engine.ingest(node("u1", "b", vec![0.9, 0.1])).unwrap();
        engine.record_co_activation("u1", "a", "b", 0.9, 0.8).unwrap();
        engine.flush();

        let updates = engine.recent_updates("u1", 10);
        assert_eq!(updates.len(), 2);
        assert!(updates.iter().all(|u| u.user_id == "u1"));
    }

    #[tokio::test]
    async fn background_tasks_shut_down_cleanly() {
        let engine = engine();
        engine.ingest(node("u1", "a", vec![1.0, 0.0])).unwrap();
        engine.ingest(node("u1", "b", vec![0.9, 0.1])).unwrap();

        let tasks = engine.start_background();
        engine.record_co_activation("u1", "a", "b", 0.9, 0.9).unwrap();
        tasks.shutdown().await;

        // The worker drained the queue before stopping
        assert!(engine.stats("u1").edge_count > 0);
        // After shutdown the queue rejects new events
        assert!(engine.record_co_activation("u1", "a", "b", 0.9, 0.9).is_err());
    }
}
