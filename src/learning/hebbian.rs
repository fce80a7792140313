//! Hebbian weight updates from co-activation
//!
//! "Cells that fire together wire together", with three guards that keep an
//! adversarial or noisy signal from distorting the graph:
//!
//! - the learning rate is modulated by the weaker node's confidence, so one
//!   low-trust node cannot inflate an edge
//! - the total |delta| any node receives in a batch is clipped
//! - pairs below the minimum observation count update statistics only

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::config::{LearningConfig, NeuralMemoryConfig};
use crate::store::UserShard;
use crate::types::{CoActivationEvent, HebbianUpdate, NodeId};

pub struct HebbianLearner {
    learning: LearningConfig,
    prune_threshold: f32,
    audit_capacity: usize,
}

impl HebbianLearner {
    pub fn new(config: &NeuralMemoryConfig) -> Self {
        Self {
            learning: config.learning.clone(),
            prune_threshold: config.decay.prune_threshold,
            audit_capacity: config.limits.audit_log_capacity,
        }
    }

    /// Apply a batch of co-activation events to one shard.
    ///
    /// The caller holds the shard write lock, so the whole batch lands
    /// atomically with respect to recall and decay. Events that are stale or
    /// reference deleted nodes are skipped. Returns the audit records for
    /// every weight change actually applied.
    pub fn apply_batch(
        &self,
        user_id: &str,
        shard: &mut UserShard,
        events: &[CoActivationEvent],
        now: DateTime<Utc>,
    ) -> Vec<HebbianUpdate> {
        let window = Duration::seconds(self.learning.co_activation_window_secs as i64);
        let mut spent: HashMap<NodeId, f32> = HashMap::new();
        let mut touched: HashSet<NodeId> = HashSet::new();
        let mut updates = Vec::new();

        for event in events {
            if now - event.observed_at > window {
                debug!(
                    user_id,
                    node_a = %event.node_a,
                    node_b = %event.node_b,
                    "skipping stale co-activation event"
                );
                continue;
            }
            if event.node_a == event.node_b {
                continue;
            }

            // Deleted mid-flight: treat as a no-op, not an error
            let (conf_a, conf_b) = match (
                shard.nodes.get(&event.node_a),
                shard.nodes.get(&event.node_b),
            ) {
                (Some(a), Some(b)) => (a.confidence, b.confidence),
                _ => {
                    debug!(
                        user_id,
                        node_a = %event.node_a,
                        node_b = %event.node_b,
                        "dropping co-activation for deleted node"
                    );
                    continue;
                }
            };

            let act_a = event.activation_a.clamp(0.0, 1.0);
            let act_b = event.activation_b.clamp(0.0, 1.0);

            let count =
                shard
                    .edges
                    .record_co_activation(&event.node_a, &event.node_b, act_a, act_b);
            if count < self.learning.min_co_activation_count {
                continue;
            }

            // Poisoning defense: the weaker confidence gates the whole pair
            let trust_factor = conf_a.min(conf_b);
            let eta = self.learning.learning_rate * trust_factor;

            for (src, dst) in [
                (&event.node_a, &event.node_b),
                (&event.node_b, &event.node_a),
            ] {
                let current = shard.edges.get_weight(src, dst);
                let raw_delta = eta * act_a * act_b - self.learning.decay_lambda * current;

                let budget_src =
                    self.learning.gradient_clipping - spent.get(src.as_str()).copied().unwrap_or(0.0);
                let budget_dst =
                    self.learning.gradient_clipping - spent.get(dst.as_str()).copied().unwrap_or(0.0);
                let allowed = budget_src.min(budget_dst);
                if allowed <= 0.0 {
                    debug!(user_id, node = %src, "gradient budget exhausted for batch");
                    continue;
                }
                let delta = raw_delta.clamp(-allowed, allowed);

                let stored = shard.edges.upsert_weight(
                    src,
                    dst,
                    current + delta,
                    self.learning.weight_max,
                    self.prune_threshold,
                );
                let applied = stored - current;
                if applied == 0.0 {
                    continue;
                }

                *spent.entry(src.clone()).or_default() += applied.abs();
                *spent.entry(dst.clone()).or_default() += applied.abs();
                touched.insert(src.clone());

                let update = HebbianUpdate {
                    user_id: user_id.to_string(),
                    src_id: src.clone(),
                    dst_id: dst.clone(),
                    delta_weight: applied,
                    timestamp: now,
                };
                shard.push_audit(update.clone(), self.audit_capacity);
                updates.push(update);
            }
        }

        // Sparsify: keep only the strongest top_m_edges per touched node
        for node_id in touched {
            shard.edges.enforce_top_m(&node_id, self.learning.top_m_edges);
        }

        updates
    }
}
