//! Activation spreading across the association graph
//!
//! Breadth-first propagation from seed nodes, bounded in three ways: a hop
//! limit, a per-hop multiplicative decay, and a threshold floor below which
//! energy stops traveling. Incoming activation combines by max, not sum -
//! many weak paths must not accumulate into a strong one.

use chrono::Utc;
use std::collections::HashMap;

use crate::config::{NeuralMemoryConfig, SpreadingConfig};
use crate::store::EdgeStore;
use crate::types::{ActivationState, NodeId};

pub struct ActivationSpreader {
    config: SpreadingConfig,
}

impl ActivationSpreader {
    pub fn new(config: &NeuralMemoryConfig) -> Self {
        Self {
            config: config.spreading.clone(),
        }
    }

    /// Propagate activation outward from `seeds` (node id -> initial energy).
    ///
    /// Returns the best activation reached per node, including the seeds
    /// themselves at hop 0. All activations are in [0, 1].
    pub fn spread(
        &self,
        edges: &EdgeStore,
        seeds: &HashMap<NodeId, f32>,
    ) -> HashMap<NodeId, ActivationState> {
        let now = Utc::now();
        let mut best: HashMap<NodeId, ActivationState> = HashMap::new();
        let mut frontier: Vec<(NodeId, f32)> = Vec::with_capacity(seeds.len());

        for (node_id, &energy) in seeds {
            let energy = energy.clamp(0.0, 1.0);
            best.insert(
                node_id.clone(),
                ActivationState {
                    node_id: node_id.clone(),
                    activation: energy,
                    hop: 0,
                    source_node_id: None,
                    timestamp: now,
                },
            );
            frontier.push((node_id.clone(), energy));
        }

        for hop in 1..=self.config.spread_hops {
            let mut next: HashMap<NodeId, f32> = HashMap::new();

            for (node_id, energy) in &frontier {
                for edge in edges.neighbors(node_id) {
                    // Clamp keeps activation in [0, 1] when weight_max > 1
                    let incoming = (energy * edge.weight * self.config.spread_decay).min(1.0);
                    if incoming < self.config.spread_threshold {
                        continue;
                    }

                    let improves = best
                        .get(&edge.dst)
                        .map_or(true, |state| incoming > state.activation);
                    if improves {
                        best.insert(
                            edge.dst.clone(),
                            ActivationState {
                                node_id: edge.dst.clone(),
                                activation: incoming,
                                hop,
                                source_node_id: Some(node_id.clone()),
                                timestamp: now,
                            },
                        );
                        let slot = next.entry(edge.dst.clone()).or_insert(0.0);
                        if incoming > *slot {
                            *slot = incoming;
                        }
                    }
                }
            }

            if next.is_empty() {
                break;
            }
            frontier = next.into_iter().collect();
        }

        best
    }
}
