//! End-to-end flows through the memory engine
//!
//! Exercises the full loop: ingest -> recall -> co-activation feedback ->
//! Hebbian learning -> decay/forgetting, all through the public API.
//!
//! Run with: cargo test --test recall_flow

use std::sync::Arc;

use pretty_assertions::assert_eq;
use synaptic::{
    Embedder, InMemoryIndex, MemoryNode, NeuralMemory, NeuralMemoryConfig, NodeKind, NodeSource,
    NodeTier,
};

/// Deterministic toy embedder: hashes words into a small fixed vector.
/// Stands in for a real model the way the engine consumes one.
struct ToyEmbedder;

impl Embedder for ToyEmbedder {
    fn embed(&self, text: &str) -> synaptic::Result<Vec<f32>> {
        let mut v = vec![0.0f32; 8];
        for word in text.split_whitespace() {
            let bucket = word
                .bytes()
                .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize))
                % v.len();
            v[bucket] += 1.0;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(v)
    }

    fn dimensions(&self) -> usize {
        8
    }
}

fn engine_with(configure: impl FnOnce(&mut NeuralMemoryConfig)) -> NeuralMemory {
    let mut config = NeuralMemoryConfig::default();
    configure(&mut config);
    NeuralMemory::new(config, Arc::new(InMemoryIndex::new())).unwrap()
}

fn node(user: &str, id: &str, embedding: Vec<f32>, importance: f32) -> MemoryNode {
    let mut n = MemoryNode::new(user, NodeKind::Fact, id, embedding, NodeSource::User);
    n.id = id.to_string();
    n.importance = importance;
    n
}

// ============================================================================
// CO-ACTIVATION WIRES AN EDGE
// ============================================================================

#[test]
fn repeated_co_activation_creates_bounded_edge() {
    let engine = engine_with(|c| {
        c.learning.min_co_activation_count = 2;
    });
    engine
        .ingest(node("u1", "a", vec![1.0, 0.0, 0.0], 0.7))
        .unwrap();
    engine
        .ingest(node("u1", "b", vec![0.0, 1.0, 0.0], 0.3))
        .unwrap();

    for _ in 0..3 {
        engine
            .record_co_activation("u1", "a", "b", 0.9, 0.8)
            .unwrap();
    }
    engine.flush();

    let weight = engine.edge_weight("u1", "a", "b");
    assert!(weight > 0.0, "edge a->b should exist after co-activation");
    assert!(weight <= engine.config().learning.weight_max);
    // Reverse direction wired too
    assert!(engine.edge_weight("u1", "b", "a") > 0.0);

    // Statistics tracked all three events
    let stats = engine.stats("u1");
    assert_eq!(stats.co_activation_pairs, 1);
}

// ============================================================================
// GRAPH ASSOCIATION SURFACES SEMANTICALLY DISTANT NODES
// ============================================================================

#[test]
fn recall_blends_semantic_and_graph_signals() {
    let engine = engine_with(|c| {
        c.learning.min_co_activation_count = 1;
        c.learning.learning_rate = 0.8;
        c.learning.gradient_clipping = 2.0;
    });
    engine
        .ingest(node("u1", "a", vec![1.0, 0.0, 0.0], 0.5))
        .unwrap();
    engine
        .ingest(node("u1", "b", vec![0.0, 1.0, 0.0], 0.5))
        .unwrap();

    // Build a strong association a <-> b
    for _ in 0..5 {
        engine
            .record_co_activation("u1", "a", "b", 1.0, 1.0)
            .unwrap();
        engine.flush();
    }
    assert!(engine.edge_weight("u1", "a", "b") > 0.3);

    // Query sits on a's embedding; b is orthogonal to it
    let results = engine.recall("u1", &[1.0, 0.0, 0.0], 5).unwrap();
    assert_eq!(results.len(), 2);

    let a = results.iter().find(|r| r.node.id == "a").unwrap();
    let b = results.iter().find(|r| r.node.id == "b").unwrap();
    assert!(a.components.semantic > 0.9, "a is a direct semantic hit");
    assert!(
        b.components.graph > 0.0,
        "b is surfaced through the association graph"
    );
    assert!(a.score >= b.score);
}

// ============================================================================
// FORGET PURGES NODE AND EDGES
// ============================================================================

#[test]
fn forget_removes_node_from_recall_and_graph() {
    let engine = engine_with(|c| {
        c.learning.min_co_activation_count = 1;
    });
    engine
        .ingest(node("u1", "a", vec![1.0, 0.0], 0.5))
        .unwrap();
    engine
        .ingest(node("u1", "b", vec![0.9, 0.1], 0.5))
        .unwrap();
    engine
        .record_co_activation("u1", "a", "b", 0.9, 0.9)
        .unwrap();
    engine.flush();
    assert!(engine.edge_weight("u1", "a", "b") > 0.0);

    engine.forget("u1", "a").unwrap();

    let results = engine.recall("u1", &[1.0, 0.0], 10).unwrap();
    assert!(results.iter().all(|r| r.node.id != "a"));
    assert_eq!(engine.edge_weight("u1", "a", "b"), 0.0);
    assert_eq!(engine.edge_weight("u1", "b", "a"), 0.0);
    assert!(engine.get("u1", "a").is_err());
}

// ============================================================================
// LENIENT SCORING WEIGHTS
// ============================================================================

#[test]
fn unnormalized_scoring_weights_construct_successfully() {
    // Sum is 0.5; validation warns but does not fail
    let engine = engine_with(|c| {
        c.scoring.alpha = 0.1;
        c.scoring.beta = 0.1;
        c.scoring.gamma = 0.1;
        c.scoring.delta = 0.1;
        c.scoring.epsilon = 0.1;
    });

    let weights = engine.config().scoring_weights_normalized();
    let sum: f32 = weights.iter().sum();
    assert!((sum - 1.0).abs() < 1e-6);
}

// ============================================================================
// DECAY AND CONSOLIDATION
// ============================================================================

#[test]
fn decay_cycles_forget_unused_associations() {
    let engine = engine_with(|c| {
        c.learning.min_co_activation_count = 1;
        c.decay.decay_rate = 0.5;
        c.decay.prune_threshold = 0.05;
    });
    engine
        .ingest(node("u1", "a", vec![1.0, 0.0], 0.9))
        .unwrap();
    engine
        .ingest(node("u1", "b", vec![0.9, 0.1], 0.9))
        .unwrap();
    engine
        .record_co_activation("u1", "a", "b", 1.0, 1.0)
        .unwrap();
    engine.flush();

    let initial = engine.edge_weight("u1", "a", "b");
    assert!(initial > 0.0);

    // Aggressive decay halves the weight each cycle until pruned
    let mut last = initial;
    for _ in 0..10 {
        engine.run_decay_cycle();
        let w = engine.edge_weight("u1", "a", "b");
        assert!(w <= last, "decay must never increase a weight");
        last = w;
    }
    assert_eq!(last, 0.0, "weak edge should be pruned away");
}

#[test]
fn frequently_used_nodes_consolidate_to_long_term() {
    let engine = engine_with(|c| {
        c.learning.min_co_activation_count = 1;
        c.decay.consolidation_use_count_min = 3;
        c.decay.consolidation_importance_min = 0.5;
        c.decay.consolidation_diversity_min = 0.05;
    });
    engine
        .ingest(node("u1", "hub", vec![1.0, 0.0], 0.5))
        .unwrap();
    engine
        .ingest(node("u1", "spoke", vec![0.9, 0.1], 0.5))
        .unwrap();

    // Recall the hub repeatedly to drive use_count and importance up,
    // wiring edges along the way
    for _ in 0..4 {
        let results = engine.recall("u1", &[1.0, 0.0], 5).unwrap();
        assert!(!results.is_empty());
        engine.flush();
    }
    let hub = engine.get("u1", "hub").unwrap();
    assert!(hub.use_count >= 3);
    assert!(hub.importance > 0.5);

    engine.run_decay_cycle();

    let hub = engine.get("u1", "hub").unwrap();
    assert_eq!(hub.tier, NodeTier::LongTerm);

    // Long-term status shields importance from further fade
    let before = hub.importance;
    engine.run_decay_cycle();
    assert_eq!(engine.get("u1", "hub").unwrap().importance, before);
}

// ============================================================================
// ISOLATION AND PURGE
// ============================================================================

#[test]
fn purge_user_leaves_other_shards_untouched() {
    let engine = engine_with(|c| {
        c.learning.min_co_activation_count = 1;
    });
    engine
        .ingest(node("u1", "a", vec![1.0, 0.0], 0.5))
        .unwrap();
    engine
        .ingest(node("u2", "a", vec![1.0, 0.0], 0.5))
        .unwrap();

    engine.purge_user("u1").unwrap();

    assert!(engine.recall("u1", &[1.0, 0.0], 5).unwrap().is_empty());
    let survivors = engine.recall("u2", &[1.0, 0.0], 5).unwrap();
    assert_eq!(survivors.len(), 1);
}

#[test]
fn recall_never_crosses_user_boundaries() {
    let engine = engine_with(|_| {});
    engine
        .ingest(node("alice", "secret", vec![1.0, 0.0], 0.9))
        .unwrap();
    engine
        .ingest(node("bob", "own", vec![1.0, 0.0], 0.9))
        .unwrap();

    let results = engine.recall("bob", &[1.0, 0.0], 50).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].node.id, "own");
}

// ============================================================================
// TEXT IN, RANKED MEMORIES OUT
// ============================================================================

#[test]
fn text_round_trip_through_an_embedder() {
    let embedder = ToyEmbedder;
    let engine = engine_with(|_| {});

    for (id, text) in [
        ("pref", "user prefers dark mode in every editor"),
        ("lang", "user writes mostly rust and python"),
        ("meet", "weekly sync happens on tuesday mornings"),
    ] {
        let mut n = MemoryNode::new(
            "u1",
            NodeKind::Preference,
            text,
            embedder.embed(text).unwrap(),
            NodeSource::User,
        );
        n.id = id.to_string();
        engine.ingest(n).unwrap();
    }

    let query = embedder.embed("user prefers dark mode in every editor").unwrap();
    let results = engine.recall("u1", &query, 2).unwrap();
    assert!(!results.is_empty());
    // The verbatim match must win
    assert_eq!(results[0].node.id, "pref");
    assert!(results[0].components.semantic > 0.99);
}

// ============================================================================
// BACKGROUND PIPELINE
// ============================================================================

#[tokio::test]
async fn background_worker_applies_recall_feedback() {
    let engine = engine_with(|c| {
        c.learning.min_co_activation_count = 1;
        c.learning.async_update_delay_ms = 10;
    });
    engine
        .ingest(node("u1", "a", vec![1.0, 0.0], 0.5))
        .unwrap();
    engine
        .ingest(node("u1", "b", vec![0.9, 0.1], 0.5))
        .unwrap();

    let tasks = engine.start_background();

    // Recall returns both nodes and schedules their pair co-activation
    let results = engine.recall("u1", &[1.0, 0.0], 5).unwrap();
    assert_eq!(results.len(), 2);

    tasks.shutdown().await;

    assert!(
        engine.edge_weight("u1", "a", "b") > 0.0,
        "worker should have wired the recalled pair before stopping"
    );
}
