//! Engine configuration
//!
//! One immutable [`NeuralMemoryConfig`] is passed by reference into every
//! component constructor; there is no global registry. All tunables are
//! range-checked once, at engine construction, so out-of-range values fail
//! fast instead of being clamped silently. The only lenient check is the
//! scoring-weight sum, which warns and proceeds.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{MemoryError, Result};

/// Top-level configuration for the memory engine
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct NeuralMemoryConfig {
    pub learning: LearningConfig,
    pub spreading: SpreadingConfig,
    pub scoring: ScoringConfig,
    pub decay: DecayConfig,
    pub limits: LimitsConfig,
}

/// Hebbian learning tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    /// Base learning rate (eta), modulated per event by node trust
    pub learning_rate: f32,
    /// Weight decay term (lambda) applied inside each update
    pub decay_lambda: f32,
    /// Upper bound for edge weights
    pub weight_max: f32,
    /// Keep only this many strongest outgoing edges per node
    pub top_m_edges: usize,
    /// Maximum total |delta_weight| any node may accrue in one batch
    pub gradient_clipping: f32,
    /// Events older than this are stale and ignored
    pub co_activation_window_secs: u64,
    /// Pairs below this observation count get statistics but no edge
    pub min_co_activation_count: u32,
    /// Batch size for the background update worker
    pub batch_update_size: usize,
    /// Debounce before a partial batch is applied
    pub async_update_delay_ms: u64,
    /// Bound on pending co-activation events; oldest dropped when full
    pub queue_capacity: usize,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            decay_lambda: 0.01,
            weight_max: 1.0,
            top_m_edges: 16,
            gradient_clipping: 0.5,
            co_activation_window_secs: 300,
            min_co_activation_count: 2,
            batch_update_size: 64,
            async_update_delay_ms: 500,
            queue_capacity: 4096,
        }
    }
}

/// Activation spreading tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpreadingConfig {
    /// Number of hops to propagate (1 - 3)
    pub spread_hops: u32,
    /// Multiplicative decay applied per hop
    pub spread_decay: f32,
    /// Activations below this floor stop propagating
    pub spread_threshold: f32,
}

impl Default for SpreadingConfig {
    fn default() -> Self {
        Self {
            spread_hops: 2,
            spread_decay: 0.7,
            spread_threshold: 0.05,
        }
    }
}

/// Recall scoring weights and shape parameters
///
/// `alpha` through `epsilon` are normalized to sum to 1.0 at scoring time;
/// `zeta` is an independent penalty and passes through unnormalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Semantic similarity weight
    pub alpha: f32,
    /// Graph activation weight
    pub beta: f32,
    /// Recency weight
    pub gamma: f32,
    /// Importance weight
    pub delta: f32,
    /// Trust (confidence) weight
    pub epsilon: f32,
    /// Redundancy penalty strength (MMR)
    pub zeta: f32,
    /// Time constant for the recency signal, in days
    pub recency_tau_days: f32,
    /// How many semantic neighbors to pull from the vector index
    pub max_candidates_k: usize,
    /// EMA factor for importance drift on recall hits
    pub importance_ema_alpha: f32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            alpha: 0.35,
            beta: 0.25,
            gamma: 0.15,
            delta: 0.15,
            epsilon: 0.10,
            zeta: 0.3,
            recency_tau_days: 30.0,
            max_candidates_k: 20,
            importance_ema_alpha: 0.1,
        }
    }
}

/// Background decay and consolidation tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecayConfig {
    /// Per-cycle multiplicative edge decay: w *= (1 - decay_rate)
    pub decay_rate: f32,
    /// Edges at or below this weight are deleted
    pub prune_threshold: f32,
    /// Seconds between background decay cycles
    pub background_interval_secs: u64,
    /// Minimum use_count for long-term promotion
    pub consolidation_use_count_min: u32,
    /// Minimum importance for long-term promotion
    pub consolidation_importance_min: f32,
    /// Minimum neighbor-diversity score for long-term promotion
    pub consolidation_diversity_min: f32,
    /// Decay multiplier for edges between two long-term nodes
    pub long_term_decay_factor: f32,
    /// Short-term nodes below this importance with no recalls are pruned
    pub node_prune_floor: f32,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            decay_rate: 0.02,
            prune_threshold: 0.01,
            background_interval_secs: 300,
            consolidation_use_count_min: 5,
            consolidation_importance_min: 0.6,
            consolidation_diversity_min: 0.3,
            long_term_decay_factor: 0.25,
            node_prune_floor: 0.05,
        }
    }
}

/// Store capacity bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Nodes per user shard; the weakest short-term node is evicted beyond this
    pub max_nodes_per_user: usize,
    /// Hebbian audit entries retained per shard
    pub audit_log_capacity: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_nodes_per_user: 10_000,
            audit_log_capacity: 256,
        }
    }
}

/// How far the alpha..epsilon sum may drift from 1.0 before warning
const WEIGHT_SUM_TOLERANCE: f32 = 0.05;

impl NeuralMemoryConfig {
    /// Validate every tunable, failing fast on out-of-range values.
    ///
    /// The scoring-weight sum is deliberately lenient: exploratory configs
    /// with unnormalized weights log a warning and proceed, because the
    /// scorer renormalizes at use.
    pub fn validate(&self) -> Result<()> {
        let l = &self.learning;
        range_check("learning_rate", l.learning_rate, 0.0, 1.0, Bound::ExclusiveLow)?;
        range_check("decay_lambda", l.decay_lambda, 0.0, 1.0, Bound::ExclusiveHigh)?;
        if !l.weight_max.is_finite() || l.weight_max <= 0.0 {
            return Err(MemoryError::validation("weight_max must be positive"));
        }
        if l.top_m_edges == 0 {
            return Err(MemoryError::validation("top_m_edges must be at least 1"));
        }
        if !l.gradient_clipping.is_finite() || l.gradient_clipping <= 0.0 {
            return Err(MemoryError::validation("gradient_clipping must be positive"));
        }
        if l.min_co_activation_count == 0 {
            return Err(MemoryError::validation("min_co_activation_count must be at least 1"));
        }
        if l.batch_update_size == 0 {
            return Err(MemoryError::validation("batch_update_size must be at least 1"));
        }
        if l.queue_capacity == 0 {
            return Err(MemoryError::validation("queue_capacity must be at least 1"));
        }

        let s = &self.spreading;
        if !(1..=3).contains(&s.spread_hops) {
            return Err(MemoryError::validation(format!(
                "spread_hops {} out of range [1, 3]",
                s.spread_hops
            )));
        }
        range_check("spread_decay", s.spread_decay, 0.0, 1.0, Bound::ExclusiveLow)?;
        range_check("spread_threshold", s.spread_threshold, 0.0, 1.0, Bound::ExclusiveHigh)?;

        let sc = &self.scoring;
        for (name, value) in [
            ("alpha", sc.alpha),
            ("beta", sc.beta),
            ("gamma", sc.gamma),
            ("delta", sc.delta),
            ("epsilon", sc.epsilon),
            ("zeta", sc.zeta),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(MemoryError::validation(format!(
                    "scoring weight {name} must be finite and non-negative, got {value}"
                )));
            }
        }
        let sum = sc.alpha + sc.beta + sc.gamma + sc.delta + sc.epsilon;
        if sum <= 0.0 {
            return Err(MemoryError::validation(
                "scoring weights alpha..epsilon must not all be zero",
            ));
        }
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            warn!(
                sum,
                "scoring weights alpha..epsilon sum far from 1.0; renormalizing at scoring time"
            );
        }
        if !sc.recency_tau_days.is_finite() || sc.recency_tau_days <= 0.0 {
            return Err(MemoryError::validation("recency_tau_days must be positive"));
        }
        if sc.max_candidates_k == 0 {
            return Err(MemoryError::validation("max_candidates_k must be at least 1"));
        }
        range_check(
            "importance_ema_alpha",
            sc.importance_ema_alpha,
            0.0,
            1.0,
            Bound::Inclusive,
        )?;

        let d = &self.decay;
        range_check("decay_rate", d.decay_rate, 0.0, 1.0, Bound::ExclusiveBoth)?;
        if !d.prune_threshold.is_finite()
            || d.prune_threshold < 0.0
            || d.prune_threshold >= l.weight_max
        {
            return Err(MemoryError::validation(format!(
                "prune_threshold {} out of range [0, weight_max)",
                d.prune_threshold
            )));
        }
        if d.background_interval_secs == 0 {
            return Err(MemoryError::validation(
                "decay background_interval_secs must be at least 1",
            ));
        }
        range_check(
            "consolidation_importance_min",
            d.consolidation_importance_min,
            0.0,
            1.0,
            Bound::Inclusive,
        )?;
        range_check(
            "consolidation_diversity_min",
            d.consolidation_diversity_min,
            0.0,
            1.0,
            Bound::Inclusive,
        )?;
        range_check(
            "long_term_decay_factor",
            d.long_term_decay_factor,
            0.0,
            1.0,
            Bound::Inclusive,
        )?;
        range_check("node_prune_floor", d.node_prune_floor, 0.0, 1.0, Bound::ExclusiveHigh)?;

        if self.limits.max_nodes_per_user == 0 {
            return Err(MemoryError::validation("max_nodes_per_user must be at least 1"));
        }

        Ok(())
    }

    /// The alpha..epsilon weights normalized to sum to 1.0.
    ///
    /// Zeta is independent of the normalized group and is not returned here.
    pub fn scoring_weights_normalized(&self) -> [f32; 5] {
        let sc = &self.scoring;
        let sum = sc.alpha + sc.beta + sc.gamma + sc.delta + sc.epsilon;
        [
            sc.alpha / sum,
            sc.beta / sum,
            sc.gamma / sum,
            sc.delta / sum,
            sc.epsilon / sum,
        ]
    }
}

enum Bound {
    Inclusive,
    ExclusiveLow,
    ExclusiveHigh,
    ExclusiveBoth,
}

fn range_check(name: &str, value: f32, low: f32, high: f32, bound: Bound) -> Result<()> {
    let ok = value.is_finite()
        && match bound {
            Bound::Inclusive => value >= low && value <= high,
            Bound::ExclusiveLow => value > low && value <= high,
            Bound::ExclusiveHigh => value >= low && value < high,
            Bound::ExclusiveBoth => value > low && value < high,
        };
    if ok {
        Ok(())
    } else {
        Err(MemoryError::validation(format!(
            "{name} {value} out of range ({low}, {high})"
        )))
    }
}
