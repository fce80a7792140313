//! Core types for Synaptic

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, Result};

/// Unique identifier for a memory node
pub type NodeId = String;

/// Identifier of the owning user (shard key)
pub type UserId = String;

/// Default importance for freshly ingested nodes
pub const DEFAULT_IMPORTANCE: f32 = 0.5;

/// A memory node in the associative graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryNode {
    /// Unique identifier
    pub id: NodeId,
    /// Owning user; the mandatory isolation boundary
    pub user_id: UserId,
    /// What kind of memory this is
    pub kind: NodeKind,
    /// Raw content
    pub text: String,
    /// Fixed-length embedding vector (non-empty)
    pub embedding: Vec<f32>,
    /// Creation timestamp, immutable after ingestion
    pub created_at: DateTime<Utc>,
    /// Importance score (0.0 - 1.0), drifts with usage
    #[serde(default = "default_importance")]
    pub importance: f32,
    /// Source-reliability confidence (0.0 - 1.0)
    pub confidence: f32,
    /// Number of times this node was returned by recall
    #[serde(default)]
    pub use_count: u32,
    /// Where the content came from
    pub source: NodeSource,
    /// Short-term nodes fade and can be pruned; long-term nodes resist decay
    #[serde(default)]
    pub tier: NodeTier,
    /// When this node was last returned by recall
    pub last_recalled_at: Option<DateTime<Utc>>,
}

fn default_importance() -> f32 {
    DEFAULT_IMPORTANCE
}

impl MemoryNode {
    /// Create a node with a generated id, default importance, and the
    /// source's default confidence.
    pub fn new(
        user_id: impl Into<UserId>,
        kind: NodeKind,
        text: impl Into<String>,
        embedding: Vec<f32>,
        source: NodeSource,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            kind,
            text: text.into(),
            embedding,
            created_at: Utc::now(),
            importance: DEFAULT_IMPORTANCE,
            confidence: source.default_confidence(),
            use_count: 0,
            source,
            tier: NodeTier::ShortTerm,
            last_recalled_at: None,
        }
    }

    /// Check the data-model invariants. Violations are rejected at ingest.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(MemoryError::validation("node id must not be empty"));
        }
        if self.user_id.is_empty() {
            return Err(MemoryError::validation("user_id must not be empty"));
        }
        if self.embedding.is_empty() {
            return Err(MemoryError::validation("embedding must not be empty"));
        }
        if !(0.0..=1.0).contains(&self.importance) {
            return Err(MemoryError::validation(format!(
                "importance {} out of range [0, 1]",
                self.importance
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(MemoryError::validation(format!(
                "confidence {} out of range [0, 1]",
                self.confidence
            )));
        }
        Ok(())
    }
}

/// Memory node classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    #[default]
    Fact,
    Preference,
    Task,
    Dialogue,
    Summary,
    ToolLog,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fact => "fact",
            Self::Preference => "preference",
            Self::Task => "task",
            Self::Dialogue => "dialogue",
            Self::Summary => "summary",
            Self::ToolLog => "tool-log",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "fact" => Ok(Self::Fact),
            "preference" => Ok(Self::Preference),
            "task" => Ok(Self::Task),
            "dialogue" => Ok(Self::Dialogue),
            "summary" => Ok(Self::Summary),
            "tool-log" => Ok(Self::ToolLog),
            _ => Err(format!("unknown node kind: {s}")),
        }
    }
}

/// Provenance of a memory node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeSource {
    #[default]
    User,
    System,
    Web,
    File,
    Tool,
    Llm,
}

impl NodeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::System => "system",
            Self::Web => "web",
            Self::File => "file",
            Self::Tool => "tool",
            Self::Llm => "llm",
        }
    }

    /// Baseline confidence by source reliability. Direct user statements and
    /// system facts rank above scraped or model-generated content.
    pub fn default_confidence(&self) -> f32 {
        match self {
            Self::User => 0.9,
            Self::System => 0.95,
            Self::File => 0.8,
            Self::Tool => 0.7,
            Self::Llm => 0.6,
            Self::Web => 0.5,
        }
    }
}

impl std::fmt::Display for NodeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NodeSource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "system" => Ok(Self::System),
            "web" => Ok(Self::Web),
            "file" => Ok(Self::File),
            "tool" => Ok(Self::Tool),
            "llm" => Ok(Self::Llm),
            _ => Err(format!("unknown node source: {s}")),
        }
    }
}

/// Memory tier controlling decay behavior
///
/// - `ShortTerm`: importance fades each decay cycle and the node can be
///   pruned once it drops below the floor
/// - `LongTerm`: promoted by consolidation, exempt from fade and pruning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NodeTier {
    #[default]
    ShortTerm,
    LongTerm,
}

/// A weighted directed association between two nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub src: NodeId,
    pub dst: NodeId,
    /// Weight in [0, weight_max]
    pub weight: f32,
}

/// Co-activation statistics for an unordered node pair
///
/// The pair is stored canonically with `node_a < node_b` lexicographically,
/// so `("b", "a")` and `("a", "b")` address the same record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoActivationRecord {
    pub node_a: NodeId,
    pub node_b: NodeId,
    /// Number of co-activation events observed
    pub count: u32,
    /// Running sum of activation_a * activation_b across events
    pub total_activation_product: f32,
    /// When the pair last co-activated
    pub last_seen: DateTime<Utc>,
}

impl CoActivationRecord {
    /// Create an empty record for a pair, canonicalizing the order.
    pub fn new(a: impl Into<NodeId>, b: impl Into<NodeId>) -> Self {
        let (node_a, node_b) = canonical_pair(a.into(), b.into());
        Self {
            node_a,
            node_b,
            count: 0,
            total_activation_product: 0.0,
            last_seen: Utc::now(),
        }
    }

    /// Record one co-activation event.
    pub fn update(&mut self, activation_a: f32, activation_b: f32) {
        self.count += 1;
        self.total_activation_product += activation_a * activation_b;
        self.last_seen = Utc::now();
    }

    /// Mean activation product, 0.0 when no events were observed.
    pub fn average_activation_product(&self) -> f32 {
        if self.count == 0 {
            0.0
        } else {
            self.total_activation_product / self.count as f32
        }
    }
}

/// Order a pair canonically: lexicographically smaller id first.
pub fn canonical_pair(a: NodeId, b: NodeId) -> (NodeId, NodeId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Transient activation produced during one spreading pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivationState {
    pub node_id: NodeId,
    /// Activation energy in [0, 1]
    pub activation: f32,
    /// Distance in hops from a seed node (0 for seeds)
    pub hop: u32,
    /// Seed or parent node that produced this activation, if any
    pub source_node_id: Option<NodeId>,
    pub timestamp: DateTime<Utc>,
}

/// Audit record of a single Hebbian weight change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HebbianUpdate {
    pub user_id: UserId,
    pub src_id: NodeId,
    pub dst_id: NodeId,
    /// Signed weight delta actually applied (after clipping and clamping)
    pub delta_weight: f32,
    pub timestamp: DateTime<Utc>,
}

/// One co-activation observation queued for the Hebbian worker
#[derive(Debug, Clone)]
pub struct CoActivationEvent {
    pub user_id: UserId,
    pub node_a: NodeId,
    pub node_b: NodeId,
    pub activation_a: f32,
    pub activation_b: f32,
    pub observed_at: DateTime<Utc>,
}

impl CoActivationEvent {
    pub fn new(
        user_id: impl Into<UserId>,
        node_a: impl Into<NodeId>,
        node_b: impl Into<NodeId>,
        activation_a: f32,
        activation_b: f32,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            node_a: node_a.into(),
            node_b: node_b.into(),
            activation_a,
            activation_b,
            observed_at: Utc::now(),
        }
    }
}

/// Per-signal contributions to a recall score, for explainability
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ScoreComponents {
    /// Vector similarity to the query
    pub semantic: f32,
    /// Best activation reached via spreading
    pub graph: f32,
    /// exp(-age / recency_tau)
    pub recency: f32,
    /// Usage-driven importance
    pub importance: f32,
    /// Source-reliability confidence
    pub trust: f32,
    /// MMR penalty against already-selected results (subtracted)
    pub redundancy_penalty: f32,
}

/// A single ranked recall hit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecallResult {
    pub node: MemoryNode,
    /// Fused relevance score (non-negative)
    pub score: f32,
    pub components: ScoreComponents,
}

/// Filter for listing a user's nodes
#[derive(Debug, Clone, Default)]
pub struct NodeFilter {
    pub kind: Option<NodeKind>,
    pub source: Option<NodeSource>,
    pub tier: Option<NodeTier>,
}

impl NodeFilter {
    pub fn matches(&self, node: &MemoryNode) -> bool {
        self.kind.map_or(true, |k| node.kind == k)
            && self.source.map_or(true, |s| node.source == s)
            && self.tier.map_or(true, |t| node.tier == t)
    }
}

/// Shard-level statistics
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MemoryStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub co_activation_pairs: usize,
    pub long_term_count: usize,
    /// Mean outgoing degree across nodes that have edges
    pub avg_out_degree: f32,
}
