//! Error types for Synaptic

use thiserror::Error;

/// Result type alias for Synaptic operations
pub type Result<T> = std::result::Result<T, MemoryError>;

/// Main error type for Synaptic
#[derive(Error, Debug)]
pub enum MemoryError {
    /// Malformed node or configuration: empty embedding, out-of-range
    /// importance/confidence, invalid tunables. Raised synchronously at
    /// ingestion or engine construction.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Node (or user shard) does not exist. Recoverable; recall paths
    /// surface an empty result set instead of propagating this.
    #[error("Node not found: {node_id}")]
    NotFound { node_id: String },

    /// A store exceeded its configured bounds. The store logs and evicts
    /// rather than failing the request; this surfaces only when eviction
    /// itself is impossible.
    #[error("Capacity exceeded: {0}")]
    Capacity(String),

    /// The co-activation queue was shut down while an event was in flight.
    #[error("Co-activation queue is closed")]
    QueueClosed,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MemoryError {
    /// Build a validation error from anything displayable.
    pub fn validation(msg: impl std::fmt::Display) -> Self {
        MemoryError::Validation(msg.to_string())
    }

    /// Build a not-found error for a node id.
    pub fn not_found(node_id: impl Into<String>) -> Self {
        MemoryError::NotFound {
            node_id: node_id.into(),
        }
    }

    /// Whether the caller can treat this as "no data" rather than a failure.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, MemoryError::NotFound { .. })
    }
}
