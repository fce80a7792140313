//! Synaptic - Neural Associative Memory
//!
//! A Hebbian-learning graph over memory nodes for AI agents: recall spreads
//! activation across learned associations, observed co-activations
//! strengthen edges asynchronously, and a background daemon lets unused
//! memories fade.
//!
//! Memory graphs are sharded per user; one user's graph is never visible to
//! another. Embeddings and vector search stay external, consumed through the
//! traits in [`index`].

pub mod config;
pub mod decay;
pub mod engine;
pub mod error;
pub mod index;
pub mod learning;
pub mod recall;
pub mod store;
pub mod types;

pub use config::NeuralMemoryConfig;
pub use engine::{BackgroundTasks, NeuralMemory};
pub use error::{MemoryError, Result};
pub use index::{cosine_similarity, Embedder, InMemoryIndex, VectorIndex};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
