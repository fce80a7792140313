//! Recall: spreading expansion plus multi-signal ranked retrieval

mod scoring;
mod spreading;

pub use scoring::RecallScorer;
pub use spreading::ActivationSpreader;
