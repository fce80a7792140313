//! Hebbian learning: co-activation driven edge formation and strengthening

mod hebbian;
mod queue;

pub use hebbian::HebbianLearner;
pub use queue::{CoActivationQueue, HebbianWorker};

pub(crate) use queue::apply_events;
