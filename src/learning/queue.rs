//! Async co-activation queue with debounced batch processing
//!
//! Recall paths publish co-activation events without blocking; a background
//! worker coalesces near-simultaneous events into one batched Hebbian update
//! per user shard. The queue is bounded: when full, the oldest pending event
//! is dropped (co-activation is an approximate signal, so lossy degradation
//! beats backpressure on the request path).

use async_channel::{bounded, Receiver, Sender, TrySendError};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, warn};

use super::hebbian::HebbianLearner;
use crate::error::{MemoryError, Result};
use crate::store::ShardedStore;
use crate::types::{CoActivationEvent, UserId};

/// Bounded queue of pending co-activation events
#[derive(Clone)]
pub struct CoActivationQueue {
    sender: Sender<CoActivationEvent>,
    receiver: Receiver<CoActivationEvent>,
}

impl CoActivationQueue {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self { sender, receiver }
    }

    /// Enqueue an event without blocking.
    ///
    /// When the queue is full the oldest pending event is dropped to make
    /// room, with a warning.
    pub fn publish(&self, event: CoActivationEvent) -> Result<()> {
        let mut event = event;
        loop {
            match self.sender.try_send(event) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(rejected)) => {
                    if self.receiver.try_recv().is_ok() {
                        warn!("co-activation queue full; dropped oldest pending event");
                    }
                    event = rejected;
                }
                Err(TrySendError::Closed(_)) => return Err(MemoryError::QueueClosed),
            }
        }
    }

    /// Drain everything currently queued, without waiting.
    pub fn drain(&self) -> Vec<CoActivationEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Close the queue; subsequent publishes fail and the worker drains out.
    pub fn close(&self) {
        self.receiver.close();
    }

    fn receiver(&self) -> Receiver<CoActivationEvent> {
        self.receiver.clone()
    }
}

/// Group events per user so each shard gets one atomic batch.
pub(crate) fn group_by_user(
    events: Vec<CoActivationEvent>,
) -> HashMap<UserId, Vec<CoActivationEvent>> {
    let mut grouped: HashMap<UserId, Vec<CoActivationEvent>> = HashMap::new();
    for event in events {
        grouped.entry(event.user_id.clone()).or_default().push(event);
    }
    grouped
}

/// Apply grouped events, one shard write lock per user.
///
/// Errors never escape: a shard that no longer exists is skipped, keeping
/// one user's churn from affecting others. Returns applied update count.
pub(crate) fn apply_events(
    store: &ShardedStore,
    learner: &HebbianLearner,
    events: Vec<CoActivationEvent>,
) -> usize {
    let now = Utc::now();
    let mut applied = 0;
    for (user_id, batch) in group_by_user(events) {
        let Some(shard) = store.shard(&user_id) else {
            debug!(%user_id, "dropping co-activation batch for purged user");
            continue;
        };
        let mut shard = shard.write();
        let updates = learner.apply_batch(&user_id, &mut shard, &batch, now);
        applied += updates.len();
    }
    applied
}

/// Background worker that feeds queued events to the Hebbian learner
pub struct HebbianWorker {
    store: Arc<ShardedStore>,
    learner: Arc<HebbianLearner>,
    queue: CoActivationQueue,
    batch_size: usize,
    debounce: Duration,
}

impl HebbianWorker {
    pub fn new(
        store: Arc<ShardedStore>,
        learner: Arc<HebbianLearner>,
        queue: CoActivationQueue,
        batch_size: usize,
        debounce_ms: u64,
    ) -> Self {
        Self {
            store,
            learner,
            queue,
            batch_size,
            debounce: Duration::from_millis(debounce_ms.max(1)),
        }
    }

    /// Run until the queue is closed and drained (call in a spawned task).
    pub async fn run(self) {
        let receiver = self.queue.receiver();
        let mut batch: Vec<CoActivationEvent> = Vec::with_capacity(self.batch_size);
        let mut debounce_timer = interval(self.debounce);

        loop {
            tokio::select! {
                result = receiver.recv() => {
                    match result {
                        Ok(event) => {
                            batch.push(event);
                            if batch.len() >= self.batch_size {
                                self.flush(&mut batch);
                            }
                        }
                        Err(_) => {
                            // Queue closed: apply what is left and stop
                            self.flush(&mut batch);
                            break;
                        }
                    }
                }
                _ = debounce_timer.tick() => {
                    self.flush(&mut batch);
                }
            }
        }

        debug!("hebbian worker stopped");
    }

    fn flush(&self, batch: &mut Vec<CoActivationEvent>) {
        if batch.is_empty() {
            return;
        }
        let events = std::mem::take(batch);
        let count = events.len();
        let applied = apply_events(&self.store, &self.learner, events);
        debug!(events = count, applied, "applied hebbian batch");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NeuralMemoryConfig;
    use crate::types::{MemoryNode, NodeKind, NodeSource};

    fn seeded_store(user_id: &str, ids: &[&str]) -> Arc<ShardedStore> {
        let store = Arc::new(ShardedStore::new());
        let shard = store.shard_or_create(user_id);
        let mut shard = shard.write();
        for id in ids {
            let mut node =
                MemoryNode::new(user_id, NodeKind::Fact, *id, vec![1.0, 0.0], NodeSource::User);
            node.id = id.to_string();
            node.confidence = 0.9;
            shard.nodes.put(node).unwrap();
        }
        drop(shard);
        store
    }

    fn test_learner() -> Arc<HebbianLearner> {
        let mut config = NeuralMemoryConfig::default();
        config.learning.min_co_activation_count = 1;
        Arc::new(HebbianLearner::new(&config))
    }

    #[test]
    fn overflow_drops_oldest_not_newest() {
        let queue = CoActivationQueue::new(2);
        for i in 0..5 {
            queue
                .publish(CoActivationEvent::new("u1", format!("n{i}"), "x", 0.5, 0.5))
                .unwrap();
        }
        assert_eq!(queue.len(), 2);
        let drained = queue.drain();
        // Oldest events were sacrificed; the two newest survive
        assert_eq!(drained[0].node_a, "n3");
        assert_eq!(drained[1].node_a, "n4");
    }

    #[test]
    fn publish_after_close_fails() {
        let queue = CoActivationQueue::new(4);
        queue.close();
        let err = queue
            .publish(CoActivationEvent::new("u1", "a", "b", 0.5, 0.5))
            .unwrap_err();
        assert!(matches!(err, MemoryError::QueueClosed));
    }

    #[test]
    fn apply_events_groups_per_user() {
        let store = seeded_store("u1", &["a", "b"]);
        // Second user shard with its own pair
        {
            let shard = store.shard_or_create("u2");
            let mut shard = shard.write();
            for id in ["c", "d"] {
                let mut node =
                    MemoryNode::new("u2", NodeKind::Fact, id, vec![1.0, 0.0], NodeSource::User);
                node.id = id.to_string();
                shard.nodes.put(node).unwrap();
            }
        }

        let events = vec![
            CoActivationEvent::new("u1", "a", "b", 0.9, 0.9),
            CoActivationEvent::new("u2", "c", "d", 0.9, 0.9),
        ];
        let applied = apply_events(&store, &test_learner(), events);
        assert_eq!(applied, 4);
        assert!(store.shard("u1").unwrap().read().edges.get_weight("a", "b") > 0.0);
        assert!(store.shard("u2").unwrap().read().edges.get_weight("c", "d") > 0.0);
    }

    #[test]
    fn purged_user_batch_is_skipped() {
        let store = Arc::new(ShardedStore::new());
        let events = vec![CoActivationEvent::new("ghost", "a", "b", 0.9, 0.9)];
        let applied = apply_events(&store, &test_learner(), events);
        assert_eq!(applied, 0);
    }

    #[tokio::test]
    async fn worker_drains_on_close() {
        let store = seeded_store("u1", &["a", "b"]);
        let queue = CoActivationQueue::new(64);
        let worker = HebbianWorker::new(store.clone(), test_learner(), queue.clone(), 32, 10);
        let handle = tokio::spawn(worker.run());

        queue
            .publish(CoActivationEvent::new("u1", "a", "b", 0.9, 0.9))
            .unwrap();
        queue.close();
        handle.await.unwrap();

        assert!(store.shard("u1").unwrap().read().edges.get_weight("a", "b") > 0.0);
    }
}
