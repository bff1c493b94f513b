use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chatcast_core::{BackpressurePolicy, HubConfig};
use futures_util::future::join_all;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::error::{DeliveryError, HubError, Result};
use crate::message::Message;
use crate::queue::{Pushed, QueueState, SubscriberId, SubscriberQueue};

type Registry = BTreeMap<SubscriberId, Arc<SubscriberQueue>>;

pub(crate) struct HubInner {
    /// The only lock guarding membership. Held to insert, remove or
    /// snapshot, never while pushing.
    registry: Mutex<Registry>,
    next_id: AtomicU64,
    config: HubConfig,
}

impl HubInner {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remove `queue` if it is the one registered under its id, then detach
    /// it. No-op for a queue that is not (or no longer) registered here.
    fn remove(&self, queue: &Arc<SubscriberQueue>) -> bool {
        let id = queue.id();
        let remaining = {
            let mut registry = self.registry();
            if !registry.get(&id).is_some_and(|r| Arc::ptr_eq(r, queue)) {
                return false;
            }
            registry.remove(&id);
            registry.len()
        };

        queue.detach();
        info!(subscriber_id = id, subscribers = remaining, "subscriber removed");
        true
    }
}

/// Central fan-out point. Cheap to clone; clones share one registry.
#[derive(Clone)]
pub struct Hub {
    pub(crate) inner: Arc<HubInner>,
}

/// What one [`Hub::publish`] call achieved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Subscribers in the snapshot.
    pub targeted: usize,
    /// Queues that accepted the message.
    pub delivered: usize,
    /// Deliveries that displaced an older message (`drop-oldest`).
    pub displaced: usize,
    /// Queues unsubscribed between the snapshot and the push.
    pub detached: usize,
    /// Per-subscriber failures. Never fatal for the publish.
    pub failures: Vec<(SubscriberId, DeliveryError)>,
}

impl PublishReport {
    fn record(&mut self, id: SubscriberId, outcome: std::result::Result<Pushed, DeliveryError>) {
        match outcome {
            Ok(Pushed::Appended) => self.delivered += 1,
            Ok(Pushed::DisplacedOldest) => {
                self.delivered += 1;
                self.displaced += 1;
            }
            Err(DeliveryError::Detached) => self.detached += 1,
            Err(e) => self.failures.push((id, e)),
        }
    }

    /// True when every subscriber still registered got the message.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

impl Hub {
    pub fn new(config: HubConfig) -> Self {
        if config.backpressure == BackpressurePolicy::Unbounded {
            warn!("hub queues are unbounded: a subscriber that stops draining grows without limit");
        }
        Self {
            inner: Arc::new(HubInner {
                registry: Mutex::new(BTreeMap::new()),
                next_id: AtomicU64::new(1),
                config,
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<HubInner>) -> Self {
        Self { inner }
    }

    pub fn config(&self) -> &HubConfig {
        &self.inner.config
    }

    /// Register a fresh, empty queue and hand back its only owner.
    #[instrument(skip(self))]
    pub fn subscribe(&self) -> Result<SubscriberHandle> {
        let mut registry = self.inner.registry();
        if let Some(limit) = self.inner.config.max_subscribers {
            if registry.len() >= limit {
                warn!(limit, "subscriber rejected: limit reached");
                return Err(HubError::ResourceExhausted { limit });
            }
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let queue = Arc::new(SubscriberQueue::new(id, &self.inner.config));
        registry.insert(id, Arc::clone(&queue));
        let subscribers = registry.len();
        drop(registry);

        info!(subscriber_id = id, subscribers, "subscriber registered");
        Ok(SubscriberHandle {
            queue,
            hub: Arc::downgrade(&self.inner),
        })
    }

    /// Remove the handle's queue from the registry.
    ///
    /// Returns `false` for a handle that is already unsubscribed or belongs
    /// to another hub. Queued messages stay drainable through the handle.
    pub fn unsubscribe(&self, handle: &SubscriberHandle) -> bool {
        let removed = self.inner.remove(&handle.queue);
        if !removed {
            debug!(subscriber_id = handle.id(), "unsubscribe ignored: not registered");
        }
        removed
    }

    /// Deliver `message` to every queue registered right now.
    ///
    /// Best effort: per-subscriber failures are logged and reported, never
    /// returned as an error. Queues are visited in subscription order.
    pub async fn publish(&self, message: impl Into<Message>) -> PublishReport {
        let message = message.into();
        let snapshot = self.snapshot();
        let mut report = PublishReport {
            targeted: snapshot.len(),
            ..PublishReport::default()
        };

        if self.inner.config.backpressure == BackpressurePolicy::Block {
            // wait on every full queue at once so one stalled consumer
            // does not hold up the rest
            let timeout = Duration::from_millis(self.inner.config.block_timeout_ms);
            let outcomes = join_all(snapshot.iter().map(|queue| {
                let message = &message;
                async move { (queue.id(), queue.push(message, timeout).await) }
            }))
            .await;
            for (id, outcome) in outcomes {
                report.record(id, outcome);
            }
        } else {
            for queue in &snapshot {
                report.record(queue.id(), queue.try_push(&message));
            }
        }

        for (id, e) in &report.failures {
            warn!(subscriber_id = id, error = %e, "delivery failed");
        }
        debug!(
            targeted = report.targeted,
            delivered = report.delivered,
            displaced = report.displaced,
            failed = report.failures.len(),
            "message published"
        );
        report
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.registry().len()
    }

    /// Unsubscribe every queue whose consumer has been away longer than
    /// `max_idle`. Consumers parked in `recv` are never reaped.
    pub fn reap_idle(&self, max_idle: Duration) -> usize {
        let now = Instant::now();
        let stale: Vec<Arc<SubscriberQueue>> = self
            .snapshot()
            .into_iter()
            .filter(|q| q.idle_for(now).is_some_and(|idle| idle >= max_idle))
            .collect();

        let mut reaped = 0;
        for queue in &stale {
            if self.inner.remove(queue) {
                warn!(subscriber_id = queue.id(), "idle subscriber reaped");
                reaped += 1;
            }
        }
        reaped
    }

    fn snapshot(&self) -> Vec<Arc<SubscriberQueue>> {
        self.inner.registry().values().cloned().collect()
    }
}

/// A subscriber session's end of its queue.
///
/// Dropping the handle unsubscribes it, which covers every way a session
/// can end (normal close, error, timeout, task cancellation).
pub struct SubscriberHandle {
    queue: Arc<SubscriberQueue>,
    hub: Weak<HubInner>,
}

impl SubscriberHandle {
    pub fn id(&self) -> SubscriberId {
        self.queue.id()
    }

    /// Wait for the next message. `None` once unsubscribed and drained.
    pub async fn recv(&self) -> Option<Message> {
        self.queue.recv().await
    }

    pub fn try_recv(&self) -> Option<Message> {
        self.queue.try_recv()
    }

    /// Everything queued right now, oldest first.
    pub fn drain(&self) -> Vec<Message> {
        self.queue.drain()
    }

    pub fn state(&self) -> QueueState {
        self.queue.state()
    }

    /// Messages waiting to be drained.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Messages this subscriber lost to the backpressure policy.
    pub fn dropped(&self) -> u64 {
        self.queue.dropped()
    }

    /// Same as [`Hub::unsubscribe`]; idempotent.
    pub fn unsubscribe(&self) -> bool {
        match self.hub.upgrade() {
            Some(hub) => hub.remove(&self.queue),
            // hub is gone, nothing can push anymore
            None => self.queue.detach(),
        }
    }
}

impl std::fmt::Debug for SubscriberHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberHandle")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("len", &self.len())
            .finish()
    }
}

impl Drop for SubscriberHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
