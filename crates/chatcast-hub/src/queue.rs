use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chatcast_core::{BackpressurePolicy, HubConfig};
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::DeliveryError;
use crate::message::Message;

/// Assigned at subscribe time, strictly increasing per hub.
pub type SubscriberId = u64;

/// Lifecycle of a queue as seen through its handle.
///
/// `Active` → `Detached`, never back. Dropping the handle disposes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Active,
    Detached,
}

/// Outcome of a successful push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pushed {
    Appended,
    /// The queue was full and its oldest message was discarded.
    DisplacedOldest,
}

struct Inner {
    buf: VecDeque<Message>,
    detached: bool,
    /// Messages lost to the overflow policy.
    dropped: u64,
    /// Last time the consumer touched the queue.
    last_seen: Instant,
    /// Consumers currently parked in `recv`.
    waiting: usize,
}

/// Per-subscriber FIFO.
///
/// The detached flag shares the buffer's lock, so once `detach` returns no
/// push can land, even from a publish whose snapshot still holds the queue.
pub(crate) struct SubscriberQueue {
    id: SubscriberId,
    capacity: Option<usize>,
    policy: BackpressurePolicy,
    inner: Mutex<Inner>,
    readable: Notify,
    writable: Notify,
}

impl SubscriberQueue {
    pub(crate) fn new(id: SubscriberId, config: &HubConfig) -> Self {
        Self {
            id,
            capacity: config.capacity(),
            policy: config.backpressure,
            inner: Mutex::new(Inner {
                buf: VecDeque::new(),
                detached: false,
                dropped: 0,
                last_seen: Instant::now(),
                waiting: 0,
            }),
            readable: Notify::new(),
            writable: Notify::new(),
        }
    }

    pub(crate) fn id(&self) -> SubscriberId {
        self.id
    }

    // A panic while holding the lock cannot leave `Inner` half-updated,
    // so a poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Push without waiting. Under `block` a full queue reports
    /// `QueueFull` and leaves the waiting to [`Self::push`].
    pub(crate) fn try_push(&self, msg: &Message) -> Result<Pushed, DeliveryError> {
        let mut inner = self.lock();
        if inner.detached {
            return Err(DeliveryError::Detached);
        }

        let pushed = match self.capacity {
            Some(capacity) if inner.buf.len() >= capacity => match self.policy {
                BackpressurePolicy::DropOldest => {
                    inner.buf.pop_front();
                    inner.dropped += 1;
                    inner.buf.push_back(msg.clone());
                    Pushed::DisplacedOldest
                }
                BackpressurePolicy::DropNewest => {
                    inner.dropped += 1;
                    return Err(DeliveryError::QueueFull { capacity });
                }
                BackpressurePolicy::Block | BackpressurePolicy::Unbounded => {
                    return Err(DeliveryError::QueueFull { capacity });
                }
            },
            _ => {
                inner.buf.push_back(msg.clone());
                Pushed::Appended
            }
        };
        drop(inner);

        self.readable.notify_one();
        Ok(pushed)
    }

    /// Push honouring the queue's policy; `block` waits up to `timeout`
    /// for the consumer to make room.
    pub(crate) async fn push(&self, msg: &Message, timeout: Duration) -> Result<Pushed, DeliveryError> {
        if self.policy != BackpressurePolicy::Block {
            return self.try_push(msg);
        }

        let wait_for_space = async {
            loop {
                let writable = self.writable.notified();
                tokio::pin!(writable);
                // register before checking so a drain in between is not missed
                writable.as_mut().enable();
                match self.try_push(msg) {
                    Err(DeliveryError::QueueFull { .. }) => writable.await,
                    other => return other,
                }
            }
        };

        match tokio::time::timeout(timeout, wait_for_space).await {
            Ok(res) => res,
            Err(_) => {
                self.lock().dropped += 1;
                Err(DeliveryError::QueueFull {
                    capacity: self.capacity.unwrap_or_default(),
                })
            }
        }
    }

    /// Next message, waiting while the queue is empty and still attached.
    /// `None` once detached and drained.
    pub(crate) async fn recv(&self) -> Option<Message> {
        loop {
            let readable = self.readable.notified();
            tokio::pin!(readable);
            readable.as_mut().enable();

            {
                let mut inner = self.lock();
                inner.last_seen = Instant::now();
                if let Some(msg) = inner.buf.pop_front() {
                    drop(inner);
                    self.writable.notify_waiters();
                    return Some(msg);
                }
                if inner.detached {
                    return None;
                }
                inner.waiting += 1;
            }

            let _parked = Parked(self);
            readable.await;
        }
    }

    pub(crate) fn try_recv(&self) -> Option<Message> {
        let mut inner = self.lock();
        inner.last_seen = Instant::now();
        let msg = inner.buf.pop_front();
        drop(inner);

        if msg.is_some() {
            self.writable.notify_waiters();
        }
        msg
    }

    /// Take everything queued right now.
    pub(crate) fn drain(&self) -> Vec<Message> {
        let mut inner = self.lock();
        inner.last_seen = Instant::now();
        let msgs: Vec<Message> = inner.buf.drain(..).collect();
        drop(inner);

        if !msgs.is_empty() {
            self.writable.notify_waiters();
        }
        msgs
    }

    /// Stop accepting pushes and wake everyone waiting on the queue.
    /// Returns `false` if it was already detached.
    pub(crate) fn detach(&self) -> bool {
        let mut inner = self.lock();
        if inner.detached {
            return false;
        }
        inner.detached = true;
        drop(inner);

        self.readable.notify_waiters();
        self.writable.notify_waiters();
        true
    }

    pub(crate) fn state(&self) -> QueueState {
        if self.lock().detached {
            QueueState::Detached
        } else {
            QueueState::Active
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().buf.len()
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    /// How long the consumer has been away, `None` while it is parked in
    /// `recv` (an idle but listening session is not a leak).
    pub(crate) fn idle_for(&self, now: Instant) -> Option<Duration> {
        let inner = self.lock();
        if inner.waiting > 0 {
            return None;
        }
        Some(now.saturating_duration_since(inner.last_seen))
    }
}

/// Counts a consumer parked in `recv`; released even if the `recv`
/// future is dropped mid-wait.
struct Parked<'a>(&'a SubscriberQueue);

impl Drop for Parked<'_> {
    fn drop(&mut self) {
        let mut inner = self.0.lock();
        inner.waiting = inner.waiting.saturating_sub(1);
        inner.last_seen = Instant::now();
    }
}
