// Layer 1: Standard library imports
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

// Layer 2: Third-party crate imports
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

// Layer 3: Internal module imports
use weft_rt::Envelope;

/// Default per-link outbound queue capacity.
pub const DEFAULT_LINK_QUEUE_CAPACITY: usize = 512;

/// What happened to a pushed envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Queued normally.
    Queued,
    /// Queued after evicting the oldest non-reply envelope.
    DroppedOldest,
    /// Dropped: the queue held only replies, which are never evicted.
    Rejected,
}

/// Per-link outbound envelope queue.
///
/// Bounded with drop-oldest semantics for non-reply traffic; `reply` and
/// `error` envelopes are never dropped (they may exceed the bound rather
/// than be lost, since exactly one reply exists per call).
#[derive(Debug)]
pub struct OutboundQueue {
    inner: Mutex<VecDeque<Envelope>>,
    capacity: usize,
    notify: Notify,
    closed: CancellationToken,
    dropped: AtomicU64,
}

impl OutboundQueue {
    /// Create a queue with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            capacity,
            notify: Notify::new(),
            closed: CancellationToken::new(),
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue an envelope for the link writer.
    pub fn push(&self, envelope: Envelope) -> PushOutcome {
        if self.closed.is_cancelled() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return PushOutcome::Rejected;
        }
        let outcome = {
            let mut queue = self.inner.lock();
            if queue.len() < self.capacity {
                queue.push_back(envelope);
                PushOutcome::Queued
            } else if let Some(victim) = queue.iter().position(|e| !e.kind.is_reply()) {
                let _ = queue.remove(victim);
                queue.push_back(envelope);
                self.dropped.fetch_add(1, Ordering::Relaxed);
                PushOutcome::DroppedOldest
            } else if envelope.kind.is_reply() {
                // Every queued envelope is a reply and so is this one:
                // grow past the bound rather than lose it.
                queue.push_back(envelope);
                PushOutcome::Queued
            } else {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                PushOutcome::Rejected
            }
        };
        self.notify.notify_one();
        outcome
    }

    /// Dequeue the next envelope, waiting if the queue is empty.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub async fn pop(&self) -> Option<Envelope> {
        loop {
            if let Some(envelope) = self.inner.lock().pop_front() {
                return Some(envelope);
            }
            if self.closed.is_cancelled() {
                return None;
            }
            tokio::select! {
                _ = self.closed.cancelled() => continue,
                _ = self.notify.notified() => continue,
            }
        }
    }

    /// Close the queue, waking the writer. Idempotent.
    pub fn close(&self) {
        self.closed.cancel();
        self.notify.notify_one();
    }

    /// True once closed.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Envelopes currently queued.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Envelopes dropped under backpressure.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use weft_rt::{ActorAddress, EnvelopeKind};

    fn envelope(kind: EnvelopeKind, tag: &str) -> Envelope {
        Envelope::new(kind, ActorAddress::local("a"), ActorAddress::local(tag))
    }

    #[tokio::test]
    async fn test_push_pop_fifo() {
        let queue = OutboundQueue::new(4);
        queue.push(envelope(EnvelopeKind::Call, "1"));
        queue.push(envelope(EnvelopeKind::Call, "2"));

        assert_eq!(queue.pop().await.unwrap().to.name(), "1");
        assert_eq!(queue.pop().await.unwrap().to.name(), "2");
    }

    #[test]
    fn test_drop_oldest_non_reply() {
        let queue = OutboundQueue::new(2);
        queue.push(envelope(EnvelopeKind::Call, "old"));
        queue.push(envelope(EnvelopeKind::Reply, "reply"));

        let outcome = queue.push(envelope(EnvelopeKind::Call, "new"));
        assert_eq!(outcome, PushOutcome::DroppedOldest);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dropped(), 1);

        // The reply survived the eviction.
        let remaining: Vec<String> = {
            let inner = queue.inner.lock();
            inner.iter().map(|e| e.to.name().to_owned()).collect()
        };
        assert_eq!(remaining, vec!["reply", "new"]);
    }

    #[test]
    fn test_replies_never_dropped() {
        let queue = OutboundQueue::new(2);
        queue.push(envelope(EnvelopeKind::Reply, "r1"));
        queue.push(envelope(EnvelopeKind::Error, "r2"));

        // A full-of-replies queue still accepts another reply.
        let outcome = queue.push(envelope(EnvelopeKind::Reply, "r3"));
        assert_eq!(outcome, PushOutcome::Queued);
        assert_eq!(queue.len(), 3);

        // But rejects plain traffic.
        let outcome = queue.push(envelope(EnvelopeKind::Call, "c"));
        assert_eq!(outcome, PushOutcome::Rejected);
        assert_eq!(queue.len(), 3);
    }

    #[tokio::test]
    async fn test_pop_waits_for_push() {
        let queue = std::sync::Arc::new(OutboundQueue::new(4));
        let queue2 = std::sync::Arc::clone(&queue);

        let waiter = tokio::spawn(async move { queue2.pop().await });
        tokio::task::yield_now().await;
        queue.push(envelope(EnvelopeKind::Call, "x"));

        let popped = waiter.await.unwrap().unwrap();
        assert_eq!(popped.to.name(), "x");
    }

    #[tokio::test]
    async fn test_close_drains_then_none() {
        let queue = OutboundQueue::new(4);
        queue.push(envelope(EnvelopeKind::Call, "x"));
        queue.close();

        assert!(queue.pop().await.is_some());
        assert!(queue.pop().await.is_none());
        assert_eq!(queue.push(envelope(EnvelopeKind::Call, "y")), PushOutcome::Rejected);
    }
}
