// Layer 1: Standard library imports
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// Layer 2: Third-party crate imports
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

// Layer 3: Internal module imports
use super::error::MailboxError;
use crate::message::Envelope;

/// Default mailbox capacity.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 128;

/// Atomic send/receive/drop counters shared by a mailbox pair.
#[derive(Debug, Default)]
pub struct MailboxCounters {
    sent: AtomicU64,
    received: AtomicU64,
    dropped: AtomicU64,
}

impl MailboxCounters {
    /// Envelopes accepted into the queue.
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Envelopes handed to the receiver.
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// `try_send` rejections due to a full queue.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }
}

/// Create a bounded mailbox pair.
///
/// # Example
/// ```rust
/// use weft_rt::mailbox::{mailbox, DEFAULT_MAILBOX_CAPACITY};
///
/// let (receiver, sender) = mailbox(DEFAULT_MAILBOX_CAPACITY);
/// assert_eq!(sender.capacity(), 128);
/// assert!(!receiver.is_closed());
/// ```
pub fn mailbox(capacity: usize) -> (Mailbox, MailboxSender) {
    let (tx, rx) = mpsc::channel(capacity);
    let closed = CancellationToken::new();
    let counters = Arc::new(MailboxCounters::default());

    let receiver = Mailbox {
        rx,
        closed: closed.clone(),
        capacity,
        counters: Arc::clone(&counters),
    };
    let sender = MailboxSender {
        tx,
        closed,
        capacity,
        counters,
    };

    (receiver, sender)
}

/// Multi-producer handle delivering envelopes into a mailbox.
#[derive(Debug, Clone)]
pub struct MailboxSender {
    tx: mpsc::Sender<Envelope>,
    closed: CancellationToken,
    capacity: usize,
    counters: Arc<MailboxCounters>,
}

impl MailboxSender {
    /// Deliver an envelope, waiting for capacity.
    ///
    /// Returns `Closed` immediately if the mailbox closes while waiting.
    pub async fn send(&self, envelope: Envelope) -> Result<(), MailboxError> {
        if self.closed.is_cancelled() {
            return Err(MailboxError::Closed);
        }
        tokio::select! {
            _ = self.closed.cancelled() => Err(MailboxError::Closed),
            result = self.tx.send(envelope) => match result {
                Ok(()) => {
                    self.counters.record_sent();
                    Ok(())
                }
                Err(_) => Err(MailboxError::Closed),
            },
        }
    }

    /// Deliver an envelope without waiting.
    pub fn try_send(&self, envelope: Envelope) -> Result<(), MailboxError> {
        if self.closed.is_cancelled() {
            return Err(MailboxError::Closed);
        }
        match self.tx.try_send(envelope) {
            Ok(()) => {
                self.counters.record_sent();
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.counters.record_dropped();
                Err(MailboxError::Full {
                    capacity: self.capacity,
                })
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(MailboxError::Closed),
        }
    }

    /// Close the mailbox, waking all blocked senders and the receiver.
    ///
    /// Idempotent; envelopes already queued are still drained by the
    /// receiver.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// True once `close` has been called on either end.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Configured queue capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Shared counters for this mailbox.
    pub fn counters(&self) -> &MailboxCounters {
        &self.counters
    }
}

/// Single-consumer receiving half of a mailbox.
#[derive(Debug)]
pub struct Mailbox {
    rx: mpsc::Receiver<Envelope>,
    closed: CancellationToken,
    capacity: usize,
    counters: Arc<MailboxCounters>,
}

impl Mailbox {
    /// Receive the next envelope.
    ///
    /// After `close`, envelopes buffered before the close are still
    /// yielded; once drained, returns `None`.
    pub async fn recv(&mut self) -> Option<Envelope> {
        loop {
            if self.closed.is_cancelled() {
                return match self.rx.try_recv() {
                    Ok(envelope) => {
                        self.counters.record_received();
                        Some(envelope)
                    }
                    Err(_) => None,
                };
            }
            let closed = self.closed.clone();
            tokio::select! {
                _ = closed.cancelled() => continue,
                envelope = self.rx.recv() => {
                    return envelope.inspect(|_| self.counters.record_received());
                }
            }
        }
    }

    /// Close the mailbox from the receiving side.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// True once `close` has been called on either end.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Configured queue capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Shared counters for this mailbox.
    pub fn counters(&self) -> &MailboxCounters {
        &self.counters
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::message::EnvelopeKind;
    use crate::util::ActorAddress;

    fn envelope(tag: &str) -> Envelope {
        Envelope::new(
            EnvelopeKind::Call,
            ActorAddress::local("sender"),
            ActorAddress::local(tag),
        )
    }

    #[tokio::test]
    async fn test_send_receive_fifo() {
        let (mut rx, tx) = mailbox(8);

        tx.send(envelope("first")).await.unwrap();
        tx.send(envelope("second")).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().to.name(), "first");
        assert_eq!(rx.recv().await.unwrap().to.name(), "second");
    }

    #[tokio::test]
    async fn test_try_send_full() {
        let (_rx, tx) = mailbox(2);

        tx.try_send(envelope("1")).unwrap();
        tx.try_send(envelope("2")).unwrap();

        let result = tx.try_send(envelope("3"));
        assert_eq!(result, Err(MailboxError::Full { capacity: 2 }));
        assert_eq!(tx.counters().dropped(), 1);
    }

    #[tokio::test]
    async fn test_send_blocks_until_capacity() {
        let (mut rx, tx) = mailbox(1);
        tx.send(envelope("1")).await.unwrap();

        let tx2 = tx.clone();
        let blocked = tokio::spawn(async move { tx2.send(envelope("2")).await });

        // The blocked sender completes once the receiver makes room.
        tokio::task::yield_now().await;
        assert_eq!(rx.recv().await.unwrap().to.name(), "1");
        blocked.await.unwrap().unwrap();
        assert_eq!(rx.recv().await.unwrap().to.name(), "2");
    }

    #[tokio::test]
    async fn test_close_wakes_blocked_sender() {
        let (_rx, tx) = mailbox(1);
        tx.send(envelope("1")).await.unwrap();

        let tx2 = tx.clone();
        let blocked = tokio::spawn(async move { tx2.send(envelope("2")).await });

        tokio::task::yield_now().await;
        tx.close();
        assert_eq!(blocked.await.unwrap(), Err(MailboxError::Closed));
    }

    #[tokio::test]
    async fn test_close_drains_then_none() {
        let (mut rx, tx) = mailbox(4);
        tx.send(envelope("1")).await.unwrap();
        tx.send(envelope("2")).await.unwrap();
        tx.close();

        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_close_idempotent() {
        let (mut rx, tx) = mailbox(4);
        tx.close();
        tx.close();
        rx.close();

        assert!(rx.recv().await.is_none());
        assert_eq!(tx.try_send(envelope("x")), Err(MailboxError::Closed));
    }

    #[tokio::test]
    async fn test_send_after_close() {
        let (_rx, tx) = mailbox(4);
        tx.close();
        assert_eq!(tx.send(envelope("x")).await, Err(MailboxError::Closed));
    }

    #[tokio::test]
    async fn test_counters() {
        let (mut rx, tx) = mailbox(4);
        tx.send(envelope("1")).await.unwrap();
        tx.send(envelope("2")).await.unwrap();
        let _ = rx.recv().await;

        assert_eq!(tx.counters().sent(), 2);
        assert_eq!(tx.counters().received(), 1);
        assert_eq!(tx.counters().dropped(), 0);
    }

    #[tokio::test]
    async fn test_per_sender_fifo_under_concurrency() {
        let (mut rx, tx) = mailbox(64);

        let tx_a = tx.clone();
        let sender_a = tokio::spawn(async move {
            for i in 0..10 {
                tx_a.send(envelope(&format!("a{i}"))).await.unwrap();
            }
        });
        let tx_b = tx.clone();
        let sender_b = tokio::spawn(async move {
            for i in 0..10 {
                tx_b.send(envelope(&format!("b{i}"))).await.unwrap();
            }
        });
        sender_a.await.unwrap();
        sender_b.await.unwrap();

        let mut last_a = None;
        let mut last_b = None;
        for _ in 0..20 {
            let name = rx.recv().await.unwrap().to.name().to_owned();
            let (prefix, index) = name.split_at(1);
            let index: u32 = index.parse().unwrap();
            let last = if prefix == "a" { &mut last_a } else { &mut last_b };
            if let Some(prev) = *last {
                assert!(index > prev, "per-sender order violated: {name}");
            }
            *last = Some(index);
        }
    }
}
