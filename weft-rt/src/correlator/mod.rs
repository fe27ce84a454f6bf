//! Request/response correlation.
//!
//! Turns fire-and-forget envelopes into synchronous calls: the correlator
//! allocates a correlation id, parks the caller on a one-shot waiter, and
//! completes the waiter from inbound `reply`/`error` envelopes received by
//! its own actor. A background sweep enforces deadlines. Every correlation
//! id completes exactly once; late replies are discarded.

pub mod error;

// Layer 1: Standard library imports
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

// Layer 3: Internal module imports
use crate::actor::{spawn_actor, ActorContext, Behavior, BehaviorKind, HandlerError};
use crate::mailbox::mailbox;
use crate::message::{Envelope, EnvelopeKind, ErrorCode, Payload};
use crate::router::Router;
use crate::util::{names, ActorAddress, CorrelationId, NodeId};

pub use error::CorrelatorError;

/// How often expired waiters are swept.
const SWEEP_INTERVAL: Duration = Duration::from_millis(25);

struct PendingCall {
    waiter: oneshot::Sender<Envelope>,
    deadline: DateTime<Utc>,
    origin: ActorAddress,
    target_node: Option<NodeId>,
}

struct CorrelatorInner {
    router: Router,
    pending: DashMap<CorrelationId, PendingCall>,
    sweep_cancel: CancellationToken,
}

impl CorrelatorInner {
    fn complete(&self, id: CorrelationId, envelope: Envelope) {
        match self.pending.remove(&id) {
            Some((_, call)) => {
                // Removing the entry first guarantees exactly-once
                // completion even when a reply races the sweep.
                let _ = call.waiter.send(envelope);
            }
            None => {
                debug!(correlation_id = %id, "discarding reply for completed call");
            }
        }
    }

    fn sweep(&self, self_address: &ActorAddress) {
        let now = Utc::now();
        let expired: Vec<CorrelationId> = self
            .pending
            .iter()
            .filter(|entry| entry.value().deadline <= now)
            .map(|entry| *entry.key())
            .collect();
        for id in expired {
            if let Some((_, call)) = self.pending.remove(&id) {
                debug!(correlation_id = %id, origin = %call.origin, "call timed out");
                let timeout_reply = Envelope::error(
                    self_address.clone(),
                    call.origin,
                    Some(id),
                    ErrorCode::Timeout,
                    "deadline elapsed before a reply arrived",
                );
                let _ = call.waiter.send(timeout_reply);
            }
        }
    }
}

/// Process-wide request correlator handle.
///
/// Cheap to clone; all clones share the same pending table.
#[derive(Clone)]
pub struct Correlator {
    inner: Arc<CorrelatorInner>,
}

impl Correlator {
    /// Register the `$correlator` actor with the router, start its receive
    /// loop and the deadline sweep, and return the shared handle.
    pub fn start(router: Router, mailbox_capacity: usize) -> Result<Self, crate::router::RouterError> {
        let inner = Arc::new(CorrelatorInner {
            router: router.clone(),
            pending: DashMap::new(),
            sweep_cancel: CancellationToken::new(),
        });

        let (receiver, sender) = mailbox(mailbox_capacity);
        router.register(names::CORRELATOR, sender, false)?;
        spawn_actor(
            names::CORRELATOR,
            None,
            false,
            Box::new(CorrelatorBehavior {
                inner: Arc::clone(&inner),
            }),
            receiver,
            router,
        );

        let sweep_inner = Arc::clone(&inner);
        tokio::spawn(async move {
            let cancel = sweep_inner.sweep_cancel.clone();
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            let self_address = correlator_address(sweep_inner.router.node_id());
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => sweep_inner.sweep(&self_address),
                }
            }
        });

        Ok(Self { inner })
    }

    /// Issue a `call` envelope and wait for its reply.
    pub async fn call(
        &self,
        to: ActorAddress,
        payload: Payload,
        timeout: Duration,
    ) -> Result<Envelope, CorrelatorError> {
        self.call_kind(
            correlator_address(self.inner.router.node_id()),
            to,
            EnvelopeKind::Call,
            payload,
            timeout,
        )
        .await
    }

    /// Issue an envelope of any kind on behalf of `origin` and wait for the
    /// correlated `reply`.
    ///
    /// External gateways use this with their synthetic origin addresses;
    /// node bootstrap uses it for `create_child` requests.
    pub async fn call_kind(
        &self,
        origin: ActorAddress,
        to: ActorAddress,
        kind: EnvelopeKind,
        payload: Payload,
        timeout: Duration,
    ) -> Result<Envelope, CorrelatorError> {
        let router = &self.inner.router;
        let correlation_id = CorrelationId::new();
        let (waiter, completion) = oneshot::channel();

        let deadline = chrono::Duration::from_std(timeout)
            .ok()
            .and_then(|d| Utc::now().checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let target_node = to
            .node()
            .cloned()
            .or_else(|| router.remote_owner(to.name()))
            .filter(|node| node != router.node_id());
        self.inner.pending.insert(
            correlation_id,
            PendingCall {
                waiter,
                deadline,
                origin: origin.clone(),
                target_node,
            },
        );

        let envelope = Envelope::new(kind, origin, to)
            .with_payload(payload)
            .with_correlation_id(correlation_id)
            .with_reply_to(correlator_address(router.node_id()));
        // Synchronous routing failures come back as error envelopes that
        // complete the waiter, same as remote ones.
        router.send_or_report(envelope);

        match tokio::time::timeout(timeout, completion).await {
            Ok(Ok(envelope)) => match envelope.kind {
                EnvelopeKind::Reply => Ok(envelope),
                _ => {
                    let code = envelope.error_code().unwrap_or(ErrorCode::HandlerError);
                    if code == ErrorCode::Timeout {
                        return Err(CorrelatorError::Timeout { timeout });
                    }
                    let message = crate::message::payload::str_field(&envelope.payload, "message")
                        .unwrap_or("call failed")
                        .to_owned();
                    Err(CorrelatorError::Remote { code, message })
                }
            },
            Ok(Err(_)) => Err(CorrelatorError::Stopped),
            Err(_) => {
                self.inner.pending.remove(&correlation_id);
                Err(CorrelatorError::Timeout { timeout })
            }
        }
    }

    /// Complete every pending call targeting `node` with an error.
    ///
    /// The federation gateway calls this when a link fails with envelopes
    /// in flight.
    pub fn fail_node(&self, node: &NodeId, code: ErrorCode, reason: &str) {
        let affected: Vec<CorrelationId> = self
            .inner
            .pending
            .iter()
            .filter(|entry| entry.value().target_node.as_ref() == Some(node))
            .map(|entry| *entry.key())
            .collect();
        if affected.is_empty() {
            return;
        }
        warn!(node = %node, count = affected.len(), "failing pending calls for dead link");
        let from = correlator_address(self.inner.router.node_id());
        for id in affected {
            if let Some((_, call)) = self.inner.pending.remove(&id) {
                let error = Envelope::error(from.clone(), call.origin, Some(id), code, reason);
                let _ = call.waiter.send(error);
            }
        }
    }

    /// Number of calls currently awaiting replies.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Stop the deadline sweep. The `$correlator` actor itself stops when
    /// the router closes its mailbox.
    pub fn stop(&self) {
        self.inner.sweep_cancel.cancel();
    }
}

fn correlator_address(node: &NodeId) -> ActorAddress {
    ActorAddress::remote(names::CORRELATOR, node.clone())
}

/// Receive loop half of the correlator: completes waiters from inbound
/// `reply` and `error` envelopes.
struct CorrelatorBehavior {
    inner: Arc<CorrelatorInner>,
}

#[async_trait]
impl Behavior for CorrelatorBehavior {
    fn kind(&self) -> BehaviorKind {
        BehaviorKind::RequestCorrelator
    }

    async fn handle(
        &mut self,
        envelope: Envelope,
        _ctx: &mut ActorContext,
    ) -> Result<Vec<Envelope>, HandlerError> {
        match (envelope.kind, envelope.correlation_id) {
            (EnvelopeKind::Reply | EnvelopeKind::Error, Some(id)) => {
                self.inner.complete(id, envelope);
            }
            (EnvelopeKind::Reply | EnvelopeKind::Error, None) => {
                debug!("dropping uncorrelated reply");
            }
            (kind, _) => {
                debug!(kind = %kind, "correlator ignoring envelope");
            }
        }
        Ok(Vec::new())
    }

    async fn on_stop(&mut self, _ctx: &mut ActorContext) {
        self.inner.sweep_cancel.cancel();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::message::payload;
    use crate::router::NodeRole;
    use serde_json::json;

    /// Echo worker that can also sleep before replying.
    struct EchoBehavior;

    #[async_trait]
    impl Behavior for EchoBehavior {
        fn kind(&self) -> BehaviorKind {
            BehaviorKind::LanguageWorker
        }

        async fn handle(
            &mut self,
            envelope: Envelope,
            ctx: &mut ActorContext,
        ) -> Result<Vec<Envelope>, HandlerError> {
            if let Some(delay) = payload::u64_field(&envelope.payload, "sleep_ms") {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            let msg = payload::str_field(&envelope.payload, "msg").unwrap_or("").to_owned();
            Ok(Envelope::reply_for(
                &envelope,
                ctx.self_address(),
                payload::pairs([("value", json!(msg))]),
            )
            .into_iter()
            .collect())
        }
    }

    fn start_system() -> (Router, Correlator) {
        let router = Router::new(NodeId::new("n1"), NodeRole::Main);
        let correlator = Correlator::start(router.clone(), 64).unwrap();

        let (rx, tx) = mailbox(64);
        router.register("echo", tx, false).unwrap();
        spawn_actor("echo", None, false, Box::new(EchoBehavior), rx, router.clone());

        (router, correlator)
    }

    #[tokio::test]
    async fn test_call_resolves_with_reply() {
        let (_router, correlator) = start_system();

        let reply = correlator
            .call(
                ActorAddress::local("echo"),
                payload::pairs([("msg", json!("hi"))]),
                Duration::from_secs(1),
            )
            .await
            .unwrap();

        assert_eq!(payload::str_field(&reply.payload, "value"), Some("hi"));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_call_unknown_actor_fails_fast() {
        let (_router, correlator) = start_system();

        let err = correlator
            .call(
                ActorAddress::local("ghost"),
                Payload::new(),
                Duration::from_secs(1),
            )
            .await
            .unwrap_err();

        assert_eq!(err.error_code(), ErrorCode::NoSuchActor);
    }

    #[tokio::test]
    async fn test_call_times_out_and_discards_late_reply() {
        let (_router, correlator) = start_system();

        let err = correlator
            .call(
                ActorAddress::local("echo"),
                payload::pairs([("msg", json!("slow")), ("sleep_ms", json!(200))]),
                Duration::from_millis(50),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CorrelatorError::Timeout { .. }));
        assert_eq!(correlator.pending_count(), 0);

        // The late reply lands after the entry is gone; nothing panics and
        // a fresh call still works.
        tokio::time::sleep(Duration::from_millis(250)).await;
        let reply = correlator
            .call(
                ActorAddress::local("echo"),
                payload::pairs([("msg", json!("again"))]),
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert_eq!(payload::str_field(&reply.payload, "value"), Some("again"));
    }

    #[tokio::test]
    async fn test_fail_node_completes_pending() {
        let router = Router::new(NodeId::new("n1"), NodeRole::Main);
        let correlator = Correlator::start(router.clone(), 64).unwrap();
        // Federation inbox swallows the forwarded envelope.
        let (_fed_rx, fed_tx) = mailbox(64);
        router.set_federation(fed_tx);

        let correlator2 = correlator.clone();
        let call = tokio::spawn(async move {
            correlator2
                .call(
                    ActorAddress::remote("echo", NodeId::new("home-1")),
                    Payload::new(),
                    Duration::from_secs(5),
                )
                .await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(correlator.pending_count(), 1);
        correlator.fail_node(
            &NodeId::new("home-1"),
            ErrorCode::NetworkUnreachable,
            "link lost",
        );

        let err = call.await.unwrap().unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::NetworkUnreachable);
    }

    #[tokio::test]
    async fn test_mailbox_full_surfaces_as_error() {
        let router = Router::new(NodeId::new("n1"), NodeRole::Main);
        let correlator = Correlator::start(router.clone(), 64).unwrap();

        // A mailbox with no draining actor saturates immediately.
        let (_rx, tx) = mailbox(1);
        router.register("stuck", tx, false).unwrap();
        router
            .send(Envelope::new(
                EnvelopeKind::Call,
                ActorAddress::local("filler"),
                ActorAddress::local("stuck"),
            ))
            .unwrap();

        let err = correlator
            .call(
                ActorAddress::local("stuck"),
                Payload::new(),
                Duration::from_secs(1),
            )
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::MailboxFull);
    }
}
