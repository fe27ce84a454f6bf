//! Process-wide message router.
//!
//! One router per node: a lock-free name-to-mailbox index for local actors,
//! a remote-owner index fed by the federation registry, and the forwarding
//! path into the federation gateway. `register`/`send` observations are
//! linearizable through the underlying concurrent maps.

pub mod error;

// Layer 1: Standard library imports
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use dashmap::{DashMap, DashSet};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, warn};

// Layer 3: Internal module imports
use crate::mailbox::MailboxSender;
use crate::message::Envelope;
use crate::util::{names, ActorAddress, NodeId};

pub use error::RouterError;

/// Bounded wait used by [`Router::send_reliable`] before giving up on a
/// full local mailbox.
pub const RELIABLE_SEND_WAIT: Duration = Duration::from_millis(250);

/// Role a node plays in the federation overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    /// Publicly reachable relay: accepts spokes, peers with other hubs,
    /// hosts the service registry.
    Main,
    /// NAT-bound relay: keeps a single outbound link to its upstream hub.
    Home,
}

struct RouterInner {
    node_id: NodeId,
    role: NodeRole,
    /// Local routing table: actor name -> mailbox sender.
    local: DashMap<String, MailboxSender>,
    /// Names of stopped actors; never handed out again within this
    /// process.
    retired: DashSet<String>,
    /// Names advertised to the federation registry.
    public: DashSet<String>,
    /// Remote ownership index, maintained by the registry on main relays.
    remote_owners: DashMap<String, NodeId>,
    /// Federation gateway inbox, installed at node bootstrap.
    federation: RwLock<Option<MailboxSender>>,
}

/// Process-wide name index and forwarding engine.
///
/// Cheap to clone; all clones share the same tables.
#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
}

impl Router {
    /// Create a router for one node.
    pub fn new(node_id: NodeId, role: NodeRole) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                node_id,
                role,
                local: DashMap::new(),
                retired: DashSet::new(),
                public: DashSet::new(),
                remote_owners: DashMap::new(),
                federation: RwLock::new(None),
            }),
        }
    }

    /// The local node id.
    pub fn node_id(&self) -> &NodeId {
        &self.inner.node_id
    }

    /// The local node role.
    pub fn role(&self) -> NodeRole {
        self.inner.role
    }

    /// Install the federation gateway inbox. Called once at bootstrap;
    /// calling again replaces the previous inbox.
    pub fn set_federation(&self, sender: MailboxSender) {
        *self.inner.federation.write() = Some(sender);
    }

    /// Register a local actor mailbox under `name`.
    ///
    /// Fails for live names and for names of stopped actors: within one
    /// process lifetime a name is handed out at most once.
    pub fn register(
        &self,
        name: impl Into<String>,
        sender: MailboxSender,
        public: bool,
    ) -> Result<(), RouterError> {
        let name = name.into();
        if self.inner.retired.contains(&name) {
            return Err(RouterError::NameInUse { name });
        }
        // Entry-based insert keeps the uniqueness check and the insert in
        // one linearizable step.
        match self.inner.local.entry(name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(RouterError::NameInUse { name }),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(sender);
                if public {
                    self.inner.public.insert(name);
                }
                Ok(())
            }
        }
    }

    /// Remove a local registration, retiring the name. Idempotent; does
    /// not close the mailbox.
    pub fn unregister(&self, name: &str) {
        if self.inner.local.remove(name).is_some() {
            self.inner.retired.insert(name.to_owned());
        }
        self.inner.public.remove(name);
    }

    /// True when `name` currently has a local mailbox.
    pub fn is_local(&self, name: &str) -> bool {
        self.inner.local.contains_key(name)
    }

    /// True when `name` belonged to an actor that has stopped.
    pub fn is_retired(&self, name: &str) -> bool {
        self.inner.retired.contains(name)
    }

    /// Number of live local registrations.
    pub fn local_count(&self) -> usize {
        self.inner.local.len()
    }

    /// Names currently advertised as public.
    pub fn public_names(&self) -> Vec<String> {
        self.inner.public.iter().map(|n| n.clone()).collect()
    }

    /// True when `name` is registered and public.
    pub fn is_public(&self, name: &str) -> bool {
        self.inner.public.contains(name)
    }

    /// Record that `name` is owned by a remote node (registry feed).
    pub fn set_remote_owner(&self, name: impl Into<String>, owner: NodeId) {
        self.inner.remote_owners.insert(name.into(), owner);
    }

    /// Drop a remote ownership record. Idempotent.
    pub fn remove_remote_owner(&self, name: &str) {
        self.inner.remote_owners.remove(name);
    }

    /// Look up the owning node for a name known to be remote.
    pub fn remote_owner(&self, name: &str) -> Option<NodeId> {
        self.inner
            .remote_owners
            .get(name)
            .map(|entry| entry.value().clone())
    }

    /// Deliver an envelope without blocking.
    ///
    /// Resolution: an address that is unqualified or names this node is
    /// looked up locally; anything else is forwarded into the federation
    /// gateway after the ttl/trace loop checks. On a main relay an
    /// unqualified miss consults the remote-owner index before failing
    /// with `NoSuchActor`; a home relay always forwards unknown names
    /// upstream.
    pub fn send(&self, envelope: Envelope) -> Result<(), RouterError> {
        let to = envelope.to.clone();
        if to.is_local_to(&self.inner.node_id) {
            if let Some(sender) = self.local_sender(to.name()) {
                return sender
                    .try_send(envelope)
                    .map_err(|e| RouterError::from_mailbox(e, to));
            }
            return self.resolve_miss(envelope, to);
        }
        self.forward(envelope)
    }

    /// Deliver an envelope, waiting up to [`RELIABLE_SEND_WAIT`] for local
    /// mailbox capacity before failing with `MailboxFull`.
    pub async fn send_reliable(&self, envelope: Envelope) -> Result<(), RouterError> {
        let to = envelope.to.clone();
        if to.is_local_to(&self.inner.node_id) {
            if let Some(sender) = self.local_sender(to.name()) {
                let capacity = sender.capacity();
                return match timeout(RELIABLE_SEND_WAIT, sender.send(envelope)).await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(RouterError::from_mailbox(e, to)),
                    Err(_) => Err(RouterError::MailboxFull {
                        address: to,
                        capacity,
                    }),
                };
            }
            return self.resolve_miss(envelope, to);
        }
        self.forward(envelope)
    }

    /// Deliver an envelope, converting failures into an `error` envelope
    /// back to its `reply_to` when one is set.
    ///
    /// Failed `reply`/`error` envelopes are logged and dropped instead, so
    /// a dead reply path cannot start an error loop.
    pub fn send_or_report(&self, envelope: Envelope) {
        let to = envelope.to.clone();
        let reply_to = envelope.reply_to.clone();
        let correlation_id = envelope.correlation_id;
        let is_reply = envelope.kind.is_reply();

        let Err(err) = self.send(envelope) else {
            return;
        };
        debug!(target = %to, error = %err, "envelope delivery failed");

        if is_reply {
            warn!(target = %to, error = %err, "dropping undeliverable reply");
            return;
        }
        let Some(reply_to) = reply_to else {
            return;
        };
        let report = Envelope::error(
            ActorAddress::remote(names::ROUTER, self.inner.node_id.clone()),
            reply_to,
            correlation_id,
            err.error_code(),
            err.to_string(),
        );
        if let Err(report_err) = self.send(report) {
            warn!(error = %report_err, "dropping undeliverable error report");
        }
    }

    /// Close every local mailbox and the federation inbox. Idempotent.
    pub fn stop_all(&self) {
        for entry in self.inner.local.iter() {
            entry.value().close();
        }
        if let Some(federation) = self.inner.federation.read().as_ref() {
            federation.close();
        }
    }

    fn local_sender(&self, name: &str) -> Option<MailboxSender> {
        self.inner.local.get(name).map(|entry| entry.value().clone())
    }

    fn resolve_miss(
        &self,
        envelope: Envelope,
        to: ActorAddress,
    ) -> Result<(), RouterError> {
        match self.inner.role {
            // A home relay cannot judge unknown names; its hub can.
            NodeRole::Home if to.node().is_none() => self.forward(envelope),
            NodeRole::Main if to.node().is_none() => match self.remote_owner(to.name()) {
                Some(owner) => {
                    let mut envelope = envelope;
                    envelope.to = envelope.to.qualified(owner);
                    self.forward(envelope)
                }
                None => Err(RouterError::NoSuchActor { address: to }),
            },
            // Qualified to this node but not registered: definitively gone.
            _ => Err(RouterError::NoSuchActor { address: to }),
        }
    }

    fn forward(&self, mut envelope: Envelope) -> Result<(), RouterError> {
        let to = envelope.to.clone();
        if envelope.trace.contains(&self.inner.node_id) {
            return Err(RouterError::RoutingLoop {
                address: to,
                reason: format!("node {} already in trace", self.inner.node_id),
            });
        }
        if envelope.ttl == 0 {
            return Err(RouterError::RoutingLoop {
                address: to,
                reason: "ttl exhausted".to_owned(),
            });
        }
        envelope.ttl -= 1;
        envelope.trace.push(self.inner.node_id.clone());

        let guard = self.inner.federation.read();
        match guard.as_ref() {
            Some(gateway) => gateway
                .try_send(envelope)
                .map_err(|e| RouterError::from_mailbox(e, to)),
            None => Err(RouterError::NetworkUnreachable {
                address: to,
                reason: "federation gateway not running".to_owned(),
            }),
        }
    }
}
