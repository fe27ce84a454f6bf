// Layer 1: Standard library imports
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// Layer 3: Internal module imports
use weft_rt::prelude::*;
use weft_rt::{mailbox, spawn_actor, RouterError};

/// Default lifetime of a registration without refresh.
pub const DEFAULT_REGISTRY_TTL: Duration = Duration::from_secs(600);

/// Default eviction sweep cadence.
pub const DEFAULT_EVICTION_INTERVAL: Duration = Duration::from_secs(30);

/// Next-hop index for nodes that are not directly linked.
///
/// Gossip teaches a hub which peer published a spoke's services; the
/// gateway uses this to pick the peer link for envelopes addressed to
/// that spoke.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: DashMap<NodeId, NodeId>,
}

impl RouteTable {
    /// Record that `owner` is reached through `via`.
    pub fn set(&self, owner: NodeId, via: NodeId) {
        self.routes.insert(owner, via);
    }

    /// Next hop toward `owner`, when known.
    pub fn via(&self, owner: &NodeId) -> Option<NodeId> {
        self.routes.get(owner).map(|entry| entry.value().clone())
    }

    /// Drop every route through a dead peer.
    pub fn forget_via(&self, via: &NodeId) {
        self.routes.retain(|_, next_hop| next_hop != via);
    }

    /// Number of known routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// True when no routes are known.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// One public-name record on a main relay.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceEntry {
    /// Node hosting the actor.
    pub owner: NodeId,
    /// Hub that published the record (self for local spokes).
    pub origin: NodeId,
    /// Per-origin monotonic version; last writer wins.
    pub version: u64,
    /// Last registration or refresh.
    pub refreshed_at: DateTime<Utc>,
}

/// One gossip line: an addition/refresh or a removal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GossipDelta {
    pub name: String,
    pub owner: NodeId,
    pub version: u64,
    #[serde(default)]
    pub removed: bool,
}

/// Registry tuning knobs.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Lifetime of an unrefreshed entry.
    pub ttl: Duration,
    /// Eviction sweep cadence.
    pub eviction_interval: Duration,
    /// Capacity of the `$registry` actor mailbox.
    pub mailbox_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_REGISTRY_TTL,
            eviction_interval: DEFAULT_EVICTION_INTERVAL,
            mailbox_capacity: 128,
        }
    }
}

struct RegistryInner {
    router: Router,
    routes: Arc<RouteTable>,
    /// Copy-on-write snapshot: lookups clone the Arc and never block
    /// writers.
    entries: RwLock<Arc<HashMap<String, ServiceEntry>>>,
    version: AtomicU64,
    /// Local-origin changes awaiting gossip to peer hubs.
    dirty: Mutex<Vec<GossipDelta>>,
    ttl: Duration,
    sweep_cancel: CancellationToken,
}

/// Federation service registry, hosted on main relays.
///
/// Cheap to clone; all clones share the same tables.
#[derive(Clone)]
pub struct ServiceRegistry {
    inner: Arc<RegistryInner>,
}

impl ServiceRegistry {
    /// Register the `$registry` actor and start the eviction sweep.
    pub fn start(
        router: Router,
        routes: Arc<RouteTable>,
        config: RegistryConfig,
    ) -> Result<Self, RouterError> {
        let inner = Arc::new(RegistryInner {
            router: router.clone(),
            routes,
            entries: RwLock::new(Arc::new(HashMap::new())),
            version: AtomicU64::new(0),
            dirty: Mutex::new(Vec::new()),
            ttl: config.ttl,
            sweep_cancel: CancellationToken::new(),
        });
        let registry = Self {
            inner: Arc::clone(&inner),
        };

        let (receiver, sender) = mailbox(config.mailbox_capacity);
        router.register(names::REGISTRY, sender, false)?;
        spawn_actor(
            names::REGISTRY,
            None,
            false,
            Box::new(RegistryBehavior {
                registry: registry.clone(),
            }),
            receiver,
            router,
        );

        let sweeper = registry.clone();
        tokio::spawn(async move {
            let cancel = sweeper.inner.sweep_cancel.clone();
            let mut ticker = tokio::time::interval(config.eviction_interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => sweeper.evict_expired(),
                }
            }
        });

        Ok(registry)
    }

    /// Current snapshot of every record.
    pub fn snapshot(&self) -> Arc<HashMap<String, ServiceEntry>> {
        Arc::clone(&self.inner.entries.read())
    }

    /// Owning node for a public name, when registered.
    pub fn lookup(&self, name: &str) -> Option<NodeId> {
        self.snapshot().get(name).map(|entry| entry.owner.clone())
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// True when no records are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take the local-origin deltas accumulated since the last gossip
    /// round. Called by the federation gateway's gossip timer.
    pub fn drain_deltas(&self) -> Vec<GossipDelta> {
        std::mem::take(&mut *self.inner.dirty.lock())
    }

    /// Stop the eviction sweep.
    pub fn stop(&self) {
        self.inner.sweep_cancel.cancel();
    }

    fn update_entries(&self, mutate: impl FnOnce(&mut HashMap<String, ServiceEntry>)) {
        let mut guard = self.inner.entries.write();
        let mut next = (**guard).clone();
        mutate(&mut next);
        *guard = Arc::new(next);
    }

    pub(crate) fn apply_register(&self, name: &str, owner: NodeId) {
        let version = self.inner.version.fetch_add(1, Ordering::Relaxed) + 1;
        let local = self.inner.router.node_id().clone();
        let entry = ServiceEntry {
            owner: owner.clone(),
            origin: local.clone(),
            version,
            refreshed_at: Utc::now(),
        };
        debug!(name, owner = %owner, version, "service registered");
        self.update_entries(|entries| {
            entries.insert(name.to_owned(), entry);
        });
        if owner != local {
            self.inner.router.set_remote_owner(name, owner.clone());
        }
        self.inner.dirty.lock().push(GossipDelta {
            name: name.to_owned(),
            owner,
            version,
            removed: false,
        });
    }

    pub(crate) fn apply_unregister(&self, name: &str, owner: &NodeId) {
        let current_owner = self.snapshot().get(name).map(|e| e.owner.clone());
        if current_owner.as_ref() != Some(owner) {
            debug!(name, claimed = %owner, "ignoring unregister from non-owner");
            return;
        }
        let version = self.inner.version.fetch_add(1, Ordering::Relaxed) + 1;
        info!(name, owner = %owner, "service unregistered");
        self.update_entries(|entries| {
            entries.remove(name);
        });
        self.inner.router.remove_remote_owner(name);
        self.inner.dirty.lock().push(GossipDelta {
            name: name.to_owned(),
            owner: owner.clone(),
            version,
            removed: true,
        });
    }

    pub(crate) fn apply_gossip(&self, origin: NodeId, deltas: Vec<GossipDelta>) {
        let local = self.inner.router.node_id().clone();
        let snapshot = self.snapshot();
        let mut accepted = Vec::new();
        for delta in deltas {
            let stale = snapshot
                .get(&delta.name)
                .is_some_and(|entry| entry.origin == origin && entry.version >= delta.version);
            if stale {
                continue;
            }
            accepted.push(delta);
        }
        if accepted.is_empty() {
            return;
        }

        debug!(origin = %origin, count = accepted.len(), "applying gossip deltas");
        self.update_entries(|entries| {
            for delta in &accepted {
                if delta.removed {
                    entries.remove(&delta.name);
                } else {
                    entries.insert(
                        delta.name.clone(),
                        ServiceEntry {
                            owner: delta.owner.clone(),
                            origin: origin.clone(),
                            version: delta.version,
                            refreshed_at: Utc::now(),
                        },
                    );
                }
            }
        });
        for delta in &accepted {
            if delta.removed {
                self.inner.router.remove_remote_owner(&delta.name);
            } else {
                if delta.owner != local {
                    self.inner
                        .router
                        .set_remote_owner(delta.name.clone(), delta.owner.clone());
                }
                self.inner.routes.set(delta.owner.clone(), origin.clone());
            }
        }
    }

    pub(crate) fn evict_expired(&self) {
        let now = Utc::now();
        let Ok(ttl) = chrono::Duration::from_std(self.inner.ttl) else {
            return;
        };
        let expired: Vec<(String, NodeId)> = self
            .snapshot()
            .iter()
            .filter(|(_, entry)| now.signed_duration_since(entry.refreshed_at) > ttl)
            .map(|(name, entry)| (name.clone(), entry.owner.clone()))
            .collect();
        if expired.is_empty() {
            return;
        }

        warn!(count = expired.len(), "evicting expired registrations");
        self.update_entries(|entries| {
            for (name, _) in &expired {
                entries.remove(name);
            }
        });
        let mut dirty = self.inner.dirty.lock();
        for (name, owner) in expired {
            self.inner.router.remove_remote_owner(&name);
            let version = self.inner.version.fetch_add(1, Ordering::Relaxed) + 1;
            dirty.push(GossipDelta {
                name,
                owner,
                version,
                removed: true,
            });
        }
    }
}

/// Receive loop half of the registry.
struct RegistryBehavior {
    registry: ServiceRegistry,
}

#[async_trait]
impl Behavior for RegistryBehavior {
    fn kind(&self) -> BehaviorKind {
        BehaviorKind::FederationRegistry
    }

    async fn handle(
        &mut self,
        envelope: Envelope,
        ctx: &mut weft_rt::ActorContext,
    ) -> Result<Vec<Envelope>, HandlerError> {
        match envelope.kind {
            EnvelopeKind::RegisterService => {
                let (name, node) = service_fields(&envelope.payload)?;
                self.registry.apply_register(name, node);
                Ok(Envelope::reply_for(
                    &envelope,
                    ctx.self_address(),
                    payload::pairs([("registered", serde_json::Value::String(name.to_owned()))]),
                )
                .into_iter()
                .collect())
            }
            EnvelopeKind::UnregisterService => {
                let (name, node) = service_fields(&envelope.payload)?;
                self.registry.apply_unregister(name, &node);
                Ok(Envelope::reply_for(
                    &envelope,
                    ctx.self_address(),
                    payload::pairs([("unregistered", serde_json::Value::String(name.to_owned()))]),
                )
                .into_iter()
                .collect())
            }
            EnvelopeKind::RegistryGossip => {
                let origin = payload::str_field(&envelope.payload, "origin")
                    .map(NodeId::from)
                    .ok_or_else(|| HandlerError::transient("gossip missing origin field"))?;
                let deltas = envelope
                    .payload
                    .get("deltas")
                    .cloned()
                    .unwrap_or(serde_json::Value::Array(Vec::new()));
                let deltas: Vec<GossipDelta> = serde_json::from_value(deltas)
                    .map_err(|err| HandlerError::transient(format!("bad gossip deltas: {err}")))?;
                self.registry.apply_gossip(origin, deltas);
                Ok(Vec::new())
            }
            EnvelopeKind::Reply | EnvelopeKind::Error | EnvelopeKind::Pong => Ok(Vec::new()),
            other => Err(HandlerError::transient(format!(
                "registry cannot process {other} envelopes"
            ))),
        }
    }

    async fn on_stop(&mut self, _ctx: &mut weft_rt::ActorContext) {
        self.registry.stop();
    }
}

fn service_fields(p: &Payload) -> Result<(&str, NodeId), HandlerError> {
    let name = payload::str_field(p, "name")
        .ok_or_else(|| HandlerError::transient("missing name field"))?;
    let node = payload::str_field(p, "node")
        .map(NodeId::from)
        .ok_or_else(|| HandlerError::transient("missing node field"))?;
    Ok((name, node))
}
