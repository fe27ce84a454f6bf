// Layer 1: Standard library imports
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// Layer 3: Internal module imports
use super::link::{
    spawn_dialer, AcceptParams, DialerParams, EventSender, LinkDirection, LinkEvent, LinkHandle,
};
use super::queue::{PushOutcome, DEFAULT_LINK_QUEUE_CAPACITY};
use super::registry::{GossipDelta, RouteTable, ServiceRegistry};
use weft_rt::prelude::*;
use weft_rt::{mailbox, CorrelationId, Mailbox, RouterError};

/// Default federation link health probe cadence.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(15);

/// Default silence after which a link is considered dead.
pub const DEFAULT_PONG_TIMEOUT: Duration = Duration::from_secs(45);

/// Default cadence for gossiping registry deltas to peer hubs.
pub const DEFAULT_GOSSIP_INTERVAL: Duration = Duration::from_secs(2);

/// Default cadence for refreshing service registrations.
pub const DEFAULT_REGISTRATION_REFRESH: Duration = Duration::from_secs(200);

/// Federation gateway tuning knobs.
#[derive(Debug, Clone)]
pub struct FederationConfig {
    /// Shared secret for the `/federate` handshake.
    pub auth_token: String,
    /// Health probe cadence.
    pub ping_interval: Duration,
    /// Silence after which a link is closed and reopened.
    pub pong_timeout: Duration,
    /// Per-link outbound queue capacity.
    pub link_queue_capacity: usize,
    /// Registry delta gossip cadence (main relays).
    pub gossip_interval: Duration,
    /// Registration refresh cadence.
    pub registration_refresh_interval: Duration,
    /// Capacity of the `$federation` inbox.
    pub mailbox_capacity: usize,
}

impl FederationConfig {
    /// Config with defaults and the given shared secret.
    pub fn new(auth_token: impl Into<String>) -> Self {
        Self {
            auth_token: auth_token.into(),
            ping_interval: DEFAULT_PING_INTERVAL,
            pong_timeout: DEFAULT_PONG_TIMEOUT,
            link_queue_capacity: DEFAULT_LINK_QUEUE_CAPACITY,
            gossip_interval: DEFAULT_GOSSIP_INTERVAL,
            registration_refresh_interval: DEFAULT_REGISTRATION_REFRESH,
            mailbox_capacity: 512,
        }
    }
}

/// Point-in-time view of the connection table.
#[derive(Debug, Clone, Serialize)]
pub struct FederationSnapshot {
    pub node_id: NodeId,
    pub role: NodeRole,
    pub upstream: Option<NodeId>,
    pub links: Vec<LinkInfo>,
}

/// One link's health summary.
#[derive(Debug, Clone, Serialize)]
pub struct LinkInfo {
    pub node_id: NodeId,
    pub role: NodeRole,
    pub direction: String,
    pub queue_len: usize,
    pub queue_dropped: u64,
    pub last_pong_age_ms: i64,
    pub established_at: DateTime<Utc>,
}

enum GatewayControl {
    AddPeer { url: String, token: String },
    Snapshot { reply: oneshot::Sender<FederationSnapshot> },
}

/// Handle to the running federation gateway.
#[derive(Clone)]
pub struct GatewayHandle {
    events: EventSender,
    control: mpsc::UnboundedSender<GatewayControl>,
    cancel: CancellationToken,
    accept: AcceptParams,
}

impl GatewayHandle {
    /// Start dialing a new peer hub. Takes effect immediately; the peer
    /// is redialed with backoff until the gateway shuts down.
    pub fn add_peer(&self, url: impl Into<String>, token: impl Into<String>) {
        let _ = self.control.send(GatewayControl::AddPeer {
            url: url.into(),
            token: token.into(),
        });
    }

    /// Fetch the current connection table.
    pub async fn snapshot(&self) -> Option<FederationSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.control.send(GatewayControl::Snapshot { reply }).ok()?;
        rx.await.ok()
    }

    /// Tear down every link and stop the gateway task. Idempotent.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub(crate) fn accept_params(&self) -> AcceptParams {
        self.accept.clone()
    }

    pub(crate) fn events(&self) -> EventSender {
        self.events.clone()
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Register the `$federation` inbox with the router and start the gateway
/// task.
///
/// The gateway owns every WebSocket link and never interprets envelope
/// semantics: inbound frames go straight to the router, which may hand
/// them back for further forwarding (bounded by ttl).
pub fn start_gateway(
    router: Router,
    correlator: weft_rt::Correlator,
    registry: Option<ServiceRegistry>,
    routes: Arc<RouteTable>,
    config: FederationConfig,
) -> Result<GatewayHandle, RouterError> {
    let (inbox, inbox_sender) = mailbox(config.mailbox_capacity);
    router.register(names::FEDERATION_GATEWAY, inbox_sender.clone(), false)?;
    router.set_federation(inbox_sender);

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();

    let handle = GatewayHandle {
        events: events_tx.clone(),
        control: control_tx,
        cancel: cancel.clone(),
        accept: AcceptParams {
            local_node: router.node_id().clone(),
            local_role: router.role(),
            auth_token: config.auth_token.clone(),
            queue_capacity: config.link_queue_capacity,
        },
    };

    let task = GatewayTask {
        router,
        correlator,
        registry,
        routes,
        config,
        links: HashMap::new(),
        upstream: None,
        events_tx,
        cancel,
    };
    tokio::spawn(task.run(inbox, events_rx, control_rx));

    Ok(handle)
}

struct LinkState {
    handle: LinkHandle,
    last_pong: DateTime<Utc>,
}

struct GatewayTask {
    router: Router,
    correlator: weft_rt::Correlator,
    registry: Option<ServiceRegistry>,
    routes: Arc<RouteTable>,
    config: FederationConfig,
    links: HashMap<NodeId, LinkState>,
    upstream: Option<NodeId>,
    events_tx: EventSender,
    cancel: CancellationToken,
}

impl GatewayTask {
    async fn run(
        mut self,
        mut inbox: Mailbox,
        mut events_rx: mpsc::UnboundedReceiver<LinkEvent>,
        mut control_rx: mpsc::UnboundedReceiver<GatewayControl>,
    ) {
        let mut ping_tick = tokio::time::interval(self.config.ping_interval);
        let mut gossip_tick = tokio::time::interval(self.config.gossip_interval);
        let mut refresh_tick =
            tokio::time::interval(self.config.registration_refresh_interval);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                maybe = inbox.recv() => match maybe {
                    Some(envelope) => self.route_outbound(envelope),
                    None => break,
                },
                Some(event) = events_rx.recv() => self.on_event(event),
                Some(control) = control_rx.recv() => self.on_control(control),
                _ = ping_tick.tick() => self.check_links(),
                _ = gossip_tick.tick() => self.gossip(),
                _ = refresh_tick.tick() => self.refresh_registrations(),
            }
        }

        info!(node = %self.router.node_id(), "federation gateway stopping");
        self.cancel.cancel();
        for (_, state) in self.links.drain() {
            state.handle.close();
        }
    }

    /// Pick the link for an outbound envelope. The router already
    /// performed the ttl/trace checks and qualified the target where the
    /// registry knows it.
    fn route_outbound(&mut self, envelope: Envelope) {
        match self.router.role() {
            NodeRole::Home => {
                let upstream = self
                    .upstream
                    .as_ref()
                    .and_then(|node| self.links.get(node))
                    .map(|state| state.handle.clone());
                match upstream {
                    Some(handle) => self.enqueue(&handle, envelope),
                    None => self.fail_envelope(
                        envelope,
                        ErrorCode::NetworkUnreachable,
                        "no upstream link",
                    ),
                }
            }
            NodeRole::Main => {
                let Some(target) = envelope.to.node().cloned() else {
                    self.fail_envelope(
                        envelope,
                        ErrorCode::NoSuchActor,
                        "unresolved name reached the gateway",
                    );
                    return;
                };
                let direct = self.links.get(&target).map(|state| state.handle.clone());
                let routed = direct.or_else(|| {
                    self.routes
                        .via(&target)
                        .and_then(|via| self.links.get(&via))
                        .map(|state| state.handle.clone())
                });
                match routed {
                    Some(handle) => self.enqueue(&handle, envelope),
                    None => self.fail_envelope(
                        envelope,
                        ErrorCode::NetworkUnreachable,
                        "no link toward the owning node",
                    ),
                }
            }
        }
    }

    fn enqueue(&self, handle: &LinkHandle, envelope: Envelope) {
        let reply_to = envelope.reply_to.clone();
        let correlation_id = envelope.correlation_id;
        let target = envelope.to.clone();
        match handle.enqueue(envelope) {
            PushOutcome::Queued => {}
            PushOutcome::DroppedOldest => {
                debug!(peer = %handle.node_id(), "link queue full; dropped oldest envelope");
            }
            PushOutcome::Rejected => {
                warn!(peer = %handle.node_id(), target = %target, "link queue rejected envelope");
                self.report_failure(
                    reply_to,
                    correlation_id,
                    ErrorCode::MailboxFull,
                    "federation link queue full",
                );
            }
        }
    }

    fn fail_envelope(&self, envelope: Envelope, code: ErrorCode, reason: &str) {
        if envelope.kind.is_reply() {
            warn!(target = %envelope.to, reason, "dropping undeliverable reply");
            return;
        }
        debug!(target = %envelope.to, code = %code, reason, "failing outbound envelope");
        self.report_failure(envelope.reply_to, envelope.correlation_id, code, reason);
    }

    fn report_failure(
        &self,
        reply_to: Option<ActorAddress>,
        correlation_id: Option<CorrelationId>,
        code: ErrorCode,
        reason: &str,
    ) {
        let Some(reply_to) = reply_to else {
            return;
        };
        let error = Envelope::error(
            self.fed_address(self.router.node_id().clone()),
            reply_to,
            correlation_id,
            code,
            reason,
        );
        self.router.send_or_report(error);
    }

    fn on_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Up(handle) => self.on_link_up(handle),
            LinkEvent::Inbound { node, envelope } => self.on_inbound(node, envelope),
            LinkEvent::Down {
                node,
                link_id,
                reason,
            } => self.on_link_down(node, link_id, &reason),
        }
    }

    fn on_link_up(&mut self, handle: LinkHandle) {
        let node = handle.node_id().clone();
        if let Some(old) = self.links.insert(
            node.clone(),
            LinkState {
                handle: handle.clone(),
                last_pong: Utc::now(),
            },
        ) {
            debug!(peer = %node, "replacing existing link");
            old.handle.close();
        }

        if self.router.role() == NodeRole::Home
            && handle.direction() == LinkDirection::Outbound
            && handle.remote_role() == NodeRole::Main
        {
            self.upstream = Some(node.clone());
            self.announce_public(&handle);
        }
        // A freshly peered hub gets our full local-origin registry view;
        // deltas keep it current afterwards.
        if self.router.role() == NodeRole::Main && handle.remote_role() == NodeRole::Main {
            self.sync_registry_to_peer(&handle);
        }
    }

    fn on_inbound(&mut self, node: NodeId, mut envelope: Envelope) {
        // Learn return routes from the forward path: every traced node
        // that is not directly linked is reachable through this link.
        for visited in &envelope.trace {
            if visited != self.router.node_id() && !self.links.contains_key(visited) {
                self.routes.set(visited.clone(), node.clone());
            }
        }
        match envelope.kind {
            EnvelopeKind::Ping => {
                let pong = Envelope::new(
                    EnvelopeKind::Pong,
                    self.fed_address(self.router.node_id().clone()),
                    self.fed_address(node.clone()),
                );
                if let Some(state) = self.links.get(&node) {
                    let _ = state.handle.enqueue(pong);
                }
            }
            EnvelopeKind::Pong => {
                if let Some(state) = self.links.get_mut(&node) {
                    state.last_pong = Utc::now();
                }
            }
            EnvelopeKind::RegisterService | EnvelopeKind::UnregisterService => {
                // Owner is the link's authenticated identity, not whatever
                // the frame claims.
                envelope
                    .payload
                    .insert("node".to_owned(), json!(node.as_str()));
                self.router.send_or_report(envelope);
            }
            _ => self.router.send_or_report(envelope),
        }
    }

    fn on_link_down(&mut self, node: NodeId, link_id: u64, reason: &str) {
        // A stale report about a link that was already replaced by a
        // reconnect must not tear down its replacement.
        if self
            .links
            .get(&node)
            .is_none_or(|state| state.handle.link_id() != link_id)
        {
            return;
        }
        let Some(state) = self.links.remove(&node) else {
            return;
        };
        state.handle.close();
        warn!(peer = %node, reason, "federation link down");

        if self.upstream.as_ref() == Some(&node) {
            self.upstream = None;
        }
        self.routes.forget_via(&node);
        self.correlator.fail_node(
            &node,
            ErrorCode::NetworkUnreachable,
            &format!("link to {node} lost: {reason}"),
        );
    }

    fn on_control(&mut self, control: GatewayControl) {
        match control {
            GatewayControl::AddPeer { url, token } => {
                info!(url = %url, "dialing peer hub");
                spawn_dialer(
                    DialerParams {
                        url,
                        token,
                        local_node: self.router.node_id().clone(),
                        local_role: self.router.role(),
                        queue_capacity: self.config.link_queue_capacity,
                        mutual: self.router.role() == NodeRole::Main,
                    },
                    self.events_tx.clone(),
                    self.cancel.child_token(),
                );
            }
            GatewayControl::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn snapshot(&self) -> FederationSnapshot {
        let now = Utc::now();
        let links = self
            .links
            .values()
            .map(|state| LinkInfo {
                node_id: state.handle.node_id().clone(),
                role: state.handle.remote_role(),
                direction: match state.handle.direction() {
                    LinkDirection::Inbound => "inbound".to_owned(),
                    LinkDirection::Outbound => "outbound".to_owned(),
                },
                queue_len: state.handle.queue_len(),
                queue_dropped: state.handle.queue_dropped(),
                last_pong_age_ms: now
                    .signed_duration_since(state.last_pong)
                    .num_milliseconds(),
                established_at: state.handle.established_at(),
            })
            .collect();
        FederationSnapshot {
            node_id: self.router.node_id().clone(),
            role: self.router.role(),
            upstream: self.upstream.clone(),
            links,
        }
    }

    /// Ping every link; close the ones whose pong is overdue.
    fn check_links(&mut self) {
        let now = Utc::now();
        let deadline = chrono::Duration::from_std(self.config.pong_timeout)
            .unwrap_or_else(|_| chrono::Duration::seconds(45));
        let mut dead = Vec::new();
        for (node, state) in &self.links {
            if now.signed_duration_since(state.last_pong) > deadline {
                dead.push(node.clone());
                continue;
            }
            let ping = Envelope::new(
                EnvelopeKind::Ping,
                self.fed_address(self.router.node_id().clone()),
                self.fed_address(node.clone()),
            );
            let _ = state.handle.enqueue(ping);
        }
        for node in dead {
            let link_id = match self.links.get(&node) {
                Some(state) => state.handle.link_id(),
                None => continue,
            };
            self.on_link_down(node, link_id, "pong timeout");
        }
    }

    /// Push accumulated local-origin registry deltas to every peer hub.
    fn gossip(&mut self) {
        let Some(registry) = &self.registry else {
            return;
        };
        let peers: Vec<LinkHandle> = self
            .links
            .values()
            .filter(|state| state.handle.remote_role() == NodeRole::Main)
            .map(|state| state.handle.clone())
            .collect();
        if peers.is_empty() {
            return;
        }
        let deltas = registry.drain_deltas();
        if deltas.is_empty() {
            return;
        }
        for peer in peers {
            self.send_gossip(&peer, &deltas);
        }
    }

    fn sync_registry_to_peer(&self, peer: &LinkHandle) {
        let Some(registry) = &self.registry else {
            return;
        };
        let local = self.router.node_id();
        let deltas: Vec<GossipDelta> = registry
            .snapshot()
            .iter()
            .filter(|(_, entry)| &entry.origin == local)
            .map(|(name, entry)| GossipDelta {
                name: name.clone(),
                owner: entry.owner.clone(),
                version: entry.version,
                removed: false,
            })
            .collect();
        if deltas.is_empty() {
            return;
        }
        self.send_gossip(peer, &deltas);
    }

    fn send_gossip(&self, peer: &LinkHandle, deltas: &[GossipDelta]) {
        let Ok(deltas_value) = serde_json::to_value(deltas) else {
            return;
        };
        let gossip = Envelope::new(
            EnvelopeKind::RegistryGossip,
            self.fed_address(self.router.node_id().clone()),
            ActorAddress::remote(names::REGISTRY, peer.node_id().clone()),
        )
        .with_payload(payload::pairs([
            ("origin", json!(self.router.node_id().as_str())),
            ("deltas", deltas_value),
        ]));
        let _ = peer.enqueue(gossip);
    }

    /// Re-advertise every public local actor so registry TTLs stay fresh.
    fn refresh_registrations(&mut self) {
        match self.router.role() {
            NodeRole::Home => {
                let upstream = self
                    .upstream
                    .as_ref()
                    .and_then(|node| self.links.get(node))
                    .map(|state| state.handle.clone());
                if let Some(handle) = upstream {
                    self.announce_public(&handle);
                }
            }
            NodeRole::Main => {
                for name in self.router.public_names() {
                    self.router.send_or_report(self.register_envelope(&name));
                }
            }
        }
    }

    /// Send a `register_service` for every public local actor down the
    /// given link (used after connect and on refresh).
    fn announce_public(&self, handle: &LinkHandle) {
        for name in self.router.public_names() {
            let _ = handle.enqueue(self.register_envelope(&name));
        }
    }

    fn register_envelope(&self, name: &str) -> Envelope {
        Envelope::new(
            EnvelopeKind::RegisterService,
            self.fed_address(self.router.node_id().clone()),
            ActorAddress::local(names::REGISTRY),
        )
        .with_payload(payload::pairs([
            ("name", json!(name)),
            ("node", json!(self.router.node_id().as_str())),
        ]))
    }

    fn fed_address(&self, node: NodeId) -> ActorAddress {
        ActorAddress::remote(names::FEDERATION_GATEWAY, node)
    }
}
