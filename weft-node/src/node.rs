//! Node bootstrap: wire the runtime, federation plane, and HTTP surface
//! together and hand back one handle.

// Layer 1: Standard library imports
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use parking_lot::Mutex;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

// Layer 3: Internal module imports
use crate::config::NodeConfig;
use crate::federation::link::{spawn_dialer, DialerParams};
use crate::federation::{
    start_gateway, FederationConfig, GatewayHandle, RegistryConfig, RouteTable, ServiceRegistry,
};
use crate::gateway::http::{build_app, AppState};
use weft_rt::prelude::*;
use weft_rt::{
    Correlator, CorrelatorError, EvalHost, LanguageWorker, NullHost, RouterError,
    SupervisorError,
};

/// Bound on waiting for the HTTP server task during shutdown.
const SERVER_STOP_WAIT: Duration = Duration::from_secs(5);

/// Builds one interpreter environment per `language_worker` child, from
/// the child's init payload.
pub type EvalHostFactory = Arc<dyn Fn(&Payload) -> Box<dyn EvalHost> + Send + Sync>;

/// Errors raised while starting or driving a node.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Configuration failed validation.
    #[error("invalid node config: {reason}")]
    InvalidConfig { reason: String },

    /// The HTTP listener could not bind.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// A runtime actor could not be registered.
    #[error(transparent)]
    Router(#[from] RouterError),

    /// The root supervisor could not be spawned.
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    /// A bootstrap-level call failed.
    #[error(transparent)]
    Call(#[from] CorrelatorError),

    /// A reply arrived without the expected shape.
    #[error("protocol error: {reason}")]
    Protocol { reason: String },
}

/// Behavior factory wired at bootstrap.
///
/// `create_child` can build supervisors and language workers; the
/// runtime-owned behaviors (gateway, registry, correlator) are started by
/// `start_node` itself and cannot be created through a supervisor.
pub struct NodeBehaviorFactory {
    eval_hosts: Option<EvalHostFactory>,
}

impl NodeBehaviorFactory {
    /// Factory producing [`NullHost`] workers (no interpreter attached).
    pub fn new() -> Self {
        Self { eval_hosts: None }
    }

    /// Factory producing workers backed by the language runtime.
    pub fn with_eval_hosts(eval_hosts: EvalHostFactory) -> Self {
        Self {
            eval_hosts: Some(eval_hosts),
        }
    }
}

impl Default for NodeBehaviorFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl BehaviorFactory for NodeBehaviorFactory {
    fn create(
        &self,
        kind: BehaviorKind,
        init: &Payload,
        spawner: &Spawner,
    ) -> Result<Box<dyn Behavior>, SupervisorError> {
        match kind {
            BehaviorKind::Supervisor => Ok(Box::new(SupervisorBehavior::new(spawner.clone()))),
            BehaviorKind::LanguageWorker => {
                let host: Box<dyn EvalHost> = match &self.eval_hosts {
                    Some(factory) => factory(init),
                    None => Box::new(NullHost),
                };
                Ok(Box::new(LanguageWorker::new(host)))
            }
            other => Err(SupervisorError::UnsupportedBehavior { kind: other }),
        }
    }
}

/// Append the federation path when the URL does not already carry it.
pub(crate) fn federate_url(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    if trimmed.ends_with("/federate") {
        trimmed.to_owned()
    } else {
        format!("{trimmed}/federate")
    }
}

/// Start a node: router, correlator, registry (main relays), federation
/// gateway, root supervisor, HTTP surface, and outbound dialers.
pub async fn start_node(config: NodeConfig) -> Result<NodeHandle, NodeError> {
    start_node_with_hosts(config, None).await
}

/// [`start_node`] with an interpreter seam for `language_worker` children.
pub async fn start_node_with_hosts(
    config: NodeConfig,
    eval_hosts: Option<EvalHostFactory>,
) -> Result<NodeHandle, NodeError> {
    config
        .validate()
        .map_err(|reason| NodeError::InvalidConfig { reason })?;

    let router = Router::new(config.node_id.clone(), config.node_type);
    let correlator = Correlator::start(router.clone(), config.mailbox_capacity)?;
    let routes = Arc::new(RouteTable::default());

    let registry = match config.node_type {
        NodeRole::Main => Some(ServiceRegistry::start(
            router.clone(),
            Arc::clone(&routes),
            RegistryConfig {
                ttl: config.registry_ttl,
                eviction_interval: config.registry_eviction_interval,
                mailbox_capacity: config.mailbox_capacity,
            },
        )?),
        NodeRole::Home => None,
    };

    let gateway = start_gateway(
        router.clone(),
        correlator.clone(),
        registry.clone(),
        routes,
        FederationConfig {
            auth_token: config.auth_token.clone(),
            ping_interval: config.ping_interval,
            pong_timeout: config.pong_timeout,
            link_queue_capacity: config.link_queue_capacity,
            gossip_interval: config.gossip_interval,
            registration_refresh_interval: config.registration_refresh_interval,
            mailbox_capacity: config.mailbox_capacity.max(512),
        },
    )?;

    // Root supervisor: the bootstrap actor everything else hangs off.
    let factory: Arc<dyn BehaviorFactory> = match eval_hosts {
        Some(hosts) => Arc::new(NodeBehaviorFactory::with_eval_hosts(hosts)),
        None => Arc::new(NodeBehaviorFactory::new()),
    };
    let spawner = Spawner::new(router.clone(), factory, config.mailbox_capacity);
    spawner.spawn_named(
        names::ROOT_SUPERVISOR,
        None,
        false,
        Box::new(SupervisorBehavior::new(spawner.clone())),
    )?;

    // HTTP surface: JSON-RPC, client WS, federation WS, control routes.
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .map_err(|source| NodeError::Bind {
            addr: config.listen_addr,
            source,
        })?;
    let local_addr = listener.local_addr().map_err(|source| NodeError::Bind {
        addr: config.listen_addr,
        source,
    })?;
    let app = build_app(AppState {
        router: router.clone(),
        correlator: correlator.clone(),
        registry: registry.clone(),
        gateway: gateway.clone(),
        local_timeout: config.call_timeout_local,
        federated_timeout: config.call_timeout_federated,
    });

    let shutdown = CancellationToken::new();
    let server_token = shutdown.clone();
    let server = tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(server_token.cancelled_owned())
            .await;
        if let Err(err) = result {
            warn!(error = %err, "http server exited with error");
        }
    });

    // Outbound links: one dialer per upstream/peer, reconnecting forever.
    if let Some(upstream) = &config.upstream_url {
        spawn_dialer(
            DialerParams {
                url: federate_url(upstream),
                token: config.auth_token.clone(),
                local_node: config.node_id.clone(),
                local_role: config.node_type,
                queue_capacity: config.link_queue_capacity,
                mutual: false,
            },
            gateway.events(),
            gateway.cancel_token().child_token(),
        );
    }
    for peer in &config.peer_urls {
        gateway.add_peer(federate_url(peer), config.auth_token.clone());
    }

    info!(
        node = %config.node_id,
        role = ?config.node_type,
        addr = %local_addr,
        "node started"
    );
    Ok(NodeHandle {
        config,
        local_addr,
        router,
        correlator,
        registry,
        gateway,
        shutdown,
        server: Mutex::new(Some(server)),
    })
}

/// Stop a node and release its handle. Equivalent to
/// [`NodeHandle::stop`]; exists as the symmetric counterpart to
/// [`start_node`] for embedding runtimes that prefer free functions.
pub async fn stop_node(handle: NodeHandle) {
    handle.stop().await;
}

/// Handle to a running node.
pub struct NodeHandle {
    config: NodeConfig,
    local_addr: SocketAddr,
    router: Router,
    correlator: Correlator,
    registry: Option<ServiceRegistry>,
    gateway: GatewayHandle,
    shutdown: CancellationToken,
    server: Mutex<Option<JoinHandle<()>>>,
}

impl NodeHandle {
    /// This node's identity.
    pub fn node_id(&self) -> &NodeId {
        self.router.node_id()
    }

    /// This node's overlay role.
    pub fn role(&self) -> NodeRole {
        self.router.role()
    }

    /// The bound HTTP/WS address (resolved when the config used port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The node's configuration.
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// The process-wide router.
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// The request correlator.
    pub fn correlator(&self) -> &Correlator {
        &self.correlator
    }

    /// The service registry (main relays only).
    pub fn registry(&self) -> Option<&ServiceRegistry> {
        self.registry.as_ref()
    }

    /// The federation gateway handle.
    pub fn gateway(&self) -> &GatewayHandle {
        &self.gateway
    }

    /// Ask the root supervisor to create a child actor, returning the
    /// assigned name.
    pub async fn create_child(
        &self,
        behavior: BehaviorKind,
        name_hint: &str,
        public: bool,
        init: Payload,
    ) -> Result<String, NodeError> {
        let payload = payload::pairs([
            ("behavior", json!(behavior.as_str())),
            ("name_hint", json!(name_hint)),
            ("public", json!(public)),
            ("init", Value::Object(init)),
        ]);
        let reply = self
            .correlator
            .call_kind(
                ActorAddress::remote(names::CORRELATOR, self.router.node_id().clone()),
                ActorAddress::local(names::ROOT_SUPERVISOR),
                EnvelopeKind::CreateChild,
                payload,
                self.config.call_timeout_local,
            )
            .await?;
        payload::str_field(&reply.payload, "name")
            .map(str::to_owned)
            .ok_or_else(|| NodeError::Protocol {
                reason: "create_child reply missing name".to_owned(),
            })
    }

    /// Call an operation on an actor, local or federated, and return the
    /// reply value.
    pub async fn call(
        &self,
        target: ActorAddress,
        operation: &str,
        params: Value,
    ) -> Result<Value, NodeError> {
        let timeout = if target.is_local_to(self.router.node_id()) {
            self.config.call_timeout_local
        } else {
            self.config.call_timeout_federated
        };
        let payload = payload::pairs([("operation", json!(operation)), ("params", params)]);
        let reply = self
            .correlator
            .call(target, payload, timeout)
            .await
            .map_err(NodeError::Call)?;
        Ok(reply.payload.get("value").cloned().unwrap_or(Value::Null))
    }

    /// Stop the node: HTTP surface, links, dialers, and every actor.
    /// Idempotent.
    pub async fn stop(&self) {
        info!(node = %self.router.node_id(), "stopping node");
        self.shutdown.cancel();
        self.gateway.shutdown();
        self.router.stop_all();
        self.correlator.stop();
        if let Some(registry) = &self.registry {
            registry.stop();
        }

        let server = self.server.lock().take();
        if let Some(server) = server {
            if tokio::time::timeout(SERVER_STOP_WAIT, server).await.is_err() {
                warn!("http server did not stop in time");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_federate_url() {
        assert_eq!(
            federate_url("ws://127.0.0.1:18080"),
            "ws://127.0.0.1:18080/federate"
        );
        assert_eq!(
            federate_url("ws://127.0.0.1:18080/"),
            "ws://127.0.0.1:18080/federate"
        );
        assert_eq!(
            federate_url("ws://127.0.0.1:18080/federate"),
            "ws://127.0.0.1:18080/federate"
        );
    }

    #[test]
    fn test_factory_supports_runtime_kinds_only() {
        let router = Router::new(NodeId::new("n1"), NodeRole::Main);
        let factory = NodeBehaviorFactory::new();
        let spawner = Spawner::new(router, Arc::new(NodeBehaviorFactory::new()), 16);

        assert!(factory
            .create(BehaviorKind::Supervisor, &Payload::new(), &spawner)
            .is_ok());
        assert!(factory
            .create(BehaviorKind::LanguageWorker, &Payload::new(), &spawner)
            .is_ok());
        assert!(matches!(
            factory.create(BehaviorKind::FederationGateway, &Payload::new(), &spawner),
            Err(SupervisorError::UnsupportedBehavior { .. })
        ));
    }
}
