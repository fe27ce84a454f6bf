//! Node configuration with sensible defaults.

// Layer 1: Standard library imports
use std::net::SocketAddr;
use std::time::Duration;

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
use weft_rt::{NodeId, NodeRole};

/// Default JSON-RPC call deadline for local targets.
pub const DEFAULT_LOCAL_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default JSON-RPC call deadline for federated targets.
pub const DEFAULT_FEDERATED_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Everything needed to start one node.
///
/// Built with [`NodeConfig::builder`]; `build` validates role-dependent
/// fields (a home relay needs an upstream, a main relay must not have
/// one).
///
/// # Examples
///
/// ```rust
/// use weft_node::NodeConfig;
/// use weft_rt::{NodeId, NodeRole};
///
/// let config = NodeConfig::builder(NodeId::new("hub-a"), NodeRole::Main)
///     .with_listen_addr("127.0.0.1:18080".parse().unwrap())
///     .with_auth_token("t")
///     .build()
///     .unwrap();
/// assert_eq!(config.node_type, NodeRole::Main);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Operator-assigned node identity.
    pub node_id: NodeId,

    /// Role in the overlay: `main` (hub) or `home` (spoke).
    pub node_type: NodeRole,

    /// Address the HTTP/WS surface binds to.
    pub listen_addr: SocketAddr,

    /// Upstream hub URL (home relays only).
    pub upstream_url: Option<String>,

    /// Peer hub URLs (main relays only).
    pub peer_urls: Vec<String>,

    /// Shared secret for the federation handshake.
    pub auth_token: String,

    /// Capacity of actor mailboxes.
    pub mailbox_capacity: usize,

    /// JSON-RPC deadline for local targets.
    pub call_timeout_local: Duration,

    /// JSON-RPC deadline for federated targets.
    pub call_timeout_federated: Duration,

    /// Per-link outbound queue capacity.
    pub link_queue_capacity: usize,

    /// Link health probe cadence.
    pub ping_interval: Duration,

    /// Silence after which a link is dead.
    pub pong_timeout: Duration,

    /// Registry entry lifetime without refresh.
    pub registry_ttl: Duration,

    /// Registry eviction sweep cadence.
    pub registry_eviction_interval: Duration,

    /// Registry gossip cadence toward peer hubs.
    pub gossip_interval: Duration,

    /// Public-actor registration refresh cadence.
    pub registration_refresh_interval: Duration,
}

impl NodeConfig {
    /// Start building a config for the given identity and role.
    pub fn builder(node_id: NodeId, node_type: NodeRole) -> NodeConfigBuilder {
        NodeConfigBuilder {
            config: NodeConfig {
                node_id,
                node_type,
                listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
                upstream_url: None,
                peer_urls: Vec::new(),
                auth_token: String::new(),
                mailbox_capacity: weft_rt::DEFAULT_MAILBOX_CAPACITY,
                call_timeout_local: DEFAULT_LOCAL_CALL_TIMEOUT,
                call_timeout_federated: DEFAULT_FEDERATED_CALL_TIMEOUT,
                link_queue_capacity: crate::federation::DEFAULT_LINK_QUEUE_CAPACITY,
                ping_interval: crate::federation::DEFAULT_PING_INTERVAL,
                pong_timeout: crate::federation::DEFAULT_PONG_TIMEOUT,
                registry_ttl: crate::federation::DEFAULT_REGISTRY_TTL,
                registry_eviction_interval: crate::federation::registry::DEFAULT_EVICTION_INTERVAL,
                gossip_interval: crate::federation::gateway::DEFAULT_GOSSIP_INTERVAL,
                registration_refresh_interval:
                    crate::federation::gateway::DEFAULT_REGISTRATION_REFRESH,
            },
        }
    }

    /// Validate role-dependent and capacity fields.
    pub fn validate(&self) -> Result<(), String> {
        if self.node_id.as_str().is_empty() {
            return Err("node_id must not be empty".to_owned());
        }
        if self.auth_token.is_empty() {
            return Err("auth_token must not be empty".to_owned());
        }
        if self.mailbox_capacity == 0 {
            return Err("mailbox_capacity must be > 0".to_owned());
        }
        if self.link_queue_capacity == 0 {
            return Err("link_queue_capacity must be > 0".to_owned());
        }
        match self.node_type {
            NodeRole::Home => {
                if self.upstream_url.is_none() {
                    return Err("home relays require upstream_url".to_owned());
                }
                if !self.peer_urls.is_empty() {
                    return Err("home relays cannot have peer_urls".to_owned());
                }
            }
            NodeRole::Main => {
                if self.upstream_url.is_some() {
                    return Err("main relays cannot have upstream_url".to_owned());
                }
            }
        }
        Ok(())
    }
}

/// Builder for [`NodeConfig`] with a fluent API.
#[derive(Debug)]
pub struct NodeConfigBuilder {
    config: NodeConfig,
}

impl NodeConfigBuilder {
    /// Set the HTTP/WS bind address (port 0 picks an ephemeral port).
    pub fn with_listen_addr(mut self, addr: SocketAddr) -> Self {
        self.config.listen_addr = addr;
        self
    }

    /// Set the upstream hub URL (home relays).
    pub fn with_upstream_url(mut self, url: impl Into<String>) -> Self {
        self.config.upstream_url = Some(url.into());
        self
    }

    /// Add a peer hub URL (main relays).
    pub fn with_peer_url(mut self, url: impl Into<String>) -> Self {
        self.config.peer_urls.push(url.into());
        self
    }

    /// Set the federation shared secret.
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.config.auth_token = token.into();
        self
    }

    /// Set actor mailbox capacity.
    pub fn with_mailbox_capacity(mut self, capacity: usize) -> Self {
        self.config.mailbox_capacity = capacity;
        self
    }

    /// Set the local-target call deadline.
    pub fn with_local_call_timeout(mut self, timeout: Duration) -> Self {
        self.config.call_timeout_local = timeout;
        self
    }

    /// Set the federated-target call deadline.
    pub fn with_federated_call_timeout(mut self, timeout: Duration) -> Self {
        self.config.call_timeout_federated = timeout;
        self
    }

    /// Set the link health probe cadence and dead-link threshold.
    pub fn with_link_health(mut self, ping_interval: Duration, pong_timeout: Duration) -> Self {
        self.config.ping_interval = ping_interval;
        self.config.pong_timeout = pong_timeout;
        self
    }

    /// Set the registry entry lifetime.
    pub fn with_registry_ttl(mut self, ttl: Duration) -> Self {
        self.config.registry_ttl = ttl;
        self
    }

    /// Set the registry eviction sweep cadence.
    pub fn with_registry_eviction_interval(mut self, interval: Duration) -> Self {
        self.config.registry_eviction_interval = interval;
        self
    }

    /// Set the gossip cadence.
    pub fn with_gossip_interval(mut self, interval: Duration) -> Self {
        self.config.gossip_interval = interval;
        self
    }

    /// Set the registration refresh cadence.
    pub fn with_registration_refresh_interval(mut self, interval: Duration) -> Self {
        self.config.registration_refresh_interval = interval;
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> Result<NodeConfig, String> {
        self.config.validate()?;
        Ok(self.config)
    }
}
