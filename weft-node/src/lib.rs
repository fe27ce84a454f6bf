//! # weft-node - Federation fabric and external gateways
//!
//! The network half of the weft runtime: persistent WebSocket links
//! between publicly reachable main relays (hubs) and NAT-bound home
//! relays (spokes), a TTL-based service registry with hub-to-hub gossip,
//! and the HTTP/JSON-RPC and WebSocket front-ends that turn client calls
//! into correlated envelopes.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use serde_json::json;
//! use weft_node::{start_node, NodeConfig};
//! use weft_rt::{ActorAddress, BehaviorKind, NodeId, NodeRole, Payload};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = NodeConfig::builder(NodeId::new("hub-a"), NodeRole::Main)
//!         .with_listen_addr("0.0.0.0:18080".parse()?)
//!         .with_auth_token("shared-secret")
//!         .build()?;
//!     let node = start_node(config).await?;
//!
//!     let name = node
//!         .create_child(BehaviorKind::LanguageWorker, "counter", false, Payload::new())
//!         .await?;
//!     let value = node
//!         .call(ActorAddress::local(&name), "increment", json!([]))
//!         .await?;
//!     println!("counter = {value}");
//!
//!     node.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`config`] - Node configuration and validation
//! - [`node`] - `start_node` bootstrap and the node handle
//! - [`federation`] - Links, gateway, registry, gossip
//! - [`gateway`] - HTTP/JSON-RPC and client WebSocket adapters

pub mod config;
pub mod federation;
pub mod gateway;
pub mod node;

// Re-export commonly used types
pub use config::{NodeConfig, NodeConfigBuilder};
pub use federation::{
    FederationConfig, FederationError, FederationSnapshot, GatewayHandle, ServiceRegistry,
};
pub use node::{
    start_node, start_node_with_hosts, stop_node, EvalHostFactory, NodeBehaviorFactory,
    NodeError, NodeHandle,
};
