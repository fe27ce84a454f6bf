//! Federation plane: WebSocket links, the connection table, and the
//! service registry.
//!
//! Hub-and-spoke overlay: publicly reachable main relays accept spokes and
//! peer with each other; NAT-bound home relays hold a single outbound link
//! to their upstream hub. The gateway owns all sockets and serializes
//! every mutation of the connection table through its own task loop.

pub mod backoff;
pub mod error;
pub mod gateway;
pub mod link;
pub mod queue;
pub mod registry;
pub mod wire;

pub use backoff::ReconnectBackoff;
pub use error::FederationError;
pub use gateway::{
    start_gateway, FederationConfig, FederationSnapshot, GatewayHandle, LinkInfo,
    DEFAULT_PING_INTERVAL, DEFAULT_PONG_TIMEOUT,
};
pub use link::{LinkDirection, LinkEvent, LinkHandle};
pub use queue::{OutboundQueue, PushOutcome, DEFAULT_LINK_QUEUE_CAPACITY};
pub use registry::{
    GossipDelta, RegistryConfig, RouteTable, ServiceEntry, ServiceRegistry,
    DEFAULT_REGISTRY_TTL,
};
pub use wire::{AuthFrame, CLOSE_UNAUTHORIZED};
