// Layer 1: Standard library imports
use std::fmt::{self, Display};

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
// (none)

/// Closed set of envelope kinds.
///
/// Dynamic dispatch by actor name is inherent to the model; type safety is
/// recovered by tagging every envelope with one of these kinds and
/// validating payload shape per kind at the behavior boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    /// Ask a supervisor to create a child actor.
    CreateChild,
    /// Evaluate source text in a language worker.
    Eval,
    /// Invoke a named operation on an actor.
    Call,
    /// Successful response to a `call`/`eval`/`create_child`.
    Reply,
    /// Failure response; payload carries `error_code`.
    Error,
    /// Stop the target actor (supervisors cascade to children).
    Shutdown,
    /// Federation link health probe.
    Ping,
    /// Federation link health response.
    Pong,
    /// Advertise a public actor to the federation registry.
    RegisterService,
    /// Withdraw a public actor from the federation registry.
    UnregisterService,
    /// Registry delta exchanged between peer hubs.
    RegistryGossip,
}

impl EnvelopeKind {
    /// Wire name of the kind (snake_case, as serialized).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateChild => "create_child",
            Self::Eval => "eval",
            Self::Call => "call",
            Self::Reply => "reply",
            Self::Error => "error",
            Self::Shutdown => "shutdown",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::RegisterService => "register_service",
            Self::UnregisterService => "unregister_service",
            Self::RegistryGossip => "registry_gossip",
        }
    }

    /// True for `reply` and `error` envelopes.
    ///
    /// Replies get preferential treatment: the federation gateway never
    /// drops them under backpressure.
    pub fn is_reply(&self) -> bool {
        matches!(self, Self::Reply | Self::Error)
    }
}

impl Display for EnvelopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
