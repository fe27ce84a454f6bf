// Layer 1: Standard library imports
use std::fmt::{self, Display};

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Layer 3: Internal module imports
use super::context::ActorContext;
use crate::message::Envelope;

/// Closed set of behavior kinds an actor can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorKind {
    /// Creates, names, monitors and stops children.
    Supervisor,
    /// Owns an interpreter environment; serves `eval` and `call`.
    LanguageWorker,
    /// HTTP/JSON-RPC front-end origin.
    HttpGateway,
    /// WebSocket front-end origin.
    WsGateway,
    /// Manages federation links and envelope (de)serialization.
    FederationGateway,
    /// Maps public actor names to owning nodes.
    FederationRegistry,
    /// Tracks pending replies and times them out.
    RequestCorrelator,
}

impl BehaviorKind {
    /// Wire name of the kind (snake_case, as serialized).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Supervisor => "supervisor",
            Self::LanguageWorker => "language_worker",
            Self::HttpGateway => "http_gateway",
            Self::WsGateway => "ws_gateway",
            Self::FederationGateway => "federation_gateway",
            Self::FederationRegistry => "federation_registry",
            Self::RequestCorrelator => "request_correlator",
        }
    }

    /// Parse the wire name.
    pub fn parse(name: &str) -> Option<Self> {
        serde_json::from_value(serde_json::Value::String(name.to_owned())).ok()
    }
}

impl Display for BehaviorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Failure raised by a behavior while processing an envelope.
///
/// Transient errors keep the actor alive; anything else transitions it to
/// `Failed` after the error reply is emitted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
    transient: bool,
}

impl HandlerError {
    /// A failure that stops the actor.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: false,
        }
    }

    /// A failure the actor survives; the sender still gets an error reply.
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: true,
        }
    }

    /// Human-readable failure description.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// True when the actor should keep processing.
    pub fn is_transient(&self) -> bool {
        self.transient
    }
}

/// Message-handling logic of one actor.
///
/// A behavior owns the actor's private state. `handle` receives each
/// envelope and returns the envelopes to send out; the receive loop routes
/// them and owns all interaction with the rest of the system.
#[async_trait]
pub trait Behavior: Send + 'static {
    /// The behavior's kind tag.
    fn kind(&self) -> BehaviorKind;

    /// Process one envelope, returning outbound envelopes.
    async fn handle(
        &mut self,
        envelope: Envelope,
        ctx: &mut ActorContext,
    ) -> Result<Vec<Envelope>, HandlerError>;

    /// Hook invoked once after the receive loop exits, before the task
    /// ends. Supervisors cascade shutdown to children here.
    async fn on_stop(&mut self, _ctx: &mut ActorContext) {}
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parse_round_trip() {
        for kind in [
            BehaviorKind::Supervisor,
            BehaviorKind::LanguageWorker,
            BehaviorKind::HttpGateway,
            BehaviorKind::WsGateway,
            BehaviorKind::FederationGateway,
            BehaviorKind::FederationRegistry,
            BehaviorKind::RequestCorrelator,
        ] {
            assert_eq!(BehaviorKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(BehaviorKind::parse("no_such_kind"), None);
    }

    #[test]
    fn test_handler_error_transience() {
        assert!(HandlerError::transient("retry me").is_transient());
        assert!(!HandlerError::fatal("dead").is_transient());
        assert_eq!(HandlerError::fatal("dead").message(), "dead");
    }
}
