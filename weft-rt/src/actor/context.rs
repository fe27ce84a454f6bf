// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
use super::lifecycle::LifecycleState;
use crate::router::Router;
use crate::util::{ActorAddress, NodeId};

/// Per-actor context handed to each [`Behavior::handle`] call.
///
/// Carries the actor's identity and the router handle. State lives in the
/// behavior itself; the context only exposes what the runtime owns.
///
/// [`Behavior::handle`]: super::behavior::Behavior::handle
pub struct ActorContext {
    name: String,
    parent: Option<ActorAddress>,
    router: Router,
    public: bool,
    lifecycle: LifecycleState,
}

impl ActorContext {
    /// Create the context for a newly spawned actor.
    pub fn new(
        name: impl Into<String>,
        parent: Option<ActorAddress>,
        router: Router,
        public: bool,
    ) -> Self {
        Self {
            name: name.into(),
            parent,
            router,
            public,
            lifecycle: LifecycleState::Starting,
        }
    }

    /// The actor's unqualified name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The actor's local address, used as `from` on outbound envelopes.
    pub fn self_address(&self) -> ActorAddress {
        ActorAddress::local(&self.name)
    }

    /// The supervising actor, when any.
    pub fn parent(&self) -> Option<&ActorAddress> {
        self.parent.as_ref()
    }

    /// The node this actor runs on.
    pub fn node_id(&self) -> &NodeId {
        self.router.node_id()
    }

    /// The process-wide router.
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Whether this actor is advertised to the federation registry.
    pub fn is_public(&self) -> bool {
        self.public
    }

    /// Current lifecycle state.
    pub fn lifecycle(&self) -> LifecycleState {
        self.lifecycle
    }

    pub(crate) fn set_lifecycle(&mut self, state: LifecycleState) {
        self.lifecycle = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::NodeRole;

    #[test]
    fn test_context_identity() {
        let router = Router::new(NodeId::new("n1"), NodeRole::Main);
        let ctx = ActorContext::new(
            "worker-1",
            Some(ActorAddress::local("$root")),
            router,
            true,
        );

        assert_eq!(ctx.name(), "worker-1");
        assert_eq!(ctx.self_address(), ActorAddress::local("worker-1"));
        assert_eq!(ctx.parent(), Some(&ActorAddress::local("$root")));
        assert_eq!(ctx.node_id(), &NodeId::new("n1"));
        assert!(ctx.is_public());
        assert_eq!(ctx.lifecycle(), LifecycleState::Starting);
    }
}
