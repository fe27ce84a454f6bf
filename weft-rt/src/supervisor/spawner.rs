// Layer 1: Standard library imports
use std::sync::Arc;

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
use super::error::SupervisorError;
use crate::actor::{spawn_actor, ActorHandle, Behavior, BehaviorKind};
use crate::mailbox::{mailbox, MailboxSender};
use crate::message::Payload;
use crate::router::Router;
use crate::util::ActorAddress;

/// Constructs behavior values for `create_child` requests.
///
/// The node provides the factory at bootstrap; it is the seam through which
/// the external language evaluator reaches the runtime (a factory building
/// `language_worker` behaviors owns the interpreter hook).
pub trait BehaviorFactory: Send + Sync + 'static {
    /// Build a behavior of `kind` from the request's init payload.
    ///
    /// `spawner` allows factories to hand nested supervisors the means to
    /// create their own children.
    fn create(
        &self,
        kind: BehaviorKind,
        init: &Payload,
        spawner: &Spawner,
    ) -> Result<Box<dyn Behavior>, SupervisorError>;
}

/// Shared actor-spawning context: router, behavior factory, and the
/// mailbox capacity applied to new children.
///
/// Cheap to clone; every supervisor in a tree carries one.
#[derive(Clone)]
pub struct Spawner {
    router: Router,
    factory: Arc<dyn BehaviorFactory>,
    mailbox_capacity: usize,
}

impl Spawner {
    /// Create a spawner.
    pub fn new(router: Router, factory: Arc<dyn BehaviorFactory>, mailbox_capacity: usize) -> Self {
        Self {
            router,
            factory,
            mailbox_capacity,
        }
    }

    /// The process-wide router.
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Build a behavior through the node's factory.
    pub fn create_behavior(
        &self,
        kind: BehaviorKind,
        init: &Payload,
    ) -> Result<Box<dyn Behavior>, SupervisorError> {
        self.factory.create(kind, init, self)
    }

    /// Register a mailbox under `name` and start the actor's receive loop.
    pub fn spawn_named(
        &self,
        name: &str,
        parent: Option<ActorAddress>,
        public: bool,
        behavior: Box<dyn Behavior>,
    ) -> Result<(MailboxSender, ActorHandle), SupervisorError> {
        let (receiver, sender) = mailbox(self.mailbox_capacity);
        self.router
            .register(name, sender.clone(), public)
            .map_err(|source| SupervisorError::SpawnFailed {
                name: name.to_owned(),
                source,
            })?;
        let handle = spawn_actor(name, parent, public, behavior, receiver, self.router.clone());
        Ok((sender, handle))
    }
}
