//! # weft-rt - Actor runtime for the weft federation fabric
//!
//! Named, independently scheduled units of mutable state that communicate
//! exclusively by asynchronous message passing, supervised for lifecycle
//! and failure. This crate is the local half of the system; `weft-node`
//! adds the federation plane and the external gateways.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use serde_json::json;
//! use weft_rt::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let router = Router::new(NodeId::new("n1"), NodeRole::Main);
//!     let correlator = Correlator::start(router.clone(), 128)?;
//!
//!     // Register a worker and call it synchronously.
//!     let spawner = Spawner::new(router.clone(), Arc::new(MyFactory), 128);
//!     spawner.spawn_named(
//!         "counter",
//!         None,
//!         false,
//!         Box::new(LanguageWorker::new(Box::new(ScratchHost::new("")))),
//!     )?;
//!
//!     let reply = correlator
//!         .call(
//!             ActorAddress::local("counter"),
//!             payload::pairs([("operation", json!("increment"))]),
//!             Duration::from_secs(30),
//!         )
//!         .await?;
//!     println!("counter = {:?}", reply.payload.get("value"));
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`message`] - Envelope value type, kinds, payloads, error codes
//! - [`mailbox`] - Bounded FIFO queues with close signalling
//! - [`actor`] - Behavior trait, context, lifecycle, receive loop
//! - [`router`] - Name index and the federation forwarding path
//! - [`supervisor`] - Child creation, naming, cascading shutdown
//! - [`correlator`] - Request/response correlation with deadlines
//! - [`worker`] - Language worker and the interpreter seam
//! - [`util`] - Ids, addresses, reserved names
//!
//! # Design Notes
//!
//! - One tokio task per actor; behavior state is never shared.
//! - Behaviors return outbound envelopes instead of sending directly,
//!   which keeps them testable without a running router.
//! - Delivery is at-most-once per hop; ordering is FIFO per
//!   (sender, receiver) pair locally.

pub mod actor;
pub mod correlator;
pub mod mailbox;
pub mod message;
pub mod router;
pub mod supervisor;
pub mod util;
pub mod worker;

// Re-export commonly used types
pub use actor::{
    spawn_actor, ActorContext, ActorHandle, Behavior, BehaviorKind, HandlerError, LifecycleState,
};
pub use correlator::{Correlator, CorrelatorError};
pub use mailbox::{mailbox, Mailbox, MailboxError, MailboxSender, DEFAULT_MAILBOX_CAPACITY};
pub use message::{Envelope, EnvelopeKind, ErrorCode, Payload, DEFAULT_TTL};
pub use router::{NodeRole, Router, RouterError};
pub use supervisor::{BehaviorFactory, Spawner, SupervisorBehavior, SupervisorError};
pub use util::{ActorAddress, CorrelationId, EnvelopeId, NodeId};
pub use worker::{EvalError, EvalHost, LanguageWorker, NullHost, ScratchHost};

/// Commonly used imports for embedding runtimes.
pub mod prelude {
    pub use crate::actor::{Behavior, BehaviorKind, HandlerError, LifecycleState};
    pub use crate::correlator::{Correlator, CorrelatorError};
    pub use crate::message::{payload, Envelope, EnvelopeKind, ErrorCode, Payload};
    pub use crate::router::{NodeRole, Router, RouterError};
    pub use crate::supervisor::{BehaviorFactory, Spawner, SupervisorBehavior};
    pub use crate::util::{names, ActorAddress, NodeId};
    pub use crate::worker::{EvalHost, LanguageWorker, ScratchHost};
}
