//! Actors: named units of private state with a receive loop.
//!
//! Each actor runs one tokio task that drains its mailbox and dispatches
//! envelopes to a [`Behavior`]. Behaviors return outbound envelopes rather
//! than touching other actors, which keeps them pure-ish and testable in
//! isolation; the loop routes the returned envelopes through the router.

pub mod behavior;
pub mod context;
pub mod lifecycle;
pub mod runner;

pub use behavior::{Behavior, BehaviorKind, HandlerError};
pub use context::ActorContext;
pub use lifecycle::LifecycleState;
pub use runner::{spawn_actor, ActorHandle};
