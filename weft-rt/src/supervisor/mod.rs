//! Supervision: child creation, naming, monitoring, cascading shutdown.
//!
//! A supervisor is itself an actor. It allocates unique child names,
//! constructs behaviors through the node's [`BehaviorFactory`], registers
//! mailboxes, and reports failed children to the observer that created
//! them. Restart policy is one-for-one with no restart; the failure report
//! leaves room for future strategies without assuming any.

pub mod behavior;
pub mod error;
pub mod spawner;

pub use behavior::SupervisorBehavior;
pub use error::SupervisorError;
pub use spawner::{BehaviorFactory, Spawner};
