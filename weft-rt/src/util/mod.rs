//! Utility types shared across the runtime.
//!
//! Identifier and addressing primitives: node ids, actor addresses with the
//! `name@node` wire form, envelope sequence ids, and correlation ids.

pub mod ids;
pub mod names;

pub use ids::{ActorAddress, AddressParseError, CorrelationId, EnvelopeId, NodeId};
