// Layer 1: Standard library imports
use std::fmt::{self, Display};
use std::sync::atomic::{AtomicU64, Ordering};

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// Layer 3: Internal module imports
// (none)

/// Process-wide envelope sequence counter.
static NEXT_ENVELOPE_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of a node participating in the federation.
///
/// Node ids are operator-assigned strings (`"hub-a"`, `"home-7"`). They are
/// globally unique by convention; the auth handshake rejects duplicates on
/// a given relay.
///
/// # Example
/// ```rust
/// use weft_rt::util::NodeId;
///
/// let node = NodeId::new("hub-a");
/// assert_eq!(node.as_str(), "hub-a");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Create a node id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Monotonic envelope identifier.
///
/// Drawn from a process-wide atomic counter, so ids are monotonic per
/// sender; combined with the sender's node id they are globally unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvelopeId(u64);

impl EnvelopeId {
    /// Allocate the next envelope id.
    pub fn next() -> Self {
        Self(NEXT_ENVELOPE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Rebuild an id from its raw value (wire decoding).
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw counter value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Display for EnvelopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Correlation identifier threading a reply back to its originating call.
///
/// UUID v4 for collision resistance across nodes; a correlation id completes
/// exactly once at the correlator that allocated it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generate a fresh correlation id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error raised when parsing an actor address from its wire form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressParseError {
    /// The name part before `@` was empty.
    #[error("actor address has an empty name: {input:?}")]
    EmptyName { input: String },

    /// The node part after `@` was empty.
    #[error("actor address has an empty node id: {input:?}")]
    EmptyNode { input: String },
}

/// Fully qualified actor address.
///
/// The wire form is `name` for local addresses and `name@node-id` for
/// addresses that name an owning node. Serialized as the string form.
///
/// # Example
/// ```rust
/// use weft_rt::util::{ActorAddress, NodeId};
///
/// let local = ActorAddress::local("counter");
/// assert_eq!(local.to_string(), "counter");
///
/// let remote = ActorAddress::remote("echo_a", NodeId::new("home-1"));
/// assert_eq!(remote.to_string(), "echo_a@home-1");
/// assert_eq!(remote.node(), Some(&NodeId::new("home-1")));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ActorAddress {
    name: String,
    node: Option<NodeId>,
}

impl ActorAddress {
    /// Create an address with no owning-node qualifier.
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            node: None,
        }
    }

    /// Create an address qualified with an owning node.
    pub fn remote(name: impl Into<String>, node: NodeId) -> Self {
        Self {
            name: name.into(),
            node: Some(node),
        }
    }

    /// The actor name without the node qualifier.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The owning node, when qualified.
    pub fn node(&self) -> Option<&NodeId> {
        self.node.as_ref()
    }

    /// True when the address is unqualified or names `local_node`.
    pub fn is_local_to(&self, local_node: &NodeId) -> bool {
        match &self.node {
            None => true,
            Some(node) => node == local_node,
        }
    }

    /// Return the same address qualified with `node`, keeping an existing
    /// qualifier if present.
    pub fn qualified(self, node: NodeId) -> Self {
        Self {
            name: self.name,
            node: Some(self.node.unwrap_or(node)),
        }
    }

    /// Return the same address with the node qualifier stripped.
    pub fn unqualified(self) -> Self {
        Self {
            name: self.name,
            node: None,
        }
    }

    /// Parse the `name` / `name@node` wire form.
    pub fn parse(input: &str) -> Result<Self, AddressParseError> {
        match input.split_once('@') {
            None => {
                if input.is_empty() {
                    return Err(AddressParseError::EmptyName {
                        input: input.to_owned(),
                    });
                }
                Ok(Self::local(input))
            }
            Some((name, node)) => {
                if name.is_empty() {
                    return Err(AddressParseError::EmptyName {
                        input: input.to_owned(),
                    });
                }
                if node.is_empty() {
                    return Err(AddressParseError::EmptyNode {
                        input: input.to_owned(),
                    });
                }
                Ok(Self::remote(name, NodeId::new(node)))
            }
        }
    }
}

impl Display for ActorAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.node {
            Some(node) => write!(f, "{}@{}", self.name, node),
            None => write!(f, "{}", self.name),
        }
    }
}

impl From<ActorAddress> for String {
    fn from(addr: ActorAddress) -> Self {
        addr.to_string()
    }
}

impl TryFrom<String> for ActorAddress {
    type Error = AddressParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}
