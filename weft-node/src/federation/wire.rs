// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
use super::error::FederationError;
use weft_rt::{Envelope, NodeId, NodeRole};

/// WebSocket close code sent when the handshake is rejected.
pub const CLOSE_UNAUTHORIZED: u16 = 4001;

/// First frame exchanged after the `/federate` upgrade.
///
/// Not an envelope kind: the auth frame exists only during the handshake
/// and never reaches the router. Hubs exchange tokens mutually; spokes
/// authenticate one-sided and ignore the token in the hub's response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthFrame {
    kind: String,
    pub node_id: NodeId,
    pub node_type: NodeRole,
    pub token: String,
}

impl AuthFrame {
    /// Build an auth frame for the local node.
    pub fn new(node_id: NodeId, node_type: NodeRole, token: impl Into<String>) -> Self {
        Self {
            kind: "auth".to_owned(),
            node_id,
            node_type,
            token: token.into(),
        }
    }

    /// Encode as a JSON text frame.
    pub fn encode(&self) -> Result<String, FederationError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode and validate the frame tag.
    pub fn decode(text: &str) -> Result<Self, FederationError> {
        let frame: Self = serde_json::from_str(text)?;
        if frame.kind != "auth" {
            return Err(FederationError::Handshake {
                reason: format!("expected auth frame, got kind {:?}", frame.kind),
            });
        }
        Ok(frame)
    }
}

/// Encode one envelope as a canonical JSON text frame.
pub fn encode_envelope(envelope: &Envelope) -> Result<String, FederationError> {
    Ok(serde_json::to_string(envelope)?)
}

/// Decode one envelope frame. Unknown fields are ignored, preserving
/// forward compatibility.
pub fn decode_envelope(text: &str) -> Result<Envelope, FederationError> {
    Ok(serde_json::from_str(text)?)
}
