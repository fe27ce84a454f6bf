// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use thiserror::Error;

// Layer 3: Internal module imports
use weft_rt::ErrorCode;

/// Errors raised on federation links and in the gateway.
#[derive(Debug, Error)]
pub enum FederationError {
    /// A frame could not be encoded or decoded as canonical JSON.
    #[error("frame codec error: {source}")]
    Codec {
        #[from]
        source: serde_json::Error,
    },

    /// The peer's first frame was not a valid auth frame.
    #[error("handshake failed: {reason}")]
    Handshake { reason: String },

    /// The peer presented a bad token or identity.
    #[error("unauthorized: {reason}")]
    Unauthorized { reason: String },

    /// The underlying WebSocket failed.
    #[error("transport error: {reason}")]
    Transport { reason: String },

    /// The link closed before the operation completed.
    #[error("link closed")]
    LinkClosed,
}

impl FederationError {
    /// Wire-level code for this failure.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Unauthorized { .. } | Self::Handshake { .. } => ErrorCode::AuthFailed,
            _ => ErrorCode::NetworkUnreachable,
        }
    }

    /// True when redialing may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::LinkClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            FederationError::Unauthorized {
                reason: "bad token".into()
            }
            .error_code(),
            ErrorCode::AuthFailed
        );
        assert_eq!(
            FederationError::LinkClosed.error_code(),
            ErrorCode::NetworkUnreachable
        );
    }

    #[test]
    fn test_retryable() {
        assert!(FederationError::LinkClosed.is_retryable());
        assert!(!FederationError::Unauthorized {
            reason: "nope".into()
        }
        .is_retryable());
    }
}
