// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use thiserror::Error;

// Layer 3: Internal module imports
use crate::mailbox::MailboxError;
use crate::message::ErrorCode;
use crate::util::ActorAddress;

/// Errors raised by router operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    /// A live actor already owns this name.
    #[error("actor name already in use: {name}")]
    NameInUse { name: String },

    /// Target unknown locally and absent from the registry.
    #[error("no such actor: {address}")]
    NoSuchActor { address: ActorAddress },

    /// Destination mailbox is at capacity.
    #[error("mailbox full for {address} (capacity {capacity})")]
    MailboxFull {
        address: ActorAddress,
        capacity: usize,
    },

    /// No federation path toward the target.
    #[error("network unreachable for {address}: {reason}")]
    NetworkUnreachable {
        address: ActorAddress,
        reason: String,
    },

    /// TTL exhausted or the local node observed itself in the trace.
    #[error("routing loop for {address}: {reason}")]
    RoutingLoop {
        address: ActorAddress,
        reason: String,
    },
}

impl RouterError {
    /// Wire-level code for this failure.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::NameInUse { .. } => ErrorCode::SupervisorError,
            Self::NoSuchActor { .. } => ErrorCode::NoSuchActor,
            Self::MailboxFull { .. } => ErrorCode::MailboxFull,
            Self::NetworkUnreachable { .. } => ErrorCode::NetworkUnreachable,
            Self::RoutingLoop { .. } => ErrorCode::RoutingLoop,
        }
    }

    /// True when a retry may succeed without topology changes.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::MailboxFull { .. } | Self::NetworkUnreachable { .. }
        )
    }

    pub(crate) fn from_mailbox(error: MailboxError, address: ActorAddress) -> Self {
        match error {
            MailboxError::Full { capacity } => Self::MailboxFull { address, capacity },
            MailboxError::Closed => Self::NoSuchActor { address },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let addr = ActorAddress::local("x");
        assert_eq!(
            RouterError::NoSuchActor {
                address: addr.clone()
            }
            .error_code(),
            ErrorCode::NoSuchActor
        );
        assert_eq!(
            RouterError::MailboxFull {
                address: addr.clone(),
                capacity: 128
            }
            .error_code(),
            ErrorCode::MailboxFull
        );
        assert_eq!(
            RouterError::RoutingLoop {
                address: addr,
                reason: "ttl exhausted".into()
            }
            .error_code(),
            ErrorCode::RoutingLoop
        );
    }

    #[test]
    fn test_from_mailbox() {
        let addr = ActorAddress::local("x");
        assert!(matches!(
            RouterError::from_mailbox(MailboxError::Full { capacity: 4 }, addr.clone()),
            RouterError::MailboxFull { capacity: 4, .. }
        ));
        assert!(matches!(
            RouterError::from_mailbox(MailboxError::Closed, addr),
            RouterError::NoSuchActor { .. }
        ));
    }
}
