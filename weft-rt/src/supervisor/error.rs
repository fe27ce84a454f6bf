// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use thiserror::Error;

// Layer 3: Internal module imports
use crate::actor::BehaviorKind;
use crate::router::RouterError;

/// Errors raised by supervisor operations.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The requested behavior name is not in the closed kind set.
    #[error("unknown behavior kind: {kind:?}")]
    UnknownBehavior { kind: String },

    /// The factory cannot construct this kind (runtime-owned behaviors
    /// are created at bootstrap, not through `create_child`).
    #[error("behavior {kind} cannot be created by a supervisor")]
    UnsupportedBehavior { kind: BehaviorKind },

    /// Child name hints must not use the runtime's `$` prefix.
    #[error("name hint {name:?} uses the reserved prefix")]
    ReservedName { name: String },

    /// The request payload was missing or malformed.
    #[error("invalid supervisor request: {reason}")]
    InvalidRequest { reason: String },

    /// No live child with the given name.
    #[error("no such child: {name}")]
    ChildNotFound { name: String },

    /// Registering the child's mailbox failed.
    #[error("failed to start child {name}: {source}")]
    SpawnFailed {
        name: String,
        #[source]
        source: RouterError,
    },

    /// Behavior construction failed inside the factory.
    #[error("behavior construction failed for {name}: {reason}")]
    FactoryFailed { name: String, reason: String },
}

impl SupervisorError {
    /// True when the caller supplied a bad request rather than hitting a
    /// runtime fault.
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownBehavior { .. }
                | Self::UnsupportedBehavior { .. }
                | Self::ReservedName { .. }
                | Self::InvalidRequest { .. }
                | Self::ChildNotFound { .. }
        )
    }

    /// True when this error names a missing child.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ChildNotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_errors() {
        assert!(SupervisorError::ReservedName {
            name: "$x".into()
        }
        .is_request_error());
        assert!(SupervisorError::ChildNotFound { name: "x".into() }.is_not_found());

        let spawn_failed = SupervisorError::SpawnFailed {
            name: "x".into(),
            source: RouterError::NameInUse { name: "x".into() },
        };
        assert!(!spawn_failed.is_request_error());
    }
}
