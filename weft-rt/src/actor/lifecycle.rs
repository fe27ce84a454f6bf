// Layer 1: Standard library imports
use std::fmt::{self, Display};

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
// (none)

/// Lifecycle of one actor.
///
/// `Starting → Running → Stopping → Stopped`, with `Failed` as a sink
/// reached from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Mailbox registered, loop not yet draining.
    Starting,
    /// Draining the mailbox.
    Running,
    /// Shutdown observed; draining best-effort before exit.
    Stopping,
    /// Loop exited cleanly.
    Stopped,
    /// Loop exited after a non-transient handler error.
    Failed,
}

impl LifecycleState {
    /// True for `Stopped` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }
}

impl Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(LifecycleState::Stopped.is_terminal());
        assert!(LifecycleState::Failed.is_terminal());
        assert!(!LifecycleState::Running.is_terminal());
        assert!(!LifecycleState::Stopping.is_terminal());
    }

    #[test]
    fn test_display() {
        assert_eq!(LifecycleState::Starting.to_string(), "starting");
        assert_eq!(LifecycleState::Failed.to_string(), "failed");
    }
}
