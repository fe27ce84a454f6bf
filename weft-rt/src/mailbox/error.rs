// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use thiserror::Error;

// Layer 3: Internal module imports
use crate::message::ErrorCode;

/// Errors raised by mailbox operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MailboxError {
    /// The mailbox is at capacity; the caller may retry.
    #[error("mailbox full (capacity {capacity})")]
    Full { capacity: usize },

    /// The mailbox has been closed; no further sends are accepted.
    #[error("mailbox closed")]
    Closed,
}

impl MailboxError {
    /// True when a retry may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Full { .. })
    }

    /// Wire-level code for this failure.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Full { .. } => ErrorCode::MailboxFull,
            Self::Closed => ErrorCode::NoSuchActor,
        }
    }
}
