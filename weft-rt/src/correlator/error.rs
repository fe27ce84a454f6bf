// Layer 1: Standard library imports
use std::time::Duration;

// Layer 2: Third-party crate imports
use thiserror::Error;

// Layer 3: Internal module imports
use crate::message::ErrorCode;

/// Errors surfaced by [`Correlator::call`](super::Correlator::call).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorrelatorError {
    /// The call completed with an `error` envelope.
    #[error("call failed ({code}): {message}")]
    Remote { code: ErrorCode, message: String },

    /// The deadline elapsed before any reply arrived. The remote work is
    /// not cancelled; a late reply is discarded.
    #[error("call timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// The correlator stopped while the call was pending.
    #[error("correlator stopped")]
    Stopped,
}

impl CorrelatorError {
    /// Wire-level code for this failure.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Remote { code, .. } => *code,
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::Stopped => ErrorCode::HandlerError,
        }
    }

    /// Human-readable failure description.
    pub fn message(&self) -> String {
        match self {
            Self::Remote { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            CorrelatorError::Remote {
                code: ErrorCode::MailboxFull,
                message: "full".into()
            }
            .error_code(),
            ErrorCode::MailboxFull
        );
        assert_eq!(
            CorrelatorError::Timeout {
                timeout: Duration::from_millis(50)
            }
            .error_code(),
            ErrorCode::Timeout
        );
        assert_eq!(CorrelatorError::Stopped.error_code(), ErrorCode::HandlerError);
    }
}
