// Layer 1: Standard library imports
use std::fmt::{self, Display};

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
use super::payload::Payload;

/// Wire-level error taxonomy carried in `payload.error_code` of `error`
/// envelopes.
///
/// Process-level error enums (`RouterError`, `MailboxError`, ...) convert
/// into one of these codes before crossing an actor or node boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Target unknown on the owning node and absent from the registry.
    NoSuchActor,
    /// Destination mailbox cannot accept; non-fatal, caller may retry.
    MailboxFull,
    /// No path to the declared owner node.
    NetworkUnreachable,
    /// TTL exhausted or the local node observed itself in the trace.
    RoutingLoop,
    /// Correlator deadline elapsed before a reply arrived.
    Timeout,
    /// The target behavior raised while processing.
    HandlerError,
    /// Child creation or lifecycle failure.
    SupervisorError,
    /// Federation handshake rejected.
    AuthFailed,
}

impl ErrorCode {
    /// Wire name of the code (snake_case, as serialized).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoSuchActor => "no_such_actor",
            Self::MailboxFull => "mailbox_full",
            Self::NetworkUnreachable => "network_unreachable",
            Self::RoutingLoop => "routing_loop",
            Self::Timeout => "timeout",
            Self::HandlerError => "handler_error",
            Self::SupervisorError => "supervisor_error",
            Self::AuthFailed => "auth_failed",
        }
    }

    /// Build the standard error payload `{error_code, message}`.
    pub fn payload(&self, message: impl Into<String>) -> Payload {
        let mut payload = Payload::new();
        payload.insert(
            "error_code".to_owned(),
            serde_json::Value::String(self.as_str().to_owned()),
        );
        payload.insert(
            "message".to_owned(),
            serde_json::Value::String(message.into()),
        );
        payload
    }

    /// Read the code back out of an error payload.
    pub fn from_payload(payload: &Payload) -> Option<Self> {
        let code = payload.get("error_code")?.as_str()?;
        serde_json::from_value(serde_json::Value::String(code.to_owned())).ok()
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_round_trip() {
        let payload = ErrorCode::MailboxFull.payload("capacity 128 exceeded");

        assert_eq!(
            payload.get("error_code").unwrap().as_str(),
            Some("mailbox_full")
        );
        assert_eq!(
            payload.get("message").unwrap().as_str(),
            Some("capacity 128 exceeded")
        );
        assert_eq!(
            ErrorCode::from_payload(&payload),
            Some(ErrorCode::MailboxFull)
        );
    }

    #[test]
    fn test_from_payload_missing_code() {
        assert_eq!(ErrorCode::from_payload(&Payload::new()), None);
    }

    #[test]
    fn test_wire_form() {
        let json = serde_json::to_string(&ErrorCode::RoutingLoop).unwrap();
        assert_eq!(json, "\"routing_loop\"");
    }
}
