// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
use super::error_code::ErrorCode;
use super::kind::EnvelopeKind;
use super::payload::Payload;
use crate::util::{ActorAddress, CorrelationId, EnvelopeId, NodeId};

/// Default hop budget for envelopes crossing federation links.
pub const DEFAULT_TTL: u8 = 8;

fn default_ttl() -> u8 {
    DEFAULT_TTL
}

/// The single message type moving through the system.
///
/// Envelopes are canonical JSON on the wire; unknown fields are ignored on
/// read for forward compatibility, and optional fields default when absent.
///
/// # Example
/// ```rust
/// use serde_json::json;
/// use weft_rt::message::{payload, Envelope, EnvelopeKind};
/// use weft_rt::util::ActorAddress;
///
/// let env = Envelope::new(
///     EnvelopeKind::Call,
///     ActorAddress::local("$http"),
///     ActorAddress::local("counter"),
/// )
/// .with_payload(payload::pairs([("operation", json!("increment"))]))
/// .with_reply_to(ActorAddress::local("$correlator"));
///
/// assert_eq!(env.kind, EnvelopeKind::Call);
/// assert_eq!(env.ttl, weft_rt::message::DEFAULT_TTL);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique per sender; globally unique combined with the sender node.
    pub id: EnvelopeId,

    /// Threads a reply to its originating call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,

    /// Originating actor address.
    pub from: ActorAddress,

    /// Target actor address; never empty.
    pub to: ActorAddress,

    /// Closed kind tag; payload shape is validated per kind.
    pub kind: EnvelopeKind,

    /// Opaque structured payload.
    #[serde(default)]
    pub payload: Payload,

    /// Address that must receive exactly one `reply` or `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<ActorAddress>,

    /// Remaining federation hops; dropped with `routing_loop` at zero.
    #[serde(default = "default_ttl")]
    pub ttl: u8,

    /// Nodes this envelope has visited, appended per forward.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trace: Vec<NodeId>,
}

impl Envelope {
    /// Create an envelope with a fresh id and default ttl.
    pub fn new(kind: EnvelopeKind, from: ActorAddress, to: ActorAddress) -> Self {
        Self {
            id: EnvelopeId::next(),
            correlation_id: None,
            from,
            to,
            kind,
            payload: Payload::new(),
            reply_to: None,
            ttl: DEFAULT_TTL,
            trace: Vec::new(),
        }
    }

    /// Builder method: set the payload.
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    /// Builder method: set the reply address.
    pub fn with_reply_to(mut self, reply_to: ActorAddress) -> Self {
        self.reply_to = Some(reply_to);
        self
    }

    /// Builder method: set the correlation id.
    pub fn with_correlation_id(mut self, id: CorrelationId) -> Self {
        self.correlation_id = Some(id);
        self
    }

    /// Builder method: set the hop budget.
    pub fn with_ttl(mut self, ttl: u8) -> Self {
        self.ttl = ttl;
        self
    }

    /// Build the `reply` envelope for a request, or `None` when the request
    /// did not ask for one.
    ///
    /// The reply inherits the request's correlation id and targets its
    /// `reply_to` address.
    pub fn reply_for(request: &Envelope, from: ActorAddress, payload: Payload) -> Option<Self> {
        let reply_to = request.reply_to.clone()?;
        let mut reply = Self::new(EnvelopeKind::Reply, from, reply_to).with_payload(payload);
        reply.correlation_id = request.correlation_id;
        Some(reply)
    }

    /// Build the `error` envelope for a request, or `None` when the request
    /// did not ask for a reply.
    pub fn error_for(
        request: &Envelope,
        from: ActorAddress,
        code: ErrorCode,
        message: impl Into<String>,
    ) -> Option<Self> {
        let reply_to = request.reply_to.clone()?;
        Some(Self::error(
            from,
            reply_to,
            request.correlation_id,
            code,
            message,
        ))
    }

    /// Build a free-standing `error` envelope.
    pub fn error(
        from: ActorAddress,
        to: ActorAddress,
        correlation_id: Option<CorrelationId>,
        code: ErrorCode,
        message: impl Into<String>,
    ) -> Self {
        let mut envelope =
            Self::new(EnvelopeKind::Error, from, to).with_payload(code.payload(message));
        envelope.correlation_id = correlation_id;
        envelope
    }

    /// The error code carried by an `error` envelope, if well-formed.
    pub fn error_code(&self) -> Option<ErrorCode> {
        if self.kind != EnvelopeKind::Error {
            return None;
        }
        ErrorCode::from_payload(&self.payload)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call_with_reply() -> Envelope {
        Envelope::new(
            EnvelopeKind::Call,
            ActorAddress::local("caller"),
            ActorAddress::local("target"),
        )
        .with_reply_to(ActorAddress::local("$correlator"))
        .with_correlation_id(CorrelationId::new())
    }

    #[test]
    fn test_new_envelope_defaults() {
        let env = Envelope::new(
            EnvelopeKind::Ping,
            ActorAddress::local("a"),
            ActorAddress::local("b"),
        );

        assert!(env.correlation_id.is_none());
        assert!(env.reply_to.is_none());
        assert!(env.payload.is_empty());
        assert!(env.trace.is_empty());
        assert_eq!(env.ttl, DEFAULT_TTL);
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Envelope::new(
            EnvelopeKind::Ping,
            ActorAddress::local("a"),
            ActorAddress::local("b"),
        );
        let b = Envelope::new(
            EnvelopeKind::Ping,
            ActorAddress::local("a"),
            ActorAddress::local("b"),
        );
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_reply_for_inherits_correlation() {
        let request = call_with_reply();
        let reply = Envelope::reply_for(
            &request,
            ActorAddress::local("target"),
            crate::message::payload::pairs([("value", json!(1))]),
        )
        .unwrap();

        assert_eq!(reply.kind, EnvelopeKind::Reply);
        assert_eq!(reply.correlation_id, request.correlation_id);
        assert_eq!(reply.to, ActorAddress::local("$correlator"));
    }

    #[test]
    fn test_reply_for_without_reply_to() {
        let request = Envelope::new(
            EnvelopeKind::Call,
            ActorAddress::local("a"),
            ActorAddress::local("b"),
        );
        assert!(Envelope::reply_for(&request, ActorAddress::local("b"), Payload::new()).is_none());
    }

    #[test]
    fn test_error_for_carries_code() {
        let request = call_with_reply();
        let error = Envelope::error_for(
            &request,
            ActorAddress::local("target"),
            ErrorCode::HandlerError,
            "boom",
        )
        .unwrap();

        assert_eq!(error.kind, EnvelopeKind::Error);
        assert_eq!(error.error_code(), Some(ErrorCode::HandlerError));
        assert_eq!(error.correlation_id, request.correlation_id);
    }

    #[test]
    fn test_error_code_on_non_error() {
        let env = call_with_reply();
        assert_eq!(env.error_code(), None);
    }

    #[test]
    fn test_serde_round_trip() {
        let env = call_with_reply()
            .with_payload(crate::message::payload::pairs([("operation", json!("x"))]));
        let json = serde_json::to_string(&env).unwrap();
        let back: Envelope = serde_json::from_str(&json).unwrap();

        assert_eq!(back.id, env.id);
        assert_eq!(back.kind, env.kind);
        assert_eq!(back.correlation_id, env.correlation_id);
        assert_eq!(back.to, env.to);
        assert_eq!(back.payload, env.payload);
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let json = r#"{
            "id": 7,
            "from": "a@n1",
            "to": "b",
            "kind": "call",
            "payload": {},
            "future_field": {"nested": true}
        }"#;

        let env: Envelope = serde_json::from_str(json).unwrap();
        assert_eq!(env.kind, EnvelopeKind::Call);
        assert_eq!(env.ttl, DEFAULT_TTL);
        assert!(env.trace.is_empty());
    }

    #[test]
    fn test_trace_serialized_when_present() {
        let mut env = call_with_reply();
        env.trace.push(NodeId::new("hub-a"));
        let json = serde_json::to_string(&env).unwrap();
        assert!(json.contains("\"trace\":[\"hub-a\"]"));
    }
}
