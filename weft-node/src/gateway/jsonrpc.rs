// Layer 1: Standard library imports
use std::time::Duration;

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

// Layer 3: Internal module imports
use weft_rt::prelude::*;
use weft_rt::Correlator;

/// JSON-RPC protocol version tag.
pub const JSONRPC_VERSION: &str = "2.0";

/// Invalid JSON in the request body.
pub const PARSE_ERROR: i64 = -32700;
/// Structurally invalid request (bad method form).
pub const INVALID_REQUEST: i64 = -32600;
/// Unknown method: `no_such_actor`.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Actor-side failure (`handler_error` and codes without a dedicated
/// mapping; the wire code rides in `error.data`).
pub const ACTOR_ERROR: i64 = -32000;
/// Correlator deadline elapsed.
pub const TIMEOUT_ERROR: i64 = -32001;
/// TTL exhausted or a node saw itself in the trace.
pub const ROUTING_LOOP_ERROR: i64 = -32002;
/// Destination mailbox full.
pub const MAILBOX_FULL_ERROR: i64 = -32003;

/// One incoming JSON-RPC call.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub id: Value,
}

/// One outgoing JSON-RPC response.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Value,
}

impl JsonRpcResponse {
    /// Successful response.
    pub fn ok(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            result: Some(result),
            error: None,
            id,
        }
    }

    /// Error response.
    pub fn err(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            result: None,
            error: Some(error),
            id,
        }
    }
}

/// JSON-RPC error object.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    /// Error with no data payload.
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Error translated from a wire-level code, preserving the code name
    /// in `data.error_code`.
    pub fn from_error_code(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: map_error_code(code),
            message: message.into(),
            data: Some(json!({ "error_code": code.as_str() })),
        }
    }
}

/// Map a wire-level error code onto its JSON-RPC code.
pub fn map_error_code(code: ErrorCode) -> i64 {
    match code {
        ErrorCode::NoSuchActor => METHOD_NOT_FOUND,
        ErrorCode::Timeout => TIMEOUT_ERROR,
        ErrorCode::RoutingLoop => ROUTING_LOOP_ERROR,
        ErrorCode::MailboxFull => MAILBOX_FULL_ERROR,
        _ => ACTOR_ERROR,
    }
}

/// Parsed `<actor>.<operation>` / `<actor>@<node>.<operation>` method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodTarget {
    pub target: ActorAddress,
    pub operation: String,
}

/// Split a dotted method path into target address and operation.
///
/// The split is at the last dot, so node ids may contain dots while
/// operations may not.
pub fn parse_method(method: &str) -> Result<MethodTarget, JsonRpcError> {
    let (actor, operation) = method.rsplit_once('.').ok_or_else(|| {
        JsonRpcError::new(
            INVALID_REQUEST,
            "method must be <actor>.<operation> or <actor>@<node>.<operation>",
        )
    })?;
    if operation.is_empty() {
        return Err(JsonRpcError::new(INVALID_REQUEST, "empty operation"));
    }
    let target = ActorAddress::parse(actor)
        .map_err(|err| JsonRpcError::new(INVALID_REQUEST, err.to_string()))?;
    Ok(MethodTarget {
        target,
        operation: operation.to_owned(),
    })
}

/// Pick the call deadline: federated targets get the longer budget.
pub fn call_timeout(
    target: &ActorAddress,
    local_node: &NodeId,
    local: Duration,
    federated: Duration,
) -> Duration {
    if target.is_local_to(local_node) {
        local
    } else {
        federated
    }
}

/// Translate one JSON-RPC request into a correlated call and back.
///
/// Gateways never touch the router directly; reply matching stays
/// centralized in the correlator.
pub async fn dispatch(
    correlator: &Correlator,
    origin: ActorAddress,
    request: JsonRpcRequest,
    local_node: &NodeId,
    local_timeout: Duration,
    federated_timeout: Duration,
) -> JsonRpcResponse {
    let id = request.id.clone();
    let method = match parse_method(&request.method) {
        Ok(method) => method,
        Err(error) => return JsonRpcResponse::err(id, error),
    };
    let timeout = call_timeout(&method.target, local_node, local_timeout, federated_timeout);
    let payload = payload::pairs([
        ("operation", json!(method.operation)),
        ("params", request.params),
    ]);

    match correlator
        .call_kind(origin, method.target, EnvelopeKind::Call, payload, timeout)
        .await
    {
        Ok(reply) => {
            let value = reply.payload.get("value").cloned().unwrap_or(Value::Null);
            JsonRpcResponse::ok(id, value)
        }
        Err(err) => JsonRpcResponse::err(
            id,
            JsonRpcError::from_error_code(err.error_code(), err.message()),
        ),
    }
}
