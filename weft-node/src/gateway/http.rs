// Layer 1: Standard library imports
use std::time::Duration;

// Layer 2: Third-party crate imports
use axum::extract::{State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

// Layer 3: Internal module imports
use super::jsonrpc::{self, JsonRpcError, JsonRpcRequest, JsonRpcResponse, PARSE_ERROR};
use super::ws;
use crate::federation::link;
use crate::federation::{GatewayHandle, ServiceRegistry};
use weft_rt::prelude::*;
use weft_rt::Correlator;

/// Shared state behind every HTTP route.
#[derive(Clone)]
pub(crate) struct AppState {
    pub router: Router,
    pub correlator: Correlator,
    pub registry: Option<ServiceRegistry>,
    pub gateway: GatewayHandle,
    pub local_timeout: Duration,
    pub federated_timeout: Duration,
}

/// Build the node's HTTP surface: JSON-RPC, client WS, federation WS,
/// and the control endpoints.
pub(crate) fn build_app(state: AppState) -> axum::Router {
    axum::Router::new()
        .route("/jsonrpc", post(jsonrpc_handler))
        .route("/ws", get(ws_handler))
        .route("/federate", get(federate_handler))
        .route("/federation/peers", get(peers_handler))
        .route("/federation/registry", get(registry_handler))
        .route("/federation/health", get(health_handler))
        .route("/federation/peers/add", post(add_peer_handler))
        .with_state(state)
}

async fn jsonrpc_handler(State(state): State<AppState>, body: String) -> Json<JsonRpcResponse> {
    let request: JsonRpcRequest = match serde_json::from_str(&body) {
        Ok(request) => request,
        Err(err) => {
            debug!(error = %err, "unparseable json-rpc body");
            return Json(JsonRpcResponse::err(
                Value::Null,
                JsonRpcError::new(PARSE_ERROR, err.to_string()),
            ));
        }
    };
    let response = jsonrpc::dispatch(
        &state.correlator,
        ActorAddress::local(names::HTTP_GATEWAY),
        request,
        state.router.node_id(),
        state.local_timeout,
        state.federated_timeout,
    )
    .await;
    Json(response)
}

async fn ws_handler(State(state): State<AppState>, upgrade: WebSocketUpgrade) -> Response {
    upgrade.on_upgrade(move |socket| ws::serve_socket(state, socket))
}

async fn federate_handler(State(state): State<AppState>, upgrade: WebSocketUpgrade) -> Response {
    let params = state.gateway.accept_params();
    let events = state.gateway.events();
    upgrade.on_upgrade(move |socket| link::accept_link(socket, params, events))
}

async fn peers_handler(State(state): State<AppState>) -> Json<Value> {
    match state.gateway.snapshot().await {
        Some(snapshot) => Json(serde_json::to_value(&snapshot).unwrap_or(Value::Null)),
        None => Json(json!({ "error": "gateway stopped" })),
    }
}

async fn registry_handler(State(state): State<AppState>) -> Json<Value> {
    match &state.registry {
        Some(registry) => {
            let snapshot = registry.snapshot();
            Json(json!({
                "entries": serde_json::to_value(&*snapshot).unwrap_or(Value::Null),
                "count": snapshot.len(),
            }))
        }
        None => Json(json!({
            "entries": {},
            "count": 0,
            "note": "home relays host no registry",
        })),
    }
}

async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let links = state.gateway.snapshot().await;
    Json(json!({
        "node_id": state.router.node_id(),
        "role": state.router.role(),
        "actors": state.router.local_count(),
        "pending_calls": state.correlator.pending_count(),
        "registry_size": state.registry.as_ref().map(|r| r.len()).unwrap_or(0),
        "federation": links.map(|s| serde_json::to_value(&s).unwrap_or(Value::Null)),
    }))
}

#[derive(Debug, Deserialize)]
struct AddPeerRequest {
    url: String,
    #[serde(default)]
    token: Option<String>,
}

async fn add_peer_handler(
    State(state): State<AppState>,
    Json(request): Json<AddPeerRequest>,
) -> impl IntoResponse {
    let token = request
        .token
        .unwrap_or_else(|| state.gateway.accept_params().auth_token.clone());
    state.gateway.add_peer(crate::node::federate_url(&request.url), token);
    (
        StatusCode::ACCEPTED,
        Json(json!({ "status": "connecting", "url": request.url })),
    )
}
