// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

// Layer 3: Internal module imports
use super::http::AppState;
use super::jsonrpc::{self, JsonRpcError, JsonRpcRequest, JsonRpcResponse, PARSE_ERROR};
use weft_rt::prelude::*;

/// Serve one client WebSocket connection.
///
/// Each text frame is an independent JSON-RPC object; requests run
/// concurrently and responses are correlated by the JSON-RPC `id`, so
/// multiple calls may be in flight per socket.
pub(crate) async fn serve_socket(state: AppState, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();

    let writer = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                let state = state.clone();
                let out = out_tx.clone();
                tokio::spawn(async move {
                    let response = handle_frame(&state, text.as_str()).await;
                    match serde_json::to_string(&response) {
                        Ok(text) => {
                            let _ = out.send(text);
                        }
                        Err(err) => debug!(error = %err, "unserializable ws response"),
                    }
                });
            }
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        }
    }

    drop(out_tx);
    let _ = writer.await;
}

async fn handle_frame(state: &AppState, text: &str) -> JsonRpcResponse {
    let request: JsonRpcRequest = match serde_json::from_str(text) {
        Ok(request) => request,
        Err(err) => {
            return JsonRpcResponse::err(
                Value::Null,
                JsonRpcError::new(PARSE_ERROR, err.to_string()),
            );
        }
    };
    jsonrpc::dispatch(
        &state.correlator,
        ActorAddress::local(names::WS_GATEWAY),
        request,
        state.router.node_id(),
        state.local_timeout,
        state.federated_timeout,
    )
    .await
}
