//! External gateway adapters: HTTP/JSON-RPC and client WebSocket.
//!
//! Thin translations over the correlator. Neither adapter calls the
//! router directly, which keeps reply matching centralized.

pub mod jsonrpc;

pub(crate) mod http;
pub(crate) mod ws;

pub use jsonrpc::{
    map_error_code, parse_method, JsonRpcError, JsonRpcRequest, JsonRpcResponse, MethodTarget,
    JSONRPC_VERSION,
};
