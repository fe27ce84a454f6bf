//! Shared helpers for multi-node integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use weft_node::{start_node_with_hosts, EvalHostFactory, NodeConfig, NodeHandle};
use weft_rt::message::payload;
use weft_rt::{EvalHost, NodeId, NodeRole, Payload, ScratchHost};

pub const TEST_TOKEN: &str = "test-token";

/// Install the test log subscriber once; `RUST_LOG` controls verbosity.
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

/// Worker factory: every `language_worker` gets a [`ScratchHost`] whose
/// echo prefix comes from the child's init payload.
pub fn scratch_hosts() -> EvalHostFactory {
    Arc::new(|init: &Payload| {
        let prefix = payload::str_field(init, "echo_prefix").unwrap_or("").to_owned();
        Box::new(ScratchHost::new(prefix)) as Box<dyn EvalHost>
    })
}

/// Start a main relay on an ephemeral port, with fast gossip for tests.
pub async fn start_hub(node_id: &str, peers: Vec<String>) -> NodeHandle {
    init_tracing();
    let mut builder = NodeConfig::builder(NodeId::new(node_id), NodeRole::Main)
        .with_listen_addr("127.0.0.1:0".parse().unwrap())
        .with_auth_token(TEST_TOKEN)
        .with_gossip_interval(Duration::from_millis(100));
    for peer in peers {
        builder = builder.with_peer_url(peer);
    }
    start_node_with_hosts(builder.build().unwrap(), Some(scratch_hosts()))
        .await
        .unwrap()
}

/// Start a home relay whose upstream is the given hub.
pub async fn start_home(node_id: &str, hub: &NodeHandle) -> NodeHandle {
    let config = NodeConfig::builder(NodeId::new(node_id), NodeRole::Home)
        .with_listen_addr("127.0.0.1:0".parse().unwrap())
        .with_auth_token(TEST_TOKEN)
        .with_upstream_url(format!("ws://{}", hub.local_addr()))
        .build()
        .unwrap();
    start_node_with_hosts(config, Some(scratch_hosts()))
        .await
        .unwrap()
}

/// Issue one JSON-RPC call against a node's HTTP gateway.
pub async fn rpc(node: &NodeHandle, method: &str, params: Value) -> Value {
    let url = format!("http://{}/jsonrpc", node.local_addr());
    let body = json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
        "id": 1,
    });
    reqwest::Client::new()
        .post(&url)
        .json(&body)
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap()
}

/// Poll a condition until it holds or the deadline passes.
pub async fn wait_for(what: &str, deadline: Duration, mut condition: impl FnMut() -> bool) {
    let start = Instant::now();
    while !condition() {
        if start.elapsed() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

/// Wait until a home relay's upstream link is established.
pub async fn wait_for_upstream(home: &NodeHandle) {
    let start = Instant::now();
    loop {
        let connected = home
            .gateway()
            .snapshot()
            .await
            .map(|snapshot| snapshot.upstream.is_some())
            .unwrap_or(false);
        if connected {
            return;
        }
        if start.elapsed() > Duration::from_secs(5) {
            panic!("timed out waiting for upstream link on {}", home.node_id());
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}
