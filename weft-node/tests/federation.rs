//! Multi-node federation tests over loopback sockets: spoke-to-spoke
//! calls through one hub, hub peering with gossip, handshake rejection,
//! and registry TTL eviction.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use weft_node::federation::AuthFrame;
use weft_node::{start_node_with_hosts, NodeConfig};
use weft_rt::message::payload;
use weft_rt::{BehaviorKind, NodeId, NodeRole};

use common::{rpc, scratch_hosts, start_home, start_hub, wait_for, wait_for_upstream, TEST_TOKEN};

#[tokio::test]
async fn test_home_hub_home_call() {
    let hub = start_hub("A", Vec::new()).await;
    let h1 = start_home("H1", &hub).await;
    let h2 = start_home("H2", &hub).await;
    wait_for_upstream(&h1).await;
    wait_for_upstream(&h2).await;

    let name = h1
        .create_child(
            BehaviorKind::LanguageWorker,
            "echo_a",
            true,
            payload::pairs([("echo_prefix", json!("A:"))]),
        )
        .await
        .unwrap();
    assert_eq!(name, "echo_a");

    let registry = hub.registry().unwrap().clone();
    wait_for("echo_a in hub registry", Duration::from_secs(5), || {
        registry.lookup("echo_a") == Some(NodeId::new("H1"))
    })
    .await;

    let response = rpc(&h2, "echo_a@H1.echo", json!(["hi"])).await;
    assert_eq!(response["result"], json!("A:hi"));

    h2.stop().await;
    h1.stop().await;
    hub.stop().await;
}

#[tokio::test]
async fn test_hub_peering_gossip_and_call() {
    let hub_a = start_hub("A", Vec::new()).await;
    let hub_b = start_hub("B", vec![format!("ws://{}", hub_a.local_addr())]).await;
    let h1 = start_home("H1", &hub_a).await;
    let h2 = start_home("H2", &hub_b).await;
    wait_for_upstream(&h1).await;
    wait_for_upstream(&h2).await;

    h1.create_child(
        BehaviorKind::LanguageWorker,
        "echo_a",
        true,
        payload::pairs([("echo_prefix", json!("A:"))]),
    )
    .await
    .unwrap();

    // The record must reach B within one gossip interval plus one RTT.
    let registry_b = hub_b.registry().unwrap().clone();
    wait_for("echo_a gossiped to B", Duration::from_secs(5), || {
        registry_b.lookup("echo_a") == Some(NodeId::new("H1"))
    })
    .await;

    let response = rpc(&h2, "echo_a@H1.echo", json!(["yo"])).await;
    assert_eq!(response["result"], json!("A:yo"));

    h2.stop().await;
    h1.stop().await;
    hub_b.stop().await;
    hub_a.stop().await;
}

#[tokio::test]
async fn test_unqualified_lookup_resolves_via_registry() {
    let hub = start_hub("A", Vec::new()).await;
    let h1 = start_home("H1", &hub).await;
    wait_for_upstream(&h1).await;

    h1.create_child(
        BehaviorKind::LanguageWorker,
        "echo_a",
        true,
        payload::pairs([("echo_prefix", json!("A:"))]),
    )
    .await
    .unwrap();
    let registry = hub.registry().unwrap().clone();
    wait_for("echo_a registered", Duration::from_secs(5), || {
        registry.lookup("echo_a").is_some()
    })
    .await;

    // Unqualified method on the hub: the registry supplies the owner.
    let response = rpc(&hub, "echo_a.echo", json!(["hey"])).await;
    assert_eq!(response["result"], json!("A:hey"));

    h1.stop().await;
    hub.stop().await;
}

#[tokio::test]
async fn test_unknown_service_fails_with_no_such_actor() {
    let hub = start_hub("A", Vec::new()).await;
    let h1 = start_home("H1", &hub).await;
    wait_for_upstream(&h1).await;

    // The home relay cannot judge the name; the hub fails it definitively
    // and the error envelope crosses back down the spoke.
    let response = rpc(&h1, "ghost.echo", json!(["x"])).await;
    assert_eq!(response["error"]["code"], json!(-32601));
    assert_eq!(response["error"]["data"]["error_code"], json!("no_such_actor"));

    h1.stop().await;
    hub.stop().await;
}

#[tokio::test]
async fn test_bad_token_closes_with_4001() {
    let hub = start_hub("A", Vec::new()).await;

    let url = format!("ws://{}/federate", hub.local_addr());
    let (mut ws, _) = connect_async(url.as_str()).await.unwrap();
    let auth = AuthFrame::new(NodeId::new("intruder"), NodeRole::Home, "wrong-token");
    ws.send(Message::Text(auth.encode().unwrap().into()))
        .await
        .unwrap();

    let mut close_code = None;
    while let Some(frame) = ws.next().await {
        match frame {
            Ok(Message::Close(Some(frame))) => {
                close_code = Some(u16::from(frame.code));
                break;
            }
            Ok(Message::Close(None)) => break,
            Ok(_) => continue,
            Err(_) => break,
        }
    }
    assert_eq!(close_code, Some(4001));

    hub.stop().await;
}

#[tokio::test]
async fn test_registry_ttl_eviction() {
    let hub_config = NodeConfig::builder(NodeId::new("A"), NodeRole::Main)
        .with_listen_addr("127.0.0.1:0".parse().unwrap())
        .with_auth_token(TEST_TOKEN)
        .with_registry_ttl(Duration::from_millis(500))
        .with_registry_eviction_interval(Duration::from_millis(100))
        // Keep the refresh far away so the entry actually expires.
        .with_registration_refresh_interval(Duration::from_secs(3600))
        .build()
        .unwrap();
    let hub = start_node_with_hosts(hub_config, Some(scratch_hosts()))
        .await
        .unwrap();

    let home_config = NodeConfig::builder(NodeId::new("H1"), NodeRole::Home)
        .with_listen_addr("127.0.0.1:0".parse().unwrap())
        .with_auth_token(TEST_TOKEN)
        .with_upstream_url(format!("ws://{}", hub.local_addr()))
        .with_registration_refresh_interval(Duration::from_secs(3600))
        .build()
        .unwrap();
    let h1 = start_node_with_hosts(home_config, Some(scratch_hosts()))
        .await
        .unwrap();
    wait_for_upstream(&h1).await;

    h1.create_child(
        BehaviorKind::LanguageWorker,
        "ephemeral",
        true,
        weft_rt::Payload::new(),
    )
    .await
    .unwrap();

    let registry = hub.registry().unwrap().clone();
    wait_for("ephemeral registered", Duration::from_secs(5), || {
        registry.lookup("ephemeral").is_some()
    })
    .await;

    // Without refresh the entry must disappear after its ttl.
    wait_for("ephemeral evicted", Duration::from_secs(5), || {
        registry.lookup("ephemeral").is_none()
    })
    .await;

    h1.stop().await;
    hub.stop().await;
}
