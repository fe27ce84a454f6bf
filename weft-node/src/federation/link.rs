// Layer 1: Standard library imports
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use axum::extract::ws::{CloseFrame, Message as ServerMessage, WebSocket};
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as ClientMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// Layer 3: Internal module imports
use super::backoff::ReconnectBackoff;
use super::error::FederationError;
use super::queue::{OutboundQueue, PushOutcome};
use super::wire::{self, AuthFrame, CLOSE_UNAUTHORIZED};
use weft_rt::{Envelope, NodeId, NodeRole};

/// Bound on waiting for the peer's auth frame.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Process-wide link id counter; distinguishes a reconnected link from
/// the one it replaced.
static NEXT_LINK_ID: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(1);

type ClientStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Which side opened this link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkDirection {
    /// Accepted on `/federate`.
    Inbound,
    /// Dialed toward a configured peer or upstream.
    Outbound,
}

/// Events the link tasks report to the federation gateway.
#[derive(Debug)]
pub enum LinkEvent {
    /// Handshake completed; the link is ready for traffic.
    Up(LinkHandle),
    /// A decoded envelope arrived from the peer.
    Inbound { node: NodeId, envelope: Envelope },
    /// The link died; the gateway fails in-flight calls toward it. The
    /// `link_id` lets the gateway ignore stale reports about a link that
    /// was already replaced by a reconnect.
    Down {
        node: NodeId,
        link_id: u64,
        reason: String,
    },
}

pub(crate) type EventSender = mpsc::UnboundedSender<LinkEvent>;

/// Shared handle to one live federation link.
///
/// The gateway enqueues outbound envelopes here; the link's writer task
/// drains the queue onto the socket.
#[derive(Debug, Clone)]
pub struct LinkHandle {
    link_id: u64,
    node_id: NodeId,
    remote_role: NodeRole,
    direction: LinkDirection,
    queue: Arc<OutboundQueue>,
    cancel: CancellationToken,
    established_at: DateTime<Utc>,
}

impl LinkHandle {
    pub(crate) fn new(
        node_id: NodeId,
        remote_role: NodeRole,
        direction: LinkDirection,
        queue_capacity: usize,
    ) -> Self {
        Self {
            link_id: NEXT_LINK_ID.fetch_add(1, std::sync::atomic::Ordering::Relaxed),
            node_id,
            remote_role,
            direction,
            queue: Arc::new(OutboundQueue::new(queue_capacity)),
            cancel: CancellationToken::new(),
            established_at: Utc::now(),
        }
    }

    /// Unique id of this link instance.
    pub fn link_id(&self) -> u64 {
        self.link_id
    }

    /// The remote node's id.
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// The remote node's role.
    pub fn remote_role(&self) -> NodeRole {
        self.remote_role
    }

    /// Which side opened the link.
    pub fn direction(&self) -> LinkDirection {
        self.direction
    }

    /// When the handshake completed.
    pub fn established_at(&self) -> DateTime<Utc> {
        self.established_at
    }

    /// Queue an envelope for the writer task.
    pub fn enqueue(&self, envelope: Envelope) -> PushOutcome {
        self.queue.push(envelope)
    }

    /// Close the link, stopping both pump tasks. Idempotent.
    pub fn close(&self) {
        self.cancel.cancel();
        self.queue.close();
    }

    /// True once closed.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Envelopes waiting for the writer.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Envelopes dropped under backpressure.
    pub fn queue_dropped(&self) -> u64 {
        self.queue.dropped()
    }

    pub(crate) fn queue(&self) -> &Arc<OutboundQueue> {
        &self.queue
    }

    pub(crate) async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }
}

/// Parameters for accepting inbound `/federate` upgrades.
#[derive(Debug, Clone)]
pub(crate) struct AcceptParams {
    pub local_node: NodeId,
    pub local_role: NodeRole,
    pub auth_token: String,
    pub queue_capacity: usize,
}

/// Drive an accepted `/federate` socket: handshake, then pump frames
/// until the link dies.
pub(crate) async fn accept_link(mut socket: WebSocket, params: AcceptParams, events: EventSender) {
    let first = match timeout(HANDSHAKE_TIMEOUT, recv_server_text(&mut socket)).await {
        Ok(Some(text)) => text,
        Ok(None) => {
            debug!("federate socket closed before auth");
            return;
        }
        Err(_) => {
            debug!("federate handshake timed out");
            return;
        }
    };
    let frame = match AuthFrame::decode(&first) {
        Ok(frame) => frame,
        Err(err) => {
            reject(socket, &err.to_string()).await;
            return;
        }
    };
    if frame.token != params.auth_token {
        reject(socket, "token mismatch").await;
        return;
    }
    if frame.node_id == params.local_node {
        reject(socket, "node id collides with the local node").await;
        return;
    }

    // Reply with our identity: hubs verify the token mutually, spokes
    // only read the node id.
    let ours = AuthFrame::new(
        params.local_node.clone(),
        params.local_role,
        params.auth_token.clone(),
    );
    let ours = match ours.encode() {
        Ok(text) => text,
        Err(err) => {
            warn!(error = %err, "failed to encode auth frame");
            return;
        }
    };
    if socket.send(ServerMessage::Text(ours.into())).await.is_err() {
        return;
    }

    let handle = LinkHandle::new(
        frame.node_id.clone(),
        frame.node_type,
        LinkDirection::Inbound,
        params.queue_capacity,
    );
    info!(peer = %frame.node_id, role = ?frame.node_type, "federation link accepted");
    if events.send(LinkEvent::Up(handle.clone())).is_err() {
        return;
    }
    run_server_link(socket, handle, events).await;
}

async fn reject(mut socket: WebSocket, reason: &str) {
    warn!(reason, "federation handshake rejected");
    let _ = socket
        .send(ServerMessage::Close(Some(CloseFrame {
            code: CLOSE_UNAUTHORIZED,
            reason: "unauthorized".into(),
        })))
        .await;
}

async fn recv_server_text(socket: &mut WebSocket) -> Option<String> {
    while let Some(result) = socket.recv().await {
        match result {
            Ok(ServerMessage::Text(text)) => return Some(text.to_string()),
            Ok(ServerMessage::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
    None
}

async fn run_server_link(socket: WebSocket, handle: LinkHandle, events: EventSender) {
    let node = handle.node_id().clone();
    let (mut sink, mut stream) = socket.split();

    let writer_handle = handle.clone();
    let writer = tokio::spawn(async move {
        while let Some(envelope) = writer_handle.queue().pop().await {
            let text = match wire::encode_envelope(&envelope) {
                Ok(text) => text,
                Err(err) => {
                    warn!(error = %err, "dropping unencodable envelope");
                    continue;
                }
            };
            if sink.send(ServerMessage::Text(text.into())).await.is_err() {
                break;
            }
        }
        writer_handle.close();
    });

    loop {
        tokio::select! {
            _ = handle.cancelled() => break,
            frame = stream.next() => match frame {
                Some(Ok(ServerMessage::Text(text))) => {
                    dispatch_frame(&node, text.as_str(), &events);
                }
                Some(Ok(ServerMessage::Close(_))) | None => break,
                Some(Ok(_)) => continue,
                Some(Err(err)) => {
                    debug!(peer = %node, error = %err, "federation socket error");
                    break;
                }
            }
        }
    }

    handle.close();
    let _ = events.send(LinkEvent::Down {
        node,
        link_id: handle.link_id(),
        reason: "link closed".to_owned(),
    });
    writer.abort();
}

fn dispatch_frame(node: &NodeId, text: &str, events: &EventSender) {
    match wire::decode_envelope(text) {
        Ok(envelope) => {
            let _ = events.send(LinkEvent::Inbound {
                node: node.clone(),
                envelope,
            });
        }
        Err(err) => {
            debug!(peer = %node, error = %err, "dropping undecodable frame");
        }
    }
}

/// Parameters for one outbound dial target.
#[derive(Debug, Clone)]
pub(crate) struct DialerParams {
    pub url: String,
    pub token: String,
    pub local_node: NodeId,
    pub local_role: NodeRole,
    pub queue_capacity: usize,
    /// Hubs verify the remote token; spokes authenticate one-sided.
    pub mutual: bool,
}

/// Spawn the persistent dial loop for one upstream or peer target.
///
/// Reconnects with exponential full-jitter backoff until `cancel` fires.
pub(crate) fn spawn_dialer(
    params: DialerParams,
    events: EventSender,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut backoff = ReconnectBackoff::default();
        loop {
            if cancel.is_cancelled() {
                break;
            }
            match dial_once(&params, &events, &cancel).await {
                Ok(()) => backoff.reset(),
                Err(err) => {
                    debug!(url = %params.url, error = %err, "federation dial failed");
                }
            }
            let delay = backoff.next_delay();
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    })
}

async fn dial_once(
    params: &DialerParams,
    events: &EventSender,
    cancel: &CancellationToken,
) -> Result<(), FederationError> {
    let (mut ws, _response) =
        connect_async(params.url.as_str())
            .await
            .map_err(|err| FederationError::Transport {
                reason: err.to_string(),
            })?;

    let ours = AuthFrame::new(
        params.local_node.clone(),
        params.local_role,
        params.token.clone(),
    );
    ws.send(ClientMessage::Text(ours.encode()?.into()))
        .await
        .map_err(|err| FederationError::Transport {
            reason: err.to_string(),
        })?;

    let reply = timeout(HANDSHAKE_TIMEOUT, recv_client_text(&mut ws))
        .await
        .map_err(|_| FederationError::Handshake {
            reason: "timed out waiting for auth reply".to_owned(),
        })?
        .ok_or(FederationError::Unauthorized {
            reason: "closed during handshake".to_owned(),
        })?;
    let theirs = AuthFrame::decode(&reply)?;
    if params.mutual && theirs.token != params.token {
        return Err(FederationError::Unauthorized {
            reason: "peer token mismatch".to_owned(),
        });
    }

    let handle = LinkHandle::new(
        theirs.node_id.clone(),
        theirs.node_type,
        LinkDirection::Outbound,
        params.queue_capacity,
    );
    info!(peer = %theirs.node_id, url = %params.url, "federation link established");
    if events.send(LinkEvent::Up(handle.clone())).is_err() {
        return Ok(());
    }
    run_client_link(ws, handle, events, cancel).await;
    Ok(())
}

async fn recv_client_text(ws: &mut ClientStream) -> Option<String> {
    while let Some(result) = ws.next().await {
        match result {
            Ok(ClientMessage::Text(text)) => return Some(text.to_string()),
            Ok(ClientMessage::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
    None
}

async fn run_client_link(
    ws: ClientStream,
    handle: LinkHandle,
    events: &EventSender,
    cancel: &CancellationToken,
) {
    let node = handle.node_id().clone();
    let (mut sink, mut stream) = ws.split();

    let writer_handle = handle.clone();
    let writer = tokio::spawn(async move {
        while let Some(envelope) = writer_handle.queue().pop().await {
            let text = match wire::encode_envelope(&envelope) {
                Ok(text) => text,
                Err(err) => {
                    warn!(error = %err, "dropping unencodable envelope");
                    continue;
                }
            };
            if sink.send(ClientMessage::Text(text.into())).await.is_err() {
                break;
            }
        }
        writer_handle.close();
    });

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = handle.cancelled() => break,
            frame = stream.next() => match frame {
                Some(Ok(ClientMessage::Text(text))) => {
                    dispatch_frame(&node, text.as_str(), events);
                }
                Some(Ok(ClientMessage::Close(_))) | None => break,
                Some(Ok(_)) => continue,
                Some(Err(err)) => {
                    debug!(peer = %node, error = %err, "federation socket error");
                    break;
                }
            }
        }
    }

    handle.close();
    let _ = events.send(LinkEvent::Down {
        node,
        link_id: handle.link_id(),
        reason: "link closed".to_owned(),
    });
    writer.abort();
}
