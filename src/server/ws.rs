//! WebSocket push channel.
//!
//! Clients connect to `/api/v1/ws` on the WebSocket port. Every connected
//! client gets a small bounded queue in the [`ClientRegistry`]; the
//! broadcaster composes one payload per tick and fans it out. With nobody
//! connected the broadcaster does not compose at all.

use super::payload::WsMessage;
use super::StateServer;
use axum::{
    extract::{
        ws::{close_code, rejection::WebSocketUpgradeRejection, CloseFrame, Message, Utf8Bytes, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub const BROADCAST_INTERVAL: Duration = Duration::from_millis(250);

/// Frames a slow client may lag behind before ticks are dropped for it.
const CLIENT_QUEUE: usize = 4;

pub type ClientId = u64;

#[derive(Debug, Default)]
pub struct ClientRegistry {
    next_id: AtomicU64,
    clients: Mutex<HashMap<ClientId, mpsc::Sender<Utf8Bytes>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn clients(&self) -> MutexGuard<'_, HashMap<ClientId, mpsc::Sender<Utf8Bytes>>> {
        match self.clients.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn register(&self) -> (ClientId, mpsc::Receiver<Utf8Bytes>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(CLIENT_QUEUE);
        self.clients().insert(id, tx);
        (id, rx)
    }

    pub fn remove(&self, id: ClientId) {
        self.clients().remove(&id);
    }

    pub fn len(&self) -> usize {
        self.clients().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients().is_empty()
    }

    /// Queue `text` for every client, dropping the ones that went away.
    /// Returns how many clients received the frame.
    pub fn broadcast(&self, text: &Utf8Bytes) -> usize {
        let mut delivered = 0;
        self.clients().retain(|id, tx| match tx.try_send(text.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                debug!(client = id, "Client lagging, frame dropped");
                true
            }
            Err(TrySendError::Closed(_)) => {
                debug!(client = id, "Client gone, removing");
                false
            }
        });
        delivered
    }
}

pub fn router(server: Arc<StateServer>) -> Router {
    Router::new()
        .route("/api/v1/ws", any(upgrade))
        .fallback(wrong_path)
        .with_state(server)
}

async fn upgrade(
    State(server): State<Arc<StateServer>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let header_token = headers.get(super::http::TOKEN_HEADER).and_then(|v| v.to_str().ok());
    let query_token = query.get("token").map(String::as_str);
    if !server.is_authorized(header_token) && !server.is_authorized(query_token) {
        warn!("Rejecting WebSocket client: missing or invalid token");
        return ws.on_upgrade(|socket| reject(socket, "Unauthorized"));
    }

    ws.on_upgrade(move |socket| client_session(server, socket))
}

async fn wrong_path(ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>) -> Response {
    match ws {
        Ok(ws) => ws.on_upgrade(|socket| reject(socket, "Invalid path")),
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Close right after the handshake with a policy violation.
async fn reject(mut socket: WebSocket, reason: &'static str) {
    let frame = CloseFrame {
        code: close_code::POLICY,
        reason: reason.into(),
    };
    let _ = socket.send(Message::Close(Some(frame))).await;
}

async fn client_session(server: Arc<StateServer>, socket: WebSocket) {
    let (id, mut frames) = server.clients().register();
    let token = server.shutdown_token();
    let (mut sink, mut stream) = socket.split();
    info!(client = id, clients = server.clients().len(), "WebSocket client connected");

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                let _ = sink
                    .send(Message::Close(Some(CloseFrame {
                        code: close_code::AWAY,
                        reason: "Server shutting down".into(),
                    })))
                    .await;
                break;
            }
            frame = frames.recv() => {
                let Some(text) = frame else { break };
                if sink.send(Message::Text(text)).await.is_err() {
                    break; // Client disconnected
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    server.clients().remove(id);
    info!(client = id, clients = server.clients().len(), "WebSocket client disconnected");
}

/// Push the state to every client each `period`, idling while nobody listens.
pub fn spawn_broadcaster(server: Arc<StateServer>, period: Duration) -> JoinHandle<()> {
    let token = server.shutdown_token();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if server.clients().is_empty() {
                continue;
            }

            let payload = match server.compose().await {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("Broadcast tick skipped: {}", e);
                    continue;
                }
            };
            match serde_json::to_string(&WsMessage::state(&payload)) {
                Ok(text) => {
                    server.clients().broadcast(&text.into());
                }
                Err(e) => warn!("Broadcast tick skipped: {}", e),
            }
        }
        debug!("Broadcaster stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_drops_closed_clients() {
        let registry = ClientRegistry::new();
        let (_a, mut rx_a) = registry.register();
        let (_b, rx_b) = registry.register();
        assert_eq!(registry.len(), 2);

        drop(rx_b);
        assert_eq!(registry.broadcast(&Utf8Bytes::from_static("hello")), 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(rx_a.try_recv().unwrap().as_str(), "hello");
    }

    #[test]
    fn test_lagging_client_is_kept() {
        let registry = ClientRegistry::new();
        let (id, _rx) = registry.register();
        for _ in 0..CLIENT_QUEUE {
            assert_eq!(registry.broadcast(&Utf8Bytes::from_static("x")), 1);
        }
        assert_eq!(registry.broadcast(&Utf8Bytes::from_static("x")), 0);
        assert_eq!(registry.len(), 1);

        registry.remove(id);
        assert!(registry.is_empty());
    }
}
