//! State composition and the HTTP / WebSocket front ends.
//!
//! [`StateServer`] owns everything needed to answer "what is playing right
//! now": the watcher's latest snapshot, the position estimator, the lyrics
//! tracker and the thumbnail upscaler. The HTTP router and the WebSocket
//! broadcaster are thin shells around [`StateServer::compose`] and
//! [`StateServer::handle_control`].

pub mod http;
pub mod payload;
pub mod ws;

use crate::artwork::ThumbnailUpscaler;
use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::lyrics::{active_lyric_index, LyricsTracker};
use crate::player::{progress, ControlCommand};
use crate::position::PositionEstimator;
use crate::watcher::MediaWatcher;
use axum::http::StatusCode;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub use http::ApiError;
pub use payload::{
    Capabilities, ControlRequest, ControlResponse, HealthPayload, LyricsPayload, PlaybackPayload,
    StatePayload, TrackPayload,
};
pub use ws::{ClientRegistry, BROADCAST_INTERVAL};

pub const API_PREFIX: &str = "/api/v1";

/// Addresses the listeners actually bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundAddrs {
    pub http: SocketAddr,
    pub ws: SocketAddr,
}

pub struct StateServer {
    watcher: Arc<MediaWatcher>,
    lyrics: Arc<LyricsTracker>,
    estimator: Mutex<PositionEstimator>,
    upscaler: ThumbnailUpscaler,
    api: ApiConfig,
    source_label: String,
    started_at: Instant,
    compositions: AtomicU64,
    clients: ClientRegistry,
    started: AtomicBool,
    token: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl StateServer {
    pub fn new(
        watcher: Arc<MediaWatcher>,
        lyrics: Arc<LyricsTracker>,
        api: ApiConfig,
        source_label: impl Into<String>,
    ) -> Self {
        Self {
            watcher,
            lyrics,
            estimator: Mutex::new(PositionEstimator::new()),
            upscaler: ThumbnailUpscaler::new(),
            api,
            source_label: source_label.into(),
            started_at: Instant::now(),
            compositions: AtomicU64::new(0),
            clients: ClientRegistry::new(),
            started: AtomicBool::new(false),
            token: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn watcher(&self) -> &Arc<MediaWatcher> {
        &self.watcher
    }

    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    pub fn api(&self) -> &ApiConfig {
        &self.api
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// How many state payloads have been built so far.
    pub fn compositions(&self) -> u64 {
        self.compositions.load(Ordering::Relaxed)
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Whether `provided` is the configured API token.
    pub fn is_authorized(&self, provided: Option<&str>) -> bool {
        match provided.map(str::trim) {
            Some(token) if !token.is_empty() => token == self.api.token,
            _ => false,
        }
    }

    /// Build the full state payload from the latest snapshot.
    ///
    /// Advances the position estimator, so calls are serialized on its lock.
    /// Decoding and resizing artwork can block; async callers go through
    /// [`compose`](Self::compose).
    pub fn build_state_payload(&self) -> StatePayload {
        self.compositions.fetch_add(1, Ordering::Relaxed);
        let snapshot = self.watcher.latest();

        let position = {
            let mut estimator = match self.estimator.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            estimator.estimate(
                snapshot.status,
                snapshot.position_secs,
                snapshot.duration_secs,
                Instant::now(),
            )
        };

        let lines = self.lyrics.observe(&snapshot.artist, &snapshot.title);
        let active_index = active_lyric_index(&lines, position);
        let hd = self.upscaler.upscale(&snapshot.thumbnail);

        StatePayload {
            timestamp: payload::now_rfc3339(),
            playback: PlaybackPayload {
                status: snapshot.status,
                position_seconds: position,
                duration_seconds: snapshot.duration_secs,
                progress: progress(position, snapshot.duration_secs),
            },
            track: TrackPayload {
                artist: snapshot.artist.clone(),
                title: snapshot.title.clone(),
                thumbnail_base64: STANDARD.encode(&snapshot.thumbnail),
                thumbnail_hd_base64: STANDARD.encode(hd),
                source: self.source_label.clone(),
            },
            lyrics: LyricsPayload {
                lines: lines.as_ref().clone(),
                active_index,
            },
            capabilities: Capabilities::default(),
        }
    }

    /// [`build_state_payload`](Self::build_state_payload) off the async runtime.
    pub async fn compose(self: &Arc<Self>) -> Result<StatePayload> {
        let server = Arc::clone(self);
        tokio::task::spawn_blocking(move || server.build_state_payload())
            .await
            .map_err(|e| Error::Server(format!("state composition failed: {}", e)))
    }

    /// Validate a raw `/control` body, dispatch it and report the new state.
    pub async fn handle_control(self: &Arc<Self>, body: &[u8]) -> std::result::Result<ControlResponse, ApiError> {
        let command = parse_control(body)?;
        let action = command.action();

        let watcher = Arc::clone(&self.watcher);
        let dispatched = tokio::task::spawn_blocking(move || watcher.execute(command))
            .await
            .map_err(|e| ApiError::control_failed(e.to_string()))?;
        if let Err(e) = dispatched {
            error!(action, "Control command failed: {:#}", e);
            return Err(ApiError::control_failed(format!("{:#}", e)));
        }
        info!(action, "Control command executed");

        let state = self
            .compose()
            .await
            .map_err(|e| ApiError::control_failed(e.to_string()))?;

        Ok(ControlResponse {
            accepted: true,
            action: action.to_string(),
            executed_at: payload::now_rfc3339(),
            state,
        })
    }

    /// Bind both listeners and start serving plus broadcasting.
    pub async fn start(self: &Arc<Self>) -> Result<BoundAddrs> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(Error::Server("state server already started".into()));
        }

        let http_listener = bind(&self.api.host, self.api.port).await?;
        let ws_listener = bind(&self.api.host, self.api.ws_port()).await?;
        let addrs = BoundAddrs {
            http: http_listener.local_addr()?,
            ws: ws_listener.local_addr()?,
        };

        info!("Local API listening at http://{}{}", addrs.http, API_PREFIX);
        info!("WebSocket listening at ws://{}{}/ws", addrs.ws, API_PREFIX);
        info!("Local API control token: {}", self.api.token);

        let mut tasks = Vec::with_capacity(3);
        tasks.push(self.serve(http_listener, http::router(Arc::clone(self)), "HTTP"));
        tasks.push(self.serve(ws_listener, ws::router(Arc::clone(self)), "WebSocket"));
        tasks.push(ws::spawn_broadcaster(Arc::clone(self), BROADCAST_INTERVAL));

        match self.tasks.lock() {
            Ok(mut guard) => guard.extend(tasks),
            Err(poisoned) => poisoned.into_inner().extend(tasks),
        }
        Ok(addrs)
    }

    fn serve(&self, listener: TcpListener, app: axum::Router, name: &'static str) -> JoinHandle<()> {
        let token = self.token.clone();
        tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            match result {
                Ok(()) => info!("{} listener stopped", name),
                Err(e) => error!("{} listener failed: {}", name, e),
            }
        })
    }

    /// Stop the broadcaster and both listeners. Safe to call repeatedly.
    pub fn shutdown(&self) {
        if !self.token.is_cancelled() {
            info!("Shutting down state server");
            self.token.cancel();
        }
    }

    /// Wait for every task started by [`start`](Self::start).
    pub async fn join(&self) {
        let tasks: Vec<_> = match self.tasks.lock() {
            Ok(mut guard) => guard.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        };
        for task in tasks {
            if let Err(e) = task.await {
                error!("Server task ended abnormally: {}", e);
            }
        }
    }
}

async fn bind(host: &str, port: u16) -> Result<TcpListener> {
    TcpListener::bind((host, port))
        .await
        .map_err(|e| Error::Server(format!("Failed to bind to {}:{}: {}", host, port, e)))
}

/// Turn a raw `/control` body into a command, or the matching 400.
pub fn parse_control(body: &[u8]) -> std::result::Result<ControlCommand, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::bad_request("invalid_request", "Request body is required"));
    }

    let request: Option<ControlRequest> = serde_json::from_slice(body)
        .map_err(|_| ApiError::bad_request("invalid_json", "Malformed JSON payload"))?;
    let request = request.unwrap_or_default();

    let action = request
        .action
        .as_deref()
        .map(|a| a.trim().to_lowercase())
        .filter(|a| !a.is_empty())
        .ok_or_else(|| ApiError::bad_request("invalid_action", "Field 'action' is required"))?;

    match action.as_str() {
        "playpause" => Ok(ControlCommand::PlayPause),
        "next" => Ok(ControlCommand::Next),
        "previous" => Ok(ControlCommand::Previous),
        "focussource" => Ok(ControlCommand::FocusSource),
        "seek" => match request.seek_seconds {
            Some(seconds) if seconds.is_finite() => Ok(ControlCommand::Seek(seconds.max(0.0))),
            _ => Err(ApiError::bad_request(
                "invalid_seek",
                "Field 'seekSeconds' is required for seek action",
            )),
        },
        other => Err(ApiError::bad_request(
            "unknown_action",
            format!("Unsupported action: {}", other),
        )),
    }
}

impl ApiError {
    fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    fn control_failed(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "control_failed", message)
    }
}
