//! HTTP contract of the local API, driven through the router without a socket.

use anyhow::Result;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

use vinyl_companion::config::ApiConfig;
use vinyl_companion::lyrics::LyricsTracker;
use vinyl_companion::player::{ControlCommand, ControlPort, MediaSnapshot, MediaSource, PollSource};
use vinyl_companion::server::{http, StateServer};
use vinyl_companion::watcher::MediaWatcher;

const TOKEN: &str = "token-prueba";

struct Silent;

impl PollSource for Silent {
    fn poll(&self) -> Result<MediaSnapshot> {
        Ok(MediaSnapshot::stopped())
    }
}

#[derive(Default)]
struct Recorder {
    commands: Mutex<Vec<ControlCommand>>,
}

impl Recorder {
    fn record(&self, command: ControlCommand) -> Result<()> {
        self.commands.lock().unwrap().push(command);
        Ok(())
    }

    fn commands(&self) -> Vec<ControlCommand> {
        self.commands.lock().unwrap().clone()
    }
}

impl ControlPort for Recorder {
    fn next(&self) -> Result<()> {
        self.record(ControlCommand::Next)
    }
    fn previous(&self) -> Result<()> {
        self.record(ControlCommand::Previous)
    }
    fn play_pause(&self) -> Result<()> {
        self.record(ControlCommand::PlayPause)
    }
    fn seek_to_seconds(&self, seconds: f64) -> Result<()> {
        self.record(ControlCommand::Seek(seconds))
    }
    fn focus_source(&self) -> Result<()> {
        self.record(ControlCommand::FocusSource)
    }
}

fn setup() -> (axum::Router, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let watcher = Arc::new(MediaWatcher::new(
        MediaSource::Poll(Arc::new(Silent)),
        recorder.clone(),
    ));
    let server = Arc::new(StateServer::new(
        watcher,
        Arc::new(LyricsTracker::new()),
        ApiConfig::default(),
        "demo",
    ));
    (http::router(server), recorder)
}

struct Reply {
    status: StatusCode,
    headers: axum::http::HeaderMap,
    body: Option<Value>,
}

async fn send(app: &axum::Router, method: Method, path: &str, token: Option<&str>, body: &str) -> Reply {
    let mut request = Request::builder().method(method).uri(path);
    if let Some(token) = token {
        request = request.header("X-Api-Token", token);
    }
    if !body.is_empty() {
        request = request.header(header::CONTENT_TYPE, "application/json");
    }

    let response = app
        .clone()
        .oneshot(request.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        None
    } else {
        Some(serde_json::from_slice(&bytes).unwrap())
    };

    Reply { status, headers, body }
}

fn assert_cors(reply: &Reply) {
    assert_eq!(reply.headers["access-control-allow-origin"], "*");
    assert_eq!(reply.headers["access-control-allow-headers"], "Content-Type, X-Api-Token");
    assert_eq!(reply.headers["access-control-allow-methods"], "GET, POST, OPTIONS");
}

fn assert_error(reply: &Reply, status: StatusCode, code: &str) {
    assert_eq!(reply.status, status);
    let body = reply.body.as_ref().expect("error body");
    assert_eq!(body["code"], code);
    assert!(body["message"].is_string());
    assert!(body["timestamp"].is_string());
    assert_cors(reply);
}

#[tokio::test]
async fn test_health() {
    let (app, _) = setup();
    let reply = send(&app, Method::GET, "/api/v1/health", None, "").await;

    assert_eq!(reply.status, StatusCode::OK);
    let body = reply.body.as_ref().unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert!(body["uptimeMs"].is_u64());
    assert!(body["timestamp"].is_string());
    assert_cors(&reply);
}

#[tokio::test]
async fn test_state_defaults_to_stopped() {
    let (app, _) = setup();
    let reply = send(&app, Method::GET, "/api/v1/state", None, "").await;

    assert_eq!(reply.status, StatusCode::OK);
    let body = reply.body.as_ref().unwrap();
    assert_eq!(body["playback"]["status"], "STOPPED");
    assert_eq!(body["playback"]["progress"], 0.0);
    assert_eq!(body["track"]["artist"], "");
    assert_eq!(body["track"]["source"], "demo");
    assert_eq!(body["lyrics"]["activeIndex"], -1);
    for capability in ["canPlayPause", "canSeek", "canNext", "canPrevious", "canFocusSource"] {
        assert_eq!(body["capabilities"][capability], true);
    }
    assert_cors(&reply);
}

#[tokio::test]
async fn test_control_requires_token() {
    let (app, recorder) = setup();

    let missing = send(&app, Method::POST, "/api/v1/control", None, r#"{"action":"next"}"#).await;
    assert_error(&missing, StatusCode::UNAUTHORIZED, "unauthorized");

    let wrong = send(&app, Method::POST, "/api/v1/control", Some("nope"), r#"{"action":"next"}"#).await;
    assert_error(&wrong, StatusCode::UNAUTHORIZED, "unauthorized");

    // Auth is checked before the body
    let garbage = send(&app, Method::POST, "/api/v1/control", None, "").await;
    assert_error(&garbage, StatusCode::UNAUTHORIZED, "unauthorized");

    assert!(recorder.commands().is_empty());
}

#[tokio::test]
async fn test_preflight_needs_no_token() {
    let (app, _) = setup();
    let reply = send(&app, Method::OPTIONS, "/api/v1/control", None, "").await;

    assert_eq!(reply.status, StatusCode::NO_CONTENT);
    assert!(reply.body.is_none());
    assert_cors(&reply);
}

#[tokio::test]
async fn test_control_validation() {
    let (app, recorder) = setup();
    let cases = [
        ("", "invalid_request"),
        ("{oops", "invalid_json"),
        (r#"{"seekSeconds": 3}"#, "invalid_action"),
        (r#"{"action":"rewind"}"#, "unknown_action"),
        (r#"{"action":"seek"}"#, "invalid_seek"),
    ];

    for (body, code) in cases {
        let reply = send(&app, Method::POST, "/api/v1/control", Some(TOKEN), body).await;
        assert_error(&reply, StatusCode::BAD_REQUEST, code);
    }
    assert!(recorder.commands().is_empty());
}

#[tokio::test]
async fn test_control_dispatches() {
    let (app, recorder) = setup();

    let reply = send(
        &app,
        Method::POST,
        "/api/v1/control",
        Some(TOKEN),
        r#"{"action":"Seek","seekSeconds":42}"#,
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    let body = reply.body.as_ref().unwrap();
    assert_eq!(body["accepted"], true);
    assert_eq!(body["action"], "seek");
    assert!(body["executedAt"].is_string());
    assert_eq!(body["state"]["playback"]["status"], "STOPPED");

    send(&app, Method::POST, "/api/v1/control", Some(TOKEN), r#"{"action":"playpause"}"#).await;
    send(&app, Method::POST, "/api/v1/control", Some(TOKEN), r#"{"action":"FOCUSSOURCE"}"#).await;

    assert_eq!(
        recorder.commands(),
        vec![
            ControlCommand::Seek(42.0),
            ControlCommand::PlayPause,
            ControlCommand::FocusSource
        ]
    );
}

#[tokio::test]
async fn test_wrong_method() {
    let (app, _) = setup();

    let reply = send(&app, Method::GET, "/api/v1/control", Some(TOKEN), "").await;
    assert_error(&reply, StatusCode::METHOD_NOT_ALLOWED, "method_not_allowed");
    assert_eq!(reply.headers["allow"], "POST, OPTIONS");

    let reply = send(&app, Method::POST, "/api/v1/state", None, "").await;
    assert_error(&reply, StatusCode::METHOD_NOT_ALLOWED, "method_not_allowed");
    assert_eq!(reply.headers["allow"], "GET, OPTIONS");
}

#[tokio::test]
async fn test_unknown_path() {
    let (app, _) = setup();
    let reply = send(&app, Method::GET, "/api/v2/state", None, "").await;
    assert_error(&reply, StatusCode::NOT_FOUND, "not_found");
}
