//! HTTP routes under `/api/v1`.

use super::payload::{now_rfc3339, ErrorBody, HealthPayload};
use super::StateServer;
use axum::{
    body::Bytes,
    extract::State,
    http::{
        header::{
            ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
            ALLOW,
        },
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::{set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::warn;

pub const TOKEN_HEADER: &str = "x-api-token";

/// Error response with a stable machine-readable `code`.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", "Missing or invalid API token")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            code: self.code.to_string(),
            message: self.message,
            timestamp: now_rfc3339(),
        };
        (self.status, Json(body)).into_response()
    }
}

pub fn router(server: Arc<StateServer>) -> Router {
    Router::new()
        .route(
            "/api/v1/health",
            get(health).fallback(|| async { method_not_allowed("GET") }),
        )
        .route(
            "/api/v1/state",
            get(state).fallback(|| async { method_not_allowed("GET") }),
        )
        .route(
            "/api/v1/control",
            post(control)
                .options(preflight)
                .fallback(|| async { method_not_allowed("POST") }),
        )
        .fallback(not_found)
        .with_state(server)
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type, X-Api-Token"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, POST, OPTIONS"),
        ))
        .layer(TraceLayer::new_for_http())
}

async fn health(State(server): State<Arc<StateServer>>) -> Json<HealthPayload> {
    Json(HealthPayload {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_ms: server.uptime().as_millis() as u64,
        timestamp: now_rfc3339(),
    })
}

async fn state(State(server): State<Arc<StateServer>>) -> Response {
    match server.compose().await {
        Ok(payload) => Json(payload).into_response(),
        Err(e) => {
            warn!("State composition failed: {}", e);
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "state_failed", e.to_string()).into_response()
        }
    }
}

async fn control(State(server): State<Arc<StateServer>>, headers: HeaderMap, body: Bytes) -> Response {
    let token = headers.get(TOKEN_HEADER).and_then(|v| v.to_str().ok());
    if !server.is_authorized(token) {
        return ApiError::unauthorized().into_response();
    }

    match server.handle_control(&body).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

fn method_not_allowed(allowed: &'static str) -> Response {
    (
        [(ALLOW, format!("{}, OPTIONS", allowed))],
        ApiError::new(
            StatusCode::METHOD_NOT_ALLOWED,
            "method_not_allowed",
            format!("Use method {}", allowed),
        ),
    )
        .into_response()
}

async fn not_found() -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "not_found", "Unknown endpoint")
}
