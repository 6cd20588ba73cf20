//! JSON bodies served by the HTTP and WebSocket endpoints.

use crate::lyrics::LyricLine;
use crate::player::PlaybackStatus;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// RFC 3339 UTC timestamp used across every payload.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatePayload {
    pub timestamp: String,
    pub playback: PlaybackPayload,
    pub track: TrackPayload,
    pub lyrics: LyricsPayload,
    pub capabilities: Capabilities,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackPayload {
    pub status: PlaybackStatus,
    pub position_seconds: f64,
    pub duration_seconds: f64,
    pub progress: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackPayload {
    pub artist: String,
    pub title: String,
    pub thumbnail_base64: String,
    pub thumbnail_hd_base64: String,
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LyricsPayload {
    pub lines: Vec<LyricLine>,
    pub active_index: isize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub can_play_pause: bool,
    pub can_seek: bool,
    pub can_next: bool,
    pub can_previous: bool,
    pub can_focus_source: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            can_play_pause: true,
            can_seek: true,
            can_next: true,
            can_previous: true,
            can_focus_source: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthPayload {
    pub status: String,
    pub version: String,
    pub uptime_ms: u64,
    pub timestamp: String,
}

/// Body of `POST /control`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlRequest {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub seek_seconds: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlResponse {
    pub accepted: bool,
    pub action: String,
    pub executed_at: String,
    pub state: StatePayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    pub timestamp: String,
}

/// Frame pushed to WebSocket clients.
#[derive(Debug, Serialize)]
pub struct WsMessage<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub state: &'a StatePayload,
}

impl<'a> WsMessage<'a> {
    pub fn state(state: &'a StatePayload) -> Self {
        Self { kind: "state", state }
    }
}
