use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PlaybackStatus {
    Playing,
    Paused,
    #[default]
    Stopped,
}

impl PlaybackStatus {
    /// Lenient mapping for status strings coming from external readers.
    /// Anything that is not clearly playing or paused counts as stopped.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PLAYING" => Self::Playing,
            "PAUSED" => Self::Paused,
            _ => Self::Stopped,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Playing => "PLAYING",
            Self::Paused => "PAUSED",
            Self::Stopped => "STOPPED",
        }
    }
}

impl fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable reading of the host's playback state.
///
/// Snapshots are never mutated once dispatched; the watcher swaps in a new
/// `Arc<MediaSnapshot>` instead.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MediaSnapshot {
    pub artist: String,
    pub title: String,
    pub status: PlaybackStatus,
    pub position_secs: f64,
    pub duration_secs: f64,
    /// Encoded cover art exactly as the source delivered it (empty = none)
    pub thumbnail: Vec<u8>,
}

impl MediaSnapshot {
    pub fn new(
        artist: impl Into<String>,
        title: impl Into<String>,
        status: PlaybackStatus,
        position_secs: f64,
        duration_secs: f64,
        thumbnail: Vec<u8>,
    ) -> Self {
        Self {
            artist: artist.into(),
            title: title.into(),
            status,
            position_secs: clamp_non_negative(position_secs),
            duration_secs: clamp_non_negative(duration_secs),
            thumbnail,
        }
    }

    /// Empty STOPPED snapshot, used before the first update and after faults.
    pub fn stopped() -> Self {
        Self::default()
    }

    pub fn is_playing(&self) -> bool {
        self.status == PlaybackStatus::Playing
    }

    pub fn is_empty(&self) -> bool {
        self.artist.is_empty() && self.title.is_empty()
    }
}

fn clamp_non_negative(value: f64) -> f64 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}

/// `position / duration` clamped to `[0, 1]`; 0 when the duration is unknown.
pub fn progress(position_secs: f64, duration_secs: f64) -> f64 {
    if duration_secs > 0.0 {
        (position_secs / duration_secs).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlCommand {
    Next,
    Previous,
    PlayPause,
    Seek(f64),
    FocusSource,
}

impl ControlCommand {
    /// Wire name used by the control API and the helper executable.
    pub fn action(&self) -> &'static str {
        match self {
            Self::Next => "next",
            Self::Previous => "previous",
            Self::PlayPause => "playpause",
            Self::Seek(_) => "seek",
            Self::FocusSource => "focussource",
        }
    }
}

/// The control side of the host's media session.
///
/// Calls are synchronous and may block (helper processes), so async callers
/// go through `spawn_blocking`.
pub trait ControlPort: Send + Sync {
    fn next(&self) -> Result<()>;
    fn previous(&self) -> Result<()>;
    fn play_pause(&self) -> Result<()>;
    fn seek_to_seconds(&self, seconds: f64) -> Result<()>;
    fn focus_source(&self) -> Result<()>;

    fn execute(&self, command: ControlCommand) -> Result<()> {
        match command {
            ControlCommand::Next => self.next(),
            ControlCommand::Previous => self.previous(),
            ControlCommand::PlayPause => self.play_pause(),
            ControlCommand::Seek(seconds) => self.seek_to_seconds(seconds),
            ControlCommand::FocusSource => self.focus_source(),
        }
    }
}

/// A source that has to be asked for the current state.
pub trait PollSource: Send + Sync {
    fn poll(&self) -> Result<MediaSnapshot>;
}

/// A source that delivers snapshots on its own schedule.
///
/// Snapshots are written into a single-slot `watch` channel, so a newer
/// snapshot replaces one the consumer has not picked up yet.
pub trait PushSource: Send + Sync {
    fn subscribe(&self, sink: watch::Sender<Option<MediaSnapshot>>) -> Result<Subscription>;
}

/// Capability of a source, fixed once at construction.
#[derive(Clone)]
pub enum MediaSource {
    Poll(Arc<dyn PollSource>),
    Push(Arc<dyn PushSource>),
}

impl fmt::Debug for MediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Poll(_) => f.write_str("MediaSource::Poll"),
            Self::Push(_) => f.write_str("MediaSource::Push"),
        }
    }
}

/// Live push subscription. Dropping it unsubscribes, on every exit path.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Unsubscribe now instead of at drop.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}
