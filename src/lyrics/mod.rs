//! Time-synced lyrics: LRC parsing, the SQLite-backed cache, the remote
//! provider and the resolver that ties them together.

pub mod cache;
pub mod lrclib;
pub mod tracker;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub use cache::{LyricsCache, LyricsCacheEntry, MAX_CACHE_ROWS};
pub use lrclib::LrclibProvider;
pub use tracker::{spawn_lyrics_worker, LyricsTracker, TrackRequest};

const FETCH_ATTEMPTS: u32 = 2;
const FETCH_BACKOFF: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LyricLine {
    pub time_seconds: f64,
    pub text: String,
}

impl LyricLine {
    pub fn new(time_seconds: f64, text: impl Into<String>) -> Self {
        Self {
            time_seconds: time_seconds.max(0.0),
            text: text.into(),
        }
    }
}

/// Normalized track identity: trimmed, lowercased artist and title.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TrackKey {
    pub artist: String,
    pub title: String,
}

impl TrackKey {
    pub fn new(artist: &str, title: &str) -> Self {
        Self {
            artist: artist.trim().to_lowercase(),
            title: title.trim().to_lowercase(),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.artist.is_empty() || self.title.is_empty()
    }
}

impl fmt::Display for TrackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.artist, self.title)
    }
}

/// Parse LRC text (`[mm:ss]text` / `[mm:ss.ff]text`).
///
/// Lines without a leading timestamp, with an unparsable timestamp or with
/// empty text are dropped. Source order is kept as-is.
pub fn parse_lrc(content: &str) -> Vec<LyricLine> {
    let mut lines = Vec::new();
    for raw in content.lines() {
        if !raw.starts_with('[') {
            continue;
        }
        let Some(end) = raw.find(']') else {
            continue;
        };

        let text = raw[end + 1..].trim();
        if text.is_empty() {
            continue;
        }
        if let Some(seconds) = parse_timestamp(raw[1..end].trim()) {
            lines.push(LyricLine::new(seconds, text));
        }
    }
    lines
}

/// `mm:ss` or `mm:ss.ff` to seconds.
fn parse_timestamp(ts: &str) -> Option<f64> {
    let (min, sec) = ts.split_once(':')?;
    if sec.contains(':') {
        return None;
    }

    let minutes: u32 = min.trim().parse().ok()?;
    let seconds: f64 = sec.trim().parse().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Some(f64::from(minutes) * 60.0 + seconds)
}

/// Index of the last line starting at or before `position_secs`, or -1.
/// Negative positions count as 0.
pub fn active_lyric_index(lines: &[LyricLine], position_secs: f64) -> isize {
    let position = position_secs.max(0.0);
    let mut active = -1;
    for (i, line) in lines.iter().enumerate() {
        if line.time_seconds <= position {
            active = i as isize;
        } else {
            break;
        }
    }
    active
}

/// A remote source of synced lyrics.
#[async_trait]
pub trait LyricsProvider: Send + Sync {
    /// Raw LRC text for the track, `None` when the provider has nothing.
    async fn fetch_synced(&self, artist: &str, title: &str) -> Result<Option<String>>;
}

/// Cache-first, network-fallback lyrics lookup.
///
/// Misses are never cached, so a track without lyrics is asked for again
/// on the next request.
pub struct LyricsResolver {
    cache: Arc<LyricsCache>,
    provider: Arc<dyn LyricsProvider>,
    attempts: u32,
    backoff: Duration,
}

impl LyricsResolver {
    pub fn new(cache: Arc<LyricsCache>, provider: Arc<dyn LyricsProvider>) -> Self {
        Self {
            cache,
            provider,
            attempts: FETCH_ATTEMPTS,
            backoff: FETCH_BACKOFF,
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn cache(&self) -> &Arc<LyricsCache> {
        &self.cache
    }

    pub async fn resolve(&self, artist: &str, title: &str) -> Vec<LyricLine> {
        let key = TrackKey::new(artist, title);
        if key.is_blank() {
            return Vec::new();
        }

        let cache = self.cache.clone();
        let lookup_key = key.clone();
        match tokio::task::spawn_blocking(move || cache.lookup(&lookup_key)).await {
            Ok(Ok(Some(lines))) => {
                info!(%key, "Lyrics cache HIT");
                return lines;
            }
            Ok(Ok(None)) => {}
            Ok(Err(e)) => warn!(%key, "Lyrics cache read failed: {}", e),
            Err(e) => warn!(%key, "Lyrics cache read task failed: {}", e),
        }

        info!(%key, "Lyrics cache MISS, fetching from provider");

        for attempt in 1..=self.attempts {
            let lines = match self.provider.fetch_synced(artist, title).await {
                Ok(Some(text)) => parse_lrc(&text),
                Ok(None) => Vec::new(),
                Err(e) => {
                    warn!(%key, attempt, "Lyrics fetch failed: {}", e);
                    Vec::new()
                }
            };

            if !lines.is_empty() {
                self.store(&key, artist, title, &lines).await;
                return lines;
            }

            if attempt < self.attempts {
                tokio::time::sleep(self.backoff).await;
            }
        }

        debug!(%key, "No synced lyrics found");
        Vec::new()
    }

    async fn store(&self, key: &TrackKey, artist: &str, title: &str, lines: &[LyricLine]) {
        let cache = self.cache.clone();
        let (artist, title, lines) = (artist.to_string(), title.to_string(), lines.to_vec());
        match tokio::task::spawn_blocking(move || cache.store(&artist, &title, &lines)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(%key, "Lyrics cache write failed: {}", e),
            Err(e) => warn!(%key, "Lyrics cache write task failed: {}", e),
        }
    }
}
