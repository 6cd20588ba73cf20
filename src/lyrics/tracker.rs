//! Current-track lyrics state and the single background worker that fills it.

use super::{LyricLine, LyricsResolver, TrackKey};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct TrackRequest {
    pub artist: String,
    pub title: String,
}

impl TrackRequest {
    pub fn key(&self) -> TrackKey {
        TrackKey::new(&self.artist, &self.title)
    }
}

#[derive(Debug, Default)]
struct Current {
    key: TrackKey,
    lines: Arc<Vec<LyricLine>>,
}

/// Lyrics for whatever track the state payload is currently about.
///
/// A track change clears the lines and queues one lookup. Only the most
/// recent request is kept; results for a track that is no longer current
/// are dropped.
#[derive(Debug)]
pub struct LyricsTracker {
    current: Mutex<Current>,
    requests: watch::Sender<Option<TrackRequest>>,
}

impl Default for LyricsTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl LyricsTracker {
    pub fn new() -> Self {
        let (requests, _) = watch::channel(None);
        Self {
            current: Mutex::new(Current::default()),
            requests,
        }
    }

    fn current(&self) -> MutexGuard<'_, Current> {
        match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Lines for the given track, queueing a lookup on a track change.
    pub fn observe(&self, artist: &str, title: &str) -> Arc<Vec<LyricLine>> {
        let key = TrackKey::new(artist, title);
        let mut current = self.current();
        if current.key == key {
            return current.lines.clone();
        }

        debug!(%key, "Track changed, clearing lyrics");
        current.key = key.clone();
        current.lines = Arc::new(Vec::new());

        if !key.is_blank() {
            self.requests.send_replace(Some(TrackRequest {
                artist: artist.to_string(),
                title: title.to_string(),
            }));
        }
        current.lines.clone()
    }

    pub fn current_key(&self) -> TrackKey {
        self.current().key.clone()
    }

    pub fn current_lines(&self) -> Arc<Vec<LyricLine>> {
        self.current().lines.clone()
    }

    /// Install a lookup result. Returns false when `key` is stale.
    pub fn complete(&self, key: &TrackKey, lines: Vec<LyricLine>) -> bool {
        let mut current = self.current();
        if current.key != *key {
            debug!(%key, current = %current.key, "Discarding stale lyrics");
            return false;
        }
        info!(%key, lines = lines.len(), "Lyrics ready");
        current.lines = Arc::new(lines);
        true
    }

    pub fn requests(&self) -> watch::Receiver<Option<TrackRequest>> {
        self.requests.subscribe()
    }
}

/// Spawn the worker that resolves lyrics for the tracker's latest request.
pub fn spawn_lyrics_worker(
    tracker: Arc<LyricsTracker>,
    resolver: Arc<LyricsResolver>,
    token: CancellationToken,
) -> JoinHandle<()> {
    let mut requests = tracker.requests();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                changed = requests.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }

            let Some(request) = requests.borrow_and_update().clone() else {
                continue;
            };

            let lines = tokio::select! {
                _ = token.cancelled() => break,
                lines = resolver.resolve(&request.artist, &request.title) => lines,
            };
            tracker.complete(&request.key(), lines);
        }
        debug!("Lyrics worker stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lyrics::tests::ScriptedProvider;
    use crate::lyrics::LyricsCache;
    use std::time::Duration;

    #[test]
    fn test_track_change_clears_and_requests() {
        let tracker = LyricsTracker::new();
        let requests = tracker.requests();

        assert!(tracker.observe("Daft Punk", "Get Lucky").is_empty());
        let key = TrackKey::new("Daft Punk", "Get Lucky");
        assert!(tracker.complete(&key, vec![LyricLine::new(1.0, "x")]));
        assert_eq!(tracker.observe("daft punk", "get lucky").len(), 1);

        assert!(tracker.observe("Queen", "Bohemian Rhapsody").is_empty());
        assert_eq!(
            requests.borrow().clone().map(|r| r.title),
            Some("Bohemian Rhapsody".to_string())
        );
    }

    #[test]
    fn test_stale_result_is_discarded() {
        let tracker = LyricsTracker::new();
        tracker.observe("Daft Punk", "Get Lucky");
        tracker.observe("Queen", "Bohemian Rhapsody");

        let stale = TrackKey::new("Daft Punk", "Get Lucky");
        assert!(!tracker.complete(&stale, vec![LyricLine::new(1.0, "x")]));
        assert!(tracker.current_lines().is_empty());
    }

    #[test]
    fn test_blank_track_does_not_request() {
        let tracker = LyricsTracker::new();
        let requests = tracker.requests();
        tracker.observe("", "");
        tracker.observe("Daft Punk", "");
        assert!(requests.borrow().is_none());
    }

    #[tokio::test]
    async fn test_worker_fills_current_track() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(Some(
            "[00:01.00]Like the legend of the phoenix".to_string(),
        ))]));
        let cache = Arc::new(LyricsCache::in_memory().unwrap());
        let resolver = Arc::new(LyricsResolver::new(cache, provider.clone()));
        let tracker = Arc::new(LyricsTracker::new());
        let token = CancellationToken::new();
        let worker = spawn_lyrics_worker(tracker.clone(), resolver, token.clone());

        tracker.observe("Daft Punk", "Get Lucky");
        for _ in 0..100 {
            if !tracker.current_lines().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(tracker.current_lines().len(), 1);
        assert_eq!(provider.calls(), 1);

        token.cancel();
        worker.await.unwrap();
    }
}
