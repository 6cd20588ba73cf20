//! Persistent lyrics cache on SQLite.
//!
//! Rows are keyed by the normalized (artist, title) pair. Every hit bumps
//! `last_played` and `play_count`; every write prunes the table down to the
//! most recently played [`MAX_CACHE_ROWS`] rows.

use super::{LyricLine, TrackKey};
use crate::error::Result;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

pub const MAX_CACHE_ROWS: usize = 400;

#[derive(Debug, Clone, PartialEq)]
pub struct LyricsCacheEntry {
    pub key: TrackKey,
    pub artist: String,
    pub title: String,
    pub lines: Vec<LyricLine>,
    /// Epoch milliseconds
    pub last_played_at: i64,
    /// Epoch milliseconds
    pub updated_at: i64,
    pub play_count: i64,
}

#[derive(Debug)]
pub struct LyricsCache {
    conn: Mutex<Connection>,
    max_rows: usize,
    path: Option<PathBuf>,
}

impl LyricsCache {
    /// Open (or create) the cache database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let cache = Self::init(Connection::open(path)?, Some(path.to_path_buf()))?;
        info!(path = %path.display(), "Lyrics cache DB ready");
        Ok(cache)
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS lyrics_cache (
                artist TEXT NOT NULL,
                title TEXT NOT NULL,
                artist_norm TEXT NOT NULL,
                title_norm TEXT NOT NULL,
                lyrics_json TEXT NOT NULL,
                last_played INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                play_count INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (artist_norm, title_norm)
            );
            CREATE INDEX IF NOT EXISTS idx_lyrics_cache_last_played
                ON lyrics_cache (last_played DESC);",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
            max_rows: MAX_CACHE_ROWS,
            path,
        })
    }

    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = max_rows;
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Cached lines for `key`, touching the row on a hit.
    pub fn lookup(&self, key: &TrackKey) -> Result<Option<Vec<LyricLine>>> {
        self.lookup_at(key, now_millis())
    }

    pub fn lookup_at(&self, key: &TrackKey, now_ms: i64) -> Result<Option<Vec<LyricLine>>> {
        if key.is_blank() {
            return Ok(None);
        }

        let conn = self.conn();
        let json: Option<String> = conn
            .query_row(
                "SELECT lyrics_json FROM lyrics_cache WHERE artist_norm = ?1 AND title_norm = ?2",
                params![key.artist, key.title],
                |row| row.get(0),
            )
            .optional()?;

        let Some(json) = json else {
            return Ok(None);
        };

        conn.execute(
            "UPDATE lyrics_cache
             SET last_played = ?1, play_count = play_count + 1
             WHERE artist_norm = ?2 AND title_norm = ?3",
            params![now_ms, key.artist, key.title],
        )?;

        match serde_json::from_str::<Vec<LyricLine>>(&json) {
            Ok(lines) if !lines.is_empty() => Ok(Some(lines)),
            Ok(_) => Ok(None),
            Err(e) => {
                warn!(%key, "Unreadable cached lyrics, treating as miss: {}", e);
                Ok(None)
            }
        }
    }

    /// Insert or replace the lines for a track, then prune.
    pub fn store(&self, artist: &str, title: &str, lines: &[LyricLine]) -> Result<()> {
        self.store_at(artist, title, lines, now_millis())
    }

    pub fn store_at(&self, artist: &str, title: &str, lines: &[LyricLine], now_ms: i64) -> Result<()> {
        let key = TrackKey::new(artist, title);
        if lines.is_empty() || key.is_blank() {
            return Ok(());
        }

        let json = serde_json::to_string(lines)?;
        let conn = self.conn();
        conn.execute(
            "INSERT INTO lyrics_cache
                (artist, title, artist_norm, title_norm, lyrics_json, last_played, updated_at, play_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, 1)
             ON CONFLICT(artist_norm, title_norm) DO UPDATE SET
                artist = excluded.artist,
                title = excluded.title,
                lyrics_json = excluded.lyrics_json,
                last_played = excluded.last_played,
                updated_at = excluded.updated_at,
                play_count = lyrics_cache.play_count + 1",
            params![artist, title, key.artist, key.title, json, now_ms],
        )?;
        info!(%key, lines = lines.len(), "Lyrics cache SAVE");

        let pruned = prune(&conn, self.max_rows)?;
        if pruned > 0 {
            debug!(pruned, "Pruned lyrics cache");
        }
        Ok(())
    }

    pub fn entry(&self, key: &TrackKey) -> Result<Option<LyricsCacheEntry>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT artist, title, lyrics_json, last_played, updated_at, play_count
                 FROM lyrics_cache WHERE artist_norm = ?1 AND title_norm = ?2",
                params![key.artist, key.title],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, i64>(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((artist, title, json, last_played_at, updated_at, play_count)) = row else {
            return Ok(None);
        };

        Ok(Some(LyricsCacheEntry {
            key: key.clone(),
            artist,
            title,
            lines: serde_json::from_str(&json)?,
            last_played_at,
            updated_at,
            play_count,
        }))
    }

    pub fn len(&self) -> Result<usize> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM lyrics_cache", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// Keep only the `max_rows` most recently played rows.
fn prune(conn: &Connection, max_rows: usize) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM lyrics_cache
         WHERE rowid IN (
             SELECT rowid FROM lyrics_cache
             ORDER BY last_played DESC, rowid DESC
             LIMIT -1 OFFSET ?1
         )",
        params![max_rows as i64],
    )?;
    Ok(deleted)
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
