use super::LyricsProvider;
use crate::error::Result;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_LRCLIB_URL: &str = "https://lrclib.net";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(6);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(8);
const USER_AGENT: &str = concat!("vinyl-companion/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
pub struct LrclibResponse {
    #[serde(rename = "syncedLyrics")]
    pub synced_lyrics: Option<String>,
    #[serde(default)]
    pub instrumental: bool,
}

impl LrclibResponse {
    /// Synced LRC text if the entry has any. Instrumentals never do.
    pub fn synced_text(self) -> Option<String> {
        if self.instrumental {
            return None;
        }
        self.synced_lyrics.filter(|text| !text.trim().is_empty())
    }
}

/// LRCLIB exact-match lookup (`/api/get`).
pub struct LrclibProvider {
    client: Client,
    base_url: String,
}

impl LrclibProvider {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/api/get", self.base_url)
    }
}

#[async_trait]
impl LyricsProvider for LrclibProvider {
    async fn fetch_synced(&self, artist: &str, title: &str) -> Result<Option<String>> {
        let params = [("artist_name", artist), ("track_name", title)];

        let resp = self.client.get(self.endpoint()).query(&params).send().await?;
        if resp.status() != StatusCode::OK {
            debug!(status = %resp.status(), "LRCLIB returned no match");
            return Ok(None);
        }

        let data: LrclibResponse = resp.json().await?;
        Ok(data.synced_text())
    }
}
