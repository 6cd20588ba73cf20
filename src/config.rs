use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

pub const APP_DIR: &str = "vinyl-companion";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const FALLBACK_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8750;
pub const DEFAULT_TOKEN: &str = "token-prueba";

pub const ENV_HOST: &str = "VINYL_API_HOST";
pub const ENV_PORT: &str = "VINYL_API_PORT";
pub const ENV_WS_PORT: &str = "VINYL_WS_PORT";
pub const ENV_TOKEN: &str = "VINYL_API_TOKEN";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    /// Defaults to `port + 1`
    pub ws_port: Option<u16>,
    pub token: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            ws_port: None,
            token: DEFAULT_TOKEN.to_string(),
        }
    }
}

impl ApiConfig {
    pub fn ws_port(&self) -> u16 {
        self.ws_port
            .filter(|p| *p != 0)
            .unwrap_or_else(|| self.port.saturating_add(1))
    }

    /// Blank host and token fall back to defaults, port 0 means default.
    pub fn normalize(&mut self) {
        let host = self.host.trim();
        self.host = if host.is_empty() { FALLBACK_HOST.to_string() } else { host.to_string() };

        let token = self.token.trim();
        self.token = if token.is_empty() { DEFAULT_TOKEN.to_string() } else { token.to_string() };

        if self.port == 0 {
            self.port = DEFAULT_PORT;
        }
        if self.ws_port == Some(0) {
            self.ws_port = None;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Cycle through built-in demo tracks instead of a real reader
    pub demo: bool,
    pub reader: Option<PathBuf>,
    pub controller: Option<PathBuf>,
    pub poll_interval_ms: u64,
    pub autoplay: bool,
    pub autoplay_retries: u32,
    pub autoplay_interval_ms: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            demo: false,
            reader: None,
            controller: None,
            poll_interval_ms: 500,
            autoplay: true,
            autoplay_retries: 3,
            autoplay_interval_ms: 700,
        }
    }
}

impl MediaConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn autoplay_interval(&self) -> Duration {
        Duration::from_millis(self.autoplay_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LyricsConfig {
    pub cache_db: Option<PathBuf>,
    pub base_url: String,
}

impl Default for LyricsConfig {
    fn default() -> Self {
        Self {
            cache_db: None,
            base_url: crate::lyrics::lrclib::DEFAULT_LRCLIB_URL.to_string(),
        }
    }
}

impl LyricsConfig {
    pub fn cache_path(&self) -> PathBuf {
        self.cache_db
            .clone()
            .unwrap_or_else(|| data_dir().join("lyrics-cache.db"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub lyrics: LyricsConfig,
}

impl AppConfig {
    pub fn get_config_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(APP_DIR);
        path.push("config.toml");
        path
    }

    /// Config file if present and readable, defaults otherwise.
    pub fn load() -> Self {
        let path = Self::get_config_path();
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => {
                debug!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                warn!("Ignoring config file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Apply `VINYL_*` variables from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup(ENV_HOST) {
            self.api.host = host;
        }
        if let Some(raw) = lookup(ENV_PORT) {
            self.api.port = parse_port(&raw).unwrap_or(DEFAULT_PORT);
        }
        if let Some(raw) = lookup(ENV_WS_PORT) {
            self.api.ws_port = parse_port(&raw);
        }
        if let Some(token) = lookup(ENV_TOKEN) {
            self.api.token = token;
        }
    }

    pub fn normalize(&mut self) {
        self.api.normalize();
    }
}

/// A usable TCP port, or `None` for garbage and 0.
pub fn parse_port(raw: &str) -> Option<u16> {
    raw.trim().parse::<u16>().ok().filter(|p| *p != 0)
}

/// `<data_dir>/vinyl-companion`, home of the lyrics cache and log files.
pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.api.host, "0.0.0.0");
        assert_eq!(config.api.port, 8750);
        assert_eq!(config.api.ws_port(), 8751);
        assert_eq!(config.api.token, "token-prueba");
        assert_eq!(config.media.autoplay_retries, 3);
        assert_eq!(config.media.autoplay_interval(), Duration::from_millis(700));
        assert_eq!(config.lyrics.base_url, "https://lrclib.net");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[api]\nport = 9000\n\n[media]\ndemo = true\n").unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.api.port, 9000);
        assert_eq!(config.api.ws_port(), 9001);
        assert_eq!(config.api.token, DEFAULT_TOKEN);
        assert!(config.media.demo);
        assert!(config.media.autoplay);
    }

    #[test]
    fn test_bad_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[api]\nport = \"nope\"").unwrap();
        assert!(matches!(AppConfig::load_from(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_env_overrides_and_fallbacks() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_HOST, "   "),
            (ENV_PORT, "not-a-port"),
            (ENV_WS_PORT, "9100"),
            (ENV_TOKEN, " secret "),
        ]);
        let mut config = AppConfig::default();
        config.api.port = 9000;
        config.apply_env_with(|k| env.get(k).map(|v| v.to_string()));
        config.normalize();

        assert_eq!(config.api.host, FALLBACK_HOST);
        assert_eq!(config.api.port, DEFAULT_PORT);
        assert_eq!(config.api.ws_port(), 9100);
        assert_eq!(config.api.token, "secret");
    }

    #[test]
    fn test_blank_token_and_zero_port_normalize() {
        let mut api = ApiConfig {
            host: "192.168.1.20".into(),
            port: 0,
            ws_port: Some(0),
            token: "".into(),
        };
        api.normalize();
        assert_eq!(api.host, "192.168.1.20");
        assert_eq!(api.port, DEFAULT_PORT);
        assert_eq!(api.ws_port(), DEFAULT_PORT + 1);
        assert_eq!(api.token, DEFAULT_TOKEN);
    }

    #[test]
    fn test_parse_port() {
        assert_eq!(parse_port(" 8080 "), Some(8080));
        assert_eq!(parse_port("0"), None);
        assert_eq!(parse_port("70000"), None);
        assert_eq!(parse_port(""), None);
    }
}
