use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vinyl_companion::config::{self, AppConfig, MediaConfig};
use vinyl_companion::lyrics::{spawn_lyrics_worker, LrclibProvider, LyricsCache, LyricsResolver, LyricsTracker};
use vinyl_companion::player::{
    locate_controller, locate_reader, ControlPort, DemoSource, LoggingController, MediaSource,
    ProcessController, ReaderSource,
};
use vinyl_companion::server::StateServer;
use vinyl_companion::watcher::MediaWatcher;

/// vinyl-companion - what's playing, with synced lyrics and HD cover art 🎵
#[derive(Parser, Debug)]
#[command(name = "vinyl-companion", version, about)]
struct Args {
    /// Listen host (default: 0.0.0.0)
    #[arg(long)]
    host: Option<String>,

    /// HTTP port (default: 8750)
    #[arg(long, short = 'p')]
    port: Option<u16>,

    /// WebSocket port (default: HTTP port + 1)
    #[arg(long)]
    ws_port: Option<u16>,

    /// Shared API token for control and WebSocket clients
    #[arg(long)]
    token: Option<String>,

    /// Cycle through demo tracks instead of reading the host's media session
    #[arg(long)]
    demo: bool,

    /// Media reader executable (or .dll) that streams JSON snapshots
    #[arg(long, value_name = "PATH")]
    reader: Option<PathBuf>,

    /// Media controller executable (or .dll) used for playback commands
    #[arg(long, value_name = "PATH")]
    controller: Option<PathBuf>,

    /// Lyrics cache database file
    #[arg(long, value_name = "PATH")]
    cache_db: Option<PathBuf>,

    /// Don't try to start playback on launch
    #[arg(long)]
    no_autoplay: bool,
}

impl Args {
    /// CLI flags win over the file and the environment.
    fn apply(&self, config: &mut AppConfig) {
        if let Some(host) = &self.host {
            config.api.host = host.clone();
        }
        if let Some(port) = self.port {
            config.api.port = port;
        }
        if let Some(ws_port) = self.ws_port {
            config.api.ws_port = Some(ws_port);
        }
        if let Some(token) = &self.token {
            config.api.token = token.clone();
        }
        if self.demo {
            config.media.demo = true;
        }
        if let Some(reader) = &self.reader {
            config.media.reader = Some(reader.clone());
        }
        if let Some(controller) = &self.controller {
            config.media.controller = Some(controller.clone());
        }
        if let Some(cache_db) = &self.cache_db {
            config.lyrics.cache_db = Some(cache_db.clone());
        }
        if self.no_autoplay {
            config.media.autoplay = false;
        }
    }
}

/// Console plus a daily log file. Keep the guard alive until exit.
fn init_tracing(log_dir: &Path) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("vinyl-companion")
        .filename_suffix("log")
        .build(log_dir);

    match appender {
        Ok(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        Err(e) => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
            warn!("File logging disabled ({}): {}", log_dir.display(), e);
            None
        }
    }
}

/// Pick the media source, its control port and the label shown to clients.
///
/// Configured paths win; otherwise the helpers are looked up in their usual
/// build folders.
fn select_media(media: &MediaConfig) -> (MediaSource, Arc<dyn ControlPort>, &'static str) {
    if media.demo {
        return demo_media();
    }

    let Some(reader) = media.reader.clone().or_else(locate_reader) else {
        warn!("No media reader configured or found, falling back to demo tracks");
        return demo_media();
    };

    let control: Arc<dyn ControlPort> = match media.controller.clone().or_else(locate_controller) {
        Some(path) => {
            info!("Media controller: {}", path.display());
            Arc::new(ProcessController::new(path))
        }
        None => {
            warn!("No media controller configured or found, control commands will only be logged");
            Arc::new(LoggingController)
        }
    };

    info!("Media reader: {}", reader.display());
    (
        MediaSource::Push(Arc::new(ReaderSource::new(reader))),
        control,
        "media-reader",
    )
}

fn demo_media() -> (MediaSource, Arc<dyn ControlPort>, &'static str) {
    info!("Demo mode: cycling through built-in tracks");
    (
        MediaSource::Poll(Arc::new(DemoSource::new())),
        Arc::new(LoggingController),
        "demo",
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    human_panic::setup_panic!();

    let args = Args::parse();
    let mut config = AppConfig::load();
    config.apply_env();
    args.apply(&mut config);
    config.normalize();

    let _log_guard = init_tracing(&config::data_dir().join("logs"));
    info!("Starting vinyl-companion v{}", env!("CARGO_PKG_VERSION"));

    // 1. Media acquisition 🎧
    let (source, control, source_label) = select_media(&config.media);
    let watcher = Arc::new(
        MediaWatcher::new(source, control).with_poll_interval(config.media.poll_interval()),
    );
    watcher.start();

    // 2. Lyrics: cache first, LRCLIB second 📜
    let cache_path = config.lyrics.cache_path();
    let cache = Arc::new(
        LyricsCache::open(&cache_path)
            .with_context(|| format!("Failed to open lyrics cache at {}", cache_path.display()))?,
    );
    let provider = Arc::new(
        LrclibProvider::new(config.lyrics.base_url.clone()).context("Failed to build lyrics client")?,
    );
    let resolver = Arc::new(LyricsResolver::new(cache, provider));
    let tracker = Arc::new(LyricsTracker::new());
    let lyrics_token = CancellationToken::new();
    let lyrics_worker = spawn_lyrics_worker(tracker.clone(), resolver, lyrics_token.clone());

    // 3. HTTP + WebSocket 🌐
    let server = Arc::new(StateServer::new(
        watcher.clone(),
        tracker,
        config.api.clone(),
        source_label,
    ));
    server.start().await.context("Failed to start local API")?;

    // 4. Startup policy
    if config.media.autoplay {
        watcher.attempt_autoplay_if_stopped(
            config.media.autoplay_retries,
            config.media.autoplay_interval(),
        );
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Shutdown requested");

    // 5. Pause first, then tear everything down
    let pausing = watcher.clone();
    if let Err(e) = tokio::task::spawn_blocking(move || pausing.autopause_if_playing()).await {
        warn!("Autopause task failed: {}", e);
    }

    server.shutdown();
    lyrics_token.cancel();
    watcher.shutdown();

    server.join().await;
    watcher.join().await;
    if let Err(e) = lyrics_worker.await {
        warn!("Lyrics worker ended abnormally: {}", e);
    }

    info!("Bye 👋");
    Ok(())
}
