use crate::player::controller::launcher;
use crate::player::traits::{MediaSnapshot, PlaybackStatus, PushSource, Subscription};
use anyhow::{Context, Result};
use base64::Engine;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const STOP_TIMEOUT: Duration = Duration::from_millis(1200);

/// One line of media-reader output.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ReaderLine {
    artist: Option<String>,
    title: Option<String>,
    status: Option<String>,
    position: Option<f64>,
    duration: Option<f64>,
    /// Base64 encoded cover art
    thumbnail: Option<String>,
}

/// Push source backed by a long-running media-reader process that prints one
/// JSON snapshot per line on stdout.
#[derive(Debug, Clone)]
pub struct ReaderSource {
    executable: PathBuf,
    stop_timeout: Duration,
}

impl ReaderSource {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            stop_timeout: STOP_TIMEOUT,
        }
    }

    /// Grace period between the stop request and the forced kill.
    pub fn with_stop_timeout(mut self, stop_timeout: Duration) -> Self {
        self.stop_timeout = stop_timeout;
        self
    }
}

impl PushSource for ReaderSource {
    fn subscribe(&self, sink: watch::Sender<Option<MediaSnapshot>>) -> Result<Subscription> {
        if !self.executable.exists() {
            anyhow::bail!("media-reader not found at {}", self.executable.display());
        }

        let mut cmd = tokio::process::Command::from(launcher(&self.executable));
        cmd.env("DOTNET_CLI_UI_LANGUAGE", "en-US")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to launch {}", self.executable.display()))?;
        let stdout = child.stdout.take().context("media-reader stdout unavailable")?;
        let stderr = child.stderr.take().context("media-reader stderr unavailable")?;

        info!(path = %self.executable.display(), "Using media reader");

        let token = CancellationToken::new();
        tokio::spawn(forward_stderr(stderr, token.clone()));
        tokio::spawn(read_snapshots(child, stdout, sink, token.clone(), self.stop_timeout));

        Ok(Subscription::new(move || token.cancel()))
    }
}

async fn read_snapshots(
    mut child: Child,
    stdout: impl AsyncRead + Unpin,
    sink: watch::Sender<Option<MediaSnapshot>>,
    token: CancellationToken,
    stop_timeout: Duration,
) {
    let mut lines = BufReader::new(stdout).lines();

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match parse_reader_line(&line) {
                        Ok(snapshot) => {
                            sink.send_replace(Some(snapshot));
                        }
                        Err(e) => warn!("media-reader invalid JSON line: {}", e),
                    }
                }
                Ok(None) => {
                    warn!("media-reader stream ended");
                    sink.send_replace(Some(MediaSnapshot::stopped()));
                    break;
                }
                Err(e) => {
                    warn!("media-reader stream stopped: {}", e);
                    sink.send_replace(Some(MediaSnapshot::stopped()));
                    break;
                }
            }
        }
    }

    stop_process(&mut child, stop_timeout).await;
}

async fn forward_stderr(stderr: impl AsyncRead + Unpin, token: CancellationToken) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) if !line.trim().is_empty() => warn!("[media-reader] {}", line),
                Ok(Some(_)) => {}
                _ => break,
            }
        }
    }
}

/// Ask the reader to exit, then force it once `stop_timeout` has passed.
async fn stop_process(child: &mut Child, stop_timeout: Duration) {
    if let Ok(Some(status)) = child.try_wait() {
        debug!(%status, "media-reader already exited");
        return;
    }

    // 1. Graceful
    request_stop(child);
    match tokio::time::timeout(stop_timeout, child.wait()).await {
        Ok(Ok(status)) => {
            info!(%status, "media-reader process stopped correctly");
            return;
        }
        Ok(Err(e)) => {
            warn!("media-reader wait failed: {}", e);
            return;
        }
        Err(_) => warn!("media-reader ignored the stop request, killing it"),
    }

    // 2. Forced
    if let Err(e) = child.start_kill() {
        warn!("media-reader kill failed: {}", e);
    }
    match tokio::time::timeout(stop_timeout, child.wait()).await {
        Ok(Ok(_)) => info!("media-reader process killed"),
        Ok(Err(e)) => warn!("media-reader wait failed: {}", e),
        Err(_) => warn!("media-reader process is still alive after shutdown attempt"),
    }
}

#[cfg(unix)]
fn request_stop(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else { return };
    if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        warn!("media-reader SIGTERM failed: {}", e);
    }
}

#[cfg(not(unix))]
fn request_stop(child: &mut Child) {
    // No terminate signal to send, so this is already the forced path
    if let Err(e) = child.start_kill() {
        warn!("media-reader kill failed: {}", e);
    }
}

/// Parse one stdout line into a snapshot. Missing fields fall back to the
/// empty/STOPPED defaults; an undecodable thumbnail is dropped.
fn parse_reader_line(line: &str) -> Result<MediaSnapshot> {
    let data: ReaderLine = serde_json::from_str(line.trim())?;

    let thumbnail = match data.thumbnail.as_deref().map(str::trim) {
        Some(encoded) if !encoded.is_empty() => base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .unwrap_or_else(|e| {
                debug!("media-reader thumbnail is not valid base64: {}", e);
                Vec::new()
            }),
        _ => Vec::new(),
    };

    Ok(MediaSnapshot::new(
        data.artist.unwrap_or_default(),
        data.title.unwrap_or_default(),
        PlaybackStatus::parse_lenient(data.status.as_deref().unwrap_or("")),
        data.position.unwrap_or(0.0),
        data.duration.unwrap_or(0.0),
        thumbnail,
    ))
}
