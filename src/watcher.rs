//! Live media snapshot acquisition.
//!
//! The watcher owns one background task that either polls a [`PollSource`]
//! on a fixed interval or holds a [`PushSource`] subscription open. Either
//! way it is the only writer of the "latest" snapshot, which readers see
//! through a `watch` channel.

use crate::player::{ControlCommand, ControlPort, MediaSnapshot, MediaSource, PollSource, PushSource};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Starting,
    Active,
    ShuttingDown,
}

impl WatcherState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Starting,
            1 => Self::Active,
            _ => Self::ShuttingDown,
        }
    }
}

pub struct MediaWatcher {
    source: MediaSource,
    control: Arc<dyn ControlPort>,
    poll_interval: Duration,
    latest: watch::Sender<Arc<MediaSnapshot>>,
    state: AtomicU8,
    token: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MediaWatcher {
    pub fn new(source: MediaSource, control: Arc<dyn ControlPort>) -> Self {
        let (latest, _) = watch::channel(Arc::new(MediaSnapshot::stopped()));
        Self {
            source,
            control,
            poll_interval: DEFAULT_POLL_INTERVAL,
            latest,
            state: AtomicU8::new(WatcherState::Starting as u8),
            token: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn state(&self) -> WatcherState {
        WatcherState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_running(&self) -> bool {
        self.state() != WatcherState::ShuttingDown
    }

    /// Start acquisition in the background. Returns immediately; calling it
    /// again (or after shutdown) does nothing.
    pub fn start(self: &Arc<Self>) {
        let mut task = match self.task.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if task.is_some() || !self.is_running() {
            return;
        }

        let _ = self.state.compare_exchange(
            WatcherState::Starting as u8,
            WatcherState::Active as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );

        let watcher = Arc::clone(self);
        *task = Some(tokio::spawn(async move {
            match watcher.source.clone() {
                MediaSource::Poll(source) => watcher.run_poll_mode(source).await,
                MediaSource::Push(source) => watcher.run_push_mode(source).await,
            }
            debug!("media watcher task finished");
        }));
    }

    /// Last dispatched snapshot (empty STOPPED before the first update).
    pub fn latest(&self) -> Arc<MediaSnapshot> {
        self.latest.borrow().clone()
    }

    /// Receiver that wakes on every dispatched snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<MediaSnapshot>> {
        self.latest.subscribe()
    }

    fn dispatch(&self, snapshot: MediaSnapshot) {
        self.latest.send_replace(Arc::new(snapshot));
    }

    async fn run_poll_mode(&self, source: Arc<dyn PollSource>) {
        while self.is_running() {
            let poll_source = Arc::clone(&source);
            match tokio::task::spawn_blocking(move || poll_source.poll()).await {
                Ok(Ok(snapshot)) => self.dispatch(snapshot),
                Ok(Err(e)) => {
                    warn!("Error fetching media info: {:#}", e);
                    self.dispatch(MediaSnapshot::stopped());
                }
                Err(e) => {
                    warn!("Media poll task failed: {}", e);
                    self.dispatch(MediaSnapshot::stopped());
                }
            }

            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    async fn run_push_mode(&self, source: Arc<dyn PushSource>) {
        let (sink, mut updates) = watch::channel(None);

        // Held until this function returns; dropping it unsubscribes.
        let _subscription = match source.subscribe(sink) {
            Ok(subscription) => subscription,
            Err(e) => {
                error!("Error subscribing media info: {:#}", e);
                self.dispatch(MediaSnapshot::stopped());
                return;
            }
        };

        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                changed = updates.changed() => {
                    if changed.is_err() {
                        warn!("Media source closed its subscription; idling until shutdown");
                        self.token.cancelled().await;
                        break;
                    }
                    let snapshot = updates.borrow_and_update().clone();
                    if let Some(snapshot) = snapshot {
                        self.dispatch(snapshot);
                    }
                }
            }
        }
    }

    /// Forward a command to the control port, propagating failures.
    /// Blocks while the port works; async callers use `spawn_blocking`.
    pub fn execute(&self, command: ControlCommand) -> anyhow::Result<()> {
        self.control.execute(command)
    }

    fn execute_logged(&self, command: ControlCommand) {
        if let Err(e) = self.control.execute(command) {
            warn!(action = command.action(), "Control command failed: {:#}", e);
        }
    }

    pub fn next(&self) {
        self.execute_logged(ControlCommand::Next);
    }

    pub fn previous(&self) {
        self.execute_logged(ControlCommand::Previous);
    }

    pub fn play_pause(&self) {
        self.execute_logged(ControlCommand::PlayPause);
    }

    pub fn seek_to_seconds(&self, seconds: f64) {
        self.execute_logged(ControlCommand::Seek(seconds));
    }

    pub fn open_current_in_browser(&self) {
        self.execute_logged(ControlCommand::FocusSource);
    }

    /// Try to get playback going after startup. Each attempt waits
    /// `interval`, then toggles play only if the host is still not playing.
    pub fn attempt_autoplay_if_stopped(self: &Arc<Self>, retries: u32, interval: Duration) -> JoinHandle<()> {
        let watcher = Arc::clone(self);
        tokio::spawn(async move {
            for attempt in 1..=retries {
                tokio::select! {
                    _ = watcher.token.cancelled() => return,
                    _ = tokio::time::sleep(interval) => {}
                }

                if !watcher.is_running() {
                    return;
                }
                if watcher.latest().is_playing() {
                    debug!(attempt, "Already playing, autoplay not needed");
                    return;
                }

                let control = Arc::clone(&watcher.control);
                match tokio::task::spawn_blocking(move || control.play_pause()).await {
                    Ok(Ok(())) => info!(attempt, "Startup autoplay attempted"),
                    Ok(Err(e)) => warn!(attempt, "Startup autoplay failed: {:#}", e),
                    Err(e) => warn!(attempt, "Startup autoplay task failed: {}", e),
                }
            }
        })
    }

    /// Pause the host if it is currently playing. Used right before shutdown.
    pub fn autopause_if_playing(&self) {
        if !self.latest().is_playing() {
            return;
        }

        match self.control.play_pause() {
            Ok(()) => info!("Shutdown autopause executed"),
            Err(e) => warn!("Shutdown autopause failed: {:#}", e),
        }
    }

    /// Stop acquisition. Safe to call more than once.
    pub fn shutdown(&self) {
        let previous = self.state.swap(WatcherState::ShuttingDown as u8, Ordering::SeqCst);
        if WatcherState::from_u8(previous) != WatcherState::ShuttingDown {
            info!("Media watcher shutting down");
        }
        self.token.cancel();
    }

    /// Wait for the acquisition task to finish (after `shutdown`).
    pub async fn join(&self) {
        let handle = match self.task.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}
