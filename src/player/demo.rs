use crate::player::traits::{ControlPort, MediaSnapshot, PlaybackStatus, PollSource};
use anyhow::Result;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

const DEMO_SONGS: [(&str, &str); 5] = [
    ("Daft Punk", "Get Lucky"),
    ("The Weeknd", "Blinding Lights"),
    ("Billie Eilish", "bad guy"),
    ("Post Malone", "Circles"),
    ("Tame Impala", "The Less I Know The Better"),
];

/// Poll source that rotates through a fixed playlist, one song per poll.
#[derive(Debug, Default)]
pub struct DemoSource {
    index: AtomicUsize,
}

impl DemoSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PollSource for DemoSource {
    fn poll(&self) -> Result<MediaSnapshot> {
        let i = self.index.fetch_add(1, Ordering::Relaxed) % DEMO_SONGS.len();
        let (artist, title) = DEMO_SONGS[i];
        Ok(MediaSnapshot::new(artist, title, PlaybackStatus::Playing, 0.0, 0.0, Vec::new()))
    }
}

/// Control port for demo mode: every command is logged and succeeds.
#[derive(Debug, Default)]
pub struct LoggingController;

impl ControlPort for LoggingController {
    fn next(&self) -> Result<()> {
        info!("Command 'next' executed (demo)");
        Ok(())
    }

    fn previous(&self) -> Result<()> {
        info!("Command 'previous' executed (demo)");
        Ok(())
    }

    fn play_pause(&self) -> Result<()> {
        info!("Command 'playpause' executed (demo)");
        Ok(())
    }

    fn seek_to_seconds(&self, seconds: f64) -> Result<()> {
        info!(seconds, "Command 'seek' executed (demo)");
        Ok(())
    }

    fn focus_source(&self) -> Result<()> {
        info!("Command 'focussource' executed (demo)");
        Ok(())
    }
}
