pub mod artwork;
pub mod config;
pub mod error;
pub mod lyrics;
pub mod player;
pub mod position;
pub mod server;
pub mod watcher;

pub use error::{Error, Result};
