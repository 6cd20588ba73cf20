//! Error types for the companion service.
//!
//! Adapters (reader process, control helper) speak `anyhow`; everything the
//! library hands back to callers goes through this enum.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file or value errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// SQLite lyrics cache errors
    #[error("Lyrics cache error: {0}")]
    Cache(#[from] rusqlite::Error),

    /// Remote lyrics provider errors
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Listener bind / serve errors
    #[error("Server error: {0}")]
    Server(String),
}

pub type Result<T> = std::result::Result<T, Error>;
