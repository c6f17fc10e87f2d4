//! Error types for the recorder

use pmoschedule::ScheduleError;
use pmostream::StreamError;
use std::path::PathBuf;

/// Result type alias for recorder operations
pub type Result<T> = std::result::Result<T, RecorderError>;

/// Errors that can occur while scheduling and archiving shows
#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    /// Directory creation, deletion or rename failed
    #[error("File system error on {}: {source}", path.display())]
    FileSystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration error (from pmoconfig/anyhow)
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),

    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    /// Playlist file could not be read or holds no URL
    #[error("Playlist error: {0}")]
    Playlist(String),
}

impl RecorderError {
    pub(crate) fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileSystem {
            path: path.into(),
            source,
        }
    }
}
