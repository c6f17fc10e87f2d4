//! Error types for the streaming pipeline

use std::io;

/// Result type alias for streaming operations
pub type Result<T> = std::result::Result<T, StreamError>;

/// Errors that can occur while fetching, decoding, playing or capturing a stream
///
/// Payloads are kept as strings so events carrying an error can be cloned and
/// fanned out to several observers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// Network failure that was not caused by a stop request
    #[error("Transport error: {0}")]
    Transport(String),

    /// The fetch was stopped on purpose
    #[error("Stream cancelled")]
    Cancelled,

    /// Malformed or undecodable stream data
    #[error("Decode error: {0}")]
    Decode(String),

    /// Output device fault (driver reset, device unplugged...)
    #[error("Output device error: {0}")]
    Device(String),

    /// Capture file could not be written
    #[error("Capture error: {0}")]
    Capture(String),

    /// Record/Play requested while a session is already running
    #[error("Recorder already active ({0})")]
    AlreadyActive(String),

    /// No source URL configured
    #[error("No stream URL configured")]
    NoSource,

    /// A background task panicked or could not be joined
    #[error("{role} task failed: {details}")]
    TaskJoin { role: &'static str, details: String },
}

impl StreamError {
    /// `true` for failures caused by an intentional stop
    pub fn is_cancellation(&self) -> bool {
        matches!(self, StreamError::Cancelled)
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn device(msg: impl Into<String>) -> Self {
        Self::Device(msg.into())
    }
}

impl From<reqwest::Error> for StreamError {
    fn from(err: reqwest::Error) -> Self {
        StreamError::Transport(err.to_string())
    }
}

impl From<hound::Error> for StreamError {
    fn from(err: hound::Error) -> Self {
        StreamError::Capture(err.to_string())
    }
}

impl From<io::Error> for StreamError {
    fn from(err: io::Error) -> Self {
        StreamError::Transport(format!("I/O error ({:?}): {}", err.kind(), err))
    }
}
