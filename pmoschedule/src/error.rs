//! Error types for schedule handling

use crate::show::ShowStatus;

/// Result type alias for schedule operations
pub type Result<T> = std::result::Result<T, ScheduleError>;

/// Errors that can occur while building or mutating a schedule
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    /// A time-of-day literal could not be parsed
    #[error("Invalid time of day '{0}' (expected HH:MM or HH:MM:SS)")]
    InvalidTime(String),

    /// Two shows share the same identifier
    #[error("Duplicate show id: {0}")]
    DuplicateId(u32),

    /// The requested status change is not in the transition table
    #[error("Invalid status transition for show {id}: {from:?} -> {to:?}")]
    InvalidTransition {
        id: u32,
        from: ShowStatus,
        to: ShowStatus,
    },

    /// No show with this identifier
    #[error("Show not found: {0}")]
    ShowNotFound(u32),
}
