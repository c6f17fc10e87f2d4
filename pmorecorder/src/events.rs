//! Events published by the scheduler to its host

use pmoschedule::Show;
use pmostream::StreamError;
use tracing::Level;

#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerEvent {
    /// A show's capture (or monitoring) has begun
    ShowStarted(Show),

    /// A show has ended; `file_path` holds the renamed recording
    ShowEnded(Show),

    /// No show is on air. Fired once each time the scheduler goes idle.
    Idle { next: Option<Show> },

    /// Informational message relayed from the recorder engine
    Recorder { message: String, level: Level },

    /// Failure relayed from the recorder engine
    RecorderException(StreamError),
}
