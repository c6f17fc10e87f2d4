//! Transport state of the recorder engine

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RecorderState {
    /// No session running
    #[default]
    Stopped,
    /// Fetching, output held until enough audio is buffered
    Buffering,
    Playing,
    /// Output held on request; the fetch keeps running
    Paused,
}

impl RecorderState {
    /// `true` while a session owns a fetch task
    pub fn is_active(self) -> bool {
        !matches!(self, RecorderState::Stopped)
    }
}

impl fmt::Display for RecorderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecorderState::Stopped => "stopped",
            RecorderState::Buffering => "buffering",
            RecorderState::Playing => "playing",
            RecorderState::Paused => "paused",
        };
        f.write_str(name)
    }
}

/// State shared between the engine handle and its monitor task
#[derive(Debug, Clone, Default)]
pub struct StateCell {
    inner: Arc<Mutex<RecorderState>>,
}

impl StateCell {
    pub fn get(&self) -> RecorderState {
        *self.inner.lock()
    }

    pub fn set(&self, state: RecorderState) {
        *self.inner.lock() = state;
    }

    /// Sets `next` only if the state is still `expected`.
    pub fn compare_and_set(&self, expected: RecorderState, next: RecorderState) -> bool {
        let mut guard = self.inner.lock();
        if *guard != expected {
            return false;
        }
        *guard = next;
        true
    }
}
