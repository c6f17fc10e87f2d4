//! Bounded restart policy after output device failures

use crate::constants::{
    MAX_RESTARTS, RESTART_BACKOFF_INITIAL, RESTART_BACKOFF_MAX, RESTART_BACKOFF_MULTIPLIER,
};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    pub enabled: bool,
    /// Restarts allowed per airing
    pub max_restarts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_restarts: MAX_RESTARTS,
            initial_backoff: RESTART_BACKOFF_INITIAL,
            max_backoff: RESTART_BACKOFF_MAX,
        }
    }
}

impl RestartPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Delay before restart number `attempt + 1`, or `None` when the budget
    /// is spent.
    ///
    /// The first restart is immediate, the following ones back off
    /// exponentially from `initial_backoff` up to `max_backoff`.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if !self.enabled || attempt >= self.max_restarts {
            return None;
        }
        if attempt == 0 {
            return Some(Duration::ZERO);
        }
        let mut delay = self.initial_backoff;
        for _ in 1..attempt {
            delay = delay.saturating_mul(RESTART_BACKOFF_MULTIPLIER);
            if delay >= self.max_backoff {
                return Some(self.max_backoff);
            }
        }
        Some(delay.min(self.max_backoff))
    }
}
