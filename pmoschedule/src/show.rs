//! Shows and their lifecycle status

use crate::error::{Result, ScheduleError};
use crate::window::{deserialize_time_of_day, serialize_time_of_day, TimeWindow};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Lifecycle status of a show for its current airing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShowStatus {
    #[default]
    Unknown,
    Started,
    Ended,
    /// Start or end could not be completed (file system error, no stream)
    Failed,
}

impl ShowStatus {
    /// Allowed status changes.
    ///
    /// ```text
    /// Unknown ─► Started ─► Ended ─► Started (next airing / restart)
    ///    │          │
    ///    └──────────┴──► Failed ─► Started
    /// ```
    pub fn can_transition_to(self, next: ShowStatus) -> bool {
        use ShowStatus::*;
        matches!(
            (self, next),
            (Unknown, Started)
                | (Unknown, Failed)
                | (Started, Ended)
                | (Started, Failed)
                | (Ended, Started)
                | (Failed, Started)
        )
    }
}

/// A scheduled program with a daily time-of-day window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Show {
    pub id: u32,
    pub title: String,
    #[serde(
        serialize_with = "serialize_time_of_day",
        deserialize_with = "deserialize_time_of_day"
    )]
    pub start: NaiveTime,
    #[serde(
        serialize_with = "serialize_time_of_day",
        deserialize_with = "deserialize_time_of_day"
    )]
    pub end: NaiveTime,
    #[serde(skip)]
    status: ShowStatus,
    #[serde(skip)]
    file_path: Option<PathBuf>,
}

impl Show {
    pub fn new(id: u32, title: impl Into<String>, start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            id,
            title: title.into(),
            start,
            end,
            status: ShowStatus::Unknown,
            file_path: None,
        }
    }

    /// Builds a show from `HH:MM[:SS]` literals
    pub fn parse(id: u32, title: impl Into<String>, start: &str, end: &str) -> Result<Self> {
        let window = TimeWindow::parse(start, end)?;
        Ok(Self::new(id, title, window.start, window.end))
    }

    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.start, self.end)
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        self.window().contains(time)
    }

    pub fn status(&self) -> ShowStatus {
        self.status
    }

    /// Path of the capture file of the current (or last) airing
    pub fn file_path(&self) -> Option<&PathBuf> {
        self.file_path.as_ref()
    }

    pub fn set_file_path(&mut self, path: Option<PathBuf>) {
        self.file_path = path;
    }

    /// Moves the show to `next`, rejecting changes outside the transition table.
    pub fn transition(&mut self, next: ShowStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(ScheduleError::InvalidTransition {
                id: self.id,
                from: self.status,
                to: next,
            });
        }
        tracing::trace!(show = %self.title, from = ?self.status, to = ?next, "Show status change");
        self.status = next;
        Ok(())
    }

    /// Forgets the airing state, used when a schedule is refreshed
    pub fn reset(&mut self) {
        self.status = ShowStatus::Unknown;
        self.file_path = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table() {
        use ShowStatus::*;
        let all = [Unknown, Started, Ended, Failed];
        let allowed = [
            (Unknown, Started),
            (Unknown, Failed),
            (Started, Ended),
            (Started, Failed),
            (Ended, Started),
            (Failed, Started),
        ];
        for from in all {
            for to in all {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{:?} -> {:?}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_invalid_transition_is_rejected() {
        let mut show = Show::parse(1, "Morning", "05:30", "10:00").unwrap();
        let err = show.transition(ShowStatus::Ended).unwrap_err();
        assert_eq!(
            err,
            ScheduleError::InvalidTransition {
                id: 1,
                from: ShowStatus::Unknown,
                to: ShowStatus::Ended
            }
        );
        assert_eq!(show.status(), ShowStatus::Unknown);

        show.transition(ShowStatus::Started).unwrap();
        assert!(show.transition(ShowStatus::Started).is_err());
        show.transition(ShowStatus::Ended).unwrap();
        assert!(show.transition(ShowStatus::Ended).is_err());
        show.transition(ShowStatus::Started).unwrap();
    }

    #[test]
    fn test_deserialize_from_yaml() {
        let yaml = "id: 3\ntitle: Late Jazz\nstart: \"23:00\"\nend: \"01:00:00\"\n";
        let show: Show = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(show.id, 3);
        assert_eq!(show.title, "Late Jazz");
        assert!(show.window().crosses_midnight());
        assert_eq!(show.status(), ShowStatus::Unknown);
        assert!(show.file_path().is_none());
    }

    #[test]
    fn test_reset_clears_airing_state() {
        let mut show = Show::parse(1, "Morning", "05:30", "10:00").unwrap();
        show.transition(ShowStatus::Started).unwrap();
        show.set_file_path(Some(PathBuf::from("/tmp/a.wav")));
        show.reset();
        assert_eq!(show.status(), ShowStatus::Unknown);
        assert!(show.file_path().is_none());
    }
}
