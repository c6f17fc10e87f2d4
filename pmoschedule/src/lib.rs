//! Daily broadcast schedule for PMORecorder
//!
//! This crate holds the pure, I/O-free part of the recorder: deciding
//! whether a time of day falls inside a show's broadcast window, and looking
//! shows up in a schedule that repeats every day.
//!
//! # Example
//!
//! ```
//! use chrono::NaiveTime;
//! use pmoschedule::{Schedule, Show};
//!
//! let schedule = Schedule::new(vec![
//!     Show::parse(1, "Morning", "05:30", "10:00").unwrap(),
//!     Show::parse(2, "Late Jazz", "23:00", "01:00").unwrap(),
//! ])
//! .unwrap();
//!
//! let half_past_midnight = NaiveTime::from_hms_opt(0, 30, 0).unwrap();
//! assert_eq!(
//!     schedule.find_current(half_past_midnight).map(|s| s.title.as_str()),
//!     Some("Late Jazz")
//! );
//! ```

pub mod error;
pub mod schedule;
pub mod show;
pub mod window;

pub use error::{Result, ScheduleError};
pub use schedule::Schedule;
pub use show::{Show, ShowStatus};
pub use window::{contains, hhmm, parse_time_of_day, TimeWindow};
