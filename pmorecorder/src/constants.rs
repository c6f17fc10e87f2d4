//! Scheduler defaults

use std::time::Duration;

/// Period of the schedule evaluation
pub const TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Restarts attempted per airing after a device failure
pub const MAX_RESTARTS: u32 = 3;

/// Delay before the second restart; the first one is immediate
pub const RESTART_BACKOFF_INITIAL: Duration = Duration::from_secs(2);

pub const RESTART_BACKOFF_MAX: Duration = Duration::from_secs(60);

pub const RESTART_BACKOFF_MULTIPLIER: u32 = 2;

/// Headroom the playout buffer keeps above the resume threshold; the fetch
/// throttles within a quarter second of full
pub const BUFFER_HEADROOM: Duration = Duration::from_millis(500);

/// Dated recording directories kept by the retention pass (0 disables it)
pub const DAYS_TO_KEEP: u32 = 7;

/// Format of the per-day recording directory and of the date token in file names
pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub const RECORDING_EXTENSION: &str = "wav";

/// Capacity of the scheduler event broadcast
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

pub const COMMAND_CHANNEL_CAPACITY: usize = 8;
