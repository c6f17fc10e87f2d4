//! Default tuning of the streaming pipeline

use std::time::Duration;

/// Audio held by the playout buffer
pub const BUFFER_CAPACITY: Duration = Duration::from_secs(20);

/// Occupancy above which buffering turns into playback
pub const RESUME_THRESHOLD: Duration = Duration::from_secs(4);

/// Occupancy below which playback goes back to buffering
pub const REBUFFER_THRESHOLD: Duration = Duration::from_millis(500);

/// Fetcher idle time when the buffer is near full
pub const THROTTLE_DELAY: Duration = Duration::from_millis(500);

/// Period of the buffering policy checks
pub const MONITOR_INTERVAL: Duration = Duration::from_millis(250);

/// Period of the occupancy debug log while a session runs
pub const OCCUPANCY_REPORT_INTERVAL: Duration = Duration::from_secs(10);

/// Upper bound on the wait for background tasks after a stop
pub const STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Render period of the clocked (device-less) output
pub const CLOCKED_OUTPUT_PERIOD: Duration = Duration::from_millis(20);

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Body chunks queued between the HTTP reader and the decoder
pub const INGEST_CHANNEL_CAPACITY: usize = 8;

pub const USER_AGENT: &str = concat!("PMORecorder/", env!("CARGO_PKG_VERSION"));
