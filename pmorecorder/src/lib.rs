//! # pmorecorder - Schedule-driven radio recorder
//!
//! Records a live radio stream according to a daily show schedule: one WAV
//! file per airing, named after the show and stamped with its actual start
//! and end times.
//!
//! ## Architecture
//!
//! ```text
//! SchedulerEngine (single task)
//!     ├── tick ─────────► Schedule (pmoschedule)
//!     ├── start/end ────► RecorderEngine (pmostream) ──► WAV capture
//!     ├── engine events ◄─┘
//!     └── SchedulerEvent ─► host (broadcast)
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use pmoconfig::Config;
//! use pmorecorder::{LocalClock, RecorderConfigExt, SchedulerEngine};
//! use pmostream::{ClockedOutput, EventSink, HttpStreamSource, RecorderEngine};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::load_config("")?;
//! let (events, engine_events) = EventSink::channel();
//! let engine = RecorderEngine::new(
//!     config.get_engine_settings()?,
//!     Arc::new(HttpStreamSource::new(config.get_source_urls()?)?),
//!     Arc::new(ClockedOutput::default()),
//!     events,
//! );
//!
//! let scheduler = SchedulerEngine::new(
//!     config.get_scheduler_settings()?,
//!     config.get_schedule()?,
//!     engine,
//!     engine_events,
//!     Arc::new(LocalClock),
//! )
//! .spawn();
//!
//! tokio::signal::ctrl_c().await?;
//! scheduler.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod cleanup;
pub mod clock;
pub mod config_ext;
pub mod constants;
pub mod error;
pub mod events;
pub mod files;
pub mod playlist;
pub mod restart;
pub mod scheduler;
pub mod station;

pub use cleanup::{remove_expired, CleanupReport};
pub use clock::{Clock, LocalClock, ManualClock};
pub use config_ext::RecorderConfigExt;
pub use error::{RecorderError, Result};
pub use events::SchedulerEvent;
pub use files::{finalize_show_file, prepare_show_file, show_file_path};
pub use playlist::load_playlist;
pub use restart::RestartPolicy;
pub use scheduler::{
    Recorder, SchedulerCommand, SchedulerEngine, SchedulerHandle, SchedulerSettings,
    SchedulerState,
};
pub use station::Station;
