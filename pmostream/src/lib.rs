//! # pmostream - Live radio capture pipeline
//!
//! Fetches a compressed live stream over HTTP, decodes it frame by frame into
//! a bounded playout buffer and drains that buffer to a monitoring output and,
//! while recording, to a WAV file.
//!
//! ## Flow control
//!
//! - The fetcher idles (500 ms by default) while less than a quarter second
//!   of space is left in the buffer.
//! - Playback starts once more than 4 s are buffered and falls back to
//!   buffering below 0.5 s, unless the stream is fully downloaded.
//!
//! ## Example
//!
//! ```no_run
//! use pmostream::{ClockedOutput, EngineSettings, EventSink, HttpStreamSource, RecorderEngine};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), pmostream::StreamError> {
//!     let (events, mut rx) = EventSink::channel();
//!     let source = HttpStreamSource::new(vec!["http://radio.example.com/live.mp3"])?;
//!     let mut engine = RecorderEngine::new(
//!         EngineSettings::default(),
//!         Arc::new(source),
//!         Arc::new(ClockedOutput::default()),
//!         events,
//!     );
//!
//!     engine.record("/tmp/show.wav").await?;
//!     tokio::spawn(async move {
//!         while let Some(event) = rx.recv().await {
//!             println!("{:?}", event);
//!         }
//!     });
//!     tokio::time::sleep(std::time::Duration::from_secs(60)).await;
//!     engine.stop().await;
//!     Ok(())
//! }
//! ```

pub mod buffer;
pub mod capture;
pub mod constants;
pub mod decoder;
pub mod engine;
pub mod error;
pub mod events;
pub mod fetcher;
pub mod format;
pub mod output;
pub mod source;
pub mod state;

pub use buffer::{BufferPolicy, FlowDecision, PlayoutBuffer};
pub use capture::CaptureTap;
pub use decoder::{ChannelReader, DecodedFrame, FrameDecoder, Mp3FrameDecoder};
pub use engine::{EngineSettings, RecorderEngine};
pub use error::{Result, StreamError};
pub use events::{log_event, EngineEvent, EventSink};
pub use fetcher::{FetchHandle, FetchOutcome, FetchSettings, FetchShared, StreamFetcher};
pub use format::PcmFormat;
#[cfg(feature = "cpal")]
pub use output::CpalOutput;
pub use output::{
    ClockedOutput, DeviceFailureSink, OutputBackend, OutputDevice, PlaybackTap, TapRenderer,
};
pub use source::{Connection, HttpStreamSource, StreamSource};
pub use state::{RecorderState, StateCell};
