//! Background fetch loop: network -> decoder -> playout buffer
//!
//! One fetcher runs per session. It is the only writer into the playout
//! buffer, which it allocates once the first decoded frame tells it the
//! format.

use crate::buffer::PlayoutBuffer;
use crate::decoder::FrameDecoder;
use crate::error::StreamError;
use crate::events::EventSink;
use crate::source::StreamSource;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How a fetch loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Clean end of stream, everything is in the buffer
    Completed,
    /// Stopped on request
    Cancelled,
    Failed(StreamError),
}

/// State the fetch loop shares with the rest of the session
#[derive(Debug, Default)]
pub struct FetchShared {
    buffer: OnceLock<Arc<PlayoutBuffer>>,
    fully_downloaded: AtomicBool,
    finished: AtomicBool,
}

impl FetchShared {
    /// Playout buffer, once the stream format is known
    pub fn buffer(&self) -> Option<&Arc<PlayoutBuffer>> {
        self.buffer.get()
    }

    pub fn is_fully_downloaded(&self) -> bool {
        self.fully_downloaded.load(Ordering::Acquire)
    }

    /// The fetch loop has exited, whatever the reason
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FetchSettings {
    pub capacity: Duration,
    pub throttle: Duration,
}

/// Spawns and owns one fetch loop
pub struct StreamFetcher {
    source: Arc<dyn StreamSource>,
    settings: FetchSettings,
    events: EventSink,
}

pub struct FetchHandle {
    shared: Arc<FetchShared>,
    join: JoinHandle<FetchOutcome>,
}

impl FetchHandle {
    pub fn shared(&self) -> &Arc<FetchShared> {
        &self.shared
    }

    /// Waits at most `timeout` for the loop to observe a stop.
    ///
    /// Returns `None` when the loop did not finish in time.
    pub async fn join(self, timeout: Duration) -> Option<FetchOutcome> {
        match tokio::time::timeout(timeout, self.join).await {
            Ok(Ok(outcome)) => Some(outcome),
            Ok(Err(err)) => Some(FetchOutcome::Failed(StreamError::TaskJoin {
                role: "fetch",
                details: err.to_string(),
            })),
            Err(_) => None,
        }
    }
}

impl StreamFetcher {
    pub fn new(source: Arc<dyn StreamSource>, settings: FetchSettings, events: EventSink) -> Self {
        Self {
            source,
            settings,
            events,
        }
    }

    /// Starts fetching on a background task until `cancel` fires or the
    /// stream ends.
    pub fn spawn(self, cancel: CancellationToken) -> FetchHandle {
        let shared = Arc::new(FetchShared::default());
        let task_shared = shared.clone();
        let join = tokio::spawn(async move {
            let outcome = self.run(&task_shared, cancel).await;
            task_shared.finished.store(true, Ordering::Release);
            outcome
        });
        FetchHandle { shared, join }
    }

    async fn run(self, shared: &Arc<FetchShared>, cancel: CancellationToken) -> FetchOutcome {
        let StreamFetcher {
            source,
            settings,
            events,
        } = self;

        events.info(format!("Connecting to {}", source.describe()));
        let connection = match source.connect(cancel.clone()).await {
            Ok(connection) => connection,
            Err(err) if err.is_cancellation() || cancel.is_cancelled() => {
                return FetchOutcome::Cancelled
            }
            Err(err) => {
                events.exception(err.clone());
                return FetchOutcome::Failed(err);
            }
        };

        events.info(format!("Connected to {}", connection.url));
        if let Some(name) = &connection.stream_name {
            events.info(format!("Stream name: {}", name));
        }

        let handle = Handle::current();
        let loop_shared = shared.clone();
        let decoder = connection.decoder;
        let blocking = tokio::task::spawn_blocking(move || {
            decode_loop(decoder, &loop_shared, settings, &events, &cancel, &handle)
        });

        match blocking.await {
            Ok(outcome) => outcome,
            Err(err) => FetchOutcome::Failed(StreamError::TaskJoin {
                role: "decode",
                details: err.to_string(),
            }),
        }
    }
}

fn decode_loop(
    mut decoder: Box<dyn FrameDecoder>,
    shared: &FetchShared,
    settings: FetchSettings,
    events: &EventSink,
    cancel: &CancellationToken,
    handle: &Handle,
) -> FetchOutcome {
    loop {
        if cancel.is_cancelled() {
            return FetchOutcome::Cancelled;
        }

        if shared.buffer().is_some_and(|b| b.near_full()) {
            handle.block_on(async {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(settings.throttle) => {}
                }
            });
            continue;
        }

        match decoder.next_frame() {
            Ok(Some(frame)) => {
                let buffer = shared.buffer.get_or_init(|| {
                    tracing::debug!(
                        "Stream format: {} Hz, {} channels, {} bits",
                        frame.format.sample_rate,
                        frame.format.channels,
                        frame.format.bits_per_sample
                    );
                    Arc::new(PlayoutBuffer::new(frame.format, settings.capacity))
                });
                if frame.format != buffer.format() {
                    tracing::warn!(
                        "Dropping frame with format {:?}, stream started as {:?}",
                        frame.format,
                        buffer.format()
                    );
                    continue;
                }
                buffer.push(&frame.pcm);
            }
            Ok(None) => {
                if cancel.is_cancelled() {
                    return FetchOutcome::Cancelled;
                }
                if shared.buffer().is_none() {
                    let err = StreamError::decode("stream contained no decodable MP3 frames");
                    events.exception(err.clone());
                    return FetchOutcome::Failed(err);
                }
                shared.fully_downloaded.store(true, Ordering::Release);
                events.info("Stream fully downloaded");
                return FetchOutcome::Completed;
            }
            Err(err) => {
                if cancel.is_cancelled() {
                    tracing::debug!("Fetch aborted by stop request: {}", err);
                    return FetchOutcome::Cancelled;
                }
                events.exception(err.clone());
                return FetchOutcome::Failed(err);
            }
        }
    }
}
