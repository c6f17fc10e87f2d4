#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use pmostream::{
    BufferPolicy, ClockedOutput, Connection, DecodedFrame, DeviceFailureSink, EngineEvent,
    EngineSettings, FrameDecoder, OutputBackend, OutputDevice, PcmFormat, PlaybackTap,
    RecorderEngine, RecorderState, StreamError, StreamSource,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

/// 8 kHz mono, 20 ms per frame
pub const FRAME_SAMPLES: usize = 160;

pub fn format() -> PcmFormat {
    PcmFormat::s16(8_000, 1)
}

pub fn settings() -> EngineSettings {
    EngineSettings {
        buffer_capacity: Duration::from_secs(2),
        policy: BufferPolicy {
            resume_above: Duration::from_millis(200),
            rebuffer_below: Duration::from_millis(50),
        },
        throttle: Duration::from_millis(10),
        monitor_interval: Duration::from_millis(10),
        stop_timeout: Duration::from_secs(1),
        mute_while_recording: true,
    }
}

/// Source generating a ramp signal
pub struct SyntheticSource {
    frames: Option<usize>,
    pace: Option<Duration>,
    failure: Option<StreamError>,
    pub connects: AtomicUsize,
}

impl SyntheticSource {
    pub fn endless() -> Self {
        Self {
            frames: None,
            pace: None,
            failure: None,
            connects: AtomicUsize::new(0),
        }
    }

    pub fn finite(frames: usize) -> Self {
        Self {
            frames: Some(frames),
            ..Self::endless()
        }
    }

    /// Produces one 20 ms frame every `pace`
    pub fn paced(pace: Duration) -> Self {
        Self {
            pace: Some(pace),
            ..Self::endless()
        }
    }

    pub fn failing(error: StreamError) -> Self {
        Self {
            failure: Some(error),
            ..Self::endless()
        }
    }
}

struct SyntheticDecoder {
    remaining: Option<usize>,
    pace: Option<Duration>,
    next_sample: i16,
}

impl FrameDecoder for SyntheticDecoder {
    fn next_frame(&mut self) -> pmostream::Result<Option<DecodedFrame>> {
        match self.remaining.as_mut() {
            Some(0) => return Ok(None),
            Some(n) => *n -= 1,
            None => {}
        }
        if let Some(pace) = self.pace {
            std::thread::sleep(pace);
        }
        let mut pcm = Vec::with_capacity(FRAME_SAMPLES * 2);
        for _ in 0..FRAME_SAMPLES {
            pcm.extend_from_slice(&self.next_sample.to_le_bytes());
            self.next_sample = self.next_sample.wrapping_add(1);
        }
        Ok(Some(DecodedFrame {
            format: format(),
            pcm,
        }))
    }
}

#[async_trait]
impl StreamSource for SyntheticSource {
    async fn connect(&self, _cancel: CancellationToken) -> pmostream::Result<Connection> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        Ok(Connection {
            decoder: Box::new(SyntheticDecoder {
                remaining: self.frames,
                pace: self.pace,
                next_sample: 0,
            }),
            url: "synthetic://ramp".into(),
            stream_name: Some("Synthetic".into()),
        })
    }

    fn describe(&self) -> String {
        "synthetic://ramp".into()
    }
}

#[derive(Debug, Default)]
pub struct Counters {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub plays: AtomicUsize,
    pub pauses: AtomicUsize,
}

impl Counters {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// Clocked output that counts device operations and can simulate faults
#[derive(Default)]
pub struct CountingOutput {
    inner: ClockedOutput,
    pub counters: Arc<Counters>,
    failures: Mutex<Option<DeviceFailureSink>>,
}

impl CountingOutput {
    pub fn new() -> Self {
        Self {
            inner: ClockedOutput::new(Duration::from_millis(5)),
            ..Default::default()
        }
    }

    /// Simulates a driver fault on the open device
    pub fn fail(&self, message: &str) {
        if let Some(sink) = self.failures.lock().as_ref() {
            sink.report(message);
        }
    }
}

impl OutputBackend for CountingOutput {
    fn name(&self) -> &str {
        "counting"
    }

    fn open(
        &self,
        tap: PlaybackTap,
        failures: DeviceFailureSink,
    ) -> pmostream::Result<Box<dyn OutputDevice>> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        *self.failures.lock() = Some(failures.clone());
        let inner = self.inner.open(tap, failures)?;
        Ok(Box::new(CountingDevice {
            inner,
            counters: self.counters.clone(),
            closed: false,
        }))
    }
}

struct CountingDevice {
    inner: Box<dyn OutputDevice>,
    counters: Arc<Counters>,
    closed: bool,
}

impl OutputDevice for CountingDevice {
    fn play(&mut self) -> pmostream::Result<()> {
        self.counters.plays.fetch_add(1, Ordering::SeqCst);
        self.inner.play()
    }

    fn pause(&mut self) -> pmostream::Result<()> {
        self.counters.pauses.fetch_add(1, Ordering::SeqCst);
        self.inner.pause()
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close();
    }
}

impl Drop for CountingDevice {
    fn drop(&mut self) {
        self.close();
    }
}

pub async fn wait_for_state(engine: &RecorderEngine, state: RecorderState, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if engine.state() == state {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    engine.state() == state
}

/// Receives events until one matches, or `None` after `timeout`
pub async fn wait_for_event<F>(
    rx: &mut UnboundedReceiver<EngineEvent>,
    timeout: Duration,
    mut matches: F,
) -> Option<EngineEvent>
where
    F: FnMut(&EngineEvent) -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let event = tokio::time::timeout_at(deadline, rx.recv()).await.ok()??;
        if matches(&event) {
            return Some(event);
        }
    }
}

pub fn drain(rx: &mut UnboundedReceiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
