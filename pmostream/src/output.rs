//! Monitoring output devices
//!
//! The device callback is the only reader of the playout buffer. It pulls
//! through a [`PlaybackTap`], which feeds the capture file with exactly what
//! was pulled before handing (possibly muted) samples to the hardware.

use crate::buffer::PlayoutBuffer;
use crate::capture::CaptureTap;
use crate::constants::CLOCKED_OUTPUT_PERIOD;
use crate::error::{Result, StreamError};
use crate::events::EventSink;
use crate::format::PcmFormat;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Consumer side of a session: buffer, capture and monitoring volume
#[derive(Clone)]
pub struct PlaybackTap {
    buffer: Arc<PlayoutBuffer>,
    capture: Option<Arc<CaptureTap>>,
    volume: f32,
}

impl PlaybackTap {
    pub fn new(buffer: Arc<PlayoutBuffer>, capture: Option<Arc<CaptureTap>>, volume: f32) -> Self {
        Self {
            buffer,
            capture,
            volume: volume.clamp(0.0, 1.0),
        }
    }

    pub fn format(&self) -> PcmFormat {
        self.buffer.format()
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Renderer owning its scratch space, to move into a device callback
    pub fn renderer(self) -> TapRenderer {
        TapRenderer {
            tap: self,
            scratch: Vec::new(),
        }
    }
}

pub struct TapRenderer {
    tap: PlaybackTap,
    scratch: Vec<u8>,
}

impl TapRenderer {
    /// Fills `out` with interleaved samples, zero-padding on underrun.
    ///
    /// Returns the number of samples that came from the buffer.
    pub fn render(&mut self, out: &mut [f32]) -> usize {
        let wanted = out.len() * 2;
        if self.scratch.len() < wanted {
            self.scratch.resize(wanted, 0);
        }
        let pulled = self.tap.buffer.pull(&mut self.scratch[..wanted]);
        let pulled = pulled - pulled % 2;

        if pulled > 0 {
            if let Some(capture) = &self.tap.capture {
                capture.write(&self.scratch[..pulled]);
            }
        }

        let volume = self.tap.volume;
        let samples = pulled / 2;
        for (i, sample) in out.iter_mut().enumerate() {
            *sample = if i < samples {
                let raw = i16::from_le_bytes([self.scratch[2 * i], self.scratch[2 * i + 1]]);
                raw as f32 / 32768.0 * volume
            } else {
                0.0
            };
        }
        samples
    }
}

/// Channel through which a device reports asynchronous faults.
///
/// Reports carry the id of the session that opened the device, so late
/// callbacks from a torn-down device can be told apart from live ones.
#[derive(Debug, Clone)]
pub struct DeviceFailureSink {
    events: EventSink,
    session: u64,
}

impl DeviceFailureSink {
    pub fn new(events: EventSink, session: u64) -> Self {
        Self { events, session }
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    pub fn report(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!(session = self.session, "Output device failure: {}", message);
        self.events.device_failure(self.session, message);
    }
}

/// Factory for output devices
pub trait OutputBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Opens a device in the held (not playing) state.
    fn open(
        &self,
        tap: PlaybackTap,
        failures: DeviceFailureSink,
    ) -> Result<Box<dyn OutputDevice>>;
}

/// A running output. Dropping it releases the hardware.
pub trait OutputDevice: Send {
    fn play(&mut self) -> Result<()>;
    fn pause(&mut self) -> Result<()>;
    /// Releases the device; later calls are no-ops.
    fn close(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeviceCommand {
    Play,
    Pause,
    Close,
}

/// Command side of a device living on its own thread
struct ThreadedDevice {
    commands: Sender<DeviceCommand>,
    thread: Option<JoinHandle<()>>,
}

impl ThreadedDevice {
    fn send(&self, command: DeviceCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| StreamError::device("output thread is gone"))
    }
}

impl OutputDevice for ThreadedDevice {
    fn play(&mut self) -> Result<()> {
        self.send(DeviceCommand::Play)
    }

    fn pause(&mut self) -> Result<()> {
        self.send(DeviceCommand::Pause)
    }

    fn close(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        let _ = self.commands.send(DeviceCommand::Close);
        if thread.join().is_err() {
            tracing::warn!("Output thread panicked");
        }
    }
}

impl Drop for ThreadedDevice {
    fn drop(&mut self) {
        self.close();
    }
}

/// Device-less output consuming the buffer at the stream's real-time rate.
///
/// Used for headless recording and in tests.
#[derive(Debug, Clone)]
pub struct ClockedOutput {
    period: Duration,
}

impl ClockedOutput {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }
}

impl Default for ClockedOutput {
    fn default() -> Self {
        Self::new(CLOCKED_OUTPUT_PERIOD)
    }
}

impl OutputBackend for ClockedOutput {
    fn name(&self) -> &str {
        "null"
    }

    fn open(
        &self,
        tap: PlaybackTap,
        _failures: DeviceFailureSink,
    ) -> Result<Box<dyn OutputDevice>> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let period = self.period;
        let thread = std::thread::Builder::new()
            .name("pmostream-clocked".into())
            .spawn(move || run_clocked(tap, rx, period))
            .map_err(|e| StreamError::device(format!("cannot spawn output thread: {}", e)))?;
        Ok(Box::new(ThreadedDevice {
            commands: tx,
            thread: Some(thread),
        }))
    }
}

/// Paces a device-less output against the wall clock.
///
/// Samples are counted from an anchor, so rounding never accumulates into
/// drift over a long show.
struct RealTimePacer {
    format: PcmFormat,
    anchor: Instant,
    rendered: usize,
}

impl RealTimePacer {
    fn new(format: PcmFormat, anchor: Instant) -> Self {
        Self {
            format,
            anchor,
            rendered: 0,
        }
    }

    fn restart(&mut self, anchor: Instant) {
        self.anchor = anchor;
        self.rendered = 0;
    }

    /// Samples owed to the device at `now`
    fn due(&mut self, now: Instant) -> usize {
        let total = self.format.samples_for(now.saturating_duration_since(self.anchor));
        let due = total.saturating_sub(self.rendered);
        self.rendered = self.rendered.max(total);
        due
    }
}

fn run_clocked(tap: PlaybackTap, commands: Receiver<DeviceCommand>, period: Duration) {
    let mut pacer = RealTimePacer::new(tap.format(), Instant::now());
    let mut renderer = tap.renderer();
    let mut block = Vec::new();
    let mut playing = false;

    loop {
        match commands.recv_timeout(period) {
            Ok(DeviceCommand::Play) => {
                playing = true;
                pacer.restart(Instant::now());
            }
            Ok(DeviceCommand::Pause) => playing = false,
            Ok(DeviceCommand::Close) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        if playing {
            let due = pacer.due(Instant::now());
            if due > 0 {
                block.resize(due, 0.0);
                renderer.render(&mut block);
            }
        }
    }
}

#[cfg(feature = "cpal")]
pub use self::cpal_output::CpalOutput;

#[cfg(feature = "cpal")]
mod cpal_output {
    use super::*;
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{FromSample, Sample, SampleFormat, SizedSample};

    /// System audio output through cpal.
    ///
    /// `cpal::Stream` is not `Send`, so each device lives on a dedicated
    /// thread driven over a command channel. When the device cannot play the
    /// stream's rate and channel count, the session falls back to a
    /// [`ClockedOutput`] so the capture keeps running.
    #[derive(Debug, Clone, Default)]
    pub struct CpalOutput {
        device_name: Option<String>,
    }

    impl CpalOutput {
        /// Output on the named device, or the host default when `None`
        pub fn new(device_name: Option<String>) -> Self {
            Self { device_name }
        }
    }

    impl OutputBackend for CpalOutput {
        fn name(&self) -> &str {
            "cpal"
        }

        fn open(
            &self,
            tap: PlaybackTap,
            failures: DeviceFailureSink,
        ) -> Result<Box<dyn OutputDevice>> {
            let (tx, rx) = crossbeam_channel::unbounded();
            // Ok(false): the device has no configuration for this stream
            let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<bool>>(1);
            let device_name = self.device_name.clone();
            let fallback = (tap.clone(), failures.clone());

            let thread = std::thread::Builder::new()
                .name("pmostream-cpal".into())
                .spawn(move || {
                    let stream = match build_stream(device_name.as_deref(), tap, failures.clone()) {
                        Ok(Some(stream)) => {
                            let _ = ready_tx.send(Ok(true));
                            stream
                        }
                        Ok(None) => {
                            let _ = ready_tx.send(Ok(false));
                            return;
                        }
                        Err(err) => {
                            let _ = ready_tx.send(Err(err));
                            return;
                        }
                    };

                    for command in rx.iter() {
                        let result = match command {
                            DeviceCommand::Play => stream.play().map_err(|e| e.to_string()),
                            DeviceCommand::Pause => stream.pause().map_err(|e| e.to_string()),
                            DeviceCommand::Close => break,
                        };
                        if let Err(err) = result {
                            failures.report(err);
                        }
                    }
                    drop(stream);
                    tracing::debug!("Audio output closed");
                })
                .map_err(|e| StreamError::device(format!("cannot spawn output thread: {}", e)))?;

            match ready_rx.recv() {
                Ok(Ok(true)) => Ok(Box::new(ThreadedDevice {
                    commands: tx,
                    thread: Some(thread),
                })),
                Ok(Ok(false)) => {
                    let _ = thread.join();
                    tracing::warn!("Falling back to a silent clocked output, capture continues");
                    let (tap, failures) = fallback;
                    ClockedOutput::default().open(tap, failures)
                }
                Ok(Err(err)) => {
                    let _ = thread.join();
                    Err(err)
                }
                Err(_) => {
                    let _ = thread.join();
                    Err(StreamError::device("output thread exited during setup"))
                }
            }
        }
    }

    /// Preferred sample format among the ranges matching the stream's rate and channels
    fn pick_sample_format(
        ranges: &[cpal::SupportedStreamConfigRange],
        format: PcmFormat,
    ) -> Option<SampleFormat> {
        let accepts = |range: &cpal::SupportedStreamConfigRange, sample_format: SampleFormat| {
            range.channels() == format.channels
                && range.sample_format() == sample_format
                && range.min_sample_rate().0 <= format.sample_rate
                && format.sample_rate <= range.max_sample_rate().0
        };
        [SampleFormat::F32, SampleFormat::I16, SampleFormat::U16]
            .into_iter()
            .find(|&sample_format| ranges.iter().any(|range| accepts(range, sample_format)))
    }

    fn negotiate(device: &cpal::Device, format: PcmFormat) -> Result<Option<SampleFormat>> {
        let ranges: Vec<_> = device
            .supported_output_configs()
            .map_err(|e| StreamError::device(e.to_string()))?
            .collect();

        let chosen = pick_sample_format(&ranges, format);
        if chosen.is_none() {
            let supported: Vec<String> = ranges
                .iter()
                .map(|r| {
                    format!(
                        "{}ch {}-{} Hz {:?}",
                        r.channels(),
                        r.min_sample_rate().0,
                        r.max_sample_rate().0,
                        r.sample_format()
                    )
                })
                .collect();
            tracing::warn!(
                "Output device rejects {} Hz / {} channels (supports: {})",
                format.sample_rate,
                format.channels,
                supported.join(", ")
            );
        }
        Ok(chosen)
    }

    /// Builds the paused stream, or `None` when the device has no matching configuration.
    fn build_stream(
        device_name: Option<&str>,
        tap: PlaybackTap,
        failures: DeviceFailureSink,
    ) -> Result<Option<cpal::Stream>> {
        let host = cpal::default_host();
        let device = match device_name {
            Some(name) => host
                .output_devices()
                .map_err(|e| StreamError::device(e.to_string()))?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| StreamError::device(format!("output device not found: {}", name)))?,
            None => host
                .default_output_device()
                .ok_or_else(|| StreamError::device("No output device available"))?,
        };

        tracing::debug!(
            "Using audio device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        let format = tap.format();
        let Some(sample_format) = negotiate(&device, format)? else {
            return Ok(None);
        };
        let config = cpal::StreamConfig {
            channels: format.channels,
            sample_rate: cpal::SampleRate(format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        tracing::debug!(
            "Output config: {} Hz, {} channels, {:?}",
            format.sample_rate,
            format.channels,
            sample_format
        );

        let renderer = tap.renderer();
        let stream = match sample_format {
            SampleFormat::I16 => make_stream::<i16>(&device, &config, renderer, failures)?,
            SampleFormat::U16 => make_stream::<u16>(&device, &config, renderer, failures)?,
            _ => make_stream::<f32>(&device, &config, renderer, failures)?,
        };

        // Some hosts start streams immediately
        let _ = stream.pause();
        Ok(Some(stream))
    }

    fn make_stream<T>(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        mut renderer: TapRenderer,
        failures: DeviceFailureSink,
    ) -> Result<cpal::Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        let mut scratch: Vec<f32> = Vec::new();
        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    if scratch.len() != data.len() {
                        scratch.resize(data.len(), 0.0);
                    }
                    renderer.render(&mut scratch);
                    for (out, sample) in data.iter_mut().zip(&scratch) {
                        *out = T::from_sample(*sample);
                    }
                },
                move |err| failures.report(err.to_string()),
                None,
            )
            .map_err(|e| StreamError::device(format!("Failed to build output stream: {}", e)))
    }

}
