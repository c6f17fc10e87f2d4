//! Recorder engine: one fetch/playback/capture session at a time
//!
//! ```text
//! StreamSource → [fetch task] → PlayoutBuffer → [device callback] → speakers
//!                                                       ↓
//!                                                  CaptureTap (.wav)
//! ```
//!
//! A monitor task per session owns the output device. It opens the device
//! once the first frame has sized the buffer, applies the buffering policy
//! and releases everything when the stream ends or a stop is requested.

use crate::buffer::{BufferPolicy, FlowDecision, PlayoutBuffer};
use crate::capture::CaptureTap;
use crate::constants::{
    BUFFER_CAPACITY, MONITOR_INTERVAL, OCCUPANCY_REPORT_INTERVAL, REBUFFER_THRESHOLD,
    RESUME_THRESHOLD, STOP_TIMEOUT, THROTTLE_DELAY,
};
use crate::error::{Result, StreamError};
use crate::events::{EngineEvent, EventSink};
use crate::fetcher::{FetchHandle, FetchSettings, FetchShared, StreamFetcher};
use crate::output::{DeviceFailureSink, OutputBackend, OutputDevice, PlaybackTap};
use crate::source::StreamSource;
use crate::state::{RecorderState, StateCell};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::Level;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub buffer_capacity: Duration,
    pub policy: BufferPolicy,
    pub throttle: Duration,
    pub monitor_interval: Duration,
    pub stop_timeout: Duration,
    /// Silence the monitoring output while a capture file is written
    pub mute_while_recording: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            buffer_capacity: BUFFER_CAPACITY,
            policy: BufferPolicy {
                resume_above: RESUME_THRESHOLD,
                rebuffer_below: REBUFFER_THRESHOLD,
            },
            throttle: THROTTLE_DELAY,
            monitor_interval: MONITOR_INTERVAL,
            stop_timeout: STOP_TIMEOUT,
            mute_while_recording: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MonitorCommand {
    Pause,
    Resume,
}

type CaptureSlot = Arc<Mutex<Option<Arc<CaptureTap>>>>;

struct Session {
    id: u64,
    cancel: CancellationToken,
    fetch: FetchHandle,
    monitor: JoinHandle<()>,
    commands: mpsc::UnboundedSender<MonitorCommand>,
    capture: CaptureSlot,
    capture_path: Option<PathBuf>,
}

pub struct RecorderEngine {
    settings: EngineSettings,
    source: Arc<dyn StreamSource>,
    output: Arc<dyn OutputBackend>,
    events: EventSink,
    state: StateCell,
    session: Option<Session>,
    last_session: u64,
}

impl RecorderEngine {
    pub fn new(
        settings: EngineSettings,
        source: Arc<dyn StreamSource>,
        output: Arc<dyn OutputBackend>,
        events: EventSink,
    ) -> Self {
        Self {
            settings,
            source,
            output,
            events,
            state: StateCell::default(),
            session: None,
            last_session: 0,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn state(&self) -> RecorderState {
        self.state.get()
    }

    /// Audio queued in the playout buffer, if a session has one
    pub fn buffered(&self) -> Option<Duration> {
        self.session
            .as_ref()
            .and_then(|s| s.fetch.shared().buffer())
            .map(|b| b.occupancy())
    }

    /// Id of the session started last, until it is stopped.
    ///
    /// Ids increase with every start; device failures carry the id of the
    /// session whose device raised them.
    pub fn current_session(&self) -> Option<u64> {
        self.session.as_ref().map(|s| s.id)
    }

    /// Capture file of the running session
    pub fn capture_path(&self) -> Option<&Path> {
        self.session
            .as_ref()
            .filter(|_| self.state().is_active())
            .and_then(|s| s.capture_path.as_deref())
    }

    /// Starts fetching and captures everything played to `path`.
    pub async fn record(&mut self, path: impl Into<PathBuf>) -> Result<()> {
        self.start(Some(path.into())).await
    }

    /// Starts fetching for monitoring only. Resumes a paused session.
    pub async fn play(&mut self) -> Result<()> {
        if self.state() == RecorderState::Paused {
            return self.unpause();
        }
        self.start(None).await
    }

    /// Holds the output device; the fetch keeps filling the buffer.
    pub fn pause(&mut self) -> Result<()> {
        let state = self.state();
        if !matches!(state, RecorderState::Playing | RecorderState::Buffering) {
            return Ok(());
        }
        if self.state.compare_and_set(state, RecorderState::Paused) {
            self.send(MonitorCommand::Pause)?;
            self.events.emit(EngineEvent::StateChanged(RecorderState::Paused));
            self.events.info("Paused");
        }
        Ok(())
    }

    pub fn unpause(&mut self) -> Result<()> {
        if self
            .state
            .compare_and_set(RecorderState::Paused, RecorderState::Playing)
        {
            self.send(MonitorCommand::Resume)?;
            self.events.emit(EngineEvent::StateChanged(RecorderState::Playing));
            self.events.info("Resumed");
        }
        Ok(())
    }

    /// Cancels the session and releases device and capture file.
    ///
    /// No-op when nothing runs. The capture file is closed when this returns.
    pub async fn stop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        let was = self.state.get();
        self.teardown(session).await;
        self.state.set(RecorderState::Stopped);
        if was.is_active() {
            self.events
                .emit(EngineEvent::StateChanged(RecorderState::Stopped));
            self.events.info("Stopped");
        }
    }

    async fn start(&mut self, capture_path: Option<PathBuf>) -> Result<()> {
        let state = self.state();
        if state.is_active() {
            return Err(StreamError::AlreadyActive(state.to_string()));
        }
        // A session that ended on its own still has tasks to reap
        if let Some(session) = self.session.take() {
            self.teardown(session).await;
        }

        self.last_session += 1;
        let id = self.last_session;
        let cancel = CancellationToken::new();
        let fetch = StreamFetcher::new(
            self.source.clone(),
            FetchSettings {
                capacity: self.settings.buffer_capacity,
                throttle: self.settings.throttle,
            },
            self.events.clone(),
        )
        .spawn(cancel.clone());

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let capture: CaptureSlot = Arc::new(Mutex::new(None));

        self.state.set(RecorderState::Buffering);
        self.events
            .emit(EngineEvent::StateChanged(RecorderState::Buffering));
        match &capture_path {
            Some(path) => self
                .events
                .info(format!("Recording to {}", path.display())),
            None => self.events.info("Playing"),
        }

        let monitor = Monitor {
            session: id,
            settings: self.settings.clone(),
            output: self.output.clone(),
            events: self.events.clone(),
            state: self.state.clone(),
            shared: fetch.shared().clone(),
            capture_path: capture_path.clone(),
            capture: capture.clone(),
            commands: commands_rx,
            cancel: cancel.clone(),
        };
        let monitor = tokio::spawn(monitor.run());

        self.session = Some(Session {
            id,
            cancel,
            fetch,
            monitor,
            commands: commands_tx,
            capture,
            capture_path,
        });
        Ok(())
    }

    fn send(&self, command: MonitorCommand) -> Result<()> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| StreamError::device("no session running"))?;
        session
            .commands
            .send(command)
            .map_err(|_| StreamError::device("session monitor is gone"))
    }

    async fn teardown(&self, session: Session) {
        session.cancel.cancel();
        let timeout = self.settings.stop_timeout;

        let mut monitor = session.monitor;
        match tokio::time::timeout(timeout, &mut monitor).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::warn!("Session monitor failed: {}", err),
            Err(_) => {
                tracing::warn!("Session monitor did not stop within {:?}", timeout);
                monitor.abort();
            }
        }

        if session.fetch.join(timeout).await.is_none() {
            tracing::warn!("Fetch did not observe the stop within {:?}", timeout);
        }

        let capture = session.capture.lock().take();
        if let Some(capture) = capture {
            if let Err(err) = capture.finish() {
                self.events.exception(err);
            }
        }
    }
}

impl Drop for RecorderEngine {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            session.cancel.cancel();
            session.monitor.abort();
        }
    }
}

struct Monitor {
    session: u64,
    settings: EngineSettings,
    output: Arc<dyn OutputBackend>,
    events: EventSink,
    state: StateCell,
    shared: Arc<FetchShared>,
    capture_path: Option<PathBuf>,
    capture: CaptureSlot,
    commands: mpsc::UnboundedReceiver<MonitorCommand>,
    cancel: CancellationToken,
}

impl Monitor {
    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.settings.monitor_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut device: Option<Box<dyn OutputDevice>> = None;
        let mut last_report = Instant::now();

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                Some(command) = self.commands.recv() => {
                    if let Some(device) = device.as_deref_mut() {
                        self.apply(command, device);
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            if !self.step(&mut device) {
                break;
            }

            if last_report.elapsed() >= OCCUPANCY_REPORT_INTERVAL {
                last_report = Instant::now();
                if let Some(buffer) = self.shared.buffer() {
                    tracing::debug!(
                        buffered_ms = buffer.occupancy().as_millis() as u64,
                        dropped = buffer.dropped_bytes(),
                        state = %self.state.get(),
                        "Buffer occupancy"
                    );
                }
            }
        }

        if let Some(mut device) = device.take() {
            device.close();
        }
        tracing::trace!("Session monitor finished");
    }

    fn apply(&self, command: MonitorCommand, device: &mut dyn OutputDevice) {
        let result = match command {
            MonitorCommand::Pause => device.pause(),
            MonitorCommand::Resume => device.play(),
        };
        if let Err(err) = result {
            self.events.device_failure(self.session, err.to_string());
        }
    }

    /// One policy check. Returns `false` once the session is over.
    fn step(&mut self, device: &mut Option<Box<dyn OutputDevice>>) -> bool {
        let Some(buffer) = self.shared.buffer().cloned() else {
            if self.shared.is_finished() {
                self.events
                    .message(Level::WARN, "Stream unavailable, nothing to play");
                self.release(device);
                return false;
            }
            return true;
        };

        if device.is_none() {
            match self.open_device(buffer.clone()) {
                Ok(opened) => *device = Some(opened),
                Err(err) => {
                    self.events.device_failure(self.session, err.to_string());
                    self.release(device);
                    return false;
                }
            }
        }

        if let Some(err) = self.capture.lock().as_ref().and_then(|c| c.take_error()) {
            self.events.exception(err);
        }

        let state = self.state.get();
        let decision = self.settings.policy.evaluate(
            state,
            buffer.occupancy(),
            self.shared.is_fully_downloaded(),
        );

        match decision {
            Some(FlowDecision::Resume) => {
                if self.state.compare_and_set(state, RecorderState::Playing) {
                    self.command_device(device, MonitorCommand::Resume);
                    self.events
                        .emit(EngineEvent::StateChanged(RecorderState::Playing));
                    let verb = if self.capture_path.is_some() {
                        "recording"
                    } else {
                        "playing"
                    };
                    self.events.info(format!("Started {}", verb));
                }
                true
            }
            Some(FlowDecision::Rebuffer) => {
                if self.state.compare_and_set(state, RecorderState::Buffering) {
                    self.command_device(device, MonitorCommand::Pause);
                    self.events
                        .emit(EngineEvent::StateChanged(RecorderState::Buffering));
                    self.events.message(Level::DEBUG, "Buffering");
                }
                true
            }
            Some(FlowDecision::Finished) => {
                self.events.info("Reached end of stream");
                self.release(device);
                self.events.emit(EngineEvent::EndOfStream);
                false
            }
            None => true,
        }
    }

    fn command_device(&self, device: &mut Option<Box<dyn OutputDevice>>, command: MonitorCommand) {
        if let Some(device) = device.as_deref_mut() {
            self.apply(command, device);
        }
    }

    fn open_device(&self, buffer: Arc<PlayoutBuffer>) -> Result<Box<dyn OutputDevice>> {
        let capture = match &self.capture_path {
            Some(path) => match CaptureTap::create(path, buffer.format()) {
                Ok(capture) => {
                    let capture = Arc::new(capture);
                    *self.capture.lock() = Some(capture.clone());
                    Some(capture)
                }
                Err(err) => {
                    self.events.exception(err);
                    None
                }
            },
            None => None,
        };

        let volume = if capture.is_some() && self.settings.mute_while_recording {
            0.0
        } else {
            1.0
        };
        self.events.message(
            Level::DEBUG,
            format!("Opening {} output (volume {})", self.output.name(), volume),
        );

        let tap = PlaybackTap::new(buffer, capture, volume);
        let mut device = self
            .output
            .open(tap, DeviceFailureSink::new(self.events.clone(), self.session))?;
        if self.state.get() == RecorderState::Playing {
            device.play()?;
        }
        Ok(device)
    }

    /// Ends the session from inside: device, capture, state.
    fn release(&self, device: &mut Option<Box<dyn OutputDevice>>) {
        if let Some(mut device) = device.take() {
            device.close();
        }
        let capture = self.capture.lock().take();
        if let Some(capture) = capture {
            if let Err(err) = capture.finish() {
                self.events.exception(err);
            }
        }
        self.state.set(RecorderState::Stopped);
        self.events
            .emit(EngineEvent::StateChanged(RecorderState::Stopped));
    }
}
