#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use parking_lot::Mutex;
use pmorecorder::{ManualClock, Recorder, SchedulerEngine, SchedulerEvent, SchedulerSettings};
use pmoschedule::{Schedule, Show};
use pmostream::{EngineEvent, StreamError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

pub fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 5, 17)
        .unwrap()
        .and_hms_opt(h, m, s)
        .unwrap()
}

/// A 05:30-10:00, B 10:00-12:00
pub fn morning_schedule() -> Schedule {
    Schedule::new(vec![
        Show::parse(1, "A", "05:30", "10:00").unwrap(),
        Show::parse(2, "B", "10:00", "12:00").unwrap(),
    ])
    .unwrap()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Record(PathBuf),
    Play,
    Stop,
}

/// Records calls and writes a placeholder file on `record`
#[derive(Clone, Default)]
pub struct FakeRecorder {
    pub calls: Arc<Mutex<Vec<Call>>>,
    pub fail_start: Arc<Mutex<Option<StreamError>>>,
    sessions: Arc<Mutex<u64>>,
    live: Arc<Mutex<Option<u64>>>,
}

impl FakeRecorder {
    fn open_session(&self) {
        let mut sessions = self.sessions.lock();
        *sessions += 1;
        *self.live.lock() = Some(*sessions);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn records(&self) -> Vec<PathBuf> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Record(p) => Some(p),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Recorder for FakeRecorder {
    async fn record(&mut self, path: &Path) -> pmostream::Result<()> {
        if let Some(err) = self.fail_start.lock().clone() {
            return Err(err);
        }
        std::fs::write(path, b"RIFF").unwrap();
        self.calls.lock().push(Call::Record(path.to_path_buf()));
        self.open_session();
        Ok(())
    }

    async fn play(&mut self) -> pmostream::Result<()> {
        if let Some(err) = self.fail_start.lock().clone() {
            return Err(err);
        }
        self.calls.lock().push(Call::Play);
        self.open_session();
        Ok(())
    }

    async fn stop(&mut self) {
        self.calls.lock().push(Call::Stop);
        *self.live.lock() = None;
    }

    fn current_session(&self) -> Option<u64> {
        *self.live.lock()
    }
}

pub struct Harness {
    pub scheduler: SchedulerEngine<FakeRecorder>,
    pub recorder: FakeRecorder,
    pub clock: Arc<ManualClock>,
    pub engine_tx: mpsc::UnboundedSender<EngineEvent>,
    pub events: broadcast::Receiver<SchedulerEvent>,
    pub dir: tempfile::TempDir,
}

impl Harness {
    pub fn new(schedule: Schedule, configure: impl FnOnce(&mut SchedulerSettings)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = SchedulerSettings {
            save_folder: dir.path().to_path_buf(),
            call_sign: "TFM".into(),
            ..SchedulerSettings::default()
        };
        configure(&mut settings);

        let recorder = FakeRecorder::default();
        let clock = Arc::new(ManualClock::new(at(0, 0, 0)));
        let (engine_tx, engine_rx) = mpsc::unbounded_channel();
        let scheduler =
            SchedulerEngine::new(settings, schedule, recorder.clone(), engine_rx, clock.clone());
        let events = scheduler.subscribe();
        Self {
            scheduler,
            recorder,
            clock,
            engine_tx,
            events,
            dir,
        }
    }

    pub async fn tick_at(&mut self, now: NaiveDateTime) {
        self.clock.set(now);
        self.scheduler.tick().await;
    }

    /// Output fault raised by `session`
    pub fn failure_of(&self, session: u64) -> EngineEvent {
        EngineEvent::DeviceFailure {
            session,
            message: "NoDriver calling waveOutWrite".into(),
        }
    }

    /// Output fault raised by the live session, or by a closed one when idle
    pub fn device_failure(&self) -> EngineEvent {
        self.failure_of(self.recorder.current_session().unwrap_or(0))
    }

    /// Delivers an output fault of the live session to the scheduler
    pub async fn fail_device(&mut self) {
        let failure = self.device_failure();
        self.scheduler.handle_engine_event(failure).await;
    }

    pub fn day_dir(&self) -> PathBuf {
        self.dir.path().join("TFM").join("2024-05-17")
    }

    /// Events published since the last call
    pub fn drain(&mut self) -> Vec<SchedulerEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }
}

pub fn titles(events: &[SchedulerEvent]) -> Vec<String> {
    events
        .iter()
        .map(|e| match e {
            SchedulerEvent::ShowStarted(s) => format!("started {}", s.title),
            SchedulerEvent::ShowEnded(s) => format!("ended {}", s.title),
            SchedulerEvent::Idle { next } => format!(
                "idle {}",
                next.as_ref().map(|s| s.title.as_str()).unwrap_or("-")
            ),
            SchedulerEvent::Recorder { message, .. } => format!("recorder {}", message),
            SchedulerEvent::RecorderException(err) => format!("exception {}", err),
        })
        .collect()
}
