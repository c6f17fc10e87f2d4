//! Schedule-driven recording.
//!
//! The scheduler is a single task that owns the schedule and the recorder
//! engine. It reacts to three inputs, one at a time:
//!
//! - a periodic tick, evaluating the schedule against the clock,
//! - engine events (messages, failures, device faults),
//! - host commands (schedule reload, shutdown).
//!
//! Shows are started and ended only from inside this task, so no show can be
//! started twice or renamed while its writer is still open.

use crate::cleanup::remove_expired;
use crate::clock::Clock;
use crate::constants::{
    COMMAND_CHANNEL_CAPACITY, DAYS_TO_KEEP, EVENT_CHANNEL_CAPACITY, TICK_INTERVAL,
};
use crate::events::SchedulerEvent;
use crate::files::{finalize_show_file, prepare_show_file, station_dir};
use crate::restart::RestartPolicy;
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, NaiveDateTime, NaiveTime};
use pmoschedule::{hhmm, Schedule, Show, ShowStatus};
use pmostream::{log_event, EngineEvent, RecorderEngine, StreamError};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// The part of the recorder engine the scheduler drives
#[async_trait]
pub trait Recorder: Send {
    /// Starts fetching and capturing to `path`
    async fn record(&mut self, path: &Path) -> pmostream::Result<()>;

    /// Starts fetching for monitoring only
    async fn play(&mut self) -> pmostream::Result<()>;

    /// Stops the session; the capture file is closed on return
    async fn stop(&mut self);

    /// Id of the live session, `None` once stopped
    fn current_session(&self) -> Option<u64>;
}

#[async_trait]
impl Recorder for RecorderEngine {
    async fn record(&mut self, path: &Path) -> pmostream::Result<()> {
        RecorderEngine::record(self, path).await
    }

    async fn play(&mut self) -> pmostream::Result<()> {
        RecorderEngine::play(self).await
    }

    async fn stop(&mut self) {
        RecorderEngine::stop(self).await
    }

    fn current_session(&self) -> Option<u64> {
        RecorderEngine::current_session(self)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerSettings {
    pub save_folder: PathBuf,
    /// Station directory under `save_folder`
    pub call_sign: String,
    /// When false, shows are monitored but not captured
    pub record_on: bool,
    pub restart: RestartPolicy,
    pub tick_interval: Duration,
    /// Retention window of the cleanup pass, 0 disables it
    pub days_to_keep: u32,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            save_folder: PathBuf::from("recordings"),
            call_sign: String::from("STATION"),
            record_on: true,
            restart: RestartPolicy::default(),
            tick_interval: TICK_INTERVAL,
            days_to_keep: DAYS_TO_KEEP,
        }
    }
}

/// What the scheduler is doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No show on air
    Idle,
    /// The show at this schedule index is being captured
    Recording(usize),
    /// The show at this schedule index failed and waits for a restart
    Restarting(usize),
}

#[derive(Debug)]
enum Activity {
    Idle,
    Recording { index: usize, restarts: u32 },
    Restarting { index: usize, restarts: u32, at: NaiveDateTime },
}

#[derive(Debug)]
pub enum SchedulerCommand {
    /// Replaces the schedule; applied right away when idle, otherwise at the
    /// next idle entry
    Reload(Schedule),
    /// Ends the current show and stops the task
    Shutdown(oneshot::Sender<()>),
}

pub struct SchedulerEngine<R: Recorder> {
    settings: SchedulerSettings,
    schedule: Schedule,
    pending_schedule: Option<Schedule>,
    recorder: R,
    engine_events: mpsc::UnboundedReceiver<EngineEvent>,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<SchedulerEvent>,
    activity: Activity,
    /// Shows kept off air until their window closes (failed start, restart
    /// budget spent)
    held: HashSet<usize>,
    idle_notified: bool,
    last_cleanup: Option<NaiveDate>,
}

impl<R: Recorder> SchedulerEngine<R> {
    /// `engine_events` is the receiving end of the recorder's event sink.
    pub fn new(
        settings: SchedulerSettings,
        schedule: Schedule,
        recorder: R,
        engine_events: mpsc::UnboundedReceiver<EngineEvent>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            settings,
            schedule,
            pending_schedule: None,
            recorder,
            engine_events,
            clock,
            events,
            activity: Activity::Idle,
            held: HashSet::new(),
            idle_notified: false,
            last_cleanup: None,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.events.subscribe()
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn recorder(&self) -> &R {
        &self.recorder
    }

    pub fn state(&self) -> SchedulerState {
        match self.activity {
            Activity::Idle => SchedulerState::Idle,
            Activity::Recording { index, .. } => SchedulerState::Recording(index),
            Activity::Restarting { index, .. } => SchedulerState::Restarting(index),
        }
    }

    /// Show currently on air
    pub fn current_show(&self) -> Option<&Show> {
        match self.activity {
            Activity::Recording { index, .. } => self.schedule.get(index),
            _ => None,
        }
    }

    fn publish(&self, event: SchedulerEvent) {
        // No subscriber is fine
        let _ = self.events.send(event);
    }

    /// Evaluates the schedule against the clock.
    pub async fn tick(&mut self) {
        let now = self.clock.now();
        let time = now.time();
        let schedule = &self.schedule;
        self.held
            .retain(|&i| schedule.get(i).is_some_and(|show| show.contains(time)));

        match self.activity {
            Activity::Recording { index, .. } => {
                if self.show_contains(index, time) {
                    return;
                }
                self.end_show(index, now).await;
                self.activity = Activity::Idle;

                if let Some(next) = self.schedule.next_index(index) {
                    if next != index && self.show_contains(next, time) && !self.held.contains(&next) {
                        self.start_show(next, 0, now).await;
                        return;
                    }
                }
                if self.past_last_show(time) {
                    self.enter_idle(now);
                    return;
                }
            }
            Activity::Restarting { index, restarts, at } => {
                if !self.show_contains(index, time) {
                    info!("Restart window closed, show is over");
                    self.activity = Activity::Idle;
                } else if now >= at {
                    self.start_show(index, restarts, now).await;
                    return;
                } else {
                    return;
                }
            }
            Activity::Idle => {}
        }

        let current = self
            .schedule
            .shows()
            .iter()
            .enumerate()
            .find(|(i, show)| show.contains(time) && !self.held.contains(i))
            .map(|(i, _)| i);
        match current {
            Some(index) => self.start_show(index, 0, now).await,
            None => self.enter_idle(now),
        }
    }

    fn show_contains(&self, index: usize, time: NaiveTime) -> bool {
        self.schedule.get(index).is_some_and(|show| show.contains(time))
    }

    fn past_last_show(&self, time: NaiveTime) -> bool {
        self.schedule
            .find_last()
            .is_some_and(|last| !last.window().crosses_midnight() && time > last.end)
    }

    fn enter_idle(&mut self, now: NaiveDateTime) {
        self.activity = Activity::Idle;
        if let Some(schedule) = self.pending_schedule.take() {
            info!(shows = schedule.len(), "Schedule reloaded");
            self.schedule = schedule;
            self.held.clear();
        }
        if self.idle_notified {
            return;
        }
        self.idle_notified = true;

        let next = self.schedule.find_upcoming(now.time()).cloned();
        match &next {
            Some(show) => info!(show = %show.title, "Idle, next show starts at {}", show.start.format("%H:%M")),
            None => info!("Idle, no show scheduled"),
        }
        self.publish(SchedulerEvent::Idle { next });
        self.run_cleanup(now.date());
    }

    fn run_cleanup(&mut self, today: NaiveDate) {
        if self.settings.days_to_keep == 0 || self.last_cleanup == Some(today) {
            return;
        }
        self.last_cleanup = Some(today);

        let dir = station_dir(&self.settings.save_folder, &self.settings.call_sign);
        let days = self.settings.days_to_keep;
        tokio::task::spawn_blocking(move || {
            if let Err(err) = remove_expired(&dir, today, days) {
                warn!("Cleanup of old recordings failed: {}", err);
            }
        });
    }

    async fn start_show(&mut self, index: usize, restarts: u32, now: NaiveDateTime) {
        let Some(show) = self.schedule.get(index).cloned() else {
            return;
        };
        self.idle_notified = false;
        info!(show = %show.title, "Starting show");

        let path = if self.settings.record_on {
            match prepare_show_file(&self.settings.save_folder, &self.settings.call_sign, &show, now) {
                Ok(path) => Some(path),
                Err(err) => {
                    error!(show = %show.title, "Cannot prepare recording: {}", err);
                    self.fail_show(index);
                    return;
                }
            }
        } else {
            None
        };

        let started = match &path {
            Some(path) => self.recorder.record(path).await,
            None => self.recorder.play().await,
        };
        if let Err(err) = started {
            error!(show = %show.title, "Recorder did not start: {}", err);
            self.publish(SchedulerEvent::RecorderException(err));
            self.fail_show(index);
            return;
        }

        let Some(show) = self.schedule.get_mut(index) else {
            return;
        };
        if let Err(err) = show.transition(ShowStatus::Started) {
            warn!("{}", err);
        }
        show.set_file_path(path);
        match show.file_path() {
            Some(path) => info!(show = %show.title, path = %path.display(), "Recording"),
            None => info!(show = %show.title, "Monitoring without capture"),
        }
        let show = show.clone();
        self.activity = Activity::Recording { index, restarts };
        self.publish(SchedulerEvent::ShowStarted(show));
    }

    /// Keeps a show off air for the rest of its window
    fn fail_show(&mut self, index: usize) {
        if let Some(show) = self.schedule.get_mut(index) {
            if let Err(err) = show.transition(ShowStatus::Failed) {
                debug!("{}", err);
            }
        }
        self.held.insert(index);
        self.activity = Activity::Idle;
    }

    /// Stops the recorder, then stamps the closed file with the actual end time.
    async fn end_show(&mut self, index: usize, now: NaiveDateTime) {
        self.recorder.stop().await;

        let Some(show) = self.schedule.get_mut(index) else {
            return;
        };
        info!(show = %show.title, "Ending show at {}", hhmm(now.time()));

        let mut status = ShowStatus::Ended;
        if let Some(path) = show.file_path().cloned() {
            match finalize_show_file(&path, now.time()) {
                Ok(Some(renamed)) => show.set_file_path(Some(renamed)),
                Ok(None) => {}
                Err(err) => {
                    error!(show = %show.title, "Cannot finalize recording: {}", err);
                    status = ShowStatus::Failed;
                }
            }
        }
        if let Err(err) = show.transition(status) {
            warn!("{}", err);
        }
        let show = show.clone();
        self.publish(SchedulerEvent::ShowEnded(show));
    }

    /// Relays an engine event and applies the device failure policy.
    ///
    /// Device failures raised by a session that was already stopped are
    /// dropped: one glitch can fire several callbacks, and only the first
    /// must end the show.
    pub async fn handle_engine_event(&mut self, engine_event: EngineEvent) {
        if let EngineEvent::DeviceFailure { session, message } = &engine_event {
            if self.recorder.current_session() != Some(*session) {
                debug!(session = *session, "Ignoring device failure of a closed session: {}", message);
                return;
            }
        }
        log_event(&engine_event);
        match engine_event {
            EngineEvent::Message { message, level } => {
                self.publish(SchedulerEvent::Recorder { message, level });
            }
            EngineEvent::Exception(err) => {
                self.publish(SchedulerEvent::RecorderException(err));
            }
            EngineEvent::DeviceFailure { message, .. } => {
                self.publish(SchedulerEvent::RecorderException(StreamError::Device(message)));
                self.on_device_failure().await;
            }
            EngineEvent::StateChanged(_) | EngineEvent::EndOfStream => {}
        }
    }

    async fn on_device_failure(&mut self) {
        let Activity::Recording { index, restarts } = self.activity else {
            return;
        };
        let now = self.clock.now();
        self.end_show(index, now).await;
        self.activity = Activity::Idle;

        match self.settings.restart.delay_for(restarts) {
            Some(delay) if delay.is_zero() => {
                warn!("Attempting restart...");
                self.start_show(index, restarts + 1, now).await;
            }
            Some(delay) => {
                warn!("Restarting in {:?}", delay);
                let at = now + ChronoDuration::from_std(delay).unwrap_or(ChronoDuration::zero());
                self.activity = Activity::Restarting {
                    index,
                    restarts: restarts + 1,
                    at,
                };
            }
            None => {
                if self.settings.restart.enabled {
                    warn!("Restart limit reached, show stays off air");
                }
                self.held.insert(index);
                self.enter_idle(now);
            }
        }
    }

    /// Installs a new schedule at the next idle point
    pub fn reload(&mut self, schedule: Schedule) {
        self.pending_schedule = Some(schedule);
        if matches!(self.activity, Activity::Idle) {
            let now = self.clock.now();
            self.idle_notified = false;
            self.enter_idle(now);
        }
    }

    /// Ends the show on air, stamping its file with the current time
    pub async fn shutdown(&mut self) {
        if let Activity::Recording { index, .. } = self.activity {
            let now = self.clock.now();
            self.end_show(index, now).await;
        }
        self.activity = Activity::Idle;
        self.recorder.stop().await;
    }

    /// Runs the scheduler on its own task.
    pub fn spawn(self) -> SchedulerHandle
    where
        R: 'static,
    {
        let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let events = self.events.clone();
        let join = tokio::spawn(self.run(rx));
        SchedulerHandle {
            commands: tx,
            events,
            join,
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<SchedulerCommand>) {
        info!(shows = self.schedule.len(), "Scheduler started");
        let mut ticker = tokio::time::interval(self.settings.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                cmd = commands.recv() => match cmd {
                    Some(SchedulerCommand::Reload(schedule)) => self.reload(schedule),
                    Some(SchedulerCommand::Shutdown(ack)) => {
                        self.shutdown().await;
                        let _ = ack.send(());
                        break;
                    }
                    None => {
                        self.shutdown().await;
                        break;
                    }
                },
                Some(engine_event) = self.engine_events.recv() => {
                    self.handle_engine_event(engine_event).await;
                }
                _ = ticker.tick() => self.tick().await,
            }
        }
        info!("Scheduler stopped");
    }
}

/// Handle to a spawned scheduler
pub struct SchedulerHandle {
    commands: mpsc::Sender<SchedulerCommand>,
    events: broadcast::Sender<SchedulerEvent>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.events.subscribe()
    }

    pub async fn reload(&self, schedule: Schedule) -> anyhow::Result<()> {
        self.commands
            .send(SchedulerCommand::Reload(schedule))
            .await
            .map_err(|_| anyhow!("Scheduler is not running"))
    }

    /// Ends the current show and waits for the task to finish.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        let (ack, done) = oneshot::channel();
        if self.commands.send(SchedulerCommand::Shutdown(ack)).await.is_ok() {
            let _ = done.await;
        }
        if let Err(err) = self.join.await {
            if err.is_cancelled() {
                warn!("Scheduler task cancelled: {err}");
                return Ok(());
            }
            return Err(anyhow!("Scheduler join error: {}", err));
        }
        Ok(())
    }
}
