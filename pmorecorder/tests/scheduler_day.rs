//! A broadcast day driven tick by tick with a manual clock

mod common;

use common::*;
use pmorecorder::{SchedulerEvent, SchedulerState};
use pmoschedule::{Schedule, Show, ShowStatus};
use pmostream::{EngineEvent, StreamError};
use tracing::Level;

#[tokio::test]
async fn morning_schedule_records_each_show_once() {
    let mut h = Harness::new(morning_schedule(), |_| {});

    h.tick_at(at(5, 0, 0)).await;
    assert_eq!(h.scheduler.state(), SchedulerState::Idle);
    assert_eq!(titles(&h.drain()), vec!["idle A"]);

    h.tick_at(at(5, 30, 0)).await;
    assert_eq!(h.scheduler.state(), SchedulerState::Recording(0));
    let a_path = h.day_dir().join("01-A-2024-05-17-0530-1000.wav");
    assert_eq!(h.recorder.calls(), vec![Call::Record(a_path.clone())]);
    assert!(a_path.exists());
    assert_eq!(titles(&h.drain()), vec!["started A"]);

    h.tick_at(at(7, 0, 0)).await;
    h.tick_at(at(10, 0, 0)).await;
    assert_eq!(h.scheduler.state(), SchedulerState::Recording(0));
    assert_eq!(h.recorder.calls().len(), 1);

    h.tick_at(at(10, 0, 5)).await;
    assert_eq!(h.scheduler.state(), SchedulerState::Recording(1));
    let b_path = h.day_dir().join("02-B-2024-05-17-1000-1200.wav");
    assert_eq!(
        h.recorder.calls(),
        vec![Call::Record(a_path.clone()), Call::Stop, Call::Record(b_path.clone())]
    );
    let a = &h.scheduler.schedule().shows()[0];
    assert_eq!(a.status(), ShowStatus::Ended);
    assert_eq!(a.file_path(), Some(&a_path));
    assert!(a_path.exists(), "A stamped with end 1000");
    assert_eq!(titles(&h.drain()), vec!["ended A", "started B"]);

    h.tick_at(at(12, 1, 0)).await;
    assert_eq!(h.scheduler.state(), SchedulerState::Idle);
    let b_final = h.day_dir().join("02-B-2024-05-17-1000-1201.wav");
    assert!(b_final.exists());
    assert!(!b_path.exists());
    assert_eq!(
        h.scheduler.schedule().shows()[1].file_path(),
        Some(&b_final)
    );
    assert_eq!(titles(&h.drain()), vec!["ended B", "idle A"]);
}

#[tokio::test]
async fn idle_notification_fires_once_per_idle_entry() {
    let mut h = Harness::new(morning_schedule(), |_| {});

    h.tick_at(at(12, 30, 0)).await;
    h.tick_at(at(13, 0, 0)).await;
    h.tick_at(at(23, 59, 0)).await;
    assert_eq!(titles(&h.drain()), vec!["idle A"]);

    h.tick_at(at(5, 30, 0)).await;
    h.tick_at(at(10, 0, 5)).await;
    h.tick_at(at(12, 0, 5)).await;
    h.tick_at(at(12, 0, 10)).await;
    let idles = h
        .drain()
        .into_iter()
        .filter(|e| matches!(e, SchedulerEvent::Idle { .. }))
        .count();
    assert_eq!(idles, 1);
}

#[tokio::test]
async fn gap_between_shows_goes_idle_and_reports_next_show() {
    let schedule = Schedule::new(vec![
        Show::parse(1, "Early", "06:00", "07:00").unwrap(),
        Show::parse(2, "Noon", "12:00", "13:00").unwrap(),
    ])
    .unwrap();
    let mut h = Harness::new(schedule, |_| {});

    h.tick_at(at(6, 0, 0)).await;
    h.drain();
    h.tick_at(at(7, 0, 5)).await;
    assert_eq!(h.scheduler.state(), SchedulerState::Idle);
    match h.drain().last() {
        Some(SchedulerEvent::Idle { next: Some(show) }) => assert_eq!(show.title, "Noon"),
        other => panic!("expected idle event, got {:?}", other),
    }

    h.tick_at(at(12, 0, 0)).await;
    assert_eq!(h.scheduler.state(), SchedulerState::Recording(1));
}

#[tokio::test]
async fn show_crossing_midnight_is_recorded_on_its_start_date() {
    let schedule = Schedule::new(vec![Show::parse(9, "Night", "23:00", "01:00").unwrap()]).unwrap();
    let mut h = Harness::new(schedule, |_| {});

    h.tick_at(at(23, 0, 0)).await;
    assert_eq!(h.scheduler.state(), SchedulerState::Recording(0));
    let path = h.day_dir().join("09-Night-2024-05-17-2300-0100.wav");
    assert_eq!(h.recorder.records(), vec![path.clone()]);

    let after_midnight = at(0, 30, 0) + chrono::Duration::days(1);
    h.tick_at(after_midnight).await;
    assert_eq!(h.scheduler.state(), SchedulerState::Recording(0));

    h.tick_at(at(1, 0, 5) + chrono::Duration::days(1)).await;
    assert_eq!(h.scheduler.state(), SchedulerState::Idle);
    assert!(h.day_dir().join("09-Night-2024-05-17-2300-0100.wav").exists());
}

#[tokio::test]
async fn monitoring_only_when_record_is_off() {
    let mut h = Harness::new(morning_schedule(), |s| s.record_on = false);

    h.tick_at(at(6, 0, 0)).await;
    assert_eq!(h.recorder.calls(), vec![Call::Play]);
    assert!(!h.dir.path().join("TFM").exists());

    h.tick_at(at(10, 0, 5)).await;
    assert_eq!(h.recorder.calls(), vec![Call::Play, Call::Stop, Call::Play]);
    let events = h.drain();
    let ended = events.iter().find_map(|e| match e {
        SchedulerEvent::ShowEnded(show) => Some(show.clone()),
        _ => None,
    });
    let ended = ended.unwrap();
    assert_eq!(ended.status(), ShowStatus::Ended);
    assert!(ended.file_path().is_none());
}

#[tokio::test]
async fn failed_start_keeps_the_show_off_air_until_its_window_closes() {
    let mut h = Harness::new(morning_schedule(), |_| {});
    *h.recorder.fail_start.lock() = Some(StreamError::NoSource);

    h.tick_at(at(6, 0, 0)).await;
    assert_eq!(h.scheduler.state(), SchedulerState::Idle);
    assert_eq!(h.scheduler.schedule().shows()[0].status(), ShowStatus::Failed);
    assert!(h
        .drain()
        .contains(&SchedulerEvent::RecorderException(StreamError::NoSource)));

    *h.recorder.fail_start.lock() = None;
    h.tick_at(at(6, 0, 5)).await;
    assert!(h.recorder.calls().is_empty());

    h.tick_at(at(10, 0, 5)).await;
    assert_eq!(h.scheduler.state(), SchedulerState::Recording(1));
}

#[tokio::test]
async fn unwritable_save_folder_fails_the_show_without_stopping_the_scheduler() {
    let mut h = Harness::new(morning_schedule(), |_| {});
    // A file where the station directory should be
    std::fs::write(h.dir.path().join("TFM"), b"").unwrap();

    h.tick_at(at(6, 0, 0)).await;
    assert_eq!(h.scheduler.state(), SchedulerState::Idle);
    assert_eq!(h.scheduler.schedule().shows()[0].status(), ShowStatus::Failed);
    assert!(h.recorder.calls().is_empty());

    h.tick_at(at(6, 0, 5)).await;
    assert!(h.recorder.calls().is_empty());
}

#[tokio::test]
async fn transport_failure_leaves_the_show_on_air_until_its_end() {
    let mut h = Harness::new(morning_schedule(), |_| {});
    h.tick_at(at(6, 0, 0)).await;
    h.drain();

    h.scheduler
        .handle_engine_event(EngineEvent::Exception(StreamError::transport("reset by peer")))
        .await;
    assert_eq!(h.scheduler.state(), SchedulerState::Recording(0));
    assert_eq!(
        h.drain(),
        vec![SchedulerEvent::RecorderException(StreamError::transport(
            "reset by peer"
        ))]
    );

    h.tick_at(at(8, 0, 0)).await;
    assert_eq!(h.recorder.records().len(), 1);
}

#[tokio::test]
async fn engine_messages_are_relayed() {
    let mut h = Harness::new(morning_schedule(), |_| {});
    h.scheduler
        .handle_engine_event(EngineEvent::Message {
            message: "Stream name: Test FM".into(),
            level: Level::INFO,
        })
        .await;
    assert_eq!(
        h.drain(),
        vec![SchedulerEvent::Recorder {
            message: "Stream name: Test FM".into(),
            level: Level::INFO
        }]
    );
}

#[tokio::test]
async fn shutdown_stamps_the_current_show_with_now() {
    let mut h = Harness::new(morning_schedule(), |_| {});
    h.tick_at(at(5, 30, 0)).await;

    h.clock.set(at(7, 15, 0));
    h.scheduler.shutdown().await;
    assert_eq!(h.scheduler.state(), SchedulerState::Idle);
    assert!(h.day_dir().join("01-A-2024-05-17-0530-0715.wav").exists());
    assert_eq!(h.recorder.calls().last(), Some(&Call::Stop));

    // Nothing on air: only the recorder is stopped again
    h.scheduler.shutdown().await;
    assert_eq!(
        h.drain()
            .iter()
            .filter(|e| matches!(e, SchedulerEvent::ShowEnded(_)))
            .count(),
        1
    );
}

#[tokio::test]
async fn reload_waits_for_the_show_on_air() {
    let mut h = Harness::new(morning_schedule(), |_| {});
    h.tick_at(at(6, 0, 0)).await;

    let replacement = Schedule::new(vec![Show::parse(5, "Evening", "18:00", "20:00").unwrap()]).unwrap();
    h.scheduler.reload(replacement.clone());
    assert_eq!(h.scheduler.schedule().len(), 2, "A keeps running");

    h.tick_at(at(12, 0, 5)).await;
    assert_eq!(h.scheduler.schedule(), &replacement);

    h.tick_at(at(18, 0, 0)).await;
    assert_eq!(h.scheduler.state(), SchedulerState::Recording(0));
    assert_eq!(h.scheduler.current_show().unwrap().title, "Evening");
}

#[tokio::test]
async fn idle_entry_removes_expired_recordings() {
    let mut h = Harness::new(morning_schedule(), |s| s.days_to_keep = 7);
    let old = h.dir.path().join("TFM").join("2024-05-01");
    std::fs::create_dir_all(&old).unwrap();

    h.tick_at(at(5, 0, 0)).await;
    for _ in 0..100 {
        if !old.exists() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(!old.exists());
}
