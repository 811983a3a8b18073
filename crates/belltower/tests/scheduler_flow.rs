//! End-to-end scheduler flows: firing, pause/resume, error surfacing,
//! stop/shutdown behavior under a live Tokio runtime.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use belltower::{trigger, BoxError, Clock, Scheduler, SchedulerError};
use chrono::{TimeDelta, Utc};
use tokio::sync::{mpsc, Notify};
use tokio::time::timeout;

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}

#[tokio::test]
async fn a_now_trigger_fires_once_then_is_dropped() {
    let scheduler = Scheduler::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let data = Arc::new("once".to_string());
    let info = scheduler
        .schedule_job(
            Arc::clone(&data),
            move |_| {
                let _ = tx.send(());
                Ok(())
            },
            vec![trigger::create("now").unwrap()],
        )
        .unwrap();

    scheduler.start().unwrap();
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("fire within 2s")
        .unwrap();

    // The completion refresh drops the spent trigger; the job itself stays.
    wait_until(|| info.triggers().is_empty()).await;
    assert_eq!(info.next_fire_time(), None);
    assert!(info.last_fire_time().is_some());
    assert!(scheduler.job_info(&data).is_ok());
    scheduler.shutdown().unwrap();
}

#[tokio::test]
async fn pause_swallows_pending_fires_and_resume_does_not_replay() {
    let offset = Arc::new(Mutex::new(TimeDelta::zero()));
    let clock_offset = Arc::clone(&offset);
    let clock =
        Clock::from_fn(move || (Utc::now() + *clock_offset.lock().unwrap()).fixed_offset());
    let scheduler = Scheduler::with_clock(clock);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let data = Arc::new(());
    let info = scheduler
        .schedule_job(
            Arc::clone(&data),
            move |_| {
                let _ = tx.send(());
                Ok(())
            },
            vec![
                trigger::create("now").unwrap(),
                trigger::create("* * * * * ?").unwrap(),
            ],
        )
        .unwrap();

    info.pause().unwrap();
    scheduler.start().unwrap();

    // The now-trigger tick lands while paused and is swallowed.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(rx.try_recv().is_err(), "paused job must not fire");
    assert!(info.is_paused());

    // Five seconds pass (by the clock) while paused.
    *offset.lock().unwrap() = TimeDelta::seconds(5);
    info.resume();
    assert!(!info.is_paused());

    // Exactly one tick: the next cron second after resume, no backlog.
    timeout(Duration::from_millis(1500), rx.recv())
        .await
        .expect("one fire after resume")
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(rx.try_recv().is_err(), "missed occurrences must not replay");

    // The now trigger was spent during the paused tick and got dropped.
    let remaining = info.triggers();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].expression(), "* * * * * ?");
    scheduler.shutdown().unwrap();
}

#[tokio::test]
async fn callback_errors_reach_subscribers_and_the_job_survives() {
    let scheduler = Scheduler::new();
    let mut errors = scheduler.subscribe_errors();
    let data = Arc::new("flaky".to_string());
    let info = scheduler
        .schedule_job(
            Arc::clone(&data),
            |_| Err("boom".into()),
            vec![trigger::create("* * * * * ?").unwrap()],
        )
        .unwrap();

    scheduler.start().unwrap();
    let err = timeout(Duration::from_secs(3), errors.recv())
        .await
        .expect("error surfaced within 3s")
        .unwrap();
    assert_eq!(err.error().to_string(), "boom");
    assert!(err.context().actual_fire_time().is_some());
    assert_eq!(
        err.context().data_downcast::<String>().as_deref(),
        Some(&"flaky".to_string())
    );

    // The failure never unschedules the job; it is re-armed.
    assert!(scheduler.job_info(&data).is_ok());
    wait_until(|| info.next_fire_time().is_some()).await;
    scheduler.shutdown().unwrap();
}

#[tokio::test]
async fn async_jobs_rearm_after_each_completion() {
    let scheduler = Scheduler::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let data = Arc::new(0_u64);
    scheduler
        .schedule_async_job(
            Arc::clone(&data),
            move |_| {
                let tx = tx.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    let _ = tx.send(());
                    Ok::<(), BoxError>(())
                }
            },
            vec![trigger::create("* * * * * ?").unwrap()],
        )
        .unwrap();

    scheduler.start().unwrap();
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("first fire")
        .unwrap();
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("second fire after re-arm")
        .unwrap();
    scheduler.shutdown().unwrap();
}

#[tokio::test]
async fn stop_disarms_without_unscheduling() {
    let scheduler = Scheduler::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let data = Arc::new(());
    scheduler
        .schedule_job(
            Arc::clone(&data),
            move |_| {
                let _ = tx.send(());
                Ok(())
            },
            vec![trigger::create("* * * * * ?").unwrap()],
        )
        .unwrap();

    scheduler.start().unwrap();
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("fires while running")
        .unwrap();

    scheduler.stop().unwrap();
    while rx.try_recv().is_ok() {}
    tokio::time::sleep(Duration::from_millis(1300)).await;
    assert!(rx.try_recv().is_err(), "no fires after stop");
    assert!(scheduler.job_info(&data).is_ok(), "job still registered");

    scheduler.shutdown().unwrap();
}

#[tokio::test]
async fn running_jobs_reports_in_flight_callbacks() {
    let scheduler = Scheduler::new();
    let gate = Arc::new(Notify::new());
    let (entered_tx, mut entered_rx) = mpsc::unbounded_channel();
    let data = Arc::new("slow".to_string());
    let gate_for_callback = Arc::clone(&gate);
    scheduler
        .schedule_async_job(
            Arc::clone(&data),
            move |_| {
                let gate = Arc::clone(&gate_for_callback);
                let entered = entered_tx.clone();
                async move {
                    let _ = entered.send(());
                    gate.notified().await;
                    Ok::<(), BoxError>(())
                }
            },
            vec![trigger::create("now").unwrap()],
        )
        .unwrap();

    scheduler.start().unwrap();
    timeout(Duration::from_secs(2), entered_rx.recv())
        .await
        .expect("callback entered")
        .unwrap();

    let running = scheduler.running_jobs().unwrap();
    assert_eq!(running.len(), 1);
    assert!(running[0].is_running());

    gate.notify_one();
    wait_until(|| scheduler.running_jobs().unwrap().is_empty()).await;
    scheduler.shutdown().unwrap();
}

#[tokio::test]
async fn shutdown_silences_armed_timers() {
    let scheduler = Scheduler::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    scheduler
        .schedule_job(
            Arc::new(()),
            move |_| {
                let _ = tx.send(());
                Ok(())
            },
            vec![trigger::create("* * * * * ?").unwrap()],
        )
        .unwrap();

    scheduler.start().unwrap();
    scheduler.shutdown().unwrap();

    while rx.try_recv().is_ok() {}
    tokio::time::sleep(Duration::from_millis(1300)).await;
    assert!(rx.try_recv().is_err(), "no fires after shutdown");
    assert_eq!(scheduler.start().unwrap_err(), SchedulerError::Disposed);
}

#[tokio::test]
async fn trigger_mutation_rearms_a_live_job() {
    let scheduler = Scheduler::new();
    let data = Arc::new("mutable".to_string());
    let info = scheduler
        .schedule_job(
            Arc::clone(&data),
            |_| Ok(()),
            vec![trigger::create("0 0 9 1 1 ?").unwrap()],
        )
        .unwrap();

    scheduler.start().unwrap();
    let distant = info.next_fire_time().expect("armed for the yearly run");

    let hourly = trigger::create("0 0 * * * ?").unwrap();
    info.add_trigger(Arc::clone(&hourly));
    let closer = info.next_fire_time().expect("armed");
    assert!(closer <= distant);

    assert!(info.remove_trigger(&hourly));
    assert!(!info.remove_trigger(&hourly), "already removed");
    assert_eq!(info.next_fire_time(), Some(distant));

    info.clear_triggers();
    assert!(info.triggers().is_empty());
    scheduler.shutdown().unwrap();
}
