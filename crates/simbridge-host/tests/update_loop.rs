use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use simbridge_host::testing::{crash_model, distance_model, ScriptedEngine};
use simbridge_host::{
    CancelToken, ConstantInput, EngineSession, FeedInput, LoopConfig, Pacing, RandomInput,
    SampleRecorder, SessionState, Simulation, StepObserver, StepRecord, StopReason,
    TracingObserver, UpdateLoop,
};
use simbridge_sys::{Crash, CrashInput, Distance, DistanceInput};

#[test]
fn cancel_mid_loop_stops_promptly_and_destroys_once() {
    let engine = ScriptedEngine::<Distance>::new(distance_model(0.1));
    let log = engine.log();
    let config = LoopConfig {
        interval_ms: 250,
        ..LoopConfig::default()
    };
    let mut simulation = Simulation::<Distance, _>::start(
        engine,
        config,
        RandomInput::uniform(100.0, 200.0, Some(3)).expect("input"),
        TracingObserver,
    )
    .expect("start");

    while log.updates() == 0 {
        thread::sleep(Duration::from_millis(1));
    }
    assert!(simulation.is_running());

    let cancelled_at = Instant::now();
    simulation.cancel_token().cancel();
    let report = simulation.shutdown().expect("shutdown");
    assert!(
        cancelled_at.elapsed() < Duration::from_millis(200),
        "pause must wake on cancel"
    );
    assert_eq!(report.reason, StopReason::Cancelled);
    assert_eq!(simulation.state(), SessionState::Destroyed);
    assert_eq!(log.destroys(), 1);
    assert!(!log.updated_after_destroy());

    simulation.shutdown().expect("second shutdown");
    drop(simulation);
    assert_eq!(log.destroys(), 1);
}

#[test]
fn transient_failures_do_not_stop_the_loop() {
    let engine = ScriptedEngine::<Distance>::new(|time_s, input: &DistanceInput| {
        if (0.15..0.25).contains(&time_s) {
            Err("solver diverged".to_string())
        } else {
            Ok(simbridge_sys::DistanceOutput {
                distance: input.speed * time_s,
            })
        }
    });
    let session: EngineSession<Distance, _> = EngineSession::open(engine).expect("open");
    let config = LoopConfig {
        max_time_s: Some(0.4),
        pacing: Pacing::Simulated,
        ..LoopConfig::default()
    };
    let report = UpdateLoop::<Distance, _, _>::new(
        config,
        ConstantInput::new(DistanceInput { speed: 10.0 }),
        TracingObserver,
    )
    .run(&session, &CancelToken::new());

    assert_eq!(report.reason, StopReason::LimitReached);
    assert_eq!(report.steps, 4);
    assert_eq!(report.failed_steps, 1);
    assert_eq!(session.steps(), 4);
}

#[test]
fn realtime_pacing_spaces_steps() {
    let session: EngineSession<Distance, _> =
        EngineSession::open(ScriptedEngine::new(distance_model(0.1))).expect("open");
    let config = LoopConfig {
        interval_ms: 20,
        max_time_s: Some(0.3),
        pacing: Pacing::Realtime,
        ..LoopConfig::default()
    };
    let started = Instant::now();
    let report = UpdateLoop::<Distance, _, _>::new(
        config,
        ConstantInput::new(DistanceInput { speed: 1.0 }),
        TracingObserver,
    )
    .run(&session, &CancelToken::new());
    assert_eq!(report.steps, 4);
    assert!(started.elapsed() >= Duration::from_millis(60));
}

#[test]
fn feed_input_reaches_engine() {
    let engine = ScriptedEngine::<Crash>::new(crash_model());
    let session: EngineSession<Crash, _> = EngineSession::open(engine).expect("open");
    let (sender, feed) = FeedInput::new(CrashInput::default());
    sender.push(CrashInput {
        speed: 30.0,
        ay: 9.0,
        ..CrashInput::default()
    });

    let flags = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&flags);
    let config = LoopConfig {
        max_time_s: Some(0.1),
        pacing: Pacing::Simulated,
        ..LoopConfig::default()
    };
    UpdateLoop::<Crash, _, _>::new(config, feed, move |record: &StepRecord<'_, Crash>| {
        sink.lock().push(record.output.crash_flag)
    })
    .run(&session, &CancelToken::new());

    assert_eq!(*flags.lock(), vec![1.0, 1.0]);
}

#[test]
fn recorder_writes_csv_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("simbridge_output.csv");
    let session: EngineSession<Distance, _> =
        EngineSession::open(ScriptedEngine::new(distance_model(0.1))).expect("open");
    let recorder = SampleRecorder::<Distance, _>::create(&path, 0.0).expect("recorder");
    let config = LoopConfig {
        max_time_s: Some(0.1),
        pacing: Pacing::Simulated,
        ..LoopConfig::default()
    };
    let report = UpdateLoop::<Distance, _, _>::new(
        config,
        ConstantInput::new(DistanceInput { speed: 150.0 }),
        recorder,
    )
    .run(&session, &CancelToken::new());
    assert_eq!(report.steps, 2);

    let text = std::fs::read_to_string(&path).expect("read recording");
    let lines: Vec<_> = text.lines().collect();
    assert_eq!(lines[0], "time_s,speed,distance");
    assert_eq!(lines[1], "0,150,15");
    assert_eq!(lines.len(), 3);
}

struct Finished(Arc<Mutex<Option<StopReason>>>);

impl StepObserver<Distance> for Finished {
    fn on_step(&mut self, _record: &StepRecord<'_, Distance>) {}

    fn on_finish(&mut self, report: &simbridge_host::LoopReport) {
        *self.0.lock() = Some(report.reason);
    }
}

#[test]
fn destroying_session_under_running_loop_closes_it() {
    let session: Arc<EngineSession<Distance, _>> = Arc::new(
        EngineSession::open(ScriptedEngine::new(distance_model(0.1))).expect("open"),
    );
    let reason = Arc::new(Mutex::new(None));
    let handle = UpdateLoop::<Distance, _, _>::new(
        LoopConfig {
            interval_ms: 1,
            ..LoopConfig::default()
        },
        ConstantInput::new(DistanceInput { speed: 1.0 }),
        Finished(Arc::clone(&reason)),
    )
    .spawn(Arc::clone(&session), CancelToken::new())
    .expect("spawn");

    thread::sleep(Duration::from_millis(10));
    assert!(session.destroy());
    let report = handle.join().expect("join");
    assert_eq!(report.reason, StopReason::SessionClosed);
    assert_eq!(*reason.lock(), Some(StopReason::SessionClosed));
    let log = session.with_boundary(|engine| engine.log());
    assert!(!log.updated_after_destroy());
}
