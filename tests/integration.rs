//! Integration tests for keyboard-tapkit
//!
//! These tests drive the full pipeline through the public API: raw scancodes
//! through the translator and the hook sink, classification, callback
//! dispatch, hook supervision and reporting.

use keyboard_tapkit::config::Config;
use keyboard_tapkit::gesture::{GestureEvent, GestureKind, TapHoldClassifier};
use keyboard_tapkit::keyboard::{
    EventHook, HookError, KeyCode, LogicalKey, ModifierFlags, RawEvent, RawEventSink,
    ScancodeTranslator, Timing, Transition,
};
use keyboard_tapkit::report::GestureRecorder;
use keyboard_tapkit::scheduler::{ManualScheduler, RunLoop, Scheduler};
use keyboard_tapkit::supervisor::{self, SupervisorOutcome};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const A: u16 = 30;

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

type Log = Arc<Mutex<Vec<(LogicalKey, GestureKind, Duration)>>>;

/// Classifier on a virtual clock, recording every gesture relative to `start`
struct Rig {
    sched: Arc<ManualScheduler>,
    classifier: TapHoldClassifier,
    start: Instant,
    log: Log,
}

impl Rig {
    fn new() -> Self {
        Self::with_timing(Timing::default())
    }

    fn with_timing(timing: Timing) -> Self {
        let start = Instant::now();
        let sched = Arc::new(ManualScheduler::starting_at(start));
        let classifier = TapHoldClassifier::with_scheduler(timing, sched.clone());
        let log: Log = Arc::default();

        let sink = Arc::clone(&log);
        classifier.subscribe(move |ev: &GestureEvent| {
            sink.lock().push((ev.key, ev.gesture, ev.at - start))
        });

        Self {
            sched,
            classifier,
            start,
            log,
        }
    }

    fn at(&self, t: u64) -> Instant {
        self.start + ms(t)
    }

    fn key(&self, t: u64, code: u16, transition: Transition) {
        self.sched.advance_to(self.at(t));
        self.classifier
            .submit_raw_event(KeyCode(code), transition, self.at(t));
        self.sched.run_due();
    }

    fn settle(&self, t: u64) {
        self.sched.advance_to(self.at(t));
    }

    fn gestures(&self) -> Vec<GestureKind> {
        self.log.lock().iter().map(|(_, g, _)| *g).collect()
    }
}

/// Hook whose liveness is flipped by the test
#[derive(Clone, Default)]
struct ScriptedHook {
    alive: Arc<AtomicBool>,
    sink: Arc<Mutex<Option<RawEventSink>>>,
}

impl ScriptedHook {
    fn emit(&self, event: RawEvent) {
        if let Some(sink) = self.sink.lock().as_ref() {
            sink.submit(event);
        }
    }
}

impl EventHook for ScriptedHook {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn install(&mut self, sink: RawEventSink) -> Result<(), HookError> {
        *self.sink.lock() = Some(sink);
        self.alive.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn uninstall(&mut self) {
        self.alive.store(false, Ordering::SeqCst);
        *self.sink.lock() = None;
    }
}

// ---------------------------------------------------------------------------
// Classification scenarios
// ---------------------------------------------------------------------------

#[test]
fn double_tap_is_one_tapped_two() {
    let rig = Rig::new();
    rig.key(0, A, Transition::Down);
    rig.key(50, A, Transition::Up);
    rig.key(200, A, Transition::Down);
    rig.key(250, A, Transition::Up);
    rig.settle(5000);

    let log = rig.log.lock().clone();
    let gestures: Vec<_> = log.iter().map(|(_, g, t)| (*g, *t)).collect();
    assert_eq!(
        gestures,
        vec![
            (GestureKind::Released, ms(50)),
            (GestureKind::Released, ms(250)),
            (GestureKind::Tapped(2), ms(750)),
        ]
    );
}

#[test]
fn long_press_is_held_released_then_tapped() {
    let rig = Rig::new();
    rig.key(0, A, Transition::Down);
    rig.key(1000, A, Transition::Up);
    rig.settle(5000);

    let log = rig.log.lock().clone();
    let gestures: Vec<_> = log.iter().map(|(_, g, t)| (*g, *t)).collect();
    assert_eq!(
        gestures,
        vec![
            (GestureKind::Held, ms(800)),
            (GestureKind::Released, ms(1000)),
            (GestureKind::Tapped(1), ms(1500)),
        ]
    );
}

#[test]
fn window_is_measured_between_releases() {
    let rig = Rig::new();
    rig.key(0, A, Transition::Down);
    rig.key(10, A, Transition::Up);
    // Down is late but the release still lands inside the window
    rig.key(400, A, Transition::Down);
    rig.key(505, A, Transition::Up);
    rig.key(1100, A, Transition::Down);
    rig.key(1110, A, Transition::Up);
    rig.settle(5000);

    let taps: Vec<_> = rig.gestures().iter().filter_map(|g| g.tap_count()).collect();
    assert_eq!(taps, vec![2, 1]);
}

#[test]
fn ten_rapid_taps_coalesce() {
    let rig = Rig::new();
    for i in 0..10 {
        rig.key(i * 60, A, Transition::Down);
        rig.key(i * 60 + 20, A, Transition::Up);
    }
    rig.settle(5000);

    let taps: Vec<_> = rig.gestures().iter().filter_map(|g| g.tap_count()).collect();
    assert_eq!(taps, vec![10]);
}

#[test]
fn custom_timing_is_honoured() {
    let timing = Timing::new(ms(200), ms(300)).expect("positive durations");
    let rig = Rig::with_timing(timing);

    rig.key(0, A, Transition::Down);
    rig.key(400, A, Transition::Up);
    rig.settle(5000);

    let log = rig.log.lock().clone();
    let gestures: Vec<_> = log.iter().map(|(_, g, t)| (*g, *t)).collect();
    assert_eq!(
        gestures,
        vec![
            (GestureKind::Held, ms(300)),
            (GestureKind::Released, ms(400)),
            (GestureKind::Tapped(1), ms(600)),
        ]
    );
}

#[test]
fn interleaved_keys_classify_independently() {
    let rig = Rig::new();
    let esc = LogicalKey::Escape.code().as_u16();

    rig.key(0, A, Transition::Down);
    rig.key(20, esc, Transition::Down);
    rig.key(40, A, Transition::Up);
    rig.key(100, A, Transition::Down);
    rig.key(120, A, Transition::Up);
    rig.settle(5000);

    let log = rig.log.lock().clone();
    let a_taps: Vec<_> = log
        .iter()
        .filter(|(k, _, _)| *k == LogicalKey::Custom(KeyCode(A)))
        .filter_map(|(_, g, _)| g.tap_count())
        .collect();
    assert_eq!(a_taps, vec![2]);

    let esc_gestures: Vec<_> = log
        .iter()
        .filter(|(k, _, _)| *k == LogicalKey::Escape)
        .map(|(_, g, _)| *g)
        .collect();
    assert_eq!(esc_gestures, vec![GestureKind::Held]);
    assert!(rig.classifier.is_key_down(LogicalKey::Escape));
}

// ---------------------------------------------------------------------------
// Key identity
// ---------------------------------------------------------------------------

#[test]
fn globe_callback_fires_for_function_scancode() {
    let rig = Rig::new();
    let hits = Arc::new(Mutex::new(0));

    let sink = Arc::clone(&hits);
    rig.classifier
        .register(LogicalKey::Globe, GestureKind::Tapped(1), move || *sink.lock() += 1);

    let fn_code = LogicalKey::Function.code().as_u16();
    rig.key(0, fn_code, Transition::Down);
    rig.key(30, fn_code, Transition::Up);
    rig.settle(5000);

    assert_eq!(*hits.lock(), 1);
}

#[test]
fn unknown_scancode_is_classified_as_custom() {
    let rig = Rig::new();
    rig.key(0, 0x2ff, Transition::Down);
    rig.key(30, 0x2ff, Transition::Up);
    rig.settle(5000);

    let log = rig.log.lock().clone();
    assert!(log
        .iter()
        .all(|(k, _, _)| *k == LogicalKey::Custom(KeyCode(0x2ff))));
    assert_eq!(log.len(), 2);
}

// ---------------------------------------------------------------------------
// Raw scancode path
// ---------------------------------------------------------------------------

#[test]
fn translated_modifier_reports_drive_classification() {
    let rig = Rig::new();
    let sink = rig.classifier.sink();
    let mut translator = ScancodeTranslator::new();
    let shift = LogicalKey::LeftShift.code().as_u16();

    // press, autorepeat, release, as evdev reports them
    for (t, value) in [(0, 1), (30, 2), (60, 2), (1000, 0)] {
        rig.sched.advance_to(rig.at(t));
        if let Some(event) = translator.translate(shift, value, rig.at(t)) {
            sink.submit(event);
        }
        rig.sched.run_due();
    }
    rig.settle(5000);

    assert_eq!(
        rig.gestures(),
        vec![GestureKind::Held, GestureKind::Released, GestureKind::Tapped(1)]
    );
}

#[test]
fn both_shifts_tracked_separately_through_flags() {
    let rig = Rig::new();
    let left = LogicalKey::LeftShift.code();
    let right = LogicalKey::RightShift.code();

    let flags = |t: u64, code: KeyCode, set: ModifierFlags| {
        rig.sched.advance_to(rig.at(t));
        rig.classifier
            .submit(RawEvent::flags_changed(code, set, rig.at(t)));
        rig.sched.run_due();
    };

    flags(0, left, ModifierFlags::LEFT_SHIFT);
    flags(10, right, ModifierFlags::LEFT_SHIFT | ModifierFlags::RIGHT_SHIFT);
    flags(50, left, ModifierFlags::RIGHT_SHIFT);
    assert!(!rig.classifier.is_key_down(LogicalKey::LeftShift));
    assert!(rig.classifier.is_key_down(LogicalKey::RightShift));

    flags(70, right, ModifierFlags::empty());
    rig.settle(5000);

    let log = rig.log.lock().clone();
    let taps: Vec<_> = log
        .iter()
        .filter_map(|(k, g, _)| g.tap_count().map(|n| (*k, n)))
        .collect();
    assert_eq!(
        taps,
        vec![(LogicalKey::LeftShift, 1), (LogicalKey::RightShift, 1)]
    );
}

// ---------------------------------------------------------------------------
// Hook supervision
// ---------------------------------------------------------------------------

#[test]
fn events_flow_from_hook_and_resume_after_recovery() {
    let rig = Rig::new();
    let hook = ScriptedHook::default();
    rig.classifier
        .attach_hook(Box::new(hook.clone()))
        .expect("scripted hook installs");
    assert_eq!(supervisor::check(&rig.classifier), SupervisorOutcome::Healthy);

    hook.emit(RawEvent::down(KeyCode(A), rig.at(0)));
    hook.emit(RawEvent::up(KeyCode(A), rig.at(0)));
    rig.settle(1000);
    assert_eq!(rig.gestures().len(), 2);

    // Simulate the hook going dark
    hook.alive.store(false, Ordering::SeqCst);
    assert!(!rig.classifier.is_hook_healthy());
    assert_eq!(supervisor::check(&rig.classifier), SupervisorOutcome::Recovered);

    hook.emit(RawEvent::down(KeyCode(A), rig.at(2000)));
    rig.settle(3000);
    assert_eq!(rig.gestures().last(), Some(&GestureKind::Held));
}

#[test]
fn modifier_held_across_hook_death_is_pressed_fresh_after_recovery() {
    let rig = Rig::new();
    let hook = ScriptedHook::default();
    rig.classifier
        .attach_hook(Box::new(hook.clone()))
        .expect("scripted hook installs");
    let shift = LogicalKey::LeftShift.code().as_u16();

    let mut before = ScancodeTranslator::new();
    let press = before.translate(shift, 1, rig.at(0)).expect("shift press");
    hook.emit(press);
    rig.settle(1000);
    assert_eq!(rig.gestures(), vec![GestureKind::Held]);

    // The release is lost while the hook is dark
    hook.alive.store(false, Ordering::SeqCst);
    assert_eq!(supervisor::check(&rig.classifier), SupervisorOutcome::Recovered);
    assert!(!rig.classifier.is_key_down(LogicalKey::LeftShift));
    rig.log.lock().clear();

    let mut after = ScancodeTranslator::new();
    for (t, value) in [(2000, 1), (3500, 0)] {
        rig.sched.advance_to(rig.at(t));
        let event = after.translate(shift, value, rig.at(t)).expect("shift report");
        hook.emit(event);
        rig.sched.run_due();
    }
    rig.settle(6000);

    let log = rig.log.lock().clone();
    let gestures: Vec<_> = log.iter().map(|(_, g, t)| (*g, *t)).collect();
    assert_eq!(
        gestures,
        vec![
            (GestureKind::Held, ms(2800)),
            (GestureKind::Released, ms(3500)),
            (GestureKind::Tapped(1), ms(4000)),
        ]
    );
}

#[test]
fn detached_hook_no_longer_delivers() {
    let rig = Rig::new();
    let hook = ScriptedHook::default();
    rig.classifier
        .attach_hook(Box::new(hook.clone()))
        .expect("scripted hook installs");

    assert!(rig.classifier.detach_hook().is_some());
    hook.emit(RawEvent::down(KeyCode(A), rig.at(0)));
    rig.settle(5000);

    assert!(rig.gestures().is_empty());
    assert_eq!(supervisor::check(&rig.classifier), SupervisorOutcome::StillDown);
}

// ---------------------------------------------------------------------------
// Registration lifecycle
// ---------------------------------------------------------------------------

#[test]
fn cancel_between_release_and_settle_suppresses_tap() {
    let rig = Rig::new();
    let fired = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&fired);
    let id = rig
        .classifier
        .register(LogicalKey::Custom(KeyCode(A)), GestureKind::Tapped(1), move || {
            sink.lock().push("tap")
        });
    let sink = Arc::clone(&fired);
    rig.classifier
        .register(LogicalKey::Custom(KeyCode(A)), GestureKind::Released, move || {
            sink.lock().push("release")
        });

    rig.key(0, A, Transition::Down);
    rig.key(50, A, Transition::Up);
    rig.classifier.cancel(id);
    rig.settle(5000);

    assert_eq!(*fired.lock(), vec!["release"]);
}

#[test]
fn recorder_and_callbacks_see_the_same_stream() {
    let rig = Rig::new();
    let recorder = GestureRecorder::attach(&rig.classifier);

    rig.key(0, A, Transition::Down);
    rig.key(50, A, Transition::Up);
    rig.key(100, A, Transition::Down);
    rig.key(1000, A, Transition::Up);
    rig.settle(5000);

    let report = recorder.report(&rig.classifier);
    assert_eq!(report.summary.total_gestures as usize, rig.gestures().len());
    // The first tap settled before the long press was released
    assert_eq!(report.keys[0].tapped.get(&1), Some(&2));
    assert_eq!(report.keys[0].held, 1);
}

// ---------------------------------------------------------------------------
// Config and real-time dispatch
// ---------------------------------------------------------------------------

#[test]
fn config_builds_classifier() {
    let mut config = Config::default();
    config.classifier.tap_window_ms = 250;
    config.monitor.keys = vec!["fn".into(), "esc".into()];

    let timing = config.timing().expect("valid timing");
    let sched = Arc::new(ManualScheduler::new());
    let classifier = TapHoldClassifier::with_scheduler(timing, sched);
    assert_eq!(classifier.timing().tap_window(), ms(250));

    let keys = config.monitored_keys().expect("valid keys");
    for key in &keys {
        classifier.register(*key, GestureKind::Held, || {});
    }
    assert_eq!(classifier.registration_count(), 2);
}

#[test]
fn run_loop_dispatches_in_real_time() {
    let timing = Timing::new(ms(40), ms(60)).expect("positive durations");
    let run_loop = RunLoop::spawn().expect("spawn run loop");
    let classifier = TapHoldClassifier::with_scheduler(timing, Arc::new(run_loop));

    let (tx, rx) = std::sync::mpsc::channel();
    let tx = Mutex::new(tx);
    classifier.subscribe(move |ev: &GestureEvent| {
        let _ = tx.lock().send(ev.gesture);
    });

    let now = Instant::now();
    classifier.submit_raw_event(KeyCode(A), Transition::Down, now);
    classifier.submit_raw_event(KeyCode(A), Transition::Up, now + ms(5));

    let first = rx.recv_timeout(Duration::from_secs(2)).expect("released");
    let second = rx.recv_timeout(Duration::from_secs(2)).expect("tapped");
    assert_eq!(first, GestureKind::Released);
    assert_eq!(second, GestureKind::Tapped(1));
    assert!(rx.recv_timeout(ms(150)).is_err());
}

#[test]
fn scheduler_clock_drives_gesture_timestamps() {
    let rig = Rig::new();
    rig.key(0, A, Transition::Down);
    rig.settle(2000);
    assert_eq!(rig.sched.now(), rig.at(2000));
    assert_eq!(rig.log.lock()[0].2, ms(800));
}

// ---------------------------------------------------------------------------
// Concurrent access
// ---------------------------------------------------------------------------

#[test]
fn producer_and_registrations_race_safely() {
    const CYCLES: usize = 500;
    const CHURN: usize = 200;

    let timing = Timing::new(ms(2), ms(10_000)).expect("positive durations");
    let run_loop = RunLoop::spawn().expect("spawn run loop");
    let classifier = TapHoldClassifier::with_scheduler(timing, Arc::new(run_loop));
    let key = LogicalKey::Custom(KeyCode(A));
    let other = LogicalKey::Escape;

    let released = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&released);
    classifier.register(key, GestureKind::Released, move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let producer = {
        let classifier = classifier.clone();
        thread::spawn(move || {
            for _ in 0..CYCLES {
                classifier.submit_raw_event(KeyCode(A), Transition::Down, Instant::now());
                classifier.submit_raw_event(KeyCode(A), Transition::Up, Instant::now());
            }
        })
    };

    let app = {
        let classifier = classifier.clone();
        thread::spawn(move || {
            let mut kept = 0;
            for i in 0..CHURN {
                let id = classifier.register(key, GestureKind::Released, || {});
                classifier.cancel(id);
                let id = classifier.register(key, GestureKind::Tapped(1), || {});
                classifier.cancel(id);
                if i % 10 == 0 {
                    classifier.register(other, GestureKind::Held, || {});
                    kept += 1;
                }
            }
            kept
        })
    };

    producer.join().expect("producer thread");
    let kept = app.join().expect("app thread");

    let deadline = Instant::now() + Duration::from_secs(5);
    while released.load(Ordering::SeqCst) < CYCLES && Instant::now() < deadline {
        thread::sleep(ms(5));
    }
    thread::sleep(ms(50));

    assert_eq!(released.load(Ordering::SeqCst), CYCLES);
    assert!(!classifier.is_key_down(key));
    assert_eq!(classifier.registration_count(), kept + 1);
}
