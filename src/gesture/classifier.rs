//! Tap/hold classifier
//!
//! Turns raw key transitions into [`GestureKind`] events:
//!
//! - key-down arms a hold timer; if it fires before the key-up, `Held` is
//!   emitted once for that down-session.
//! - key-up emits `Released` right away, counts the tap, and arms a settle
//!   timer for the tap window. Only the settle timer of the most recent
//!   key-up emits `Tapped(n)` with the size of the burst.
//!
//! All per-key state sits behind one lock. Timer jobs re-check their token
//! under that lock, so a timer racing with its own cancellation either runs
//! completely or not at all. Callbacks run on the scheduler, never while the
//! state lock is held.

use super::registry::{CallbackRegistry, RegistrationId};
use super::{GestureEvent, GestureKind};
use crate::keyboard::{
    resolve, EventHook, HookError, KeyCode, KeyboardState, LogicalKey, RawEvent, RawEventKind,
    RawEventSink, Timing, Transition,
};
use crate::scheduler::{RunLoop, Scheduler};
use parking_lot::Mutex;
use std::io;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// Errors reported by the classifier
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    /// The raw event source could not be established
    #[error("event hook unavailable: {0}")]
    HookUnavailable(#[from] HookError),
    /// Recovery was requested but no hook is attached
    #[error("no event hook attached")]
    NoHook,
    /// A timing threshold was zero
    #[error("invalid timing: {0}")]
    InvalidTiming(&'static str),
    /// The dispatch thread could not be started
    #[error("failed to start dispatch thread: {0}")]
    Dispatch(io::Error),
}

struct Inner {
    state: Mutex<KeyboardState>,
    registry: Mutex<CallbackRegistry>,
    scheduler: Arc<dyn Scheduler>,
    hook: Mutex<Option<Box<dyn EventHook>>>,
}

impl Inner {
    fn submit(self: &Arc<Self>, event: RawEvent) {
        let key = resolve(event.code);
        let mut state = self.state.lock();

        let transition = match event.kind {
            RawEventKind::Key(transition) => transition,
            RawEventKind::FlagsChanged => match state.diff_flags(key, event.flags) {
                Some(transition) => transition,
                None => {
                    log::trace!("flags changed without a transition for {}", key);
                    return;
                }
            },
        };

        match transition {
            Transition::Down => self.key_down(&mut state, key),
            Transition::Up => self.key_up(&mut state, key, event.timestamp),
        }
    }

    fn key_down(self: &Arc<Self>, state: &mut KeyboardState, key: LogicalKey) {
        let hold_duration = state.timing().hold_duration();
        let entry = state.key_mut(key);

        let Some(pressed) = entry.press() else {
            log::trace!("duplicate down for {}", key);
            return;
        };

        if let Some(stale) = pressed.stale_timer {
            self.scheduler.cancel(stale);
        }

        let weak = Arc::downgrade(self);
        let session = pressed.session;
        let timer = self.scheduler.schedule(
            hold_duration,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.hold_fired(key, session);
                }
            }),
        );
        entry.hold_timer = Some(timer);
    }

    fn key_up(self: &Arc<Self>, state: &mut KeyboardState, key: LogicalKey, timestamp: Instant) {
        let tap_window = state.timing().tap_window();

        let Some(released) = state.key_mut(key).release(timestamp, tap_window) else {
            log::trace!("duplicate up for {}", key);
            return;
        };

        if let Some(timer) = released.hold_timer {
            self.scheduler.cancel(timer);
        }

        // Zero delay keeps Released ahead of the settle timer on the dispatch context
        let weak = Arc::downgrade(self);
        self.scheduler.schedule(
            Duration::ZERO,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.dispatch(GestureEvent::new(key, GestureKind::Released, timestamp));
                }
            }),
        );

        let weak = Arc::downgrade(self);
        let generation = released.generation;
        log::trace!("{} tap #{} pending", key, released.tap_count);
        self.scheduler.schedule(
            tap_window,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.settle_fired(key, generation);
                }
            }),
        );
    }

    fn hold_fired(&self, key: LogicalKey, session: u64) {
        let fire = self.state.lock().key_mut(key).hold_elapsed(session);
        if fire {
            self.dispatch(GestureEvent::new(key, GestureKind::Held, self.scheduler.now()));
        }
    }

    fn settle_fired(&self, key: LogicalKey, generation: u64) {
        let count = self.state.lock().key_mut(key).settle(generation);
        if let Some(count) = count {
            self.dispatch(GestureEvent::new(key, GestureKind::Tapped(count), self.scheduler.now()));
        }
    }

    fn reset_transient(&self) {
        let mut state = self.state.lock();
        let stale = state.reset_transient();
        for timer in stale {
            self.scheduler.cancel(timer);
        }
    }

    fn dispatch(&self, event: GestureEvent) {
        let listeners = self.registry.lock().listeners(&event.key, event.gesture);
        log::debug!("{}", event);
        listeners.invoke(&event);
    }

    fn sink(self: &Arc<Self>) -> RawEventSink {
        let weak: Weak<Inner> = Arc::downgrade(self);
        RawEventSink::new(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.submit(event);
            }
        })
    }
}

/// Per-key tap, hold and release classifier.
///
/// Cheap to clone; clones share state. Safe to feed from a hook thread while
/// other threads register and cancel callbacks.
#[derive(Clone)]
pub struct TapHoldClassifier {
    inner: Arc<Inner>,
}

impl TapHoldClassifier {
    /// Create a classifier with its own dispatch thread
    pub fn new(timing: Timing) -> Result<Self, ClassifierError> {
        let run_loop = RunLoop::spawn().map_err(ClassifierError::Dispatch)?;
        Ok(Self::with_scheduler(timing, Arc::new(run_loop)))
    }

    /// Create a classifier that runs timers and callbacks on `scheduler`
    pub fn with_scheduler(timing: Timing, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(KeyboardState::new(timing)),
                registry: Mutex::new(CallbackRegistry::new()),
                scheduler,
                hook: Mutex::new(None),
            }),
        }
    }

    /// Call `callback` every time `gesture` is recognised on `key`
    pub fn register<F>(&self, key: LogicalKey, gesture: GestureKind, callback: F) -> RegistrationId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner
            .registry
            .lock()
            .register(key, gesture, Arc::new(callback))
    }

    /// Call `observer` for every gesture on every key
    pub fn subscribe<F>(&self, observer: F) -> RegistrationId
    where
        F: Fn(&GestureEvent) + Send + Sync + 'static,
    {
        self.inner.registry.lock().subscribe(Arc::new(observer))
    }

    /// Remove a registration. Gestures dispatched after this returns will not
    /// reach it; a call already running may still finish.
    pub fn cancel(&self, id: RegistrationId) -> bool {
        self.inner.registry.lock().cancel(id)
    }

    /// Number of live registrations
    pub fn registration_count(&self) -> usize {
        self.inner.registry.lock().len()
    }

    /// Feed one discrete transition
    pub fn submit_raw_event(&self, code: KeyCode, transition: Transition, timestamp: Instant) {
        self.submit(RawEvent::new(
            code,
            RawEventKind::Key(transition),
            Default::default(),
            timestamp,
        ));
    }

    /// Feed one raw event; flag changes are diffed into transitions
    pub fn submit(&self, event: RawEvent) {
        self.inner.submit(event);
    }

    /// Handle hooks use to push events into this classifier
    pub fn sink(&self) -> RawEventSink {
        self.inner.sink()
    }

    pub fn timing(&self) -> Timing {
        self.inner.state.lock().timing()
    }

    /// Replace both thresholds. Timers already armed keep their old deadline.
    pub fn set_timing(&self, timing: Timing) {
        self.inner.state.lock().set_timing(timing);
    }

    pub fn set_tap_window(&self, tap_window: Duration) -> Result<(), ClassifierError> {
        let mut state = self.inner.state.lock();
        let timing = state
            .timing()
            .with_tap_window(tap_window)
            .ok_or(ClassifierError::InvalidTiming("tap window must be positive"))?;
        state.set_timing(timing);
        Ok(())
    }

    pub fn set_hold_duration(&self, hold_duration: Duration) -> Result<(), ClassifierError> {
        let mut state = self.inner.state.lock();
        let timing = state
            .timing()
            .with_hold_duration(hold_duration)
            .ok_or(ClassifierError::InvalidTiming("hold duration must be positive"))?;
        state.set_timing(timing);
        Ok(())
    }

    /// Whether `key` is currently down
    pub fn is_key_down(&self, key: LogicalKey) -> bool {
        self.inner
            .state
            .lock()
            .get(&key)
            .is_some_and(|state| state.is_down)
    }

    /// Keys seen so far
    pub fn tracked_keys(&self) -> usize {
        self.inner.state.lock().tracked_keys()
    }

    /// Attach and install a raw event source, replacing any previous one.
    ///
    /// The hook is kept even if installation fails, so that
    /// [`TapHoldClassifier::reinstall_hook`] can retry it later.
    pub fn attach_hook(&self, mut hook: Box<dyn EventHook>) -> Result<(), ClassifierError> {
        let mut slot = self.inner.hook.lock();
        if let Some(mut previous) = slot.take() {
            previous.uninstall();
            self.inner.reset_transient();
        }

        let result = hook.install(self.sink());
        match &result {
            Ok(()) => log::info!("{} hook installed", hook.name()),
            Err(e) => log::warn!("{} hook unavailable: {}", hook.name(), e),
        }
        *slot = Some(hook);
        result.map_err(ClassifierError::from)
    }

    /// Uninstall and return the attached hook
    pub fn detach_hook(&self) -> Option<Box<dyn EventHook>> {
        let mut hook = self.inner.hook.lock().take()?;
        hook.uninstall();
        log::info!("{} hook detached", hook.name());
        Some(hook)
    }

    /// Whether an attached hook is delivering events
    pub fn is_hook_healthy(&self) -> bool {
        self.inner
            .hook
            .lock()
            .as_ref()
            .is_some_and(|hook| hook.is_alive())
    }

    /// Reinstall the attached hook if it has gone dark. A no-op on a live hook.
    pub fn reinstall_hook(&self) -> Result<(), ClassifierError> {
        let mut slot = self.inner.hook.lock();
        let hook = slot.as_mut().ok_or(ClassifierError::NoHook)?;
        if hook.is_alive() {
            return Ok(());
        }

        log::warn!("{} hook is not delivering events; reinstalling", hook.name());
        hook.uninstall();
        // The new source starts from an all-keys-up snapshot
        self.inner.reset_transient();
        hook.install(self.sink())?;
        log::info!("{} hook reinstalled", hook.name());
        Ok(())
    }
}
