//! Per-key tap/hold state tracking
//!
//! This is the pure half of the classifier: it decides what each transition
//! means and leaves timers and callbacks to the caller.

use super::{LogicalKey, ModifierFlags, Transition};
use crate::scheduler::TimerId;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Default window in which consecutive taps are counted together
pub const DEFAULT_TAP_WINDOW: Duration = Duration::from_millis(500);

/// Default time a key must stay down to count as held
pub const DEFAULT_HOLD_DURATION: Duration = Duration::from_millis(800);

/// Tap and hold thresholds. Both are always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Maximum gap between a key-up and the next one for both to count in the same burst
    tap_window: Duration,
    /// How long a key must stay down before `Held` fires
    hold_duration: Duration,
}

impl Timing {
    /// Build a timing pair. Returns `None` if either duration is zero.
    pub fn new(tap_window: Duration, hold_duration: Duration) -> Option<Self> {
        if tap_window.is_zero() || hold_duration.is_zero() {
            return None;
        }
        Some(Self {
            tap_window,
            hold_duration,
        })
    }

    pub fn tap_window(&self) -> Duration {
        self.tap_window
    }

    pub fn hold_duration(&self) -> Duration {
        self.hold_duration
    }

    /// Same thresholds with a different tap window; `None` if it is zero
    pub fn with_tap_window(self, tap_window: Duration) -> Option<Self> {
        Self::new(tap_window, self.hold_duration)
    }

    /// Same thresholds with a different hold duration; `None` if it is zero
    pub fn with_hold_duration(self, hold_duration: Duration) -> Option<Self> {
        Self::new(self.tap_window, hold_duration)
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            tap_window: DEFAULT_TAP_WINDOW,
            hold_duration: DEFAULT_HOLD_DURATION,
        }
    }
}

/// State of a single key
#[derive(Debug, Clone, Default)]
pub struct KeyRuntimeState {
    /// Whether a key-down has been seen with no matching key-up yet
    pub is_down: bool,
    /// Taps counted in the current burst
    pub pending_tap_count: u64,
    /// Time of the last key-up; `None` stands for the distant past
    pub last_tap: Option<Instant>,
    /// Armed hold timer for the current down-session
    pub hold_timer: Option<TimerId>,
    /// Incremented on each accepted key-down
    down_session: u64,
    /// Incremented on each accepted key-up
    tap_generation: u64,
    /// `Held` already emitted for the current down-session
    held_emitted: bool,
}

/// Outcome of an accepted key-down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PressOutcome {
    /// Hold timer left over from an earlier session, to be cancelled
    pub stale_timer: Option<TimerId>,
    /// Token the new hold timer must present when it fires
    pub session: u64,
}

/// Outcome of an accepted key-up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseOutcome {
    /// Hold timer to cancel
    pub hold_timer: Option<TimerId>,
    /// Taps counted so far in this burst, including this one
    pub tap_count: u64,
    /// Token the settle timer must present when it fires
    pub generation: u64,
}

impl KeyRuntimeState {
    /// Handle a key-down. Returns `None` if the key is already down.
    pub fn press(&mut self) -> Option<PressOutcome> {
        if self.is_down {
            return None;
        }
        self.is_down = true;
        self.held_emitted = false;
        self.down_session += 1;

        Some(PressOutcome {
            stale_timer: self.hold_timer.take(),
            session: self.down_session,
        })
    }

    /// Handle a key-up at `now`. Returns `None` if the key is already up.
    pub fn release(&mut self, now: Instant, tap_window: Duration) -> Option<ReleaseOutcome> {
        if !self.is_down {
            return None;
        }
        self.is_down = false;

        let within_window = self
            .last_tap
            .map(|last| now.saturating_duration_since(last) <= tap_window)
            .unwrap_or(false);

        if within_window {
            self.pending_tap_count = self.pending_tap_count.saturating_add(1);
        } else {
            self.pending_tap_count = 1;
        }
        self.last_tap = Some(now);
        self.tap_generation += 1;

        Some(ReleaseOutcome {
            hold_timer: self.hold_timer.take(),
            tap_count: self.pending_tap_count,
            generation: self.tap_generation,
        })
    }

    /// Hold timer for `session` fired. Returns true if `Held` should be emitted.
    pub fn hold_elapsed(&mut self, session: u64) -> bool {
        if !self.is_down || self.down_session != session || self.held_emitted {
            return false;
        }
        self.held_emitted = true;
        self.hold_timer = None;
        true
    }

    /// Settle timer for `generation` fired. Returns the burst size to emit, if any.
    pub fn settle(&mut self, generation: u64) -> Option<u64> {
        if self.tap_generation != generation || self.pending_tap_count == 0 {
            return None;
        }
        let count = self.pending_tap_count;
        self.pending_tap_count = 0;
        Some(count)
    }

    /// Whether `Held` fired for the current down-session
    pub fn held_emitted(&self) -> bool {
        self.held_emitted
    }

    /// Forget the current down-session after the event source was lost.
    ///
    /// The key is treated as up and any hold timer for the old session goes
    /// stale. The pending tap burst is kept. Returns the hold timer to cancel.
    pub fn reset_down(&mut self) -> Option<TimerId> {
        self.is_down = false;
        self.held_emitted = false;
        self.down_session += 1;
        self.hold_timer.take()
    }
}

/// Overall keyboard state
#[derive(Debug, Default)]
pub struct KeyboardState {
    /// State for each key, created on first use
    keys: HashMap<LogicalKey, KeyRuntimeState>,
    /// Modifier flags from the last flag-change event
    flags: ModifierFlags,
    /// Thresholds applied to timers armed from now on
    timing: Timing,
}

impl KeyboardState {
    pub fn new(timing: Timing) -> Self {
        Self {
            keys: HashMap::new(),
            flags: ModifierFlags::empty(),
            timing,
        }
    }

    /// State for `key`, created if missing
    pub fn key_mut(&mut self, key: LogicalKey) -> &mut KeyRuntimeState {
        self.keys.entry(key).or_default()
    }

    /// Get state for a specific key
    pub fn get(&self, key: &LogicalKey) -> Option<&KeyRuntimeState> {
        self.keys.get(key)
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    pub fn set_timing(&mut self, timing: Timing) {
        self.timing = timing;
    }

    /// Last observed modifier flags
    pub fn flags(&self) -> ModifierFlags {
        self.flags
    }

    /// Derive a transition for `key` from a flag-change event.
    ///
    /// Compares the key's modifier bit in `flags` against the previously
    /// observed set, then records `flags` as the new baseline. Returns `None`
    /// when the key has no modifier bit or its bit did not change.
    pub fn diff_flags(&mut self, key: LogicalKey, flags: ModifierFlags) -> Option<Transition> {
        let previous = std::mem::replace(&mut self.flags, flags);
        let bit = key.modifier_flag()?;

        match (previous.contains(bit), flags.contains(bit)) {
            (false, true) => Some(Transition::Down),
            (true, false) => Some(Transition::Up),
            _ => None,
        }
    }

    /// Drop everything that depended on the lost event source: keys still
    /// down and the modifier baseline. Returns hold timers to cancel.
    pub fn reset_transient(&mut self) -> Vec<TimerId> {
        self.flags = ModifierFlags::empty();
        self.keys
            .values_mut()
            .filter_map(KeyRuntimeState::reset_down)
            .collect()
    }

    /// Keys currently down
    pub fn keys_down(&self) -> Vec<LogicalKey> {
        self.keys
            .iter()
            .filter(|(_, state)| state.is_down)
            .map(|(key, _)| *key)
            .collect()
    }

    /// Number of keys seen so far
    pub fn tracked_keys(&self) -> usize {
        self.keys.len()
    }
}
