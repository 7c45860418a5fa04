//! Raw keyboard event types and scancode translation

use super::{resolve, KeyCode};
use std::collections::HashSet;
use std::fmt;
use std::time::Instant;

bitflags::bitflags! {
    /// Snapshot of the modifier keys held when an event was produced.
    ///
    /// Left and right variants get their own bit so that releasing one side
    /// while the other is still held is visible in the diff.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ModifierFlags: u32 {
        const CAPS_LOCK   = 1 << 0;
        const LEFT_SHIFT  = 1 << 1;
        const RIGHT_SHIFT = 1 << 2;
        const CONTROL     = 1 << 3;
        const ALT         = 1 << 4;
        const META        = 1 << 5;
        const FUNCTION    = 1 << 6;
    }
}

/// Direction of a key transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    /// Key went down
    Down,
    /// Key came back up
    Up,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transition::Down => f.write_str("down"),
            Transition::Up => f.write_str("up"),
        }
    }
}

/// What kind of report a raw event carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawEventKind {
    /// Discrete key-down or key-up
    Key(Transition),
    /// Modifier state changed; the direction must be derived from `flags`
    FlagsChanged,
}

/// A hardware-level key report as delivered by an event hook
#[derive(Debug, Clone, Copy)]
pub struct RawEvent {
    /// The key code
    pub code: KeyCode,
    /// Type of report
    pub kind: RawEventKind,
    /// Modifier snapshot after this event
    pub flags: ModifierFlags,
    /// When the event occurred
    pub timestamp: Instant,
}

impl RawEvent {
    pub fn new(
        code: KeyCode,
        kind: RawEventKind,
        flags: ModifierFlags,
        timestamp: Instant,
    ) -> Self {
        Self {
            code,
            kind,
            flags,
            timestamp,
        }
    }

    /// Discrete key-down
    pub fn down(code: KeyCode, timestamp: Instant) -> Self {
        Self::new(code, RawEventKind::Key(Transition::Down), ModifierFlags::empty(), timestamp)
    }

    /// Discrete key-up
    pub fn up(code: KeyCode, timestamp: Instant) -> Self {
        Self::new(code, RawEventKind::Key(Transition::Up), ModifierFlags::empty(), timestamp)
    }

    /// Modifier flag change
    pub fn flags_changed(code: KeyCode, flags: ModifierFlags, timestamp: Instant) -> Self {
        Self::new(code, RawEventKind::FlagsChanged, flags, timestamp)
    }
}

/// Turns press/release/repeat scancode reports into [`RawEvent`]s.
///
/// Autorepeat and redundant reports are dropped. Keys that own a modifier
/// bit are reported as `FlagsChanged` carrying the updated flag set, the way
/// platform hooks report modifiers.
#[derive(Debug, Default)]
pub struct ScancodeTranslator {
    pressed: HashSet<u16>,
    flags: ModifierFlags,
}

impl ScancodeTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Translate one report. `value` follows evdev: 0 release, 1 press, 2 repeat.
    pub fn translate(&mut self, scancode: u16, value: i32, timestamp: Instant) -> Option<RawEvent> {
        // Skip key repeats
        if value == 2 {
            return None;
        }

        let pressed = value != 0;
        if pressed {
            if !self.pressed.insert(scancode) {
                return None;
            }
        } else if !self.pressed.remove(&scancode) {
            return None;
        }

        let code = KeyCode(scancode);
        match resolve(code).modifier_flag() {
            Some(flag) => {
                self.flags.set(flag, pressed);
                Some(RawEvent::flags_changed(code, self.flags, timestamp))
            }
            None => {
                let transition = if pressed { Transition::Down } else { Transition::Up };
                Some(RawEvent::new(code, RawEventKind::Key(transition), self.flags, timestamp))
            }
        }
    }

    /// Currently held scancodes
    pub fn pressed(&self) -> &HashSet<u16> {
        &self.pressed
    }

    /// Current modifier snapshot
    pub fn flags(&self) -> ModifierFlags {
        self.flags
    }

    /// Forget all held keys, e.g. after the source was reopened
    pub fn reset(&mut self) {
        self.pressed.clear();
        self.flags = ModifierFlags::empty();
    }
}
