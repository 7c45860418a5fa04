//! Raw keyboard events, key identity and per-key state

mod event;
mod state;
pub mod hook;
pub mod keymap;

#[cfg(target_os = "linux")]
pub mod evdev_listener;

#[cfg(feature = "device-query")]
pub mod polling;

pub use event::{ModifierFlags, RawEvent, RawEventKind, ScancodeTranslator, Transition};
pub use hook::{EventHook, HookError, RawEventSink};
pub use keymap::{raw_code, resolve, KeyCode, LogicalKey, ParseKeyError};
pub use state::{
    KeyRuntimeState, KeyboardState, PressOutcome, ReleaseOutcome, Timing, DEFAULT_HOLD_DURATION,
    DEFAULT_TAP_WINDOW,
};

#[cfg(target_os = "linux")]
pub use evdev_listener::{evdev_status, is_evdev_available, EvdevHook};

#[cfg(feature = "device-query")]
pub use polling::PollingHook;
