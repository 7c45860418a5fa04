//! keyboard-tapkit - per-key tap, hold and release recognition
//!
//! Raw key transitions come in from an [`keyboard::EventHook`] (evdev on
//! Linux, or a polling fallback) and are classified per key into
//! [`gesture::GestureKind`] events, which are dispatched to registered
//! callbacks on a single dispatch context.

pub mod config;
pub mod gesture;
pub mod keyboard;
pub mod report;
pub mod scheduler;
pub mod supervisor;

pub use config::Config;
pub use gesture::{ClassifierError, GestureEvent, GestureKind, RegistrationId, TapHoldClassifier};
pub use keyboard::{KeyCode, LogicalKey, Timing, Transition};
