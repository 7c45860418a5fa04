//! Gesture recognition on top of raw key transitions

mod classifier;
mod kind;
pub mod registry;

pub use classifier::{ClassifierError, TapHoldClassifier};
pub use kind::{GestureEvent, GestureKind};
pub use registry::{Callback, Observer, RegistrationId};
