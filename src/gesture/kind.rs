//! Classified gesture types

use crate::keyboard::LogicalKey;
use std::fmt;
use std::time::Instant;

/// A higher-level event recognised for one key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GestureKind {
    /// A burst of `n` taps, reported once the tap window closes
    Tapped(u64),
    /// The key stayed down past the hold duration
    Held,
    /// The key came up
    Released,
}

impl GestureKind {
    /// Tap count for `Tapped`, `None` otherwise
    pub fn tap_count(&self) -> Option<u64> {
        match self {
            GestureKind::Tapped(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for GestureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GestureKind::Tapped(1) => f.write_str("tapped"),
            GestureKind::Tapped(n) => write!(f, "tapped x{}", n),
            GestureKind::Held => f.write_str("held"),
            GestureKind::Released => f.write_str("released"),
        }
    }
}

/// A gesture together with the key it belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GestureEvent {
    pub key: LogicalKey,
    pub gesture: GestureKind,
    /// When the gesture was recognised
    pub at: Instant,
}

impl GestureEvent {
    pub fn new(key: LogicalKey, gesture: GestureKind, at: Instant) -> Self {
        Self { key, gesture, at }
    }
}

impl fmt::Display for GestureEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.key, self.gesture)
    }
}
