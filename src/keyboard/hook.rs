//! Raw event sources
//!
//! An [`EventHook`] is whatever delivers raw key reports to the classifier:
//! an evdev reader, a polling listener, or a test double. Hooks can die
//! without warning (a device is unplugged, the OS revokes access), so they
//! expose a liveness check and can be installed again.

use super::RawEvent;
use std::fmt;
use std::io;
use std::sync::Arc;

/// Error type for event hook operations
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    /// No keyboard devices found
    #[error("No keyboard devices found")]
    NoDevices,
    /// Permission denied accessing device
    #[error("Permission denied accessing {0}")]
    PermissionDenied(String),
    /// Device enumeration failed
    #[error("Device enumeration failed: {0}")]
    EnumerationFailed(String),
    /// IO error
    #[error("IO error: {0}")]
    Io(io::Error),
    /// Reader thread could not be started
    #[error("Failed to start hook thread: {0}")]
    Spawn(io::Error),
}

impl From<io::Error> for HookError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::PermissionDenied {
            HookError::PermissionDenied("device".to_string())
        } else {
            HookError::Io(e)
        }
    }
}

/// Ingress handle a hook pushes raw events into.
///
/// Cheap to clone and safe to call from any thread. Events pushed after the
/// receiving classifier has been dropped are discarded.
#[derive(Clone)]
pub struct RawEventSink {
    deliver: Arc<dyn Fn(RawEvent) + Send + Sync>,
}

impl RawEventSink {
    pub fn new(deliver: impl Fn(RawEvent) + Send + Sync + 'static) -> Self {
        Self {
            deliver: Arc::new(deliver),
        }
    }

    /// Hand one event to the receiver
    pub fn submit(&self, event: RawEvent) {
        (self.deliver)(event);
    }
}

impl fmt::Debug for RawEventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawEventSink").finish_non_exhaustive()
    }
}

/// A source of raw key events.
///
/// `install` must be idempotent on a live hook. After `uninstall` the hook
/// must stop calling the sink.
pub trait EventHook: Send {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Start delivering events into `sink`
    fn install(&mut self, sink: RawEventSink) -> Result<(), HookError>;

    /// Whether events are still flowing
    fn is_alive(&self) -> bool;

    /// Stop delivering events and release OS resources
    fn uninstall(&mut self);
}
