//! Hook liveness supervisor
//!
//! Event hooks can silently stop delivering: a keyboard is unplugged, the
//! device node goes away, or the reader thread dies. The supervisor checks
//! the hook periodically and reinstalls it when it has gone dark.

use crate::gesture::{ClassifierError, TapHoldClassifier};
use std::io;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Something whose event source can be checked and recovered
pub trait Supervised: Send + Sync {
    fn is_healthy(&self) -> bool;
    fn recover(&self) -> Result<(), ClassifierError>;
}

impl Supervised for TapHoldClassifier {
    fn is_healthy(&self) -> bool {
        self.is_hook_healthy()
    }

    fn recover(&self) -> Result<(), ClassifierError> {
        self.reinstall_hook()
    }
}

/// Result of a single liveness check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorOutcome {
    /// Hook was delivering events
    Healthy,
    /// Hook was dead and has been reinstalled
    Recovered,
    /// Hook was dead and could not be reinstalled
    StillDown,
}

/// Check `target` once and try to recover it if needed
pub fn check(target: &dyn Supervised) -> SupervisorOutcome {
    if target.is_healthy() {
        return SupervisorOutcome::Healthy;
    }

    match target.recover() {
        Ok(()) if target.is_healthy() => {
            log::info!("event hook recovered");
            SupervisorOutcome::Recovered
        }
        Ok(()) => {
            log::warn!("event hook reinstalled but still not delivering");
            SupervisorOutcome::StillDown
        }
        Err(e) => {
            log::warn!("event hook recovery failed: {}", e);
            SupervisorOutcome::StillDown
        }
    }
}

/// Background thread that runs [`check`] every `interval`
pub struct LivenessSupervisor {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl LivenessSupervisor {
    pub fn spawn<T>(target: T, interval: Duration) -> io::Result<Self>
    where
        T: Supervised + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name("keyboard-tapkit-supervisor".to_string())
            .spawn(move || {
                log::debug!("liveness supervisor running every {:?}", interval);
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            check(&target);
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                log::debug!("liveness supervisor stopped");
            })?;

        Ok(Self {
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Stop the thread and wait for it
    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("liveness supervisor panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for LivenessSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}
