//! Portable polling hook built on `device_query`
//!
//! Used where evdev is not available. It diffs the set of pressed keys on
//! every poll, so transitions shorter than the poll interval are missed and
//! the FN key is invisible.

use super::hook::{EventHook, HookError, RawEventSink};
use super::keymap::from_device_query;
use super::ScancodeTranslator;
use device_query::{DeviceQuery, DeviceState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

struct Worker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Event hook that polls key state
pub struct PollingHook {
    poll_interval: Duration,
    worker: Option<Worker>,
}

impl PollingHook {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            worker: None,
        }
    }

    fn poll_loop(sink: RawEventSink, stop: Arc<AtomicBool>, poll_interval: Duration) {
        let device_state = DeviceState::new();
        let mut translator = ScancodeTranslator::new();
        let mut last_keys: Vec<u16> = Vec::new();

        while !stop.load(Ordering::Acquire) {
            let now = Instant::now();
            let current_keys: Vec<u16> = device_state
                .get_keys()
                .into_iter()
                .filter_map(from_device_query)
                .map(|code| code.as_u16())
                .collect();

            for code in current_keys.iter().filter(|c| !last_keys.contains(c)) {
                if let Some(raw) = translator.translate(*code, 1, now) {
                    sink.submit(raw);
                }
            }
            for code in last_keys.iter().filter(|c| !current_keys.contains(c)) {
                if let Some(raw) = translator.translate(*code, 0, now) {
                    sink.submit(raw);
                }
            }

            last_keys = current_keys;
            thread::sleep(poll_interval);
        }
    }
}

impl EventHook for PollingHook {
    fn name(&self) -> &'static str {
        "device_query"
    }

    fn install(&mut self, sink: RawEventSink) -> Result<(), HookError> {
        if self.is_alive() {
            return Ok(());
        }
        self.uninstall();

        let stop = Arc::new(AtomicBool::new(false));
        let poll_interval = self.poll_interval;
        let handle = {
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("keyboard-tapkit-poll".to_string())
                .spawn(move || Self::poll_loop(sink, stop, poll_interval))
                .map_err(HookError::Spawn)?
        };

        log::info!("polling hook started ({:?} interval)", poll_interval);
        self.worker = Some(Worker { stop, handle });
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.handle.is_finished())
    }

    fn uninstall(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.stop.store(true, Ordering::Release);
            // Dropped from inside our own thread; it exits on the next pass
            if worker.handle.thread().id() == thread::current().id() {
                return;
            }
            if worker.handle.join().is_err() {
                log::error!("polling thread panicked");
            }
        }
    }
}

impl Drop for PollingHook {
    fn drop(&mut self) {
        self.uninstall();
    }
}
