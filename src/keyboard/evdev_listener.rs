//! Raw evdev-based event hook for Linux
//!
//! Reads scancodes straight from `/dev/input/event*`, which sees the FN key
//! and other keys that higher-level APIs swallow. A reader thread feeds the
//! classifier; if any device disappears the thread exits and the hook reports
//! itself dead until it is installed again.

use super::hook::{EventHook, HookError, RawEventSink};
use super::ScancodeTranslator;
use evdev::{Device, EventType};
use nix::libc;
use std::fs;
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Find all keyboard input devices
fn find_keyboard_devices() -> Result<Vec<PathBuf>, HookError> {
    let input_dir = Path::new("/dev/input");
    if !input_dir.exists() {
        return Err(HookError::EnumerationFailed(
            "/dev/input does not exist".to_string(),
        ));
    }

    let entries = fs::read_dir(input_dir)
        .map_err(|e| HookError::EnumerationFailed(e.to_string()))?;

    let mut keyboards: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| name.starts_with("event"))
        })
        .filter(|path| is_keyboard_device(path))
        .collect();

    if keyboards.is_empty() {
        return Err(HookError::NoDevices);
    }

    keyboards.sort();
    Ok(keyboards)
}

/// Check if a device is a keyboard by examining /sys/class/input
fn is_keyboard_device(device_path: &Path) -> bool {
    let Some(name) = device_path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };

    // Key capability bitmap; a keyboard has well over 50 keys mapped
    let caps_path = format!("/sys/class/input/{}/device/capabilities/key", name);
    if let Ok(caps) = fs::read_to_string(&caps_path) {
        let trimmed = caps.trim();
        if !trimmed.is_empty() && trimmed != "0" {
            let total_bits: u32 = trimmed
                .split_whitespace()
                .filter_map(|hex| u64::from_str_radix(hex, 16).ok())
                .map(|n| n.count_ones())
                .sum();
            return total_bits > 50;
        }
    }

    let name_path = format!("/sys/class/input/{}/device/name", name);
    if let Ok(dev_name) = fs::read_to_string(&name_path) {
        let dev_name_lower = dev_name.to_lowercase();
        return dev_name_lower.contains("keyboard")
            || dev_name_lower.contains("kbd")
            || dev_name_lower.contains("hid");
    }
    false
}

fn set_nonblocking(device: &Device) -> io::Result<()> {
    let fd = device.as_raw_fd();
    // SAFETY: `fd` belongs to `device`, which outlives both calls
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: as above
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Open every keyboard we are allowed to read
fn open_keyboards() -> Result<Vec<(PathBuf, Device)>, HookError> {
    let mut devices = Vec::new();

    for path in find_keyboard_devices()? {
        match Device::open(&path) {
            Ok(device) => {
                set_nonblocking(&device)?;
                log::debug!(
                    "opened {} ({})",
                    path.display(),
                    device.name().unwrap_or("unnamed")
                );
                devices.push((path, device));
            }
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                log::debug!("skipping {}: permission denied", path.display());
                continue;
            }
            Err(e) => return Err(HookError::Io(e)),
        }
    }

    if devices.is_empty() {
        return Err(HookError::PermissionDenied(
            "Cannot access any keyboard devices. \
             Try running with sudo or add user to 'input' group."
                .to_string(),
        ));
    }
    Ok(devices)
}

struct Worker {
    stop: Arc<AtomicBool>,
    alive: Arc<AtomicBool>,
    handle: JoinHandle<()>,
    device_paths: Vec<PathBuf>,
}

/// Evdev-backed event hook
pub struct EvdevHook {
    poll_interval: Duration,
    worker: Option<Worker>,
}

impl EvdevHook {
    /// Create an uninstalled hook that polls its devices every `poll_interval`
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            worker: None,
        }
    }

    /// Paths of the devices being read, empty when not installed
    pub fn device_paths(&self) -> &[PathBuf] {
        self.worker
            .as_ref()
            .map(|w| w.device_paths.as_slice())
            .unwrap_or(&[])
    }

    fn read_loop(
        mut devices: Vec<(PathBuf, Device)>,
        sink: RawEventSink,
        stop: Arc<AtomicBool>,
        alive: Arc<AtomicBool>,
        poll_interval: Duration,
    ) {
        let mut translator = ScancodeTranslator::new();

        'outer: while !stop.load(Ordering::Acquire) {
            for (path, device) in devices.iter_mut() {
                match device.fetch_events() {
                    Ok(events) => {
                        let now = Instant::now();
                        for ev in events {
                            if ev.event_type() != EventType::KEY {
                                continue;
                            }
                            if let Some(raw) = translator.translate(ev.code(), ev.value(), now) {
                                sink.submit(raw);
                            }
                        }
                    }
                    Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {}
                    Err(e) => {
                        log::warn!("lost keyboard device {}: {}", path.display(), e);
                        break 'outer;
                    }
                }
            }
            thread::sleep(poll_interval);
        }

        alive.store(false, Ordering::Release);
    }
}

impl Default for EvdevHook {
    fn default() -> Self {
        Self::new(Duration::from_millis(2))
    }
}

impl EventHook for EvdevHook {
    fn name(&self) -> &'static str {
        "evdev"
    }

    fn install(&mut self, sink: RawEventSink) -> Result<(), HookError> {
        if self.is_alive() {
            return Ok(());
        }
        self.uninstall();

        let devices = open_keyboards()?;
        let device_paths: Vec<PathBuf> = devices.iter().map(|(p, _)| p.clone()).collect();

        let stop = Arc::new(AtomicBool::new(false));
        let alive = Arc::new(AtomicBool::new(true));
        let poll_interval = self.poll_interval;

        let handle = {
            let stop = Arc::clone(&stop);
            let alive = Arc::clone(&alive);
            thread::Builder::new()
                .name("keyboard-tapkit-evdev".to_string())
                .spawn(move || Self::read_loop(devices, sink, stop, alive, poll_interval))
                .map_err(HookError::Spawn)?
        };

        log::info!("evdev hook reading {} device(s)", device_paths.len());
        self.worker = Some(Worker {
            stop,
            alive,
            handle,
            device_paths,
        });
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|w| w.alive.load(Ordering::Acquire) && !w.handle.is_finished())
    }

    fn uninstall(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.stop.store(true, Ordering::Release);
            // Dropped from inside our own thread; it exits on the next pass
            if worker.handle.thread().id() == thread::current().id() {
                return;
            }
            if worker.handle.join().is_err() {
                log::error!("evdev reader thread panicked");
            }
        }
    }
}

impl Drop for EvdevHook {
    fn drop(&mut self) {
        self.uninstall();
    }
}

/// Check if evdev is available (Linux only, with device access)
pub fn is_evdev_available() -> bool {
    find_keyboard_devices().is_ok()
}

/// Get a status message about evdev availability
pub fn evdev_status() -> String {
    match find_keyboard_devices() {
        Ok(devices) => format!("{} keyboard device(s) found", devices.len()),
        Err(HookError::NoDevices) => "No keyboard devices found".to_string(),
        Err(HookError::PermissionDenied(_)) => {
            "Permission denied - run with sudo or add user to 'input' group".to_string()
        }
        Err(e) => format!("Error: {}", e),
    }
}
