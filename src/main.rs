//! keyboard-tapkit - headless tap/hold monitor
//!
//! Reads raw key events, classifies them per key and logs every tap burst,
//! hold and release for the configured keys until Ctrl-C.

use anyhow::{Context, Result};
use std::sync::mpsc;

use keyboard_tapkit::{
    config::{Config, HookBackend},
    gesture::{GestureKind, TapHoldClassifier},
    keyboard::{EventHook, LogicalKey},
    report::GestureRecorder,
    supervisor::LivenessSupervisor,
};

#[cfg(target_os = "linux")]
use keyboard_tapkit::keyboard::{evdev_status, is_evdev_available, EvdevHook};

#[cfg(feature = "device-query")]
use keyboard_tapkit::keyboard::PollingHook;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            log::warn!("using default config: {}", e);
            Config::default()
        }
    };

    let timing = config.timing()?;
    let keys = config.monitored_keys()?;
    let classifier = TapHoldClassifier::new(timing)?;

    register_logging(&classifier, &keys, config.monitor.max_tap_count);
    let mut recorder = GestureRecorder::attach(&classifier);

    match select_hook(&config) {
        Some(hook) => {
            // The supervisor keeps retrying a hook that failed to install
            if let Err(e) = classifier.attach_hook(hook) {
                log::warn!("{}", e);
            }
        }
        None => log::error!("no event hook available for {:?} backend", config.hook.backend),
    }

    let mut supervisor = if config.supervisor.enabled {
        Some(
            LivenessSupervisor::spawn(classifier.clone(), config.supervisor_interval())
                .context("failed to start liveness supervisor")?,
        )
    } else {
        None
    };

    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(());
    })
    .context("failed to install Ctrl-C handler")?;

    log::info!(
        "monitoring {} key(s), tap window {:?}, hold duration {:?}; Ctrl-C to quit",
        keys.len(),
        timing.tap_window(),
        timing.hold_duration()
    );
    let _ = shutdown_rx.recv();
    log::info!("shutting down");

    if let Some(supervisor) = supervisor.as_mut() {
        supervisor.stop();
    }
    classifier.detach_hook();
    recorder.detach(&classifier);

    let report = recorder.report(&classifier);
    log::info!(
        "{} gesture(s): {} tap burst(s), {} hold(s), {} release(s)",
        report.summary.total_gestures,
        report.summary.tap_bursts,
        report.summary.holds,
        report.summary.releases
    );

    if config.report.export_on_exit {
        let dir = config.report.directory.clone().unwrap_or_default();
        let path = dir.join(report.file_name());
        report
            .export_json(&path)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        log::info!("report written to {}", path.display());
    }

    Ok(())
}

fn register_logging(classifier: &TapHoldClassifier, keys: &[LogicalKey], max_tap_count: u64) {
    for &key in keys {
        classifier.register(key, GestureKind::Held, move || log::info!("{} held", key));
        classifier.register(key, GestureKind::Released, move || {
            log::info!("{} released", key)
        });
        for n in 1..=max_tap_count {
            let gesture = GestureKind::Tapped(n);
            classifier.register(key, gesture, move || log::info!("{} {}", key, gesture));
        }
    }
}

fn select_hook(config: &Config) -> Option<Box<dyn EventHook>> {
    match config.hook.backend {
        HookBackend::Evdev => evdev_hook(config),
        HookBackend::Polling => polling_hook(config),
    }
}

#[cfg(target_os = "linux")]
fn evdev_hook(config: &Config) -> Option<Box<dyn EventHook>> {
    if is_evdev_available() {
        log::info!("evdev: {}", evdev_status());
    } else {
        // Devices may appear later; the supervisor retries the install
        log::warn!("evdev: {}", evdev_status());
    }
    Some(Box::new(EvdevHook::new(config.poll_interval())))
}

#[cfg(not(target_os = "linux"))]
fn evdev_hook(config: &Config) -> Option<Box<dyn EventHook>> {
    log::warn!("evdev is only available on Linux; trying the polling backend");
    polling_hook(config)
}

#[cfg(feature = "device-query")]
fn polling_hook(config: &Config) -> Option<Box<dyn EventHook>> {
    Some(Box::new(PollingHook::new(config.poll_interval())))
}

#[cfg(not(feature = "device-query"))]
fn polling_hook(_config: &Config) -> Option<Box<dyn EventHook>> {
    log::warn!("built without the device-query feature; polling backend unavailable");
    None
}
