//! Session report and export functionality

use crate::gesture::{GestureEvent, GestureKind, RegistrationId, TapHoldClassifier};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Complete session report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    /// Report metadata
    pub metadata: ReportMetadata,
    /// Summary statistics
    pub summary: SessionSummary,
    /// Per-key gesture counts, ordered by key code
    pub keys: Vec<KeyTally>,
}

/// Report metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Report generation timestamp
    pub generated_at: String,
    /// Application version
    pub version: String,
    /// Session duration in seconds
    pub duration_secs: f64,
    /// Tap window in effect when the report was taken (ms)
    pub tap_window_ms: u64,
    /// Hold duration in effect when the report was taken (ms)
    pub hold_duration_ms: u64,
}

/// Session summary statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Gestures of every kind
    pub total_gestures: u64,
    /// Tap bursts (one per `Tapped(n)`)
    pub tap_bursts: u64,
    /// Individual taps across all bursts
    pub total_taps: u64,
    pub holds: u64,
    pub releases: u64,
}

/// Gesture counts for one key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyTally {
    /// Key name, or `Custom(code)`
    pub key: String,
    pub code: u16,
    /// Bursts by tap count
    pub tapped: BTreeMap<u64, u64>,
    pub held: u64,
    pub released: u64,
    /// Longest burst seen
    pub max_tap_count: u64,
}

impl KeyTally {
    fn record(&mut self, gesture: GestureKind) {
        match gesture {
            GestureKind::Tapped(n) => {
                *self.tapped.entry(n).or_default() += 1;
                self.max_tap_count = self.max_tap_count.max(n);
            }
            GestureKind::Held => self.held += 1,
            GestureKind::Released => self.released += 1,
        }
    }

    /// Total individual taps
    pub fn taps(&self) -> u64 {
        self.tapped.iter().map(|(n, bursts)| n * bursts).sum()
    }
}

/// Collects every gesture a classifier emits
pub struct GestureRecorder {
    started: Instant,
    tallies: Arc<Mutex<BTreeMap<u16, KeyTally>>>,
    registration: Option<RegistrationId>,
}

impl GestureRecorder {
    /// Subscribe to `classifier` and start counting
    pub fn attach(classifier: &TapHoldClassifier) -> Self {
        let tallies: Arc<Mutex<BTreeMap<u16, KeyTally>>> = Arc::default();

        let sink = Arc::clone(&tallies);
        let registration = classifier.subscribe(move |event: &GestureEvent| {
            let mut tallies = sink.lock();
            let tally = tallies.entry(event.key.id()).or_insert_with(|| KeyTally {
                key: event.key.to_string(),
                code: event.key.id(),
                ..Default::default()
            });
            tally.record(event.gesture);
        });

        Self {
            started: Instant::now(),
            tallies,
            registration: Some(registration),
        }
    }

    /// Stop counting; the tallies collected so far are kept
    pub fn detach(&mut self, classifier: &TapHoldClassifier) {
        if let Some(id) = self.registration.take() {
            classifier.cancel(id);
        }
    }

    /// Copy of the current tallies, ordered by key code
    pub fn tallies(&self) -> Vec<KeyTally> {
        self.tallies.lock().values().cloned().collect()
    }

    /// Build a report from what has been recorded so far
    pub fn report(&self, classifier: &TapHoldClassifier) -> SessionReport {
        SessionReport::new(self.started, classifier, self.tallies())
    }
}

impl SessionReport {
    /// Create a new session report
    pub fn new(start_time: Instant, classifier: &TapHoldClassifier, keys: Vec<KeyTally>) -> Self {
        let duration_secs = start_time.elapsed().as_secs_f64();
        let now: DateTime<Utc> = Utc::now();
        let timing = classifier.timing();

        let summary = keys.iter().fold(SessionSummary::default(), |mut acc, tally| {
            let bursts: u64 = tally.tapped.values().sum();
            acc.tap_bursts += bursts;
            acc.total_taps += tally.taps();
            acc.holds += tally.held;
            acc.releases += tally.released;
            acc.total_gestures += bursts + tally.held + tally.released;
            acc
        });

        Self {
            metadata: ReportMetadata {
                generated_at: now.to_rfc3339(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                duration_secs,
                tap_window_ms: timing.tap_window().as_millis() as u64,
                hold_duration_ms: timing.hold_duration().as_millis() as u64,
            },
            summary,
            keys,
        }
    }

    /// Export report to JSON file
    pub fn export_json(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }

    /// Export report to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Default file name for an export, stamped with the generation time
    pub fn file_name(&self) -> String {
        let stamp = DateTime::parse_from_rfc3339(&self.metadata.generated_at)
            .map(|t| t.format("%Y%m%d-%H%M%S").to_string())
            .unwrap_or_else(|_| "session".to_string());
        format!("keyboard-tapkit-{}.json", stamp)
    }
}
