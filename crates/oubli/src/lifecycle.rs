//! Lifecycle controller: the public enable/disable entry point.
//!
//! Composes the instrumentation boundary and the leak scanner behind one
//! {Disabled, Enabled} state machine. Both transitions are idempotent, and
//! every step is independently guarded: a failure to start the scanner never
//! prevents the detector from being marked enabled, and a failure while
//! stopping it never blocks the boundary restore.

use std::sync::{LazyLock, Mutex};
use std::time::Duration;

use oubli_types::Retention;
use tracing::{info, warn};

use crate::instrument::{self, PatchGuard};
use crate::registry;

/// Normalized detector configuration.
///
/// The enable call accepts anything `Into<DetectorConfig>` — a full config,
/// a bare timeout `Duration`, or a bare millisecond count — and resolves it
/// here once; nothing downstream re-interprets the raw input.
#[derive(Debug, Clone, Copy)]
pub struct DetectorConfig {
    /// How long a future may stay pending before it is flagged.
    pub timeout: Duration,
    /// How often the leak scanner runs.
    pub interval: Duration,
    /// Storage discipline for the global registry, applied at its first
    /// construction.
    pub retention: Retention,
    /// Log track/untrack events and inline full traces into leak warnings.
    pub verbose: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            interval: Duration::from_secs(1),
            retention: Retention::Weak,
            verbose: false,
        }
    }
}

impl From<Duration> for DetectorConfig {
    fn from(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }
}

impl From<u64> for DetectorConfig {
    fn from(timeout_ms: u64) -> Self {
        Duration::from_millis(timeout_ms).into()
    }
}

struct ControllerState {
    enabled: bool,
    patch: Option<PatchGuard>,
}

struct LeakDetector {
    state: Mutex<ControllerState>,
}

static DETECTOR: LazyLock<LeakDetector> = LazyLock::new(|| LeakDetector {
    state: Mutex::new(ControllerState {
        enabled: false,
        patch: None,
    }),
});

/// Turn leak detection on. No-op when already enabled.
pub fn enable(options: impl Into<DetectorConfig>) {
    DETECTOR.enable(options.into());
}

/// Turn leak detection off, restoring untracked future creation and
/// clearing the registry. No-op when already disabled.
pub fn disable() {
    DETECTOR.disable();
}

impl LeakDetector {
    fn enable(&self, config: DetectorConfig) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if state.enabled {
            return;
        }

        let tracker = registry::install(config.retention);
        tracker.set_verbose(config.verbose);

        match instrument::activate() {
            Some(guard) => state.patch = Some(guard),
            None => warn!("instrumentation boundary already active, reusing existing activation"),
        }

        // Guards itself: outside a tokio runtime this warns and skips the
        // scanner, and the detector is still marked enabled.
        tracker.start_auto_check(config.timeout, config.interval);

        state.enabled = true;
        info!(
            timeout_ms = config.timeout.as_millis() as u64,
            interval_ms = config.interval.as_millis() as u64,
            "future leak detection enabled"
        );
    }

    fn disable(&self) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if !state.enabled {
            return;
        }

        let tracker = registry::global();
        tracker.stop_auto_check();
        if let Some(guard) = state.patch.take() {
            instrument::deactivate(guard);
        }
        tracker.clear();

        state.enabled = false;
        info!("future leak detection disabled");
    }
}
