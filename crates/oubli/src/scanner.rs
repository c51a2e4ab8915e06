//! Periodic leak scanner.
//!
//! A background tokio task walks the registry index on a fixed interval and
//! reports every record that has been pending longer than the threshold.
//! A record is re-flagged on every scan until it settles or the registry is
//! cleared — repeated warnings are the intended behavior for a genuinely
//! stuck future.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::registry::{Shared, TrackRecord, Tracker};

/// Floor for the scan period. `tokio::time::interval` rejects a zero period.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

impl Tracker {
    /// Start (or restart) the recurring leak check.
    ///
    /// Any previously running scan task is aborted before the replacement is
    /// installed, under the registry lock, so two scanners never coexist and
    /// no task is orphaned. The first check fires one full `interval` after
    /// this call. Outside a tokio runtime this logs a warning and does
    /// nothing.
    pub fn start_auto_check(&self, timeout: Duration, interval: Duration) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no tokio runtime available, leak scanner not started");
            return;
        };

        let period = interval.max(MIN_INTERVAL);
        // The scan task holds only a weak reference so an abandoned tracker
        // shuts its scanner down instead of being kept alive by it.
        let registry = Arc::downgrade(&self.shared);
        let task = runtime.spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            loop {
                ticker.tick().await;
                let Some(shared) = registry.upgrade() else {
                    break;
                };
                check_shared(&shared, timeout);
            }
        });

        let Ok(mut state) = self.shared.state.lock() else {
            task.abort();
            return;
        };
        if let Some(previous) = state.scanner.replace(task) {
            previous.abort();
        }
    }

    /// Cancel the recurring leak check, if any. Idempotent. An in-flight
    /// scan pass runs to completion; only the pending timer is cancelled.
    pub fn stop_auto_check(&self) {
        let Ok(mut state) = self.shared.state.lock() else {
            return;
        };
        if let Some(scanner) = state.scanner.take() {
            scanner.abort();
        }
    }

    /// Whether a recurring leak check is currently installed.
    pub fn auto_check_running(&self) -> bool {
        self.shared
            .state
            .lock()
            .map(|state| state.scanner.is_some())
            .unwrap_or(false)
    }

    /// Run one leak check pass now. Returns the number of records flagged.
    pub fn check_leaks(&self, timeout: Duration) -> usize {
        check_shared(&self.shared, timeout)
    }
}

/// One bounded pass over the index: snapshot stale records under the lock,
/// report outside it.
pub(crate) fn check_shared(shared: &Shared, timeout: Duration) -> usize {
    let now = Instant::now();
    let (stale, verbose): (Vec<Arc<TrackRecord>>, bool) = {
        let Ok(state) = shared.state.lock() else {
            return 0;
        };
        let stale = state
            .index
            .values()
            .filter(|record| now.duration_since(record.created_at) > timeout)
            .map(Arc::clone)
            .collect();
        (stale, state.verbose)
    };

    for record in &stale {
        let pending_ms = now.duration_since(record.created_at).as_millis() as u64;
        warn!(
            future_id = record.id,
            pending_ms,
            frame = %record.top_frame,
            "potential leak: future pending past threshold"
        );
        if verbose {
            warn!(future_id = record.id, trace = %record.trace, "creation backtrace");
        } else {
            debug!(future_id = record.id, trace = %record.trace, "creation backtrace");
        }
    }
    stale.len()
}
