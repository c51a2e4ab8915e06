//! Leak detection for forgotten futures.
//!
//! Oubli wraps futures at creation, remembers where each one came from, and
//! periodically warns — through `tracing` — about futures that have been
//! pending longer than a threshold. It is aimed at debugging long-running
//! tokio processes where forgotten or parked asynchronous work causes stuck
//! pipelines or unbounded growth.
//!
//! # Using this crate
//!
//! ```rust,no_run
//! use oubli::TrackedFutureExt as _;
//!
//! #[tokio::main]
//! async fn main() {
//!     // Flag anything pending for more than two seconds, scanning twice a
//!     // second.
//!     oubli::enable(oubli::DetectorConfig {
//!         timeout: std::time::Duration::from_secs(2),
//!         interval: std::time::Duration::from_millis(500),
//!         ..Default::default()
//!     });
//!
//!     let answer = fetch_answer().tracked().await;
//!     println!("{answer}");
//!
//!     oubli::disable();
//! }
//!
//! async fn fetch_answer() -> u32 {
//!     42
//! }
//! ```
//!
//! Wrap futures with [`tracked`] / [`TrackedFutureExt::tracked`], spawn with
//! [`spawn_tracked`], and aggregate with [`join_all`], [`race`],
//! [`join_settled`], [`first_ok`] — the aggregates are tracked too. While
//! the detector is disabled the wrappers are registration-free
//! pass-throughs.
//!
//! Detection is strictly best-effort: no tracking failure ever alters the
//! wrapped future's behavior or propagates into caller code.

mod combinators;
mod instrument;
mod lifecycle;
mod registry;
mod scanner;
mod trace;

pub use combinators::{FirstOk, JoinAll, JoinSettled, Race, first_ok, join_all, join_settled, race};
pub use instrument::{Map, Tracked, TrackedFutureExt, spawn_tracked, tracked};
pub use lifecycle::{DetectorConfig, disable, enable};
pub use oubli_types::{PendingReport, PendingSnapshot, Retention};
pub use registry::{HandleId, Tracker};
pub use trace::{filter_trace, top_frame};

use std::time::Duration;

use tracing::warn;

// ── Global tracker facade ────────────────────────────────
//
// Free functions over the process-global registry, for external diagnostics
// and tests. Instance-level use goes through `Tracker` directly.

/// Register an externally owned future handle with its raw creation
/// backtrace.
pub fn track_future(handle: HandleId, raw_stack: &str) {
    registry::global().track(handle, raw_stack);
}

/// Deregister a handle. Idempotent.
pub fn untrack(handle: HandleId) {
    registry::global().untrack(handle);
}

/// Number of currently pending tracked futures.
pub fn pending_count() -> usize {
    registry::global().pending_count()
}

/// Filtered creation traces of all pending futures.
pub fn pending_traces() -> Vec<String> {
    registry::global().pending_traces()
}

/// Point-in-time snapshots of all pending futures, oldest first.
pub fn pending_snapshots() -> Vec<PendingSnapshot> {
    registry::global().pending_snapshots()
}

/// Drop all records, reset record ids, and stop the scanner if running.
pub fn clear() {
    registry::global().clear();
}

/// Start (or restart) the recurring leak check on the global registry.
pub fn start_auto_check(timeout: Duration, interval: Duration) {
    registry::global().start_auto_check(timeout, interval);
}

/// Cancel the recurring leak check. Idempotent.
pub fn stop_auto_check() {
    registry::global().stop_auto_check();
}

/// Run one leak check pass now; returns the number of futures flagged.
pub fn check_leaks(timeout: Duration) -> usize {
    registry::global().check_leaks(timeout)
}

/// Render the pending set as a JSON report.
pub fn dump_pending() -> String {
    let pending = pending_snapshots();
    let report = PendingReport {
        count: pending.len() as u64,
        pending,
    };
    match facet_json::to_vec(&report) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            warn!(%e, "failed to serialize pending report");
            "{}".to_string()
        }
    }
}
