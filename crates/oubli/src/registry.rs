//! Tracking registry: maps live future handles to provenance records.
//!
//! Dual storage: `primary` resolves a handle back to its record (strong or
//! weak record references, per the construction-time [`Retention`]), and
//! `index` keeps records iterable by monotonic id for counting and scans.
//! Every operation is a short critical section behind one mutex; nothing in
//! here ever panics outward — tracking is best-effort by policy.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::Instant;

use oubli_types::{PendingSnapshot, Retention};
use tracing::debug;

use crate::trace;

// ── Handle identity ──────────────────────────────────────

/// Opaque identity for a tracked future handle.
///
/// Minted by whoever owns the future (normally the instrumentation wrapper);
/// the registry only observes it. Handle ids are process-unique and never
/// reset, unlike record ids which restart after [`Tracker::clear`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(u64);

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

impl HandleId {
    /// Mint a fresh process-unique handle id.
    pub fn mint() -> Self {
        Self(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
    }
}

// ── Records ──────────────────────────────────────────────

/// Provenance record for one tracked future.
#[derive(Debug)]
pub(crate) struct TrackRecord {
    pub(crate) id: u64,
    pub(crate) created_at: Instant,
    pub(crate) trace: String,
    pub(crate) top_frame: String,
}

/// A `primary` map entry. Strong retention pins the record; weak retention
/// lets the `index` side own its lifetime.
enum Slot {
    Strong(Arc<TrackRecord>),
    Weak(Weak<TrackRecord>),
}

impl Slot {
    fn record(&self) -> Option<Arc<TrackRecord>> {
        match self {
            Slot::Strong(record) => Some(Arc::clone(record)),
            Slot::Weak(weak) => weak.upgrade(),
        }
    }
}

// ── Tracker ──────────────────────────────────────────────

pub(crate) struct TrackerState {
    pub(crate) primary: HashMap<HandleId, Slot>,
    pub(crate) index: BTreeMap<u64, Arc<TrackRecord>>,
    pub(crate) next_id: u64,
    pub(crate) verbose: bool,
    pub(crate) scanner: Option<tokio::task::JoinHandle<()>>,
}

pub(crate) struct Shared {
    pub(crate) retention: Retention,
    pub(crate) state: Mutex<TrackerState>,
}

/// Registry of live tracked futures.
///
/// Cheap to clone (shared interior); the storage discipline is fixed at
/// construction and never inferred from ambient process state.
#[derive(Clone)]
pub struct Tracker {
    pub(crate) shared: Arc<Shared>,
}

impl Tracker {
    pub fn new(retention: Retention) -> Self {
        Self {
            shared: Arc::new(Shared {
                retention,
                state: Mutex::new(TrackerState {
                    primary: HashMap::new(),
                    index: BTreeMap::new(),
                    next_id: 0,
                    verbose: false,
                    scanner: None,
                }),
            }),
        }
    }

    /// Set whether track/untrack events are logged. Resolved once by the
    /// lifecycle controller from [`DetectorConfig`](crate::DetectorConfig).
    pub fn set_verbose(&self, verbose: bool) {
        if let Ok(mut state) = self.shared.state.lock() {
            state.verbose = verbose;
        }
    }

    /// Register a future handle with its raw creation backtrace.
    ///
    /// Filters the trace, extracts the representative frame, allocates the
    /// next record id, and inserts into both maps. Re-tracking a live handle
    /// replaces the previous record (last registration wins; the superseded
    /// record leaves the index). Never fails outward.
    pub fn track(&self, handle: HandleId, raw_stack: &str) {
        let trace = trace::filter_trace(raw_stack);
        let top_frame = trace::top_frame(raw_stack).unwrap_or_default();

        let Ok(mut state) = self.shared.state.lock() else {
            return;
        };

        if matches!(self.shared.retention, Retention::Weak) {
            // Sweep slots whose record is already gone so a handle that was
            // never untracked cannot grow `primary` without bound.
            state.primary.retain(|_, slot| slot.record().is_some());
        }

        state.next_id += 1;
        let record = Arc::new(TrackRecord {
            id: state.next_id,
            created_at: Instant::now(),
            trace,
            top_frame,
        });

        let slot = match self.shared.retention {
            Retention::Strong => Slot::Strong(Arc::clone(&record)),
            Retention::Weak => Slot::Weak(Arc::downgrade(&record)),
        };
        if let Some(previous) = state.primary.insert(handle, slot)
            && let Some(old) = previous.record()
        {
            state.index.remove(&old.id);
        }
        if state.verbose {
            debug!(future_id = record.id, frame = %record.top_frame, "tracking future");
        }
        state.index.insert(record.id, record);
    }

    /// Remove a handle from both maps. Idempotent; unknown handles are a
    /// no-op.
    pub fn untrack(&self, handle: HandleId) {
        let Ok(mut state) = self.shared.state.lock() else {
            return;
        };
        if let Some(slot) = state.primary.remove(&handle)
            && let Some(record) = slot.record()
        {
            state.index.remove(&record.id);
            if state.verbose {
                debug!(future_id = record.id, "future settled, untracked");
            }
        }
    }

    /// Number of currently pending tracked futures.
    pub fn pending_count(&self) -> usize {
        self.shared
            .state
            .lock()
            .map(|state| state.index.len())
            .unwrap_or(0)
    }

    /// Filtered creation traces of all pending futures.
    pub fn pending_traces(&self) -> Vec<String> {
        let Ok(state) = self.shared.state.lock() else {
            return Vec::new();
        };
        state
            .index
            .values()
            .map(|record| record.trace.clone())
            .collect()
    }

    /// Point-in-time snapshots of all pending futures, oldest first.
    pub fn pending_snapshots(&self) -> Vec<PendingSnapshot> {
        let Ok(state) = self.shared.state.lock() else {
            return Vec::new();
        };
        let now = Instant::now();
        state
            .index
            .values()
            .map(|record| PendingSnapshot {
                id: record.id,
                age_secs: now.duration_since(record.created_at).as_secs_f64(),
                top_frame: record.top_frame.clone(),
                trace: record.trace.clone(),
            })
            .collect()
    }

    /// Drop every record, reset the record id counter, and stop the leak
    /// scanner if it is running. The next tracked future gets id 1.
    pub fn clear(&self) {
        let Ok(mut state) = self.shared.state.lock() else {
            return;
        };
        state.primary = HashMap::new();
        state.index.clear();
        state.next_id = 0;
        if let Some(scanner) = state.scanner.take() {
            scanner.abort();
        }
    }
}

// ── Global registry ──────────────────────────────────────

static GLOBAL: OnceLock<Tracker> = OnceLock::new();

/// The process-global tracker the instrumentation boundary registers into.
/// Constructed with weak retention unless [`install`] ran first.
pub(crate) fn global() -> &'static Tracker {
    GLOBAL.get_or_init(|| Tracker::new(Retention::Weak))
}

/// Construct the global tracker with an explicit retention mode.
/// First construction wins; later calls return the existing tracker.
pub(crate) fn install(retention: Retention) -> &'static Tracker {
    GLOBAL.get_or_init(move || Tracker::new(retention))
}
