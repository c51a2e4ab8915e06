//! Shared plain-data types for the oubli leak detector.
//!
//! Kept dependency-light so diagnostic consumers (dump tooling, examples)
//! can use the snapshot types without pulling in the core crate.

use facet::Facet;

/// Storage discipline for the registry's primary handle map.
///
/// Chosen once at tracker construction, never inferred from ambient process
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Facet)]
#[repr(u8)]
pub enum Retention {
    /// The registry pins every record: `primary` stays enumerable for the
    /// whole life of the entry. Meant for inspectable contexts (tests,
    /// interactive debugging).
    Strong,
    /// The registry holds weak record references in `primary`, so it never
    /// extends a record's lifetime on the handle side. Default for
    /// production processes.
    Weak,
}

/// Serializable envelope for a pending-futures dump.
#[derive(Debug, Clone, Facet)]
pub struct PendingReport {
    /// Number of pending futures at collection time.
    pub count: u64,
    /// One entry per pending future.
    pub pending: Vec<PendingSnapshot>,
}

/// A point-in-time view of one pending (unsettled) future.
#[derive(Debug, Clone, Facet)]
pub struct PendingSnapshot {
    /// Record id, monotonically increasing per clear-epoch, never reused.
    pub id: u64,
    /// Time since the future was created (seconds).
    pub age_secs: f64,
    /// The most representative creation-site frame, for compact reports.
    pub top_frame: String,
    /// Full filtered creation backtrace.
    pub trace: String,
}
