//! Instrumentation boundary: the single point where futures become
//! observable.
//!
//! Rust has no process-global future constructor to swap, so the boundary is
//! a wrapper type plus a process-global activation flag. [`Tracked`] is
//! always present in the types; whether constructing one registers anything
//! is governed by the flag, which the lifecycle controller owns through a
//! single-owner [`PatchGuard`]. Wrapping never changes the inner future's
//! output, readiness timing, or chaining behavior, and registration failures
//! never propagate into the wrapped future's control flow.

use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use crate::registry::{self, HandleId};
use crate::trace;

// ── Activation ───────────────────────────────────────────

static PATCHED: AtomicBool = AtomicBool::new(false);

/// Proof of an exclusive activation of the instrumentation boundary.
/// Consumed by [`deactivate`]; dropping it without deactivating leaves the
/// boundary active, which is the lifecycle controller's responsibility to
/// avoid.
pub(crate) struct PatchGuard {
    _priv: (),
}

/// Flip the boundary to active. Returns `None` when it already is — a second
/// activation is a strict no-op, never a second layer.
pub(crate) fn activate() -> Option<PatchGuard> {
    PATCHED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .ok()
        .map(|_| PatchGuard { _priv: () })
}

/// Restore the inactive state, consuming the activation proof.
pub(crate) fn deactivate(_guard: PatchGuard) {
    PATCHED.store(false, Ordering::SeqCst);
}

pub(crate) fn is_active() -> bool {
    PATCHED.load(Ordering::SeqCst)
}

// ── Tracked wrapper ──────────────────────────────────────

struct Probe {
    handle: HandleId,
    settled: bool,
}

/// Pass-through future wrapper that makes the inner future observable.
///
/// Registered with the global registry at construction (when the boundary is
/// active), deregistered when the inner future settles or when the wrapper
/// is dropped unsettled — a dropped future can never complete, so it leaves
/// the pending set either way.
pub struct Tracked<F> {
    inner: F,
    probe: Option<Probe>,
}

/// Wrap a future, registering it when the boundary is active.
///
/// The handle is registered before this function returns, so a caller can
/// never observe an untracked live future created while instrumentation is
/// on.
pub fn tracked<F>(future: F) -> Tracked<F::IntoFuture>
where
    F: IntoFuture,
{
    Tracked {
        inner: future.into_future(),
        probe: register(),
    }
}

fn register() -> Option<Probe> {
    if !is_active() {
        return None;
    }
    let handle = HandleId::mint();
    let raw = trace::capture_raw();
    registry::global().track(handle, &raw);
    Some(Probe {
        handle,
        settled: false,
    })
}

/// Extension adapter: `some_future.tracked()`.
pub trait TrackedFutureExt: IntoFuture + Sized {
    fn tracked(self) -> Tracked<Self::IntoFuture> {
        crate::instrument::tracked(self)
    }
}

impl<F: IntoFuture> TrackedFutureExt for F {}

/// Wrap a future and spawn it on the tokio runtime.
pub fn spawn_tracked<F>(future: F) -> tokio::task::JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(tracked(future))
}

impl<F> Tracked<F> {
    fn settle(&mut self) {
        if let Some(probe) = &mut self.probe
            && !probe.settled
        {
            probe.settled = true;
            registry::global().untrack(probe.handle);
        }
    }
}

impl<F: Future> Tracked<F> {
    /// Derive a continuation future.
    ///
    /// The derived future is itself registered, so a forgotten continuation
    /// is just as visible as a forgotten root.
    pub fn map<T, G>(self, op: G) -> Tracked<Map<F, G>>
    where
        G: FnOnce(F::Output) -> T,
    {
        tracked(Map {
            inner: self,
            op: Some(op),
        })
    }
}

impl<F: Future> Future for Tracked<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // SAFETY: `inner` is never moved out of `self` after pinning; the
        // probe is plain data and not structurally pinned.
        let this = unsafe { self.get_unchecked_mut() };
        let inner = unsafe { Pin::new_unchecked(&mut this.inner) };
        match inner.poll(cx) {
            Poll::Ready(output) => {
                this.settle();
                Poll::Ready(output)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<F> Drop for Tracked<F> {
    fn drop(&mut self) {
        self.settle();
    }
}

// ── Derivation future ────────────────────────────────────

/// Future returned by [`Tracked::map`].
pub struct Map<F, G> {
    inner: Tracked<F>,
    op: Option<G>,
}

impl<F, G, T> Future for Map<F, G>
where
    F: Future,
    G: FnOnce(F::Output) -> T,
{
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // SAFETY: `inner` is never moved after pinning; `op` is not
        // structurally pinned.
        let this = unsafe { self.get_unchecked_mut() };
        let inner = unsafe { Pin::new_unchecked(&mut this.inner) };
        match inner.poll(cx) {
            Poll::Ready(value) => {
                let op = this.op.take().expect("map future polled after completion");
                Poll::Ready(op(value))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activation_is_single_owner_and_reversible() {
        // Run the whole state machine in one test so no other activation
        // test can interleave.
        let guard = match activate() {
            Some(guard) => guard,
            None => panic!("boundary unexpectedly active at test start"),
        };
        assert!(is_active());
        assert!(activate().is_none());
        assert!(is_active());

        deactivate(guard);
        assert!(!is_active());

        let guard = activate().expect("reactivation after deactivate");
        deactivate(guard);
        assert!(!is_active());
    }
}
