//! Aggregate operations over collections of futures.
//!
//! Each combinator returns its aggregate future already wrapped in
//! [`Tracked`], so a forgotten `join_all` or `race` is as visible to the
//! leak scanner as a forgotten root future. Children are polled in input
//! order; completed slots are overwritten in place, which drops the child
//! future without moving it out of its pinned location.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::instrument::{Tracked, tracked};

// ── join_all ─────────────────────────────────────────────

enum JoinSlot<F, T> {
    Pending(F),
    Done(Option<T>),
}

/// Future returned by [`join_all`].
pub struct JoinAll<F, T> {
    children: Vec<JoinSlot<F, T>>,
}

/// Wait for every future to succeed, short-circuiting on the first failure.
///
/// Success values come back in input order. An empty input resolves
/// immediately with an empty vector.
pub fn join_all<I, F, T, E>(futures: I) -> Tracked<JoinAll<F, T>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>>,
{
    tracked(JoinAll {
        children: futures.into_iter().map(JoinSlot::Pending).collect(),
    })
}

impl<F, T, E> Future for JoinAll<F, T>
where
    F: Future<Output = Result<T, E>>,
{
    type Output = Result<Vec<T>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // SAFETY: children are never moved after `self` is pinned; completed
        // slots are overwritten in place, dropping the child future where it
        // sits.
        let this = unsafe { self.get_unchecked_mut() };

        let mut all_done = true;
        for slot in this.children.iter_mut() {
            let outcome = match slot {
                JoinSlot::Pending(child) => match unsafe { Pin::new_unchecked(child) }.poll(cx) {
                    Poll::Ready(Ok(value)) => Some(value),
                    Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                    Poll::Pending => {
                        all_done = false;
                        None
                    }
                },
                JoinSlot::Done(_) => None,
            };
            if let Some(value) = outcome {
                *slot = JoinSlot::Done(Some(value));
            }
        }

        if all_done {
            let values = this
                .children
                .iter_mut()
                .map(|slot| match slot {
                    JoinSlot::Done(value) => {
                        value.take().expect("join_all polled after completion")
                    }
                    JoinSlot::Pending(_) => unreachable!("pending child after completion check"),
                })
                .collect();
            Poll::Ready(Ok(values))
        } else {
            Poll::Pending
        }
    }
}

// ── race ─────────────────────────────────────────────────

/// Future returned by [`race`].
pub struct Race<F> {
    children: Vec<F>,
}

/// Resolve with the first future to settle; the rest are dropped with the
/// aggregate. An empty input never resolves.
pub fn race<I, F>(futures: I) -> Tracked<Race<F>>
where
    I: IntoIterator<Item = F>,
    F: Future,
{
    tracked(Race {
        children: futures.into_iter().collect(),
    })
}

impl<F: Future> Future for Race<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // SAFETY: children are never moved after `self` is pinned.
        let this = unsafe { self.get_unchecked_mut() };
        for child in this.children.iter_mut() {
            if let Poll::Ready(output) = unsafe { Pin::new_unchecked(child) }.poll(cx) {
                return Poll::Ready(output);
            }
        }
        Poll::Pending
    }
}

// ── join_settled ─────────────────────────────────────────

enum SettledSlot<F: Future> {
    Pending(F),
    Done(Option<F::Output>),
}

/// Future returned by [`join_settled`].
pub struct JoinSettled<F: Future> {
    children: Vec<SettledSlot<F>>,
}

/// Wait for every future to settle, never short-circuiting.
///
/// Outputs come back in input order; with `Result` futures this is the
/// settlement-report shape (successes and failures side by side).
pub fn join_settled<I, F>(futures: I) -> Tracked<JoinSettled<F>>
where
    I: IntoIterator<Item = F>,
    F: Future,
{
    tracked(JoinSettled {
        children: futures.into_iter().map(SettledSlot::Pending).collect(),
    })
}

impl<F: Future> Future for JoinSettled<F> {
    type Output = Vec<F::Output>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // SAFETY: children are never moved after `self` is pinned; completed
        // slots are overwritten in place.
        let this = unsafe { self.get_unchecked_mut() };

        let mut all_done = true;
        for slot in this.children.iter_mut() {
            let outcome = match slot {
                SettledSlot::Pending(child) => {
                    match unsafe { Pin::new_unchecked(child) }.poll(cx) {
                        Poll::Ready(output) => Some(output),
                        Poll::Pending => {
                            all_done = false;
                            None
                        }
                    }
                }
                SettledSlot::Done(_) => None,
            };
            if let Some(output) = outcome {
                *slot = SettledSlot::Done(Some(output));
            }
        }

        if all_done {
            let outputs = this
                .children
                .iter_mut()
                .map(|slot| match slot {
                    SettledSlot::Done(output) => {
                        output.take().expect("join_settled polled after completion")
                    }
                    SettledSlot::Pending(_) => unreachable!("pending child after completion check"),
                })
                .collect();
            Poll::Ready(outputs)
        } else {
            Poll::Pending
        }
    }
}

// ── first_ok ─────────────────────────────────────────────

enum AnySlot<F, E> {
    Pending(F),
    Failed(Option<E>),
}

/// Future returned by [`first_ok`].
pub struct FirstOk<F, E> {
    children: Vec<AnySlot<F, E>>,
}

/// Resolve with the first future to succeed. If every future fails, resolve
/// with all failures in input order. An empty input fails immediately with
/// an empty error list.
pub fn first_ok<I, F, T, E>(futures: I) -> Tracked<FirstOk<F, E>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>>,
{
    tracked(FirstOk {
        children: futures.into_iter().map(AnySlot::Pending).collect(),
    })
}

impl<F, T, E> Future for FirstOk<F, E>
where
    F: Future<Output = Result<T, E>>,
{
    type Output = Result<T, Vec<E>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // SAFETY: children are never moved after `self` is pinned; failed
        // slots are overwritten in place.
        let this = unsafe { self.get_unchecked_mut() };

        let mut all_failed = true;
        for slot in this.children.iter_mut() {
            let failure = match slot {
                AnySlot::Pending(child) => match unsafe { Pin::new_unchecked(child) }.poll(cx) {
                    Poll::Ready(Ok(value)) => return Poll::Ready(Ok(value)),
                    Poll::Ready(Err(e)) => Some(e),
                    Poll::Pending => {
                        all_failed = false;
                        None
                    }
                },
                AnySlot::Failed(_) => None,
            };
            if let Some(e) = failure {
                *slot = AnySlot::Failed(Some(e));
            }
        }

        if all_failed {
            let errors = this
                .children
                .iter_mut()
                .map(|slot| match slot {
                    AnySlot::Failed(e) => e.take().expect("first_ok polled after completion"),
                    AnySlot::Pending(_) => unreachable!("pending child after failure check"),
                })
                .collect();
            Poll::Ready(Err(errors))
        } else {
            Poll::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::ready;
    use std::time::Duration;

    type BoxFut<T> = Pin<Box<dyn Future<Output = T> + Send>>;

    #[tokio::test]
    async fn join_all_collects_in_input_order() {
        let futures: Vec<BoxFut<Result<u32, ()>>> = vec![
            Box::pin(async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(1)
            }),
            Box::pin(ready(Ok(2))),
            Box::pin(ready(Ok(3))),
        ];
        assert_eq!(join_all(futures).await, Ok(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn join_all_short_circuits_on_failure() {
        let futures: Vec<BoxFut<Result<u32, &str>>> =
            vec![Box::pin(ready(Ok(1))), Box::pin(ready(Err("boom")))];
        assert_eq!(join_all(futures).await, Err("boom"));
    }

    #[tokio::test]
    async fn join_all_of_nothing_resolves_empty() {
        let futures: Vec<BoxFut<Result<u32, ()>>> = Vec::new();
        assert_eq!(join_all(futures).await, Ok(Vec::new()));
    }

    #[tokio::test]
    async fn race_resolves_with_the_first_winner() {
        let futures: Vec<BoxFut<u32>> = vec![
            Box::pin(async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                1
            }),
            Box::pin(ready(2)),
        ];
        assert_eq!(race(futures).await, 2);
    }

    #[tokio::test]
    async fn race_of_nothing_never_resolves() {
        let futures: Vec<BoxFut<u32>> = Vec::new();
        let timed = tokio::time::timeout(Duration::from_millis(10), race(futures)).await;
        assert!(timed.is_err());
    }

    #[tokio::test]
    async fn join_settled_reports_successes_and_failures() {
        let futures: Vec<BoxFut<Result<u32, &str>>> = vec![
            Box::pin(ready(Ok(1))),
            Box::pin(async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Err("late failure")
            }),
            Box::pin(ready(Ok(3))),
        ];
        assert_eq!(
            join_settled(futures).await,
            vec![Ok(1), Err("late failure"), Ok(3)]
        );
    }

    #[tokio::test]
    async fn first_ok_skips_failures() {
        let futures: Vec<BoxFut<Result<u32, &str>>> = vec![
            Box::pin(ready(Err("first"))),
            Box::pin(async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(7)
            }),
        ];
        assert_eq!(first_ok(futures).await, Ok(7));
    }

    #[tokio::test]
    async fn first_ok_aggregates_failures_in_input_order() {
        let futures: Vec<BoxFut<Result<u32, &str>>> = vec![
            Box::pin(async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Err("a")
            }),
            Box::pin(ready(Err("b"))),
        ];
        assert_eq!(first_ok(futures).await, Err(vec!["a", "b"]));

        let none: Vec<BoxFut<Result<u32, &str>>> = Vec::new();
        assert_eq!(first_ok(none).await, Err(Vec::new()));
    }
}
