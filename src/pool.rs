use anyhow::{Context, Result};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{self, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// What a pool run produced.
#[derive(Debug)]
pub(crate) struct PoolOutcome<T, R> {
    /// Results of units that ran to completion, in completion order.
    pub completed: Vec<R>,
    /// Inputs whose unit panicked.
    pub panicked: Vec<T>,
}

/// Run `work` for each item with at most `limit` units in flight.
///
/// A fresh semaphore is created per call, so the pool lives exactly as long as
/// the phase that uses it. Cancellation is checked before each new unit is
/// dispatched; units already running are awaited and their results kept.
pub(crate) async fn run_bounded<T, R, F, Fut>(
    items: impl IntoIterator<Item = T>,
    limit: usize,
    cancel: &CancellationToken,
    work: F,
) -> Result<PoolOutcome<T, R>>
where
    T: Clone + Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut,
    Fut: Future<Output = R> + Send + 'static,
{
    let sem = Arc::new(Semaphore::new(limit.max(1)));
    let mut set = JoinSet::new();
    let mut owners: HashMap<task::Id, T> = HashMap::new();
    let mut outcome = PoolOutcome {
        completed: Vec::new(),
        panicked: Vec::new(),
    };

    for item in items {
        if cancel.is_cancelled() {
            break;
        }
        let permit = sem
            .clone()
            .acquire_owned()
            .await
            .context("worker pool semaphore closed")?;
        // Reap finished units so the set does not grow with the input.
        while let Some(res) = set.try_join_next_with_id() {
            outcome.record(res, &mut owners);
        }
        if cancel.is_cancelled() {
            break;
        }

        let unit = work(item.clone());
        let handle = set.spawn(async move {
            let _permit = permit; // keep permit until the unit completes
            unit.await
        });
        owners.insert(handle.id(), item);
    }

    while let Some(res) = set.join_next_with_id().await {
        outcome.record(res, &mut owners);
    }
    Ok(outcome)
}

impl<T, R> PoolOutcome<T, R> {
    fn record(&mut self, res: Result<(task::Id, R), JoinError>, owners: &mut HashMap<task::Id, T>) {
        match res {
            Ok((id, value)) => {
                owners.remove(&id);
                self.completed.push(value);
            }
            Err(err) => {
                let item = owners.remove(&err.id());
                if err.is_panic() {
                    warn!(error = %err, "worker panicked; unit absorbed");
                }
                if let Some(item) = item {
                    self.panicked.push(item);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn never_exceeds_limit() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        let out = run_bounded(0..50u32, 4, &cancel, |i| {
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                i
            }
        })
        .await
        .unwrap();

        assert_eq!(out.completed.len(), 50);
        assert!(peak.load(Ordering::SeqCst) <= 4);
    }

    #[tokio::test]
    async fn panics_are_reported_per_item() {
        let cancel = CancellationToken::new();
        let out = run_bounded([1u32, 2, 3], 2, &cancel, |i| async move {
            if i == 2 {
                panic!("unit {i} failed");
            }
            i
        })
        .await
        .unwrap();

        let mut done = out.completed.clone();
        done.sort();
        assert_eq!(done, vec![1, 3]);
        assert_eq!(out.panicked, vec![2]);
    }

    #[tokio::test]
    async fn cancelled_before_start_dispatches_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let out = run_bounded(0..10u32, 2, &cancel, |i| async move { i })
            .await
            .unwrap();
        assert!(out.completed.is_empty());
    }
}
