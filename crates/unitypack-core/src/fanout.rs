//! Concurrent fan-out over meta files with a single completion transition.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::{PackError, PackResult};

/// Tracks which of N entries have finished.
///
/// `mark_done` returns `true` for exactly one caller: the one whose mark
/// fills the last open slot. Marking a slot twice has no effect.
#[derive(Debug)]
pub struct CompletionTracker {
    slots: Vec<AtomicBool>,
    remaining: AtomicUsize,
}

impl CompletionTracker {
    pub fn new(len: usize) -> Self {
        Self {
            slots: (0..len).map(|_| AtomicBool::new(false)).collect(),
            remaining: AtomicUsize::new(len),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn mark_done(&self, index: usize) -> bool {
        let Some(slot) = self.slots.get(index) else {
            return false;
        };
        if slot.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.remaining.fetch_sub(1, Ordering::AcqRel) == 1
    }

    pub fn is_done(&self, index: usize) -> bool {
        self.slots
            .get(index)
            .is_some_and(|slot| slot.load(Ordering::Acquire))
    }

    pub fn done_count(&self) -> usize {
        self.len() - self.remaining.load(Ordering::Acquire)
    }

    pub fn is_complete(&self) -> bool {
        self.remaining.load(Ordering::Acquire) == 0
    }
}

/// Dispatches one job per item and runs a completion step once all succeed.
#[derive(Debug, Clone)]
pub struct FanOut {
    parallelism: usize,
}

impl FanOut {
    pub fn new(parallelism: usize) -> Self {
        Self {
            parallelism: parallelism.max(1),
        }
    }

    /// Run `job` for every item, then `on_complete` with the outputs in input order.
    ///
    /// Jobs run concurrently (bounded by `parallelism`) and may finish in any
    /// order. A failing job does not cancel its siblings; every job is awaited
    /// before returning, and `on_complete` is skipped if any job failed. The
    /// error returned is the failure of the earliest item in input order.
    pub async fn run<I, T, J, JFut, C, CFut, R>(
        &self,
        items: Vec<I>,
        job: J,
        on_complete: C,
    ) -> PackResult<R>
    where
        I: Send + 'static,
        T: Send + 'static,
        J: Fn(usize, I) -> JFut,
        JFut: Future<Output = PackResult<T>> + Send + 'static,
        C: FnOnce(Vec<T>) -> CFut,
        CFut: Future<Output = PackResult<R>>,
    {
        if items.is_empty() {
            return Err(PackError::InvalidInput {
                message: "no entries to process".to_string(),
            });
        }

        let total = items.len();
        let tracker = Arc::new(CompletionTracker::new(total));
        let sem = Arc::new(Semaphore::new(self.parallelism));
        let mut join_set = JoinSet::new();

        for (index, item) in items.into_iter().enumerate() {
            let permit = sem
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| PackError::Task {
                    message: e.to_string(),
                })?;
            let fut = job(index, item);
            let tracker = tracker.clone();
            join_set.spawn(async move {
                let _permit = permit;
                let outcome = fut.await.map(|value| {
                    let filled = tracker.mark_done(index);
                    (value, filled)
                });
                (index, outcome)
            });
        }

        let mut outputs: Vec<Option<T>> = (0..total).map(|_| None).collect();
        let mut failures: Vec<(usize, PackError)> = Vec::new();
        let mut filled = false;

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, Ok((value, last)))) => {
                    outputs[index] = Some(value);
                    filled |= last;
                    debug!(index, done = tracker.done_count(), total, "entry finished");
                }
                Ok((index, Err(e))) => {
                    warn!(index, error = %e, "entry failed");
                    failures.push((index, e));
                }
                Err(e) => {
                    warn!(error = %e, "entry task did not complete");
                    failures.push((usize::MAX, e.into()));
                }
            }
        }

        if !failures.is_empty() {
            failures.sort_by_key(|(index, _)| *index);
            if failures.len() > 1 {
                warn!(failed = failures.len(), total, "multiple entries failed");
            }
            let (_, first) = failures.swap_remove(0);
            return Err(first);
        }

        if !filled {
            let pending: Vec<usize> = (0..total).filter(|&i| !tracker.is_done(i)).collect();
            return Err(PackError::Task {
                message: format!(
                    "completion tracker not full: {}/{} entries, pending {:?}",
                    tracker.done_count(),
                    total,
                    pending
                ),
            });
        }

        on_complete(outputs.into_iter().flatten().collect()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn tracker_reports_full_exactly_once() {
        let tracker = CompletionTracker::new(3);
        assert!(!tracker.mark_done(2));
        assert!(!tracker.mark_done(2));
        assert!(!tracker.mark_done(0));
        assert!(tracker.is_done(0));
        assert!(!tracker.is_done(1));
        assert!(!tracker.is_complete());
        assert!(tracker.mark_done(1));
        assert!(tracker.is_complete());
        assert!(!tracker.mark_done(1));
        assert!(!tracker.mark_done(7));
        assert_eq!(tracker.done_count(), 3);
    }

    #[test]
    fn tracker_single_winner_under_threads() {
        for _ in 0..50 {
            let tracker = Arc::new(CompletionTracker::new(16));
            let winners = Arc::new(AtomicUsize::new(0));
            let handles: Vec<_> = (0..16)
                .map(|i| {
                    let tracker = tracker.clone();
                    let winners = winners.clone();
                    std::thread::spawn(move || {
                        if tracker.mark_done(i) {
                            winners.fetch_add(1, Ordering::SeqCst);
                        }
                    })
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }
            assert_eq!(winners.load(Ordering::SeqCst), 1);
            assert!(tracker.is_complete());
        }
    }

    async fn run_with_delays(delays: Vec<u64>) -> (Vec<usize>, usize) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let order = FanOut::new(8)
            .run(
                delays,
                |index, delay| async move {
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    Ok(index)
                },
                |outputs| async move {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Ok(outputs)
                },
            )
            .await
            .unwrap();
        (order, calls.load(Ordering::SeqCst))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn completion_runs_once_for_any_finish_order() {
        let permutations = [
            vec![1, 5, 10, 20],
            vec![20, 10, 5, 1],
            vec![10, 1, 20, 5],
            vec![0, 0, 0, 0],
        ];
        for delays in permutations {
            let (outputs, calls) = run_with_delays(delays).await;
            assert_eq!(calls, 1);
            assert_eq!(outputs, vec![0, 1, 2, 3]);
        }
    }

    #[tokio::test]
    async fn failure_skips_completion_and_waits_for_siblings() {
        let finished = Arc::new(AtomicUsize::new(0));
        let completions = Arc::new(AtomicUsize::new(0));
        let counted = completions.clone();
        let tracked = finished.clone();

        let err = FanOut::new(4)
            .run(
                vec![30u64, 0, 10, 0],
                move |index, delay| {
                    let tracked = tracked.clone();
                    async move {
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                        tracked.fetch_add(1, Ordering::SeqCst);
                        if index == 1 || index == 3 {
                            Err(PackError::archive(format!("entry {index}")))
                        } else {
                            Ok(())
                        }
                    }
                },
                |_| async move {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                },
            )
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "archive step failed: entry 1");
        assert_eq!(completions.load(Ordering::SeqCst), 0);
        assert_eq!(finished.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn empty_input_is_rejected() {
        let err = FanOut::new(2)
            .run(
                Vec::<u8>::new(),
                |_, _| async { Ok(()) },
                |_| async { Ok(()) },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PackError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn parallelism_is_bounded() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (a, p) = (active.clone(), peak.clone());

        FanOut::new(2)
            .run(
                vec![(); 8],
                move |_, _| {
                    let (active, peak) = (a.clone(), p.clone());
                    async move {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    }
                },
                |_| async { Ok(()) },
            )
            .await
            .unwrap();

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
