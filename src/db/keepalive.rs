//! Periodic keep-alive task.
//!
//! The task owns nothing but a tick callback. The connection manager hands it
//! a closure over a `Weak` reference to its state, so the task exits on its own
//! once the manager is gone, and dropping the [`KeepAliveTask`] aborts it.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

/// What a single keep-alive tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAliveOutcome {
    /// Recent activity (or no connection to keep alive); no probe issued.
    Skipped,
    /// Probe succeeded.
    Healthy,
    /// Probe failed and the reconnect succeeded.
    Recovered,
    /// Probe failed and so did the reconnect. The next tick tries again.
    RecoveryFailed,
}

impl KeepAliveOutcome {
    /// Whether the tick sent a probe query.
    pub fn probed(&self) -> bool {
        !matches!(self, Self::Skipped)
    }
}

/// Handle to a running keep-alive loop. Aborts the loop when dropped.
#[derive(Debug)]
pub struct KeepAliveTask {
    handle: JoinHandle<()>,
    period: Duration,
}

impl KeepAliveTask {
    /// Spawn a loop calling `tick` every `period`, starting one period from now.
    ///
    /// `tick` returns `None` once its owner is gone, which ends the loop.
    pub fn spawn<F, Fut>(period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Option<Fut> + Send + 'static,
        Fut: Future<Output = KeepAliveOutcome> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;

                let Some(tick_future) = tick() else {
                    info!("Connection manager dropped, keep-alive task exiting");
                    return;
                };
                let outcome = tick_future.await;
                debug!(outcome = ?outcome, "Keep-alive tick");
            }
        });

        debug!(period_secs = period.as_secs(), "Keep-alive task started");
        Self { handle, period }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// True until the loop exits or is aborted.
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for KeepAliveTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_task(period: Duration, limit: Option<usize>) -> (KeepAliveTask, Arc<AtomicUsize>) {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let task = KeepAliveTask::spawn(period, move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if limit.is_some_and(|l| n > l) {
                return None;
            }
            Some(async { KeepAliveOutcome::Skipped })
        });
        (task, ticks)
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_after_one_period() {
        let (task, ticks) = counting_task(Duration::from_secs(30), None);

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
        assert!(task.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_aborts_loop() {
        let (task, ticks) = counting_task(Duration::from_secs(10), None);
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);

        drop(task);
        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_exits_when_owner_gone() {
        let (task, _ticks) = counting_task(Duration::from_secs(5), Some(1));
        tokio::time::sleep(Duration::from_secs(11)).await;
        tokio::task::yield_now().await;
        assert!(!task.is_running());
    }

    #[test]
    fn test_outcome_probed() {
        assert!(!KeepAliveOutcome::Skipped.probed());
        assert!(KeepAliveOutcome::Healthy.probed());
        assert!(KeepAliveOutcome::RecoveryFailed.probed());
    }
}
