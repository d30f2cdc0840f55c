//! Display-refresh loop driving the level visualisation.
//!
//! [`RefreshLoop::start`] spawns a tokio task that calls the tick closure at
//! a fixed period (missed ticks are skipped, never bunched up).  The loop is
//! cancelled exactly once: [`cancel`](RefreshLoop::cancel) on an idle or
//! already cancelled loop does nothing.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Handle to a running (or idle) refresh loop.
#[derive(Debug, Default)]
pub struct RefreshLoop {
    task: Option<JoinHandle<()>>,
}

impl RefreshLoop {
    /// A loop that was never started.
    pub fn idle() -> Self {
        Self::default()
    }

    /// Spawn the loop on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn start<F>(period: Duration, mut tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let period = period.max(Duration::from_millis(1));
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                tick();
            }
        });
        Self { task: Some(task) }
    }

    /// Stop the loop.  Returns `true` only when a running loop was stopped.
    pub fn cancel(&mut self) -> bool {
        match self.task.take() {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for RefreshLoop {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Period for a refresh rate in Hz (clamped to 1..=240).
pub fn period_for_hz(hz: u32) -> Duration {
    Duration::from_micros(1_000_000 / hz.clamp(1, 240) as u64)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn ticks_until_cancelled() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let mut refresh = RefreshLoop::start(Duration::from_millis(1), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        while ticks.load(Ordering::SeqCst) < 3 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert!(refresh.is_running());

        assert!(refresh.cancel());
        tokio::task::yield_now().await;
        let after_cancel = ticks.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), after_cancel);
        assert!(!refresh.is_running());
    }

    #[tokio::test]
    async fn cancel_twice_is_noop() {
        let mut refresh = RefreshLoop::start(Duration::from_millis(5), || {});
        assert!(refresh.cancel());
        assert!(!refresh.cancel());
    }

    #[test]
    fn cancel_never_started_is_noop() {
        let mut refresh = RefreshLoop::idle();
        assert!(!refresh.is_running());
        assert!(!refresh.cancel());
    }

    #[test]
    fn period_is_clamped() {
        assert_eq!(period_for_hz(60), Duration::from_micros(16_666));
        assert_eq!(period_for_hz(0), Duration::from_secs(1));
        assert_eq!(period_for_hz(10_000), Duration::from_micros(4_166));
    }
}
