use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Seconds a standard quiz question stays open.
pub const QUESTION_SECS: u64 = 10;
/// Seconds a reading-comprehension question stays open.
pub const READING_SECS: u64 = 30;
/// Post-feedback delay before the run advances on its own.
pub const FEEDBACK_DELAY_SECS: u64 = 3;

const TICK_INTERVAL: Duration = Duration::from_millis(500);

/// A cancellable scheduled continuation owned by one session.
///
/// `on_tick` reports whole remaining seconds and is only invoked when the
/// value changed since the last report, so the UI is never edited with the
/// same text twice. `on_expire` fires exactly once, after which the task is
/// gone. Dropping the countdown aborts it, so handing a session a new one
/// always cancels the previous one first.
#[derive(Debug)]
pub struct Countdown {
    task: JoinHandle<()>,
}

impl Countdown {
    pub fn start<T, TFut, E, EFut>(total_secs: u64, mut on_tick: T, on_expire: E) -> Self
    where
        T: FnMut(u64) -> TFut + Send + 'static,
        TFut: Future<Output = ()> + Send,
        E: FnOnce() -> EFut + Send + 'static,
        EFut: Future<Output = ()> + Send,
    {
        let task = tokio::spawn(async move {
            let end = Instant::now() + Duration::from_secs(total_secs);
            let mut interval = tokio::time::interval(TICK_INTERVAL);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last_reported = None;
            loop {
                interval.tick().await;
                let remaining = end.saturating_duration_since(Instant::now());
                let secs = remaining.as_secs_f64().ceil() as u64;
                if secs == 0 {
                    break;
                }
                if last_reported != Some(secs) {
                    last_reported = Some(secs);
                    on_tick(secs).await;
                }
            }
            on_expire().await;
        });
        Self { task }
    }

    /// One-shot variant with no ticks; used for the auto-advance delay.
    pub fn delay<E, EFut>(secs: u64, on_fire: E) -> Self
    where
        E: FnOnce() -> EFut + Send + 'static,
        EFut: Future<Output = ()> + Send,
    {
        let task = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            on_fire().await;
        });
        Self { task }
    }

    /// Idempotent: cancelling an already-fired or already-cancelled
    /// countdown is a no-op.
    pub fn cancel(&self) {
        self.task.abort();
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.task.abort();
    }
}
