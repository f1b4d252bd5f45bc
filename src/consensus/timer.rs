use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

/// Handle to a scheduled single-shot timer.
///
/// Dropping the handle does not cancel the timer; `cancel` is idempotent
/// and safe to call after the timer has fired.
#[derive(Debug)]
pub struct TimerHandle {
    token: CancellationToken,
}

impl TimerHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }
}

/// Schedule `callback` to run once after `delay` unless cancelled first.
pub fn after<F>(delay: Duration, callback: F) -> TimerHandle
where
    F: FnOnce() + Send + 'static,
{
    let token = CancellationToken::new();
    let guard = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(delay) => callback(),
            _ = guard.cancelled() => {}
        }
    });
    TimerHandle { token }
}

/// Generates a random election timeout within the configured range.
///
/// Drawn fresh on every restart so concurrent followers diverge in when
/// they become candidates.
pub fn random_election_timeout(min_ms: u64, max_ms: u64) -> Duration {
    let mut rng = rand::thread_rng();
    let timeout_ms = rng.gen_range(min_ms..=max_ms);
    Duration::from_millis(timeout_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn timer_fires_after_delay() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();

        let _handle = after(Duration::from_millis(100), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_never_fires() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();

        let handle = after(Duration::from_millis(100), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        handle.cancel();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_is_idempotent_and_safe_after_firing() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();

        let handle = after(Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // Already fired; cancelling now is a no-op, repeatedly.
        handle.cancel();
        handle.cancel();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn election_timeout_stays_in_range() {
        for _ in 0..200 {
            let timeout = random_election_timeout(150, 300);
            assert!(timeout >= Duration::from_millis(150));
            assert!(timeout <= Duration::from_millis(300));
        }
    }

    #[test]
    fn election_timeout_draws_are_not_all_identical() {
        let draws: Vec<Duration> = (0..50).map(|_| random_election_timeout(150, 300)).collect();
        assert!(draws.iter().any(|&d| d != draws[0]));
    }
}
