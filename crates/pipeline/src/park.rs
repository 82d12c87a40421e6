//! Timed parking for background loops
//!
//! A loop parks when it has nothing to do and is woken early by its
//! counterpart when state changes in its favour. A wake issued while the
//! loop is busy is remembered, so the next park returns immediately.

use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
pub(crate) struct Parker {
    notify: Notify,
}

impl Parker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wake the parked loop (or pre-empt its next park)
    #[inline]
    pub fn unpark(&self) {
        self.notify.notify_one();
    }

    /// Park until woken, `timeout` elapses, or `cancel` fires
    pub async fn park(&self, timeout: Duration, cancel: &CancellationToken) {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = self.notify.notified() => {}
            _ = tokio::time::sleep(timeout) => {}
        }
    }
}

/// Sleep for `duration` unless cancelled first
///
/// Returns false if cancelled.
pub(crate) async fn cooldown(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    #[tokio::test]
    async fn test_park_times_out() {
        let parker = Parker::new();
        let started = Instant::now();
        parker
            .park(Duration::from_millis(20), &CancellationToken::new())
            .await;
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_unpark_before_park_is_remembered() {
        let parker = Parker::new();
        parker.unpark();

        let started = Instant::now();
        parker
            .park(Duration::from_secs(10), &CancellationToken::new())
            .await;
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_unpark_wakes_parked_task() {
        let parker = Arc::new(Parker::new());
        let cancel = CancellationToken::new();

        let task = {
            let parker = Arc::clone(&parker);
            let cancel = cancel.clone();
            tokio::spawn(async move { parker.park(Duration::from_secs(10), &cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        parker.unpark();

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("park should return after unpark")
            .unwrap();
    }

    #[tokio::test]
    async fn test_cooldown_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(!cooldown(Duration::from_secs(10), &cancel).await);
        assert!(cooldown(Duration::from_millis(1), &CancellationToken::new()).await);
    }
}
