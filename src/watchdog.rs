//! Connection health monitoring.
//!
//! The server sends `PIN` roughly every 30 seconds. [`KeepaliveClock`] records
//! when the last one arrived and [`HealthWatchdog`] periodically checks that
//! it is recent enough.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

/// Instant of the most recent inbound keepalive.
#[derive(Debug)]
pub struct KeepaliveClock {
    last: Mutex<Instant>,
}

impl KeepaliveClock {
    /// Start the clock at the current instant.
    pub fn new() -> Self {
        Self {
            last: Mutex::new(Instant::now()),
        }
    }

    /// Record a keepalive now.
    pub fn touch(&self) {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    /// Time since the last keepalive.
    pub fn elapsed(&self) -> Duration {
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }
}

impl Default for KeepaliveClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Why [`HealthWatchdog::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogExit {
    /// The keepalive threshold was exceeded.
    Stale,
    /// The running flag was cleared.
    Stopped,
}

/// Periodic keepalive recency check.
#[derive(Debug, Clone)]
pub struct HealthWatchdog {
    clock: Arc<KeepaliveClock>,
    stale_after: Duration,
    interval: Duration,
}

impl HealthWatchdog {
    pub fn new(clock: Arc<KeepaliveClock>, stale_after: Duration, interval: Duration) -> Self {
        Self {
            clock,
            stale_after,
            interval,
        }
    }

    /// Whether the connection is stale right now.
    pub fn is_stale(&self) -> bool {
        self.clock.elapsed() > self.stale_after
    }

    /// Check every interval until stale or until `running` clears.
    pub async fn run(self, running: Arc<AtomicBool>) -> WatchdogExit {
        debug!(stale_after = ?self.stale_after, "watchdog started");
        loop {
            tokio::time::sleep(self.interval).await;
            if !running.load(Ordering::Acquire) {
                debug!("watchdog stopped");
                return WatchdogExit::Stopped;
            }
            if self.is_stale() {
                warn!(
                    silent_for = ?self.clock.elapsed(),
                    "no keepalive within threshold, connection is stale"
                );
                return WatchdogExit::Stale;
            }
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    fn watchdog(clock: &Arc<KeepaliveClock>) -> HealthWatchdog {
        HealthWatchdog::new(
            Arc::clone(clock),
            Duration::from_secs(90),
            Duration::from_secs(1),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn goes_stale_after_prolonged_silence() {
        let clock = Arc::new(KeepaliveClock::new());
        let running = Arc::new(AtomicBool::new(true));
        let start = Instant::now();

        let exit = watchdog(&clock).run(running).await;

        assert_eq!(exit, WatchdogExit::Stale);
        let waited = Instant::now() - start;
        assert!(waited > Duration::from_secs(90));
        assert!(waited <= Duration::from_secs(92));
    }

    #[tokio::test(start_paused = true)]
    async fn regular_keepalives_keep_it_healthy() {
        let clock = Arc::new(KeepaliveClock::new());
        let running = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(watchdog(&clock).run(Arc::clone(&running)));

        for _ in 0..10 {
            tokio::time::sleep(Duration::from_secs(30)).await;
            clock.touch();
        }
        assert!(!task.is_finished());

        running.store(false, Ordering::Release);
        assert_eq!(task.await.unwrap(), WatchdogExit::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn exactly_at_threshold_is_not_stale() {
        let clock = Arc::new(KeepaliveClock::new());
        tokio::time::advance(Duration::from_secs(90)).await;
        assert!(!watchdog(&clock).is_stale());
        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(watchdog(&clock).is_stale());
    }
}
