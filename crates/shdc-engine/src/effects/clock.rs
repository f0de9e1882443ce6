//! Time effect: wall-clock seconds for header timestamps and freshness
//! checks, plus a sleep primitive for the rotation and discovery-backoff
//! schedulers.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Wall-clock access, abstracted so the engine's schedulers and freshness
/// checks can run against a deterministic fake in tests.
#[async_trait]
pub trait ClockEffects: Send + Sync {
    /// Current time as Unix epoch seconds.
    async fn now_unix(&self) -> u32;

    /// Suspend the calling task for `duration`.
    async fn sleep(&self, duration: Duration);
}

#[async_trait]
impl<T: ClockEffects + ?Sized> ClockEffects for Arc<T> {
    async fn now_unix(&self) -> u32 {
        (**self).now_unix().await
    }

    async fn sleep(&self, duration: Duration) {
        (**self).sleep(duration).await
    }
}

/// Production clock backed by the OS wall clock and the Tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl ClockEffects for SystemClock {
    async fn now_unix(&self) -> u32 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0)
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(feature = "testing")]
mod fake {
    use super::ClockEffects;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::Duration;

    /// Deterministic clock for scenario tests: `now_unix` is set explicitly
    /// by the test and `sleep` advances it by the requested duration
    /// instead of actually waiting, so backoff/rotation schedules run
    /// instantly under test control.
    pub struct FakeClock {
        now: Mutex<u32>,
    }

    impl FakeClock {
        /// Start the fake clock at `start` (Unix epoch seconds).
        pub fn new(start: u32) -> Self {
            Self {
                now: Mutex::new(start),
            }
        }

        /// Jump the clock forward or set it to an arbitrary value.
        pub fn set(&self, value: u32) {
            *self.now.lock() = value;
        }

        /// Advance the clock by `duration`.
        pub fn advance(&self, duration: Duration) {
            let mut now = self.now.lock();
            *now = now.saturating_add(duration.as_secs() as u32);
        }
    }

    #[async_trait]
    impl ClockEffects for FakeClock {
        async fn now_unix(&self) -> u32 {
            *self.now.lock()
        }

        async fn sleep(&self, duration: Duration) {
            self.advance(duration);
            tokio::task::yield_now().await;
        }
    }
}

#[cfg(feature = "testing")]
pub use fake::FakeClock;
