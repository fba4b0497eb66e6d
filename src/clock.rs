//! Time sources for debounce windows
//!
//! Timestamps are durations since the clock's own origin, so a clock can be
//! shared between controls and replaced by a manual one in tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Supplies the current timestamp on demand
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;
}

/// Clock handle shared by every control created from the same wiring
pub type SharedClock = Arc<dyn Clock>;

/// Monotonic clock backed by `Instant`
#[derive(Debug, Clone)]
pub struct SystemClock {
    start_instant: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start_instant: Instant::now(),
        }
    }

    pub fn shared() -> SharedClock {
        Arc::new(Self::new())
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.start_instant.elapsed()
    }
}

/// Clock that only moves when told to
///
/// Resolution is one microsecond. `set` may move time backwards, which is how
/// tests exercise a misbehaving host clock.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_us: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, at: Duration) {
        self.now_us.store(at.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn set_secs(&self, secs: f64) {
        self.now_us
            .store((secs * 1_000_000.0).round() as u64, Ordering::Relaxed);
    }

    pub fn advance(&self, by: Duration) {
        self.now_us
            .fetch_add(by.as_micros() as u64, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_micros(self.now_us.load(Ordering::Relaxed))
    }
}
