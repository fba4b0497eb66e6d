//! Debounce timer
//!
//! Arms a window at the current clock time and reports whether the window has
//! elapsed. An unarmed timer is never ready.

use std::time::Duration;

use crate::clock::SharedClock;
use crate::error::{ControlError, Result};

/// Default window for double-click detection
pub const DEFAULT_DOUBLE_TIMEOUT: Duration = Duration::from_millis(300);

pub struct DebounceTimer {
    timeout: Duration,
    armed_at: Option<Duration>,
    clock: SharedClock,
}

impl DebounceTimer {
    pub fn new(timeout: Duration, clock: SharedClock) -> Self {
        Self {
            timeout,
            armed_at: None,
            clock,
        }
    }

    /// Create a timer from a timeout in seconds
    ///
    /// Negative, NaN and infinite timeouts are rejected.
    pub fn from_secs(timeout_secs: f64, clock: SharedClock) -> Result<Self> {
        let timeout = Duration::try_from_secs_f64(timeout_secs)
            .map_err(|_| ControlError::InvalidTimeout(timeout_secs))?;
        Ok(Self::new(timeout, clock))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Arm (or re-arm) the window at the current time
    pub fn start(&mut self) {
        self.armed_at = Some(self.clock.now());
    }

    pub fn stop(&mut self) {
        self.armed_at = None;
    }

    pub fn is_armed(&self) -> bool {
        self.armed_at.is_some()
    }

    /// True once the armed window has fully elapsed
    ///
    /// A clock that moved backwards since `start` reads as zero elapsed time.
    pub fn ready(&self) -> bool {
        match self.armed_at {
            Some(armed_at) => self.clock.now().saturating_sub(armed_at) >= self.timeout,
            None => false,
        }
    }
}

impl std::fmt::Debug for DebounceTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebounceTimer")
            .field("timeout", &self.timeout)
            .field("armed_at", &self.armed_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn test_unarmed_timer_is_not_ready() {
        let clock = ManualClock::new();
        let timer = DebounceTimer::new(Duration::from_millis(300), clock.clone());

        clock.advance(Duration::from_secs(10));
        assert!(!timer.is_armed());
        assert!(!timer.ready());
    }

    #[test]
    fn test_ready_after_timeout() {
        let clock = ManualClock::new();
        let mut timer = DebounceTimer::new(Duration::from_millis(300), clock.clone());

        timer.start();
        assert!(!timer.ready());

        clock.set_secs(0.299);
        assert!(!timer.ready());

        // Boundary is inclusive
        clock.set_secs(0.3);
        assert!(timer.ready());
    }

    #[test]
    fn test_restart_reopens_window() {
        let clock = ManualClock::new();
        let mut timer = DebounceTimer::new(Duration::from_millis(300), clock.clone());

        timer.start();
        clock.set_secs(0.5);
        assert!(timer.ready());

        timer.start();
        assert!(!timer.ready());
        clock.set_secs(0.8);
        assert!(timer.ready());
    }

    #[test]
    fn test_stop_disarms() {
        let clock = ManualClock::new();
        let mut timer = DebounceTimer::new(Duration::from_millis(100), clock.clone());

        timer.start();
        clock.set_secs(1.0);
        timer.stop();
        assert!(!timer.ready());
    }

    #[test]
    fn test_clock_moving_backwards_reads_not_ready() {
        let clock = ManualClock::new();
        clock.set_secs(5.0);
        let mut timer = DebounceTimer::new(Duration::from_millis(300), clock.clone());

        timer.start();
        clock.set_secs(1.0);
        assert!(!timer.ready());
    }

    #[test]
    fn test_from_secs_validation() {
        let clock = ManualClock::new();
        assert!(DebounceTimer::from_secs(0.3, clock.clone()).is_ok());
        assert!(DebounceTimer::from_secs(0.0, clock.clone()).is_ok());
        assert!(matches!(
            DebounceTimer::from_secs(-1.0, clock.clone()),
            Err(ControlError::InvalidTimeout(_))
        ));
        assert!(DebounceTimer::from_secs(f64::NAN, clock).is_err());
    }
}
