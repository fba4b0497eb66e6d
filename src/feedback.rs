//! Feedback throttling and lazy deduplication
//!
//! A feedback request is either dropped (lazy mode, value already sent),
//! parked as the single pending value until the next idle tick (throttling),
//! or written straight away. Parked values coalesce: only the latest survives.

use std::sync::Arc;

use anyhow::Result;
use tracing::trace;

/// Destination of packed feedback words (status | cc << 8 | value << 16)
///
/// Implementations use interior mutability; the dispatcher only holds `&self`.
pub trait FeedbackSink: Send + Sync {
    fn send(&self, port: u8, message: u32) -> Result<()>;
}

pub type SharedSink = Arc<dyn FeedbackSink>;

/// Outcome of a feedback request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackEffect {
    /// Value equals the last one written and lazy feedback is on
    Suppressed,
    /// Stored as the pending value, written on the next flush
    Buffered,
    /// Written through the sink during the request
    WrittenImmediately,
}

#[derive(Debug, Clone, Default)]
pub struct FeedbackThrottle {
    pending_value: Option<u8>,
    last_sent_value: Option<u8>,
    throttling: bool,
    lazy: bool,
}

impl FeedbackThrottle {
    pub fn new(throttling: bool, lazy: bool) -> Self {
        Self {
            pending_value: None,
            last_sent_value: None,
            throttling,
            lazy,
        }
    }

    pub fn pending_value(&self) -> Option<u8> {
        self.pending_value
    }

    pub fn last_sent_value(&self) -> Option<u8> {
        self.last_sent_value
    }

    pub fn is_throttling(&self) -> bool {
        self.throttling
    }

    pub fn is_lazy(&self) -> bool {
        self.lazy
    }

    /// Request that `value` be written
    ///
    /// `write` performs the physical write. If it fails, the error is returned
    /// and `last_sent_value` is left untouched.
    pub fn request<F>(&mut self, value: u8, write: F) -> Result<FeedbackEffect>
    where
        F: FnOnce(u8) -> Result<()>,
    {
        if self.lazy && self.last_sent_value == Some(value) {
            trace!("Feedback {} suppressed (already sent)", value);
            return Ok(FeedbackEffect::Suppressed);
        }

        if self.throttling {
            if let Some(dropped) = self.pending_value.replace(value) {
                trace!("Feedback {} replaced pending {}", value, dropped);
            }
            return Ok(FeedbackEffect::Buffered);
        }

        write(value)?;
        self.last_sent_value = Some(value);
        Ok(FeedbackEffect::WrittenImmediately)
    }

    /// Write the pending value, if any
    ///
    /// Returns the value written. The pending slot is cleared before the write,
    /// so a failed write is not retried on the next flush.
    pub fn flush<F>(&mut self, write: F) -> Result<Option<u8>>
    where
        F: FnOnce(u8) -> Result<()>,
    {
        let Some(value) = self.pending_value.take() else {
            return Ok(None);
        };

        write(value)?;
        self.last_sent_value = Some(value);
        Ok(Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    fn recorder(log: &mut Vec<u8>) -> impl FnOnce(u8) -> Result<()> + '_ {
        move |v| {
            log.push(v);
            Ok(())
        }
    }

    #[test]
    fn test_plain_request_writes_immediately() {
        let mut throttle = FeedbackThrottle::new(false, false);
        let mut writes = Vec::new();

        let effect = throttle.request(42, recorder(&mut writes)).unwrap();
        assert_eq!(effect, FeedbackEffect::WrittenImmediately);
        assert_eq!(writes, vec![42]);
        assert_eq!(throttle.last_sent_value(), Some(42));

        // Not lazy: repeated value is written again
        throttle.request(42, recorder(&mut writes)).unwrap();
        assert_eq!(writes, vec![42, 42]);
    }

    #[test]
    fn test_lazy_suppresses_repeat() {
        let mut throttle = FeedbackThrottle::new(false, true);
        let mut writes = Vec::new();

        let first = throttle.request(5, recorder(&mut writes)).unwrap();
        let second = throttle.request(5, recorder(&mut writes)).unwrap();

        assert_eq!(first, FeedbackEffect::WrittenImmediately);
        assert_eq!(second, FeedbackEffect::Suppressed);
        assert_eq!(writes, vec![5]);
    }

    #[test]
    fn test_throttle_coalesces_to_latest() {
        let mut throttle = FeedbackThrottle::new(true, false);
        let mut writes = Vec::new();

        for v in 1..=3 {
            let effect = throttle.request(v, recorder(&mut writes)).unwrap();
            assert_eq!(effect, FeedbackEffect::Buffered);
        }
        assert!(writes.is_empty());
        assert_eq!(throttle.pending_value(), Some(3));

        assert_eq!(throttle.flush(recorder(&mut writes)).unwrap(), Some(3));
        assert_eq!(writes, vec![3]);
        assert_eq!(throttle.pending_value(), None);
        assert_eq!(throttle.last_sent_value(), Some(3));
    }

    #[test]
    fn test_flush_is_idempotent() {
        let mut throttle = FeedbackThrottle::new(true, false);
        let mut writes = Vec::new();

        throttle.request(9, recorder(&mut writes)).unwrap();
        throttle.flush(recorder(&mut writes)).unwrap();
        assert_eq!(throttle.flush(recorder(&mut writes)).unwrap(), None);
        assert_eq!(writes, vec![9]);
    }

    #[test]
    fn test_lazy_throttled_compares_against_sent_not_pending() {
        let mut throttle = FeedbackThrottle::new(true, true);
        let mut writes = Vec::new();

        // Pending values never count as sent
        assert_eq!(
            throttle.request(7, recorder(&mut writes)).unwrap(),
            FeedbackEffect::Buffered
        );
        assert_eq!(
            throttle.request(7, recorder(&mut writes)).unwrap(),
            FeedbackEffect::Buffered
        );
        throttle.flush(recorder(&mut writes)).unwrap();

        assert_eq!(
            throttle.request(7, recorder(&mut writes)).unwrap(),
            FeedbackEffect::Suppressed
        );
        assert_eq!(writes, vec![7]);
    }

    #[test]
    fn test_failed_write_does_not_record_sent_value() {
        let mut throttle = FeedbackThrottle::new(false, true);

        let result = throttle.request(3, |_| Err(anyhow!("port closed")));
        assert!(result.is_err());
        assert_eq!(throttle.last_sent_value(), None);

        // Lazy mode must not suppress the retry by the application
        let mut writes = Vec::new();
        assert_eq!(
            throttle.request(3, recorder(&mut writes)).unwrap(),
            FeedbackEffect::WrittenImmediately
        );
    }

    #[test]
    fn test_failed_flush_clears_pending() {
        let mut throttle = FeedbackThrottle::new(true, false);
        let mut writes = Vec::new();

        throttle.request(11, recorder(&mut writes)).unwrap();
        assert!(throttle.flush(|_| Err(anyhow!("port closed"))).is_err());
        assert_eq!(throttle.pending_value(), None);
        assert_eq!(throttle.flush(recorder(&mut writes)).unwrap(), None);
        assert!(writes.is_empty());
    }
}
