//! Stateful MIDI Control Change controls
//!
//! Turns raw CC messages into tracked control values (with double-click
//! detection for buttons) and turns feedback requests into throttled,
//! deduplicated CC output.

pub mod bindings;
pub mod clock;
pub mod config;
pub mod control;
pub mod dispatcher;
pub mod error;
pub mod feedback;
pub mod identity;
pub mod midi;
pub mod timer;
pub mod transport;

pub use bindings::{BindingTable, EventBindings, EventId};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{AppConfig, ControlConfig, ControlKind};
pub use control::{
    ButtonState, Control, ControlCallback, ControlContext, ControlState, UpdatePolicy,
};
pub use dispatcher::{ControlHandle, DispatchPolicy, Dispatcher};
pub use error::ControlError;
pub use feedback::{FeedbackEffect, FeedbackSink, FeedbackThrottle, SharedSink};
pub use identity::{ControlIdentity, RemoteControlId};
pub use midi::MidiEvent;
pub use timer::DebounceTimer;

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use anyhow::{bail, Result};
    use parking_lot::Mutex;

    use crate::feedback::FeedbackSink;
    use crate::midi::unpack;

    /// Sink that records every packed write
    #[derive(Default)]
    pub struct RecordingSink {
        writes: Mutex<Vec<(u8, u32)>>,
        fail_next: AtomicBool,
    }

    impl RecordingSink {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Make the next write fail
        pub fn fail_next(&self) {
            self.fail_next.store(true, Ordering::SeqCst);
        }

        pub fn writes(&self) -> Vec<(u8, u32)> {
            self.writes.lock().clone()
        }

        /// CC values of every write, in order
        pub fn values(&self) -> Vec<u8> {
            self.writes.lock().iter().map(|(_, w)| unpack(*w)[2]).collect()
        }
    }

    impl FeedbackSink for RecordingSink {
        fn send(&self, port: u8, message: u32) -> Result<()> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                bail!("port {} unavailable", port);
            }
            self.writes.lock().push((port, message));
            Ok(())
        }
    }
}
