//! Routing of incoming events and idle ticks to registered controls
//!
//! The dispatcher only keeps weak references: dropping the last
//! [`ControlHandle`] unregisters the control on the next dispatch.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ControlConfig;
use crate::control::{Control, ControlContext};
use crate::error::Result;
use crate::midi::MidiEvent;

/// Shared handle to a registered control
pub type ControlHandle = Arc<Mutex<Control>>;

/// What to do when a control fails during dispatch or idle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchPolicy {
    /// Log the error and keep delivering to the remaining controls
    #[default]
    Continue,
    /// Stop at the first error and return it
    Halt,
}

#[derive(Debug, Default)]
pub struct Dispatcher {
    controls: Vec<Weak<Mutex<Control>>>,
    policy: DispatchPolicy,
}

impl Dispatcher {
    pub fn new(policy: DispatchPolicy) -> Self {
        Self {
            controls: Vec::new(),
            policy,
        }
    }

    pub fn policy(&self) -> DispatchPolicy {
        self.policy
    }

    /// Build a control from config and register it
    pub fn create(
        &mut self,
        config: &ControlConfig,
        ctx: &ControlContext,
    ) -> Result<ControlHandle> {
        let control = Control::from_config(config, ctx)?;
        Ok(self.register(control))
    }

    /// Register a control; the returned handle keeps it alive
    pub fn register(&mut self, control: Control) -> ControlHandle {
        debug!(
            "Registered {} ({})",
            control.display_name(),
            control.identity()
        );
        let handle = Arc::new(Mutex::new(control));
        self.controls.push(Arc::downgrade(&handle));
        handle
    }

    /// Remove a control from routing. Returns false if it was not registered.
    pub fn unregister(&mut self, handle: &ControlHandle) -> bool {
        let before = self.controls.len();
        self.controls
            .retain(|weak| !std::ptr::eq(weak.as_ptr(), Arc::as_ptr(handle)));
        before != self.controls.len()
    }

    /// Number of controls still alive
    pub fn len(&self) -> usize {
        self.controls.iter().filter(|w| w.strong_count() > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver an event received on `port` to every control on that port
    ///
    /// Returns the number of controls that matched. Controls are visited in
    /// registration order; with [`DispatchPolicy::Halt`] the first failure
    /// stops delivery.
    ///
    /// Each control's lock is held while its callback runs. Callbacks must
    /// work through the `&mut Control` they are given; locking their own
    /// [`ControlHandle`] from inside the callback deadlocks.
    pub fn dispatch(&mut self, port: u8, event: &MidiEvent) -> Result<usize> {
        let mut matched = 0;

        for handle in self.live() {
            let mut control = handle.lock();
            if control.identity().port() != port {
                continue;
            }

            match control.on_event(event) {
                Ok(true) => matched += 1,
                Ok(false) => {}
                Err(e) => {
                    matched += 1;
                    self.handle_error(e)?;
                }
            }
        }

        Ok(matched)
    }

    /// Idle tick: flush buffered feedback of every control
    ///
    /// Returns the number of controls that wrote a value.
    pub fn idle(&mut self) -> Result<usize> {
        let mut flushed = 0;

        for handle in self.live() {
            match handle.lock().on_idle() {
                Ok(Some(_)) => flushed += 1,
                Ok(None) => {}
                Err(e) => self.handle_error(e)?,
            }
        }

        Ok(flushed)
    }

    /// Upgrade live controls, dropping dead entries
    fn live(&mut self) -> Vec<ControlHandle> {
        self.controls.retain(|w| w.strong_count() > 0);
        self.controls.iter().filter_map(Weak::upgrade).collect()
    }

    fn handle_error(&self, error: crate::error::ControlError) -> Result<()> {
        match self.policy {
            DispatchPolicy::Halt => Err(error),
            DispatchPolicy::Continue => {
                warn!("{}", error);
                Ok(())
            }
        }
    }
}
