//! MIDI CC control state engine
//!
//! A [`Control`] tracks the value of one CC controller, invokes an optional
//! callback on every matching event, and writes feedback back to the device
//! through the [`FeedbackThrottle`]. Buttons share the same engine and differ
//! only in their [`UpdatePolicy`], which adds rising-edge double-click
//! detection.

use std::collections::HashMap;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, trace};

use crate::bindings::{EventBindings, EventId};
use crate::clock::SharedClock;
use crate::config::{ControlConfig, ControlKind};
use crate::error::{ControlError, Result};
use crate::feedback::{FeedbackEffect, FeedbackThrottle, SharedSink};
use crate::identity::{ControlIdentity, RemoteControlId};
use crate::midi::MidiEvent;
use crate::timer::DebounceTimer;

/// Callback invoked after a matching event updated the control
///
/// The control is passed mutably so the callback can answer with feedback.
pub type ControlCallback = Box<dyn FnMut(&mut Control, &MidiEvent) -> anyhow::Result<()> + Send>;

/// Collaborators shared by all controls built from the same wiring
#[derive(Clone)]
pub struct ControlContext {
    /// Port assigned to controls whose configuration names none
    pub default_port: u8,
    pub clock: SharedClock,
    pub sink: SharedSink,
}

/// Current value and one step of history
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlState {
    pub value: u8,
    pub previous_value: u8,
}

/// Rising-edge tracking and double-click classification for buttons
#[derive(Debug)]
pub struct ButtonState {
    timer: DebounceTimer,
    last_rising_value: u8,
    is_double_click: bool,
}

impl ButtonState {
    /// Wrap `timer` and arm it, so a press inside the first window after
    /// construction already counts as a double click
    pub fn new(mut timer: DebounceTimer) -> Self {
        timer.start();
        Self {
            timer,
            last_rising_value: 0,
            is_double_click: false,
        }
    }

    /// Classify a new button value
    ///
    /// A press outside the window (or with the timer stopped) opens a new one;
    /// a press landing inside it is a double click and leaves the window
    /// running from where it was opened.
    fn observe(&mut self, value: u8) {
        let high_edge = value > self.last_rising_value;
        self.last_rising_value = value;
        self.is_double_click = false;

        if !high_edge {
            return;
        }

        if self.timer.is_armed() && !self.timer.ready() {
            self.is_double_click = true;
        } else {
            self.timer.start();
        }
    }

    pub fn is_double_click(&self) -> bool {
        self.is_double_click
    }

    pub fn last_rising_value(&self) -> u8 {
        self.last_rising_value
    }

    pub fn timer(&self) -> &DebounceTimer {
        &self.timer
    }

    /// Disarm the window; the next press starts a fresh one
    pub fn stop_window(&mut self) {
        self.timer.stop();
    }
}

/// How a matching event's value is folded into the control
#[derive(Debug)]
pub enum UpdatePolicy {
    /// Store the value
    Plain,
    /// Store the value and run double-click detection
    Button(ButtonState),
}

impl UpdatePolicy {
    fn apply(&mut self, state: &mut ControlState, value: u8) {
        state.value = value;
        if let UpdatePolicy::Button(button) = self {
            button.observe(value);
        }
    }
}

pub struct Control {
    identity: ControlIdentity,
    name: String,
    verbose: bool,
    state: ControlState,
    policy: UpdatePolicy,
    feedback: FeedbackThrottle,
    sink: SharedSink,
    attributes: HashMap<String, Value>,
    callback: Option<ControlCallback>,
}

impl Control {
    /// Plain control with no throttling and no lazy feedback
    pub fn new(identity: ControlIdentity, sink: SharedSink) -> Self {
        Self {
            identity,
            name: String::new(),
            verbose: false,
            state: ControlState::default(),
            policy: UpdatePolicy::Plain,
            feedback: FeedbackThrottle::default(),
            sink,
            attributes: HashMap::new(),
            callback: None,
        }
    }

    /// Momentary button with double-click detection
    pub fn button(
        identity: ControlIdentity,
        double_timeout: Duration,
        clock: SharedClock,
        sink: SharedSink,
    ) -> Self {
        let timer = DebounceTimer::new(double_timeout, clock);
        Self::new(identity, sink).with_policy(UpdatePolicy::Button(ButtonState::new(timer)))
    }

    /// Build a control from its configuration
    ///
    /// Fails on out-of-range channel/CC numbers and invalid button timeouts.
    pub fn from_config(config: &ControlConfig, ctx: &ControlContext) -> Result<Self> {
        let port = config.port.unwrap_or(ctx.default_port);
        let identity = ControlIdentity::new(port, config.channel, config.cc_number)?;

        let policy = match config.kind {
            ControlKind::Plain => UpdatePolicy::Plain,
            ControlKind::Button => {
                let timer = DebounceTimer::from_secs(config.double_timeout, ctx.clock.clone())?;
                UpdatePolicy::Button(ButtonState::new(timer))
            }
        };

        let mut control = Self::new(identity, ctx.sink.clone())
            .with_policy(policy)
            .with_name(config.name.clone())
            .with_throttling(config.throttling)
            .with_lazy_feedback(config.lazy_feedback)
            .with_verbose(config.verbose);
        control.attributes = config.attributes.clone();

        Ok(control)
    }

    pub fn with_policy(mut self, policy: UpdatePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_throttling(mut self, throttling: bool) -> Self {
        self.feedback = FeedbackThrottle::new(throttling, self.feedback.is_lazy());
        self
    }

    pub fn with_lazy_feedback(mut self, lazy: bool) -> Self {
        self.feedback = FeedbackThrottle::new(self.feedback.is_throttling(), lazy);
        self
    }

    /// Log every value update at info level
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn identity(&self) -> &ControlIdentity {
        &self.identity
    }

    pub fn remote_control_id(&self) -> RemoteControlId {
        self.identity.encode()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name for logs, falling back to `MidiControl(channel, 0xcc)`
    pub fn display_name(&self) -> String {
        if self.name.is_empty() {
            format!(
                "MidiControl({}, {:#x})",
                self.identity.channel(),
                self.identity.cc_number()
            )
        } else {
            self.name.clone()
        }
    }

    pub fn value(&self) -> u8 {
        self.state.value
    }

    pub fn previous_value(&self) -> u8 {
        self.state.previous_value
    }

    pub fn state(&self) -> ControlState {
        self.state
    }

    pub fn policy(&self) -> &UpdatePolicy {
        &self.policy
    }

    /// Button state, `None` for plain controls
    pub fn button_state(&self) -> Option<&ButtonState> {
        match &self.policy {
            UpdatePolicy::Button(button) => Some(button),
            UpdatePolicy::Plain => None,
        }
    }

    /// Whether the last matching event was a double click (always false for plain controls)
    pub fn is_double_click(&self) -> bool {
        self.button_state()
            .map(ButtonState::is_double_click)
            .unwrap_or(false)
    }

    pub fn feedback(&self) -> &FeedbackThrottle {
        &self.feedback
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Typed attribute lookup; `None` if missing or of another shape
    pub fn attribute_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn attributes(&self) -> &HashMap<String, Value> {
        &self.attributes
    }

    /// Install (or replace) the callback
    ///
    /// The callback receives this control mutably. When the control is driven
    /// by a [`Dispatcher`](crate::Dispatcher) its handle is locked for the
    /// duration of the call, so the callback must not lock that handle again.
    pub fn set_callback<F>(&mut self, callback: F) -> &mut Self
    where
        F: FnMut(&mut Control, &MidiEvent) -> anyhow::Result<()> + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    pub fn clear_callback(&mut self) -> Option<ControlCallback> {
        self.callback.take()
    }

    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    /// Feed one incoming event through the control
    ///
    /// `previous_value` is refreshed on every call, matching or not. Returns
    /// whether the event matched; callback errors are returned to the caller.
    pub fn on_event(&mut self, event: &MidiEvent) -> Result<bool> {
        self.state.previous_value = self.state.value;

        if !self.identity.matches(event) {
            trace!("{} ignored {}", self.identity, event);
            return Ok(false);
        }

        self.policy.apply(&mut self.state, event.control_value());

        if self.verbose {
            info!("{} = {}", self.display_name(), self.state.value);
        } else {
            debug!("{} = {}", self.display_name(), self.state.value);
        }
        if self.is_double_click() {
            debug!("{} double click", self.display_name());
        }

        if let Some(mut callback) = self.callback.take() {
            let result = callback(self, event);
            // The callback may have installed a replacement
            if self.callback.is_none() {
                self.callback = Some(callback);
            }
            result.map_err(|source| ControlError::Callback {
                control: self.display_name(),
                source,
            })?;
        }

        Ok(true)
    }

    /// Send a CC value back to the device, subject to throttling and lazy mode
    pub fn send_feedback(&mut self, value: u8) -> Result<FeedbackEffect> {
        if value > 0x7F {
            return Err(ControlError::InvalidValue(value));
        }

        let port = self.identity.port();
        let word = self.identity.feedback_word(value);
        let sink = &self.sink;
        let effect = self
            .feedback
            .request(value, |_| sink.send(port, word))
            .map_err(|source| ControlError::Feedback {
                control: self.display_name(),
                source,
            })?;

        match effect {
            FeedbackEffect::Buffered => {
                debug!("{} feedback {} buffered", self.display_name(), value)
            }
            FeedbackEffect::WrittenImmediately => {
                debug!("{} feedback {} sent", self.display_name(), value)
            }
            FeedbackEffect::Suppressed => {}
        }
        Ok(effect)
    }

    /// Idle tick: flush buffered feedback. Returns the value written, if any.
    pub fn on_idle(&mut self) -> Result<Option<u8>> {
        let identity = self.identity;
        let sink = &self.sink;
        let flushed = self
            .feedback
            .flush(|value| sink.send(identity.port(), identity.feedback_word(value)))
            .map_err(|source| ControlError::Feedback {
                control: self.display_name(),
                source,
            })?;

        if let Some(value) = flushed {
            debug!("{} feedback {} flushed", self.display_name(), value);
        }
        Ok(flushed)
    }

    /// Host event linked to this control, if the user assigned one
    pub fn linked_event(&self, bindings: &dyn EventBindings) -> Option<EventId> {
        bindings.find_event_id(self.remote_control_id())
    }
}

impl std::fmt::Debug for Control {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Control")
            .field("identity", &self.identity)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("policy", &self.policy)
            .field("feedback", &self.feedback)
            .field("attributes", &self.attributes)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}
