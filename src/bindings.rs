//! Lookup of logical targets bound to a control's remote control ID
//!
//! The host assigns event IDs (parameters, mixer slots, ...) to hardware
//! controls. A control can ask which event, if any, is linked to it.

use std::collections::HashMap;

use crate::identity::{ControlIdentity, RemoteControlId};

/// Host-assigned identifier of a bindable target
pub type EventId = u32;

/// Source of control-to-event assignments
pub trait EventBindings {
    fn find_event_id(&self, control_id: RemoteControlId) -> Option<EventId>;
}

/// In-memory binding table
#[derive(Debug, Clone, Default)]
pub struct BindingTable {
    bindings: HashMap<RemoteControlId, EventId>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `identity` to `event`, returning the previous binding
    pub fn bind(&mut self, identity: &ControlIdentity, event: EventId) -> Option<EventId> {
        self.bindings.insert(identity.encode(), event)
    }

    pub fn unbind(&mut self, identity: &ControlIdentity) -> Option<EventId> {
        self.bindings.remove(&identity.encode())
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Identities and events of every binding
    pub fn iter(&self) -> impl Iterator<Item = (ControlIdentity, EventId)> + '_ {
        self.bindings
            .iter()
            .filter_map(|(&id, &event)| {
                ControlIdentity::decode(id).map(|identity| (identity, event))
            })
    }
}

impl EventBindings for BindingTable {
    fn find_event_id(&self, control_id: RemoteControlId) -> Option<EventId> {
        self.bindings.get(&control_id).copied()
    }
}
