//! Control identity and byte-level matching
//!
//! A control is addressed by (port, channel, CC number). The port only takes
//! part in the remote control ID; incoming events are matched on channel and
//! CC number alone because routing already filtered them by port.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ControlError, Result};
use crate::midi::{pack_cc, MidiEvent, CONTROL_CHANGE};

/// Integer key combining port, channel and CC number
pub type RemoteControlId = u32;

const CHANNEL_SHIFT: u32 = 16;
const PORT_SHIFT: u32 = 22;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawIdentity")]
pub struct ControlIdentity {
    port: u8,
    channel: u8,
    cc_number: u8,
}

#[derive(Deserialize)]
struct RawIdentity {
    port: u8,
    channel: u8,
    cc_number: u8,
}

impl TryFrom<RawIdentity> for ControlIdentity {
    type Error = ControlError;

    fn try_from(raw: RawIdentity) -> Result<Self> {
        Self::new(raw.port, raw.channel, raw.cc_number)
    }
}

impl ControlIdentity {
    /// Validate and build an identity: channel 0-15, CC number 0-127
    pub fn new(port: u8, channel: u8, cc_number: u8) -> Result<Self> {
        if channel > 0x0F {
            return Err(ControlError::InvalidChannel(channel));
        }
        if cc_number > 0x7F {
            return Err(ControlError::InvalidCcNumber(cc_number));
        }
        Ok(Self {
            port,
            channel,
            cc_number,
        })
    }

    pub fn port(&self) -> u8 {
        self.port
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn cc_number(&self) -> u8 {
        self.cc_number
    }

    /// True if the event is a Control Change on this channel and CC number
    pub fn matches(&self, event: &MidiEvent) -> bool {
        event.kind() == CONTROL_CHANGE
            && event.channel() == self.channel
            && event.data1 == self.cc_number
    }

    /// Encode as remote control ID: `cc + (channel << 16) + ((port + 1) << 22)`
    pub fn encode(&self) -> RemoteControlId {
        self.cc_number as u32
            + ((self.channel as u32) << CHANNEL_SHIFT)
            + ((self.port as u32 + 1) << PORT_SHIFT)
    }

    /// Reverse of [`encode`](Self::encode)
    ///
    /// Returns `None` for IDs that no valid identity encodes to.
    pub fn decode(id: RemoteControlId) -> Option<Self> {
        let cc_number = (id & 0xFFFF) as u8;
        let channel = ((id >> CHANNEL_SHIFT) & 0x3F) as u8;
        let port_plus_one = id >> PORT_SHIFT;
        if port_plus_one == 0 || port_plus_one > u8::MAX as u32 + 1 {
            return None;
        }
        let identity = Self::new((port_plus_one - 1) as u8, channel, cc_number).ok()?;
        (identity.encode() == id).then_some(identity)
    }

    /// Packed feedback word for `value` on this control
    pub fn feedback_word(&self, value: u8) -> u32 {
        pack_cc(self.channel, self.cc_number, value)
    }
}

impl fmt::Display for ControlIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "port:{} ch:{} cc:{}",
            self.port,
            self.channel + 1,
            self.cc_number
        )
    }
}

/// Free-function form of [`ControlIdentity::matches`]
pub fn matches(event: &MidiEvent, identity: &ControlIdentity) -> bool {
    identity.matches(event)
}
