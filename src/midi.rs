//! MIDI event type and wire helpers
//!
//! Incoming messages are kept as raw status/data triples because control
//! matching works at the byte level. Outgoing feedback is packed into a single
//! word: status in the low byte, CC number in the next, value in the third.

use std::fmt;

/// Status high nibble of a Control Change message
pub const CONTROL_CHANGE: u8 = 0xB0;

/// Raw three-byte channel message as delivered by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MidiEvent {
    pub status: u8,
    pub data1: u8,
    pub data2: u8,
}

impl MidiEvent {
    pub fn new(status: u8, data1: u8, data2: u8) -> Self {
        Self {
            status,
            data1,
            data2,
        }
    }

    /// Build a Control Change event: channel (0-15), cc (0-127), value (0-127)
    pub fn control_change(channel: u8, cc: u8, value: u8) -> Self {
        Self::new(CONTROL_CHANGE | (channel & 0x0F), cc & 0x7F, value & 0x7F)
    }

    /// Parse a channel message from raw bytes
    ///
    /// System messages and running status are not handled and yield `None`.
    /// Two-byte messages (Program Change, Channel Pressure) get `data2 = 0`.
    pub fn from_raw(data: &[u8]) -> Option<Self> {
        let status = *data.first()?;

        // Running status (data byte first) would need per-port state
        if status < 0x80 || status >= 0xF0 {
            return None;
        }

        let data1 = data.get(1)? & 0x7F;
        let data2 = match status & 0xF0 {
            0xC0 | 0xD0 => 0,
            _ => data.get(2)? & 0x7F,
        };

        Some(Self::new(status, data1, data2))
    }

    /// High nibble of the status byte
    pub fn kind(&self) -> u8 {
        self.status & 0xF0
    }

    /// Low nibble of the status byte (0-15)
    pub fn channel(&self) -> u8 {
        self.status & 0x0F
    }

    pub fn is_control_change(&self) -> bool {
        self.kind() == CONTROL_CHANGE
    }

    /// Controller value carried by the second data byte
    pub fn control_value(&self) -> u8 {
        self.data2
    }

    pub fn to_bytes(&self) -> [u8; 3] {
        [self.status, self.data1, self.data2]
    }
}

impl fmt::Display for MidiEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_control_change() {
            write!(
                f,
                "CC ch:{} cc:{} v:{}",
                self.channel() + 1,
                self.data1,
                self.data2
            )
        } else {
            write!(f, "MIDI {}", format_hex(&self.to_bytes()))
        }
    }
}

/// Pack a Control Change into the single-word layout used for feedback writes
pub fn pack_cc(channel: u8, cc: u8, value: u8) -> u32 {
    (CONTROL_CHANGE as u32 + (channel & 0x0F) as u32)
        + (((cc & 0x7F) as u32) << 8)
        + (((value & 0x7F) as u32) << 16)
}

/// Split a packed word back into its three message bytes
pub fn unpack(word: u32) -> [u8; 3] {
    [
        (word & 0xFF) as u8,
        ((word >> 8) & 0xFF) as u8,
        ((word >> 16) & 0xFF) as u8,
    ]
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_change_parsing() {
        let event = MidiEvent::from_raw(&[0xB2, 7, 100]).unwrap();

        assert_eq!(event, MidiEvent::new(0xB2, 7, 100));
        assert!(event.is_control_change());
        assert_eq!(event.channel(), 2);
        assert_eq!(event.control_value(), 100);
    }

    #[test]
    fn test_note_on_is_not_control_change() {
        let event = MidiEvent::from_raw(&[0x90, 60, 100]).unwrap();
        assert!(!event.is_control_change());
        assert_eq!(event.kind(), 0x90);
    }

    #[test]
    fn test_program_change_has_no_second_data_byte() {
        let event = MidiEvent::from_raw(&[0xC3, 5]).unwrap();
        assert_eq!(event, MidiEvent::new(0xC3, 5, 0));
    }

    #[test]
    fn test_rejects_system_and_truncated_messages() {
        assert_eq!(MidiEvent::from_raw(&[]), None);
        assert_eq!(MidiEvent::from_raw(&[0xF8]), None);
        assert_eq!(MidiEvent::from_raw(&[0x40, 0x10]), None);
        assert_eq!(MidiEvent::from_raw(&[0xB0, 7]), None);
    }

    #[test]
    fn test_data_bytes_are_masked() {
        let event = MidiEvent::from_raw(&[0xB0, 0x87, 0xFF]).unwrap();
        assert_eq!(event.data1, 0x07);
        assert_eq!(event.data2, 0x7F);
    }

    #[test]
    fn test_pack_layout() {
        // ch 3, cc 0x10, value 0x40
        let word = pack_cc(3, 0x10, 0x40);
        assert_eq!(word, 0x0040_10B3);
        assert_eq!(unpack(word), [0xB3, 0x10, 0x40]);
    }

    #[test]
    fn test_display() {
        assert_eq!(MidiEvent::control_change(0, 7, 100).to_string(), "CC ch:1 cc:7 v:100");
        assert_eq!(MidiEvent::new(0x90, 60, 1).to_string(), "MIDI 90 3C 01");
    }
}
