//! MIDI port connections
//!
//! Connects the configured input and output ports by name pattern. Incoming
//! bytes are parsed into [`MidiEvent`]s and pushed onto a channel; outgoing
//! feedback words are unpacked and written to the output connection.

use anyhow::{anyhow, bail, Context, Result};
use midir::{MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use crate::feedback::FeedbackSink;
use crate::midi::{format_hex, unpack, MidiEvent};

const CLIENT_NAME: &str = "CC-Controls";

/// Case-insensitive substring match against port names
fn find_port<P>(
    ports: Vec<P>,
    name_of: impl Fn(&P) -> Option<String>,
    pattern: &str,
) -> Option<(P, String)> {
    let pattern = pattern.to_lowercase();
    ports.into_iter().find_map(|port| {
        let name = name_of(&port)?;
        if name.to_lowercase().contains(&pattern) {
            debug!("Found port '{}' matching pattern '{}'", name, pattern);
            Some((port, name))
        } else {
            None
        }
    })
}

/// Feedback sink writing to one output connection
///
/// The connection serves a single logical port; writes for other ports fail.
pub struct MidiOutputSink {
    port: u8,
    conn: Mutex<MidiOutputConnection>,
}

impl MidiOutputSink {
    /// Connect to the first output port whose name contains `pattern`
    pub fn connect(pattern: &str, port: u8) -> Result<Self> {
        let midi_out = MidiOutput::new(CLIENT_NAME).context("Failed to create MIDI output")?;

        let (out_port, port_name) =
            find_port(midi_out.ports(), |p| midi_out.port_name(p).ok(), pattern)
                .ok_or_else(|| anyhow!("Output port '{}' not found", pattern))?;

        info!("Connecting to output port: {}", port_name);

        let conn = midi_out
            .connect(&out_port, CLIENT_NAME)
            .map_err(|e| anyhow!("Failed to connect to output port: {}", e))?;

        Ok(Self {
            port,
            conn: Mutex::new(conn),
        })
    }
}

impl FeedbackSink for MidiOutputSink {
    fn send(&self, port: u8, message: u32) -> Result<()> {
        if port != self.port {
            bail!("No output connection for port {}", port);
        }

        let bytes = unpack(message);
        trace!("→ port {}: {}", port, format_hex(&bytes));
        self.conn
            .lock()
            .send(&bytes)
            .context("Failed to send MIDI message")
    }
}

/// Connect to the first input port whose name contains `pattern`
///
/// Parsed channel messages are forwarded to `event_tx`; the connection stays
/// open until the returned handle is dropped.
pub fn connect_input(
    pattern: &str,
    event_tx: mpsc::Sender<MidiEvent>,
) -> Result<MidiInputConnection<()>> {
    let midi_in = MidiInput::new(CLIENT_NAME).context("Failed to create MIDI input")?;

    let (in_port, port_name) = find_port(midi_in.ports(), |p| midi_in.port_name(p).ok(), pattern)
        .ok_or_else(|| anyhow!("Input port '{}' not found", pattern))?;

    info!("Connecting to input port: {}", port_name);

    midi_in
        .connect(
            &in_port,
            CLIENT_NAME,
            move |_timestamp, data, _| match MidiEvent::from_raw(data) {
                Some(event) => {
                    // Don't block the MIDI thread
                    let _ = event_tx.try_send(event);
                }
                None => trace!("Ignoring MIDI: {}", format_hex(data)),
            },
            (),
        )
        .map_err(|e| anyhow!("Failed to connect to input port: {}", e))
}
