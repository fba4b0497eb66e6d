//! Configuration for controls and the runtime
//!
//! Handles loading and parsing of the YAML configuration file.

use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::bindings::{BindingTable, EventId};
use crate::dispatcher::DispatchPolicy;
use crate::identity::ControlIdentity;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub midi: MidiConfig,
    /// Period of the idle tick that flushes throttled feedback
    #[serde(default = "default_idle_interval_ms")]
    pub idle_interval_ms: u64,
    #[serde(default)]
    pub on_callback_error: DispatchPolicy,
    #[serde(default)]
    pub controls: Vec<ControlConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bindings: Vec<BindingConfig>,
}

/// MIDI port configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MidiConfig {
    /// Input port name pattern (case-insensitive substring)
    pub input_port: String,
    /// Output port name pattern (case-insensitive substring)
    pub output_port: String,
    /// Port number given to controls that do not name one
    #[serde(default)]
    pub default_port: u8,
}

/// Kind of control
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlKind {
    #[default]
    Plain,
    /// Momentary button with double-click detection
    Button,
}

/// Construction options for a single control
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ControlConfig {
    pub channel: u8,
    pub cc_number: u8,
    /// Falls back to the runtime's default port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u8>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub kind: ControlKind,
    /// Delay feedback until the next idle tick
    #[serde(default)]
    pub throttling: bool,
    /// Skip feedback equal to the last value sent
    #[serde(default)]
    pub lazy_feedback: bool,
    #[serde(default)]
    pub verbose: bool,
    /// Double-click window in seconds (buttons only)
    #[serde(default = "default_double_timeout")]
    pub double_timeout: f64,
    /// Free-form data for the application, looked up by key
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, serde_json::Value>,
}

impl ControlConfig {
    /// Plain control on `channel`/`cc_number` with every option at its default
    pub fn new(channel: u8, cc_number: u8) -> Self {
        Self {
            channel,
            cc_number,
            port: None,
            name: String::new(),
            kind: ControlKind::Plain,
            throttling: false,
            lazy_feedback: false,
            verbose: false,
            double_timeout: default_double_timeout(),
            attributes: HashMap::new(),
        }
    }

    pub fn button(channel: u8, cc_number: u8) -> Self {
        Self {
            kind: ControlKind::Button,
            ..Self::new(channel, cc_number)
        }
    }
}

/// Assignment of a host event to a control address
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BindingConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u8>,
    pub channel: u8,
    pub cc_number: u8,
    pub event: EventId,
}

impl AppConfig {
    /// Load configuration from file
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        Self::from_yaml(&contents).with_context(|| format!("Failed to parse YAML config: {}", path))
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: AppConfig = serde_yaml::from_str(contents)?;
        Ok(config)
    }

    /// Build the binding table, resolving missing ports to the default port
    pub fn binding_table(&self) -> Result<BindingTable> {
        let mut table = BindingTable::new();
        for binding in &self.bindings {
            let port = binding.port.unwrap_or(self.midi.default_port);
            let identity = ControlIdentity::new(port, binding.channel, binding.cc_number)
                .with_context(|| format!("Invalid binding for event {}", binding.event))?;
            table.bind(&identity, binding.event);
        }
        Ok(table)
    }

    /// Check that every control resolves to the default port
    ///
    /// The runtime opens one input and one output connection, both serving
    /// `midi.default_port`; a control on any other port would never receive
    /// events and its feedback writes would fail.
    pub fn check_ports(&self) -> Result<()> {
        let default_port = self.midi.default_port;
        let stray: Vec<String> = self
            .controls
            .iter()
            .filter_map(|c| match c.port {
                Some(port) if port != default_port => {
                    Some(format!("ch:{} cc:{} port:{}", c.channel, c.cc_number, port))
                }
                _ => None,
            })
            .collect();

        if !stray.is_empty() {
            bail!(
                "Controls not on the connected port {}: {}",
                default_port,
                stray.join(", ")
            );
        }
        Ok(())
    }
}

// Default value functions
fn default_idle_interval_ms() -> u64 { 20 }
fn default_double_timeout() -> f64 { 0.3 }

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::EventBindings;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
midi:
  input_port: "nanoKONTROL"
  output_port: "nanoKONTROL"
  default_port: 2

on_callback_error: halt

controls:
  - channel: 0
    cc_number: 7
    name: Volume
    throttling: true
  - channel: 0
    cc_number: 41
    kind: button
    port: 5
    attributes:
      led: true

bindings:
  - channel: 0
    cc_number: 7
    event: 4096
"#;

    #[test]
    fn test_parse_with_defaults() {
        let config = AppConfig::from_yaml(SAMPLE).unwrap();

        assert_eq!(config.midi.default_port, 2);
        assert_eq!(config.idle_interval_ms, 20);
        assert_eq!(config.on_callback_error, DispatchPolicy::Halt);
        assert_eq!(config.controls.len(), 2);

        let volume = &config.controls[0];
        assert_eq!(volume.kind, ControlKind::Plain);
        assert!(volume.throttling);
        assert!(!volume.lazy_feedback);
        assert_eq!(volume.port, None);

        let button = &config.controls[1];
        assert_eq!(button.kind, ControlKind::Button);
        assert_eq!(button.double_timeout, 0.3);
        assert_eq!(button.port, Some(5));
        assert_eq!(button.attributes["led"], serde_json::json!(true));
    }

    #[test]
    fn test_binding_table_uses_default_port() {
        let config = AppConfig::from_yaml(SAMPLE).unwrap();
        let table = config.binding_table().unwrap();

        let on_default = ControlIdentity::new(2, 0, 7).unwrap();
        let on_zero = ControlIdentity::new(0, 0, 7).unwrap();
        assert_eq!(table.find_event_id(on_default.encode()), Some(4096));
        assert_eq!(table.find_event_id(on_zero.encode()), None);
    }

    #[test]
    fn test_binding_table_rejects_bad_channel() {
        let mut config = AppConfig::from_yaml(SAMPLE).unwrap();
        config.bindings[0].channel = 16;
        assert!(config.binding_table().is_err());
    }

    #[test]
    fn test_check_ports_rejects_control_off_default_port() {
        let config = AppConfig::from_yaml(SAMPLE).unwrap();
        let err = config.check_ports().unwrap_err();
        assert!(err.to_string().contains("ch:0 cc:41 port:5"));
    }

    #[test]
    fn test_check_ports_accepts_default_and_explicit_default() {
        let mut config = AppConfig::from_yaml(SAMPLE).unwrap();
        config.controls[1].port = None;
        assert!(config.check_ports().is_ok());

        config.controls[1].port = Some(2);
        assert!(config.check_ports().is_ok());
    }

    #[tokio::test]
    async fn test_load_from_file() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("controls.yaml");
        std::fs::write(&path, SAMPLE)?;

        let config = AppConfig::load(&path.to_string_lossy()).await?;
        assert_eq!(config.midi.input_port, "nanoKONTROL");
        Ok(())
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let err = AppConfig::load("/nonexistent/controls.yaml").await.unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
