//! Session configuration
//!
//! Loaded from YAML. Every option has a default, so an empty file is a
//! valid configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::Error;
use crate::platform::name_matches;

/// Options recognized by [`MidiSession`](crate::session::MidiSession)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Client name announced to the host MIDI service
    #[serde(default = "default_client_name")]
    pub client_name: String,

    /// Log every swallowed send failure
    #[serde(default)]
    pub verbose: bool,

    /// Channel used by `send_message` when none is given
    #[serde(default)]
    pub default_channel: u8,

    /// Capacity of the incoming event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Open every matching input during initialization
    #[serde(default)]
    pub auto_open_inputs: bool,

    /// Substring filter for input port names (case-insensitive)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_filter: Option<String>,

    /// Substring filter for output port names (case-insensitive)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_filter: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            client_name: default_client_name(),
            verbose: false,
            default_channel: 0,
            event_buffer: default_event_buffer(),
            auto_open_inputs: false,
            input_filter: None,
            output_filter: None,
        }
    }
}

impl SessionConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: SessionConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path))?;

        config.validate()?;

        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, path: &str) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path))?;

        Ok(())
    }

    pub fn validate(&self) -> std::result::Result<(), Error> {
        if self.client_name.trim().is_empty() {
            return Err(Error::Config("client_name cannot be empty".to_string()));
        }
        if self.default_channel > 15 {
            return Err(Error::Config(format!(
                "default_channel must be 0-15, got {}",
                self.default_channel
            )));
        }
        if self.event_buffer == 0 {
            return Err(Error::Config("event_buffer must be greater than 0".to_string()));
        }
        Ok(())
    }

    pub fn accepts_input(&self, name: &str) -> bool {
        name_matches(name, self.input_filter.as_deref())
    }

    pub fn accepts_output(&self, name: &str) -> bool {
        name_matches(name, self.output_filter.as_deref())
    }
}

fn default_client_name() -> String { "midi-session".to_string() }
fn default_event_buffer() -> usize { 1000 }

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_from_empty_yaml() {
        let config: SessionConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.client_name, "midi-session");
        assert_eq!(config.event_buffer, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = SessionConfig {
            default_channel: 16,
            ..SessionConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = SessionConfig {
            event_buffer: 0,
            ..SessionConfig::default()
        };
        assert!(config.validate().is_err());

        let config = SessionConfig {
            client_name: "  ".to_string(),
            ..SessionConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_filters() {
        let config = SessionConfig {
            input_filter: Some("launch".to_string()),
            ..SessionConfig::default()
        };
        assert!(config.accepts_input("Launchpad Mini"));
        assert!(!config.accepts_input("X-Touch"));
        assert!(config.accepts_output("anything"));
    }

    #[tokio::test]
    async fn test_load_and_save() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "client_name: studio\nverbose: true\ndefault_channel: 9\noutput_filter: synth").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let config = SessionConfig::load(&path).await.unwrap();
        assert_eq!(config.client_name, "studio");
        assert!(config.verbose);
        assert_eq!(config.default_channel, 9);
        assert_eq!(config.output_filter.as_deref(), Some("synth"));

        let out = tempfile::NamedTempFile::new().unwrap();
        let out_path = out.path().to_str().unwrap().to_string();
        config.save(&out_path).await.unwrap();
        assert_eq!(SessionConfig::load(&out_path).await.unwrap(), config);
    }

    #[tokio::test]
    async fn test_load_rejects_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "default_channel: 20").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        assert!(SessionConfig::load(&path).await.is_err());
        assert!(SessionConfig::load("/nonexistent/session.yaml").await.is_err());
    }
}
