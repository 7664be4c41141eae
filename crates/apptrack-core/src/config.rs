use crate::error::RegistryError;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main registry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[builder(setter(into, strip_option))]
#[serde(rename_all = "camelCase")]
pub struct RegistryConfig {
    /// Origin tag the registry uses to recognize its own change notifications
    #[builder(default = "default_origin()")]
    #[serde(default = "default_origin")]
    pub origin: String,

    /// How often platform sources poll the process table (in milliseconds)
    #[builder(default = "default_poll_interval_ms()")]
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Capacity of the command channel feeding the registry service
    #[builder(default = "default_command_capacity()")]
    #[serde(default = "default_command_capacity")]
    pub command_capacity: usize,

    /// Overrides the store's `showAllProcesses` flag at start
    #[builder(default)]
    #[serde(default)]
    pub show_all: Option<bool>,

    /// Extra directories scanned for desktop entries, searched before the XDG defaults
    #[builder(default)]
    #[builder(setter(custom))]
    #[serde(default)]
    pub desktop_entry_dirs: Vec<PathBuf>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            poll_interval_ms: default_poll_interval_ms(),
            command_capacity: default_command_capacity(),
            show_all: None,
            desktop_entry_dirs: Vec::new(),
        }
    }
}

impl RegistryConfig {
    pub fn builder() -> RegistryConfigBuilder {
        RegistryConfigBuilder::default()
    }

    /// Validate the configuration and return errors if invalid
    pub fn validate(&self) -> Result<(), RegistryError> {
        if self.origin.trim().is_empty() {
            return Err(RegistryError::ConfigurationError(
                "origin must not be empty".to_string(),
            ));
        }

        if !(50..=60_000).contains(&self.poll_interval_ms) {
            return Err(RegistryError::ConfigurationError(format!(
                "poll_interval_ms must be between 50 and 60000, got {}",
                self.poll_interval_ms
            )));
        }

        if self.command_capacity == 0 {
            return Err(RegistryError::ConfigurationError(
                "command_capacity must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the poll interval as Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl RegistryConfigBuilder {
    pub fn desktop_entry_dirs<P: Into<PathBuf>, I: IntoIterator<Item = P>>(
        &mut self,
        iter: I,
    ) -> &mut Self {
        let dirs = self.desktop_entry_dirs.get_or_insert_with(Vec::new);
        dirs.extend(iter.into_iter().map(Into::into));
        self
    }
}

// Default value functions for serde
fn default_origin() -> String {
    "running-apps".to_string()
}
fn default_poll_interval_ms() -> u64 {
    1_000
}
fn default_command_capacity() -> usize {
    32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RegistryConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.origin, "running-apps");
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.show_all, None);
    }

    #[test]
    fn test_builder() {
        let config = RegistryConfig::builder()
            .origin("prefs-window")
            .poll_interval_ms(250u64)
            .show_all(true)
            .desktop_entry_dirs(["/opt/apps", "/srv/apps"])
            .build()
            .unwrap();

        assert_eq!(config.origin, "prefs-window");
        assert_eq!(config.poll_interval_ms, 250);
        assert_eq!(config.command_capacity, 32);
        assert_eq!(config.show_all, Some(true));
        assert_eq!(
            config.desktop_entry_dirs,
            vec![PathBuf::from("/opt/apps"), PathBuf::from("/srv/apps")]
        );
    }

    #[test]
    fn test_invalid_config() {
        let mut config = RegistryConfig {
            poll_interval_ms: 10,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.poll_interval_ms = 500;
        config.command_capacity = 0;
        assert!(config.validate().is_err());

        config.command_capacity = 8;
        config.origin = "  ".to_string();
        assert!(matches!(
            config.validate(),
            Err(RegistryError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: RegistryConfig =
            serde_json::from_str(r#"{"pollIntervalMs": 2000, "showAll": false}"#).unwrap();
        assert_eq!(config.poll_interval_ms, 2000);
        assert_eq!(config.show_all, Some(false));
        assert_eq!(config.origin, "running-apps");
        assert!(config.desktop_entry_dirs.is_empty());
    }
}
