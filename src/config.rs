//! Client configuration

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub services: ServicesConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where each entity kind lives inside a node record, and how outbound
/// payloads address it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceIdentifiers {
    /// Service `type` that carries the fragment parameter
    pub service_type: String,
    /// Parameter `type` whose value is the raw fragment array
    pub param_type: String,
    /// Service name used as the payload key
    pub service_name: String,
    /// Parameter name used as the payload key
    pub param_name: String,
}

impl ServiceIdentifiers {
    pub fn new(
        service_type: impl Into<String>,
        param_type: impl Into<String>,
        service_name: impl Into<String>,
        param_name: impl Into<String>,
    ) -> Self {
        Self {
            service_type: service_type.into(),
            param_type: param_type.into(),
            service_name: service_name.into(),
            param_name: param_name.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    #[serde(default = "default_schedule_service")]
    pub schedules: ServiceIdentifiers,

    #[serde(default = "default_scene_service")]
    pub scenes: ServiceIdentifiers,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            schedules: default_schedule_service(),
            scenes: default_scene_service(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Capacity of the store event broadcast channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            event_capacity: default_event_capacity(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// EnvFilter directive, e.g. "shardview=debug"
    #[serde(default)]
    pub filter: Option<String>,
}

// Defaults
fn default_schedule_service() -> ServiceIdentifiers {
    ServiceIdentifiers::new("esp.service.schedule", "esp.param.schedules", "Schedule", "Schedules")
}
fn default_scene_service() -> ServiceIdentifiers {
    ServiceIdentifiers::new("esp.service.scenes", "esp.param.scenes", "Scenes", "Scenes")
}
fn default_event_capacity() -> usize { 256 }

impl Config {
    /// Parse a TOML document; absent sections take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Read and parse a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}
