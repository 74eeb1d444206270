//! Device configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tandem_core::{DeviceType, EngineConfig, TrackRef};

/// One catalog entry in the `tracks:` list.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackEntry {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: String,
    /// Seconds.
    pub duration: f64,
}

impl TrackEntry {
    pub fn to_track_ref(&self) -> TrackRef {
        TrackRef {
            title: self.title.clone(),
            artist_name: self.artist.clone(),
            duration: self.duration,
            ..TrackRef::unresolved(self.id.clone())
        }
    }
}

/// Device configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Relay WebSocket endpoint.
    /// Override: `TANDEM_RELAY_URL`
    pub relay_url: String,

    /// Name shown to other devices. Defaults to the host name.
    /// Override: `TANDEM_DEVICE_NAME`
    pub device_name: Option<String>,

    /// Override: `TANDEM_DEVICE_TYPE`
    pub device_type: DeviceType,

    /// Announce `web`/`android` in `hello` for relays that predate the
    /// current device classes.
    /// Override: `TANDEM_LEGACY_DEVICE_TYPES`
    pub legacy_device_types: bool,

    /// Override: `TANDEM_HEARTBEAT_INTERVAL_MS`
    pub heartbeat_interval_ms: Option<u64>,

    pub transfer_timeout_ms: Option<u64>,

    /// Static track catalog for the simulated output.
    pub tracks: Vec<TrackEntry>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            relay_url: "ws://localhost:3001/v1/ws".to_string(),
            device_name: None,
            device_type: DeviceType::Desktop,
            legacy_device_types: false,
            heartbeat_interval_ms: None,
            transfer_timeout_ms: None,
            tracks: Vec::new(),
        }
    }
}

impl DeviceConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("TANDEM_RELAY_URL") {
            if !val.trim().is_empty() {
                self.relay_url = val;
            }
        }

        if let Ok(val) = std::env::var("TANDEM_DEVICE_NAME") {
            if !val.trim().is_empty() {
                self.device_name = Some(val);
            }
        }

        if let Ok(val) = std::env::var("TANDEM_DEVICE_TYPE") {
            match val.parse() {
                Ok(device_type) => self.device_type = device_type,
                Err(e) => log::warn!("Ignoring TANDEM_DEVICE_TYPE: {}", e),
            }
        }

        if let Ok(val) = std::env::var("TANDEM_LEGACY_DEVICE_TYPES") {
            self.legacy_device_types = matches!(val.trim(), "1" | "true" | "yes");
        }

        if let Ok(val) = std::env::var("TANDEM_HEARTBEAT_INTERVAL_MS") {
            if let Ok(interval) = val.parse() {
                self.heartbeat_interval_ms = Some(interval);
            }
        }
    }

    /// Configured device name, or the host name.
    pub fn resolved_device_name(&self) -> String {
        self.device_name.clone().unwrap_or_else(|| {
            hostname::get()
                .ok()
                .and_then(|name| name.into_string().ok())
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| "Tandem device".to_string())
        })
    }

    /// Converts to tandem-core's EngineConfig type.
    pub fn to_engine_config(&self) -> EngineConfig {
        let defaults = EngineConfig::default();
        EngineConfig {
            device_name: self.resolved_device_name(),
            device_type: self.device_type,
            legacy_device_types: self.legacy_device_types,
            heartbeat_interval_ms: self
                .heartbeat_interval_ms
                .unwrap_or(defaults.heartbeat_interval_ms),
            transfer_timeout_ms: self
                .transfer_timeout_ms
                .unwrap_or(defaults.transfer_timeout_ms),
            ..defaults
        }
    }

    pub fn catalog_tracks(&self) -> Vec<TrackRef> {
        self.tracks.iter().map(TrackEntry::to_track_ref).collect()
    }
}
