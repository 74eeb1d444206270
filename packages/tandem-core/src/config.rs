//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{TandemError, TandemResult};
use crate::protocol::DeviceType;
use crate::protocol_constants::{
    EVENT_CHANNEL_CAPACITY, HEARTBEAT_INTERVAL_MS, HELLO_RETRY_INTERVAL_MS,
    INTERPOLATION_TICK_MS, RECONNECT_DELAY_MS, TRANSFER_TIMEOUT_MS,
};

/// Configuration for one device's session engine.
///
/// All fields have sensible defaults.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Human-readable name announced in `hello`.
    pub device_name: String,

    /// Device class announced in `hello`.
    pub device_type: DeviceType,

    /// Announce the class as `web`/`android` for relays that reject
    /// `desktop`/`mobile`/`embedded`.
    pub legacy_device_types: bool,

    /// Heartbeat broadcast interval while this device is the output (ms).
    pub heartbeat_interval_ms: u64,

    /// Local timeout for an unresolved transfer handshake (ms).
    pub transfer_timeout_ms: u64,

    /// Interval between `hello` resends until `welcome` arrives (ms).
    pub hello_retry_interval_ms: u64,

    /// Interpolation tick while mirroring a remote output device (ms).
    pub interpolation_tick_ms: u64,

    /// Delay before reconnecting to the relay (ms).
    pub reconnect_delay_ms: u64,

    /// Capacity of the event broadcast channel.
    pub event_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            device_name: "Tandem device".to_string(),
            device_type: DeviceType::Desktop,
            legacy_device_types: false,
            heartbeat_interval_ms: HEARTBEAT_INTERVAL_MS,
            transfer_timeout_ms: TRANSFER_TIMEOUT_MS,
            hello_retry_interval_ms: HELLO_RETRY_INTERVAL_MS,
            interpolation_tick_ms: INTERPOLATION_TICK_MS,
            reconnect_delay_ms: RECONNECT_DELAY_MS,
            event_channel_capacity: EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`TandemError::Configuration`] for values that would stall
    /// timers or panic channel construction.
    pub fn validate(&self) -> TandemResult<()> {
        if self.device_name.trim().is_empty() {
            return Err(TandemError::Configuration(
                "device_name must not be empty".to_string(),
            ));
        }
        let intervals = [
            ("heartbeat_interval_ms", self.heartbeat_interval_ms),
            ("transfer_timeout_ms", self.transfer_timeout_ms),
            ("hello_retry_interval_ms", self.hello_retry_interval_ms),
            ("interpolation_tick_ms", self.interpolation_tick_ms),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(TandemError::Configuration(format!("{name} must be >= 1")));
            }
        }
        if self.event_channel_capacity == 0 {
            return Err(TandemError::Configuration(
                "event_channel_capacity must be >= 1 (broadcast::channel panics on 0)"
                    .to_string(),
            ));
        }
        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_millis(self.transfer_timeout_ms)
    }

    pub fn hello_retry_interval(&self) -> Duration {
        Duration::from_millis(self.hello_retry_interval_ms)
    }

    pub fn interpolation_tick(&self) -> Duration {
        Duration::from_millis(self.interpolation_tick_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(5));
        assert_eq!(config.transfer_timeout_ms, 10_000);
    }

    #[test]
    fn zero_heartbeat_is_rejected() {
        let config = EngineConfig {
            heartbeat_interval_ms: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("heartbeat_interval_ms"));
    }

    #[test]
    fn blank_device_name_is_rejected() {
        let config = EngineConfig {
            device_name: "   ".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_config_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"device_name":"Kitchen","device_type":"embedded"}"#)
                .unwrap();
        assert_eq!(config.device_name, "Kitchen");
        assert_eq!(config.device_type, DeviceType::Embedded);
        assert_eq!(config.heartbeat_interval_ms, HEARTBEAT_INTERVAL_MS);
    }
}
