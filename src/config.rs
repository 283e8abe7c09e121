// Timeouts, ports, serial link and loop configuration
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::base::kobuki::DEFAULT_BAUDRATE;
use crate::messages::CommandMode;

// Control loop frequency
pub const DEFAULT_TICK_HZ: f64 = 20.0;

// Loop frequency bounds; the serial write has to fit inside a tick
pub const MIN_TICK_HZ: f64 = 0.1;
pub const MAX_TICK_HZ: f64 = 1000.0;

// Command timeout for watchdog
pub const DEFAULT_CMD_TIMEOUT: Duration = Duration::from_millis(500);
pub const MAX_CMD_TIMEOUT_S: f64 = 60.0;

// UDP listener for teleop commands
pub const DEFAULT_UDP_PORT: u16 = 5005;
pub const DEFAULT_BIND_ADDR: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_UDP_PORT);

// Serial port for the Kobuki base
pub const DEFAULT_SERIAL_PORT: &str = "/dev/ttyUSB1";

// Zero-velocity frames sent on shutdown before releasing the link
pub const DEFAULT_STOP_FRAMES: u32 = 10;

// Delay after opening the link and after switching motor power
pub const DEFAULT_SETTLE_MS: u64 = 100;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Built-in deployment variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Profile {
    /// Both axes, motor power switched on at startup and off at shutdown
    Teleop,
    /// Linear velocity only, motor power left alone
    LinearDebug,
}

/// Everything the control loop needs to know about its deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    pub serial_port: String,
    pub baudrate: u32,
    pub bind_addr: SocketAddr,
    pub supports_angular: bool,
    pub manage_motor_power: bool,
    pub tick_hz: f64,
    pub timeout_s: f64,
    pub stop_frames: u32,
    pub settle_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::teleop()
    }
}

impl BridgeConfig {
    pub fn teleop() -> Self {
        Self {
            serial_port: DEFAULT_SERIAL_PORT.to_string(),
            baudrate: DEFAULT_BAUDRATE,
            bind_addr: DEFAULT_BIND_ADDR,
            supports_angular: true,
            manage_motor_power: true,
            tick_hz: DEFAULT_TICK_HZ,
            timeout_s: DEFAULT_CMD_TIMEOUT.as_secs_f64(),
            stop_frames: DEFAULT_STOP_FRAMES,
            settle_ms: DEFAULT_SETTLE_MS,
        }
    }

    pub fn linear_debug() -> Self {
        Self {
            supports_angular: false,
            manage_motor_power: false,
            ..Self::teleop()
        }
    }

    pub fn for_profile(profile: Profile) -> Self {
        match profile {
            Profile::Teleop => Self::teleop(),
            Profile::LinearDebug => Self::linear_debug(),
        }
    }

    /// Overlay a JSON object on top of this config; keys absent from the JSON keep their value
    pub fn merge_json(&self, json: &str) -> Result<Self, ConfigError> {
        let overlay: serde_json::Value = serde_json::from_str(json)?;
        let serde_json::Value::Object(overlay) = overlay else {
            return Err(ConfigError::Invalid(
                "config root must be a JSON object".to_string(),
            ));
        };

        let mut merged = serde_json::to_value(self)?;
        if let serde_json::Value::Object(base) = &mut merged {
            base.extend(overlay);
        }
        Ok(serde_json::from_value(merged)?)
    }

    /// Overlay a JSON config file on top of this config
    pub fn merge_json_file(&self, path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        self.merge_json(&json)
    }

    /// Reject values the loop can't run with. `tick_period` and `timeout`
    /// are only meaningful on a config that passed this check.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.tick_hz >= MIN_TICK_HZ && self.tick_hz <= MAX_TICK_HZ) {
            return Err(ConfigError::Invalid(format!(
                "tick_hz must be in [{}, {}], got {}",
                MIN_TICK_HZ, MAX_TICK_HZ, self.tick_hz
            )));
        }
        if !(self.timeout_s > 0.0 && self.timeout_s <= MAX_CMD_TIMEOUT_S) {
            return Err(ConfigError::Invalid(format!(
                "timeout_s must be in (0, {}], got {}",
                MAX_CMD_TIMEOUT_S, self.timeout_s
            )));
        }
        if self.serial_port.is_empty() {
            return Err(ConfigError::Invalid("serial_port is empty".to_string()));
        }
        Ok(())
    }

    pub fn command_mode(&self) -> CommandMode {
        CommandMode::from_supports_angular(self.supports_angular)
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_hz)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_s)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiles() {
        let teleop = BridgeConfig::teleop();
        assert!(teleop.supports_angular);
        assert!(teleop.manage_motor_power);
        assert_eq!(teleop.bind_addr.port(), 5005);
        assert_eq!(teleop.baudrate, 115_200);
        assert_eq!(teleop.timeout(), Duration::from_millis(500));
        assert_eq!(teleop.tick_period(), Duration::from_millis(50));

        let debug = BridgeConfig::for_profile(Profile::LinearDebug);
        assert_eq!(debug.command_mode(), CommandMode::LinearOnly);
        assert!(!debug.manage_motor_power);
        assert_eq!(debug.serial_port, teleop.serial_port);
    }

    #[test]
    fn test_merge_json_keeps_unset_fields() {
        let base = BridgeConfig::linear_debug();
        let merged = base
            .merge_json(r#"{ "tick_hz": 30.0, "serial_port": "/dev/kobuki" }"#)
            .unwrap();

        assert_eq!(merged.tick_hz, 30.0);
        assert_eq!(merged.serial_port, "/dev/kobuki");
        assert!(!merged.supports_angular);
        assert_eq!(merged.stop_frames, DEFAULT_STOP_FRAMES);
    }

    #[test]
    fn test_merge_json_rejects_unknown_and_non_object() {
        let base = BridgeConfig::teleop();
        assert!(matches!(
            base.merge_json(r#"{ "tick_rate": 30 }"#),
            Err(ConfigError::Json(_))
        ));
        assert!(matches!(
            base.merge_json("[1, 2]"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_validate() {
        assert!(BridgeConfig::teleop().validate().is_ok());

        let bad_hz = BridgeConfig {
            tick_hz: 0.0,
            ..BridgeConfig::teleop()
        };
        assert!(bad_hz.validate().is_err());

        let bad_timeout = BridgeConfig {
            timeout_s: f64::NAN,
            ..BridgeConfig::teleop()
        };
        assert!(bad_timeout.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unrepresentable_durations() {
        // Both would overflow Duration if they got through
        let slow = BridgeConfig {
            tick_hz: 1e-300,
            ..BridgeConfig::teleop()
        };
        assert!(slow.validate().is_err());

        let forever = BridgeConfig {
            timeout_s: 1e20,
            ..BridgeConfig::teleop()
        };
        assert!(forever.validate().is_err());

        for tick_hz in [f64::INFINITY, f64::NAN, -20.0, MAX_TICK_HZ + 1.0] {
            let cfg = BridgeConfig {
                tick_hz,
                ..BridgeConfig::teleop()
            };
            assert!(cfg.validate().is_err(), "tick_hz={}", tick_hz);
        }
    }

    #[test]
    fn test_validated_bounds_convert() {
        let edge = BridgeConfig {
            tick_hz: MIN_TICK_HZ,
            timeout_s: MAX_CMD_TIMEOUT_S,
            ..BridgeConfig::teleop()
        };
        assert!(edge.validate().is_ok());
        assert_eq!(edge.tick_period(), Duration::from_secs(10));
        assert_eq!(edge.timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_bind_addr_from_json() {
        let cfg = BridgeConfig::teleop()
            .merge_json(r#"{ "bind_addr": "127.0.0.1:6000" }"#)
            .unwrap();
        assert_eq!(cfg.bind_addr, "127.0.0.1:6000".parse().unwrap());
    }
}
