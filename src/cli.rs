//! Command-line arguments for the bridge binary.
//!
//! Precedence, lowest to highest: `--profile`, `--config` JSON file, then
//! individual flags.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use crate::config::{BridgeConfig, ConfigError, Profile};

#[derive(Debug, Parser)]
#[command(
    name = "kobuki-bridge",
    version,
    about = "UDP teleop to Kobuki serial bridge with a command watchdog"
)]
pub struct Cli {
    /// Deployment profile to start from
    #[arg(long, value_enum, default_value_t = Profile::Teleop)]
    pub profile: Profile,

    /// JSON file whose keys override the profile
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Serial device of the base
    #[arg(long)]
    pub port: Option<String>,

    /// Serial baud rate
    #[arg(long)]
    pub baud: Option<u32>,

    /// UDP address to listen on for commands
    #[arg(long)]
    pub bind: Option<SocketAddr>,

    /// Control loop rate in Hz
    #[arg(long)]
    pub tick_hz: Option<f64>,

    /// Watchdog timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<f64>,

    /// Zero-velocity frames sent on shutdown
    #[arg(long)]
    pub stop_frames: Option<u32>,

    /// Accept linear velocity only; angular is discarded
    #[arg(long)]
    pub linear_only: bool,

    /// Never send Motor-Power packets
    #[arg(long)]
    pub no_motor_power: bool,
}

impl Cli {
    /// Resolve the final configuration and validate it
    pub fn into_config(self) -> Result<BridgeConfig, ConfigError> {
        let mut config = BridgeConfig::for_profile(self.profile);
        if let Some(path) = &self.config {
            config = config.merge_json_file(path)?;
        }

        if let Some(port) = self.port {
            config.serial_port = port;
        }
        if let Some(baud) = self.baud {
            config.baudrate = baud;
        }
        if let Some(bind) = self.bind {
            config.bind_addr = bind;
        }
        if let Some(tick_hz) = self.tick_hz {
            config.tick_hz = tick_hz;
        }
        if let Some(timeout) = self.timeout {
            config.timeout_s = timeout;
        }
        if let Some(stop_frames) = self.stop_frames {
            config.stop_frames = stop_frames;
        }
        if self.linear_only {
            config.supports_angular = false;
        }
        if self.no_motor_power {
            config.manage_motor_power = false;
        }

        config.validate()?;
        Ok(config)
    }
}
