// Command watchdog
// Note: if teleop crashes or the network drops, the last command would otherwise
// keep the base moving forever. The watchdog zeroes the effective command once
// the last valid command is older than the timeout.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::messages::VelocityCommand;

/// Health of the command link as seen by the watchdog
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LinkHealth {
    Ok,
    CmdStale,
}

/// Velocity actually handed to the kinematics this tick
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EffectiveVelocity {
    pub linear_m_s: f64,
    pub angular_rad_s: f64,
}

impl From<&VelocityCommand> for EffectiveVelocity {
    fn from(cmd: &VelocityCommand) -> Self {
        Self {
            linear_m_s: cmd.linear_m_s,
            angular_rad_s: cmd.angular_rad_s,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WatchdogState {
    last_command_time: Option<Instant>,
    timeout: Duration,
    health: LinkHealth,
}

impl WatchdogState {
    pub fn new(timeout: Duration) -> Self {
        Self {
            last_command_time: None,
            timeout,
            health: LinkHealth::CmdStale, // Start stale until first cmd
        }
    }

    /// Record a valid command at `now`
    pub fn feed(&mut self, now: Instant) {
        self.last_command_time = Some(now);
    }

    pub fn last_command_time(&self) -> Option<Instant> {
        self.last_command_time
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn health(&self) -> LinkHealth {
        self.health
    }

    /// True when no command arrived, or the last one is older than the timeout
    pub fn is_stale(&self, now: Instant) -> bool {
        match self.last_command_time {
            Some(at) => now.saturating_duration_since(at) > self.timeout,
            None => true,
        }
    }
}

/// Decide the velocity for this tick
///
/// Must run before kinematics so a stale command never reaches a drive frame.
pub fn effective_velocity(
    state: &mut WatchdogState,
    command: Option<&VelocityCommand>,
    now: Instant,
) -> EffectiveVelocity {
    let stale = state.is_stale(now);

    match (stale, command) {
        (false, Some(cmd)) => {
            if state.health != LinkHealth::Ok {
                info!("Command stream active");
            }
            state.health = LinkHealth::Ok;
            EffectiveVelocity::from(cmd)
        }
        _ => {
            // Watchdog triggered - stop the robot
            if state.health != LinkHealth::CmdStale {
                let age = state
                    .last_command_time
                    .map(|at| now.saturating_duration_since(at));
                warn!("Command stale ({:?} old), stopping base", age.unwrap_or_default());
            }
            state.health = LinkHealth::CmdStale;
            EffectiveVelocity::default() // Zero velocity
        }
    }
}
