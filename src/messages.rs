// Define message types for the bridge
//
// Wire format from teleop/scripts -> bridge is plain UTF-8 text:
//   "<linear_m_s>"                   (linear-only mode)
//   "<linear_m_s> <angular_rad_s>"   (both axes)

use std::num::ParseFloatError;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Which fields an inbound command carries
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommandMode {
    /// `linear` or `linear angular`; angular is always discarded
    LinearOnly,
    /// `linear angular`
    LinearAngular,
}

impl CommandMode {
    pub fn from_supports_angular(supports_angular: bool) -> Self {
        if supports_angular {
            CommandMode::LinearAngular
        } else {
            CommandMode::LinearOnly
        }
    }
}

/// Why an inbound datagram was rejected
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ParseError {
    #[error("payload is not valid UTF-8")]
    NotUtf8,

    #[error("expected {expected} field(s), got {got}")]
    FieldCount { expected: &'static str, got: usize },

    #[error("invalid number {field:?}: {source}")]
    Number {
        field: String,
        source: ParseFloatError,
    },

    #[error("non-finite value {0}")]
    NonFinite(f64),
}

/// Velocity command from a teleop source
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VelocityCommand {
    pub linear_m_s: f64,
    pub angular_rad_s: f64,
    pub received_at: Instant,
}

impl VelocityCommand {
    /// Parse a datagram payload received at `received_at`
    pub fn parse(
        payload: &[u8],
        mode: CommandMode,
        received_at: Instant,
    ) -> Result<Self, ParseError> {
        let text = std::str::from_utf8(payload).map_err(|_| ParseError::NotUtf8)?;
        let (linear_m_s, angular_rad_s) = parse_velocity(text, mode)?;
        Ok(Self {
            linear_m_s,
            angular_rad_s,
            received_at,
        })
    }
}

fn parse_field(field: &str) -> Result<f64, ParseError> {
    let value: f64 = field.parse().map_err(|source| ParseError::Number {
        field: field.to_string(),
        source,
    })?;
    if !value.is_finite() {
        return Err(ParseError::NonFinite(value));
    }
    Ok(value)
}

/// Parse `(linear_m_s, angular_rad_s)` from command text
pub fn parse_velocity(text: &str, mode: CommandMode) -> Result<(f64, f64), ParseError> {
    let fields: Vec<&str> = text.split_whitespace().collect();

    match (mode, fields.as_slice()) {
        (CommandMode::LinearOnly, [linear]) => Ok((parse_field(linear)?, 0.0)),
        (CommandMode::LinearOnly, [linear, angular]) => {
            // Senders that always emit both fields still work; angular must be numeric
            parse_field(angular)?;
            Ok((parse_field(linear)?, 0.0))
        }
        (CommandMode::LinearAngular, [linear, angular]) => {
            Ok((parse_field(linear)?, parse_field(angular)?))
        }
        (CommandMode::LinearOnly, _) => Err(ParseError::FieldCount {
            expected: "1 or 2",
            got: fields.len(),
        }),
        (CommandMode::LinearAngular, _) => Err(ParseError::FieldCount {
            expected: "2",
            got: fields.len(),
        }),
    }
}
