// Differential-drive kinematics for the Kobuki base
// Converts a (linear, angular) body velocity into the speed/radius pair the
// Base-Control command expects.

use super::kobuki::base_control_subpayload;

/// Below this magnitude a velocity component is treated as noise
pub const VELOCITY_EPSILON: f64 = 1e-3;

/// Largest turning radius magnitude the base accepts (mm)
pub const MAX_RADIUS_MM: i16 = 32767;

/// Radius used for pure rotation; the sign selects the spin direction
pub const SPIN_RADIUS_MM: i16 = 1;

/// Speed and turning radius for one control tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriveFrame {
    pub speed_mm_s: i16,
    pub radius_mm: i16,
}

impl DriveFrame {
    /// Zero speed, straight line
    pub const STOP: DriveFrame = DriveFrame {
        speed_mm_s: 0,
        radius_mm: 0,
    };

    pub fn new(speed_mm_s: i16, radius_mm: i16) -> Self {
        Self {
            speed_mm_s,
            radius_mm,
        }
    }

    pub fn is_stop(&self) -> bool {
        *self == Self::STOP
    }

    /// Base-Control sub-payload carrying this frame
    pub fn to_subpayload(&self) -> [u8; 6] {
        base_control_subpayload(self.speed_mm_s, self.radius_mm)
    }
}

/// Round a value and saturate it into `[min, max]`
fn round_clamped(value: f64, min: i16, max: i16) -> i16 {
    // Float-to-int `as` saturates, so the i32 step can't wrap
    let rounded = value.round() as i32;
    rounded.clamp(min as i32, max as i32) as i16
}

/// Convert linear (m/s) and angular (rad/s) velocity into a drive frame
///
/// # Arguments
/// * `linear_m_s` - Forward velocity in m/s (positive = forward)
/// * `angular_rad_s` - Rotational velocity in rad/s (positive = counter-clockwise)
///
/// Radius policy, checked in order: negligible angular velocity drives
/// straight (radius 0); negligible linear velocity spins in place (radius
/// +/-1); otherwise radius is `speed_mm_s / angular_rad_s`.
pub fn velocity_to_drive_frame(linear_m_s: f64, angular_rad_s: f64) -> DriveFrame {
    let speed_mm_s = round_clamped(linear_m_s * 1000.0, i16::MIN, i16::MAX);

    let radius_mm = if angular_rad_s.abs() < VELOCITY_EPSILON {
        0
    } else if linear_m_s.abs() < VELOCITY_EPSILON {
        if angular_rad_s > 0.0 {
            SPIN_RADIUS_MM
        } else {
            -SPIN_RADIUS_MM
        }
    } else {
        // mm/s divided by rad/s, no unit conversion. Matches what the base
        // has been driven with so far; verify against hardware before changing.
        round_clamped(
            speed_mm_s as f64 / angular_rad_s,
            -MAX_RADIUS_MM,
            MAX_RADIUS_MM,
        )
    };

    DriveFrame {
        speed_mm_s,
        radius_mm,
    }
}
