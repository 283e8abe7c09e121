// High-level driver for the Kobuki base
//
// Combines kinematics and the Kobuki framing to provide a simple API
// for driving the differential base.

use serialport::SerialPort;
use std::io::Write;
use tracing::{debug, info, warn};

use super::kinematics::{velocity_to_drive_frame, DriveFrame};
use super::kobuki::{KobukiBus, Result};

/// High-level driver for the Kobuki differential base
pub struct KobukiBase<W: Write = Box<dyn SerialPort>> {
    bus: KobukiBus<W>,
    last_frame: Option<DriveFrame>,
}

impl KobukiBase {
    /// Open the base on the specified serial port
    pub fn open(port: &str, baudrate: u32) -> Result<Self> {
        info!("Opening Kobuki base on {} @ {} bps", port, baudrate);
        let bus = KobukiBus::open_with_baudrate(port, baudrate)?;
        Ok(Self::from_bus(bus))
    }
}

impl<W: Write> KobukiBase<W> {
    pub fn from_bus(bus: KobukiBus<W>) -> Self {
        Self {
            bus,
            last_frame: None,
        }
    }

    /// Switch drive motor power on or off
    pub fn set_motor_power(&mut self, on: bool) -> Result<()> {
        info!("Motor power {}", if on { "ON" } else { "OFF" });
        self.bus.motor_power(on)
    }

    /// Send body velocity command to the base
    ///
    /// # Arguments
    /// * `linear` - Forward velocity in m/s
    /// * `angular` - Rotational velocity in rad/s (positive = counter-clockwise)
    pub fn set_velocity(&mut self, linear: f64, angular: f64) -> Result<DriveFrame> {
        let frame = velocity_to_drive_frame(linear, angular);
        self.send_frame(frame)?;
        Ok(frame)
    }

    /// Send a precomputed drive frame
    pub fn send_frame(&mut self, frame: DriveFrame) -> Result<()> {
        if self.last_frame != Some(frame) {
            debug!(
                "Drive frame: speed={} mm/s, radius={} mm",
                frame.speed_mm_s, frame.radius_mm
            );
        }
        self.bus.base_control(frame.speed_mm_s, frame.radius_mm)?;
        self.last_frame = Some(frame);
        Ok(())
    }

    /// Send a single zero-velocity frame
    pub fn stop(&mut self) -> Result<()> {
        self.send_frame(DriveFrame::STOP)
    }

    /// Last frame successfully written, if any
    pub fn last_frame(&self) -> Option<DriveFrame> {
        self.last_frame
    }

    /// Borrow the underlying link
    pub fn bus(&self) -> &KobukiBus<W> {
        &self.bus
    }
}

impl<W: Write> Drop for KobukiBase<W> {
    fn drop(&mut self) {
        // Last-ditch stop if the base was left moving (e.g. a fatal error unwound the loop)
        if matches!(self.last_frame, Some(frame) if !frame.is_stop()) {
            if let Err(e) = self.stop() {
                warn!("Failed to stop base on drop: {}", e);
            }
        }
    }
}
