// Kobuki serial protocol framing
//
// Packet format: [0xAA, 0x55, Length, Sub-payload..., Checksum]
// Checksum is the XOR of the length byte and every sub-payload byte, so the
// XOR of everything from Length through Checksum comes out to zero.

use serialport::{self, SerialPort};
use std::io::Write;
use std::time::Duration;
use tracing::debug;

/// Default serial configuration for the Kobuki base
pub const DEFAULT_BAUDRATE: u32 = 115_200;
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Packet header bytes
pub const HEADER: [u8; 2] = [0xAA, 0x55];

/// Largest sub-payload the single length byte can describe
pub const MAX_SUBPAYLOAD_LEN: usize = u8::MAX as usize;

/// Sub-payload opcodes used by the bridge
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    BaseControl = 0x01,
    MotorPower = 0x04,
}

impl Opcode {
    /// Declared data length that follows the opcode/length pair
    pub const fn data_len(self) -> u8 {
        match self {
            Opcode::BaseControl => 4, // speed (2) + radius (2)
            Opcode::MotorPower => 2,  // state + reserved
        }
    }
}

/// Error types for Kobuki communication
#[derive(Debug, thiserror::Error)]
pub enum KobukiError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Sub-payload of {len} bytes does not fit in a single packet (max 255)")]
    PayloadTooLong { len: usize },
}

pub type Result<T> = std::result::Result<T, KobukiError>;

/// XOR checksum over the length byte and sub-payload
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc ^ b)
}

/// Frame a sub-payload with header, length and checksum.
///
/// The encoder does not inspect the opcode; callers hand it a well-formed
/// sub-payload.
pub fn encode_packet(subpayload: &[u8]) -> Result<Vec<u8>> {
    let length = u8::try_from(subpayload.len()).map_err(|_| KobukiError::PayloadTooLong {
        len: subpayload.len(),
    })?;

    let mut packet = Vec::with_capacity(HEADER.len() + 2 + subpayload.len());
    packet.extend_from_slice(&HEADER);
    packet.push(length);
    packet.extend_from_slice(subpayload);

    // Checksum over length and sub-payload
    let cs = checksum(&packet[HEADER.len()..]);
    packet.push(cs);

    Ok(packet)
}

/// Sub-payload for a Base-Control command (little-endian speed and radius)
pub fn base_control_subpayload(speed_mm_s: i16, radius_mm: i16) -> [u8; 6] {
    let [v_lo, v_hi] = speed_mm_s.to_le_bytes();
    let [r_lo, r_hi] = radius_mm.to_le_bytes();
    [
        Opcode::BaseControl as u8,
        Opcode::BaseControl.data_len(),
        v_lo,
        v_hi,
        r_lo,
        r_hi,
    ]
}

/// Sub-payload for a Motor-Power command
pub fn motor_power_subpayload(on: bool) -> [u8; 4] {
    [
        Opcode::MotorPower as u8,
        Opcode::MotorPower.data_len(),
        u8::from(on),
        0x00,
    ]
}

/// Kobuki serial link - frames and writes packets to the base.
///
/// Generic over the writer so the link can be swapped for an in-memory
/// buffer; the default is a real serial port.
pub struct KobukiBus<W: Write = Box<dyn SerialPort>> {
    port: W,
}

impl KobukiBus {
    /// Open a new connection to the base
    pub fn open(port_name: &str) -> Result<Self> {
        Self::open_with_baudrate(port_name, DEFAULT_BAUDRATE)
    }

    /// Open with custom baudrate
    pub fn open_with_baudrate(port_name: &str, baudrate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;

        Ok(Self { port })
    }
}

impl<W: Write> KobukiBus<W> {
    /// Wrap an already-open writer
    pub fn from_writer(port: W) -> Self {
        Self { port }
    }

    /// Borrow the underlying writer
    pub fn get_ref(&self) -> &W {
        &self.port
    }

    /// Frame a sub-payload and write it to the link
    pub fn send(&mut self, subpayload: &[u8]) -> Result<()> {
        let packet = encode_packet(subpayload)?;
        debug!("TX {:02X?}", packet);
        self.port.write_all(&packet)?;
        self.port.flush()?;
        Ok(())
    }

    /// Send a Base-Control command
    pub fn base_control(&mut self, speed_mm_s: i16, radius_mm: i16) -> Result<()> {
        self.send(&base_control_subpayload(speed_mm_s, radius_mm))
    }

    /// Switch drive motor power on or off
    pub fn motor_power(&mut self, on: bool) -> Result<()> {
        self.send(&motor_power_subpayload(on))
    }
}
