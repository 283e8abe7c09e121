// Drive control for the Kobuki differential base
//
// Provides:
// - Differential-drive kinematics (velocity -> speed/radius drive frame)
// - Kobuki serial packet framing
// - High-level base driver API

mod driver;
pub mod kinematics;
pub mod kobuki;

pub use driver::KobukiBase;
pub use kinematics::{velocity_to_drive_frame, DriveFrame};
pub use kobuki::{encode_packet, KobukiBus, KobukiError};
