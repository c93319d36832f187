//! ATA command set: register frames, IDENTIFY DEVICE, SMART and the device
//! command engine.

pub mod device;
pub mod identify;
pub mod smart;
pub mod task_file;

pub use device::{AtaDevice, Capabilities, TransferMode};
