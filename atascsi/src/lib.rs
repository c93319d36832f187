// modular_bitfield_msb generates fields that trip unused_parens; keep this crate clean.
#![allow(unused_parens)]

pub mod ata;
pub mod bits;
pub mod buffer;
pub mod command;
mod data_direction;
mod error;
pub mod marshal;
pub mod mmc;
pub mod mode_page;
pub mod scsi;
pub mod stream;
pub mod transport;
pub mod vpd;

pub use ata::AtaDevice;
pub use buffer::{Buffer, BufferMut};
pub use command::Command;
pub use data_direction::DataDirection;
pub use error::{Error, Result};
pub use marshal::{Family, Lookup, Marshal};
pub use scsi::{ResultData, Scsi, Status, DEFAULT_TIMEOUT};
pub use stream::SectorStream;
