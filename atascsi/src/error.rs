use std::{io, path::PathBuf};

use crate::scsi::sense::SenseData;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    ArgumentOutOfBounds(String),
    #[error("{0}")]
    BadArgument(String),
    #[error("buffer too small: {required} bytes required, {available} bytes available")]
    BufferTooSmall { required: usize, available: usize },
    #[error("access of {size} bytes at offset {offset} is outside a {length} byte buffer")]
    OutOfRange {
        offset: usize,
        size: usize,
        length: usize,
    },

    #[error("ata command failed, error register {error:#04x}, status register {status:#04x}")]
    Ata { error: u8, status: u8 },
    #[error("scsi command failed with sense data {0:?}")]
    Sense(SenseData),
    #[error("scsi command failed with status {0:#04x}")]
    ScsiStatus(u8),

    #[error("unknown {family} type code {code:#x}")]
    UnknownTypeCode { family: &'static str, code: u16 },
    #[error("{family} declares {declared} bytes but only {available} bytes are available")]
    Truncated {
        family: &'static str,
        declared: usize,
        available: usize,
    },
    #[error("malformed data: {0}")]
    Decode(String),

    #[error("{0} is not supported")]
    NotSupported(&'static str),
    #[error("{0} is not a block or character device")]
    NotBlockDevice(PathBuf),
    #[error("{0} does not accept pass-through commands")]
    NotPassThroughDevice(PathBuf),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// `true` for errors raised by the device rather than by argument checks,
    /// parsing or the transport.
    pub fn is_device_error(&self) -> bool {
        matches!(
            self,
            Error::Ata { .. } | Error::Sense(_) | Error::ScsiStatus(_)
        )
    }

    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            Error::UnknownTypeCode { .. } | Error::Truncated { .. } | Error::Decode(_)
        )
    }
}

impl From<Error> for io::Error {
    fn from(value: Error) -> Self {
        match value {
            Error::Io(e) => e,
            Error::NotSupported(_) => io::Error::new(io::ErrorKind::Unsupported, value),
            Error::ArgumentOutOfBounds(_)
            | Error::BadArgument(_)
            | Error::BufferTooSmall { .. }
            | Error::OutOfRange { .. } => io::Error::new(io::ErrorKind::InvalidInput, value),
            Error::UnknownTypeCode { .. } | Error::Truncated { .. } | Error::Decode(_) => {
                io::Error::new(io::ErrorKind::InvalidData, value)
            }
            _ => io::Error::new(io::ErrorKind::Other, value),
        }
    }
}
