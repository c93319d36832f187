//! Contracts for the pass-through facilities that carry commands to a device.
//!
//! Implementations submit exactly one command at a time and block until it
//! completes or the timeout expires. Errors returned from `execute` are
//! transport failures; device status is reported through the returned
//! registers or sense data.

#[cfg(test)]
pub(crate) mod mock;
#[cfg(target_os = "linux")]
pub mod sg;
#[cfg(target_os = "windows")]
pub mod windows;

use std::time::Duration;

use bitflags::bitflags;

use crate::{ata::task_file::TaskFile, scsi::sense::SenseData, scsi::Status, DataDirection};

bitflags! {
    /// Per-command transfer flags. Values match the Windows `ATA_FLAGS_*` set.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct AtaFlags: u16 {
        const DRDY_REQUIRED = 0x01;
        const DATA_IN = 0x02;
        const DATA_OUT = 0x04;
        const EXTENDED_COMMAND = 0x08;
        const USE_DMA = 0x10;
        const NO_MULTIPLE = 0x20;
    }
}

/// The data phase of a command.
#[derive(Debug)]
pub enum DataBuffer<'a> {
    None,
    FromDevice(&'a mut [u8]),
    ToDevice(&'a [u8]),
}

impl DataBuffer<'_> {
    pub fn len(&self) -> usize {
        match self {
            DataBuffer::None => 0,
            DataBuffer::FromDevice(b) => b.len(),
            DataBuffer::ToDevice(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn direction(&self) -> DataDirection {
        match self {
            DataBuffer::None => DataDirection::None,
            DataBuffer::FromDevice(_) => DataDirection::FromDevice,
            DataBuffer::ToDevice(_) => DataDirection::ToDevice,
        }
    }
}

/// A validated ATA submission: the register pair, the data phase and the flags
/// describing it.
#[derive(Debug)]
pub struct AtaRequest<'a> {
    pub current: TaskFile,
    pub previous: TaskFile,
    pub data: DataBuffer<'a>,
    pub flags: AtaFlags,
    pub timeout: Duration,
}

impl<'a> AtaRequest<'a> {
    /// Fails when the data phase and the direction flags disagree: a command
    /// either has no data buffer and neither direction flag, or a non-empty
    /// buffer and exactly the matching direction flag.
    pub fn new(
        current: TaskFile,
        previous: TaskFile,
        data: DataBuffer<'a>,
        flags: AtaFlags,
        timeout: Duration,
    ) -> crate::Result<Self> {
        let data_in = flags.contains(AtaFlags::DATA_IN);
        let data_out = flags.contains(AtaFlags::DATA_OUT);

        let consistent = match &data {
            DataBuffer::None => !data_in && !data_out,
            DataBuffer::FromDevice(b) => !b.is_empty() && data_in && !data_out,
            DataBuffer::ToDevice(b) => !b.is_empty() && data_out && !data_in,
        };

        if !consistent {
            return Err(crate::Error::BadArgument(format!(
                "flags {:?} do not match a {:?} data buffer of {} bytes",
                flags,
                data.direction(),
                data.len()
            )));
        }

        Ok(Self {
            current,
            previous,
            data,
            flags,
            timeout,
        })
    }
}

pub trait AtaPassThrough {
    /// Issues the request and returns the post-command `(current, previous)`
    /// register images.
    fn execute(&self, request: AtaRequest<'_>) -> crate::Result<(TaskFile, TaskFile)>;

    fn lock_volume(&self) -> crate::Result<()> {
        Err(crate::Error::NotSupported("volume locking"))
    }

    fn unlock_volume(&self) -> crate::Result<()> {
        Err(crate::Error::NotSupported("volume unlocking"))
    }

    fn dismount_volume(&self) -> crate::Result<()> {
        Err(crate::Error::NotSupported("volume dismounting"))
    }
}

impl<T: AtaPassThrough + ?Sized> AtaPassThrough for &T {
    fn execute(&self, request: AtaRequest<'_>) -> crate::Result<(TaskFile, TaskFile)> {
        (**self).execute(request)
    }

    fn lock_volume(&self) -> crate::Result<()> {
        (**self).lock_volume()
    }

    fn unlock_volume(&self) -> crate::Result<()> {
        (**self).unlock_volume()
    }

    fn dismount_volume(&self) -> crate::Result<()> {
        (**self).dismount_volume()
    }
}

#[derive(Debug)]
pub struct ScsiRequest<'a> {
    pub command: &'a [u8],
    pub data: DataBuffer<'a>,
    pub timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct ScsiResponse {
    pub status: Status,
    pub sense: SenseData,
    pub transfered_data_length: usize,
}

pub trait ScsiPassThrough {
    fn execute(&self, request: ScsiRequest<'_>) -> crate::Result<ScsiResponse>;
}

impl<T: ScsiPassThrough + ?Sized> ScsiPassThrough for &T {
    fn execute(&self, request: ScsiRequest<'_>) -> crate::Result<ScsiResponse> {
        (**self).execute(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_validation_test() {
        let tf = TaskFile::default();
        let timeout = Duration::from_secs(1);
        let mut buffer = [0u8; 512];

        assert!(AtaRequest::new(tf, tf, DataBuffer::None, AtaFlags::DRDY_REQUIRED, timeout).is_ok());
        assert!(AtaRequest::new(tf, tf, DataBuffer::None, AtaFlags::DATA_IN, timeout).is_err());
        assert!(AtaRequest::new(
            tf,
            tf,
            DataBuffer::FromDevice(&mut buffer),
            AtaFlags::DATA_IN | AtaFlags::USE_DMA,
            timeout
        )
        .is_ok());
        assert!(AtaRequest::new(
            tf,
            tf,
            DataBuffer::FromDevice(&mut buffer),
            AtaFlags::DATA_IN | AtaFlags::DATA_OUT,
            timeout
        )
        .is_err());
        assert!(AtaRequest::new(
            tf,
            tf,
            DataBuffer::ToDevice(&buffer),
            AtaFlags::DATA_IN,
            timeout
        )
        .is_err());
        assert!(AtaRequest::new(
            tf,
            tf,
            DataBuffer::FromDevice(&mut []),
            AtaFlags::DATA_IN,
            timeout
        )
        .is_err());
    }
}
