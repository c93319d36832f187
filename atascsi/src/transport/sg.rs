//! Linux SCSI generic (`SG_IO`) transport.

use std::{
    fs::{File, OpenOptions},
    io,
    os::{
        fd::AsRawFd,
        unix::fs::{FileTypeExt, OpenOptionsExt},
    },
    path::{Path, PathBuf},
    ptr,
};

use nix::libc;
use tracing::{debug, warn};

use crate::{
    scsi::{
        sense::{SenseData, MAX_SENSE_BUFFER_LENGTH},
        Status,
    },
    transport::{DataBuffer, ScsiPassThrough, ScsiRequest, ScsiResponse},
};

const SG_IO: u32 = 0x2285;
const SG_GET_VERSION_NUM: u32 = 0x2282;
/// sg driver 3.0 introduced the `sg_io_hdr` interface.
const SG_MINIMUM_VERSION: i32 = 30000;

const SG_DXFER_NONE: i32 = -1;
const SG_DXFER_TO_DEV: i32 = -2;
const SG_DXFER_FROM_DEV: i32 = -3;

const SG_INFO_OK_MASK: u32 = 0x1;
const DRIVER_SENSE: u16 = 0x08;

#[repr(C)]
#[derive(Debug)]
struct SgIoHeader {
    interface_id: i32,
    data_direction: i32,
    command_length: u8,
    max_sense_buffer_length: u8,
    iovec_count: u16,
    data_length: u32,
    data: *mut libc::c_void,
    command: *const u8,
    sense_buffer: *mut u8,
    timeout: u32,
    flags: u32,
    pack_id: i32,
    user_pointer: *mut libc::c_void,
    status: u8,
    masked_status: u8,
    message_status: u8,
    sense_buffer_written: u8,
    host_status: u16,
    driver_status: u16,
    residual_count: i32,
    duration: u32,
    info: u32,
}

/// An open sg node (`/dev/sgN`) or a block device that accepts `SG_IO`.
#[derive(Debug)]
pub struct SgDevice {
    path: PathBuf,
    file: File,
}

impl SgDevice {
    pub fn open<P: AsRef<Path> + ?Sized>(path: &P) -> crate::Result<Self> {
        let mut options = OpenOptions::new();
        options.read(true).write(true);
        Self::open_with(path.as_ref(), options)
    }

    pub fn open_readonly<P: AsRef<Path> + ?Sized>(path: &P) -> crate::Result<Self> {
        let mut options = OpenOptions::new();
        options.read(true);
        Self::open_with(path.as_ref(), options)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_with(path: &Path, mut options: OpenOptions) -> crate::Result<Self> {
        let file = options.custom_flags(libc::O_NONBLOCK).open(path)?;

        let file_type = file.metadata()?.file_type();
        if !file_type.is_block_device() && !file_type.is_char_device() {
            return Err(crate::Error::NotBlockDevice(path.to_owned()));
        }

        let mut version = 0_i32;
        let result = unsafe { libc::ioctl(file.as_raw_fd(), SG_GET_VERSION_NUM as _, &mut version) };
        if result != 0 || version < SG_MINIMUM_VERSION {
            debug!(path = %path.display(), version, "sg version check failed");
            return Err(crate::Error::NotPassThroughDevice(path.to_owned()));
        }

        debug!(path = %path.display(), version, "opened sg device");

        Ok(Self {
            path: path.to_owned(),
            file,
        })
    }
}

impl ScsiPassThrough for SgDevice {
    fn execute(&self, request: ScsiRequest<'_>) -> crate::Result<ScsiResponse> {
        let mut sense_buffer = [0u8; MAX_SENSE_BUFFER_LENGTH];

        let data_length = request.data.len();
        let (data_direction, data): (i32, *mut libc::c_void) = match request.data {
            DataBuffer::None => (SG_DXFER_NONE, ptr::null_mut()),
            DataBuffer::FromDevice(buffer) => (SG_DXFER_FROM_DEV, buffer.as_mut_ptr().cast()),
            // the kernel only reads from a to-device buffer
            DataBuffer::ToDevice(buffer) => (SG_DXFER_TO_DEV, buffer.as_ptr() as *mut _),
        };

        let command_length = u8::try_from(request.command.len()).map_err(|_| {
            crate::Error::BadArgument(format!(
                "command of {} bytes is too long",
                request.command.len()
            ))
        })?;
        let data_length = u32::try_from(data_length).map_err(|_| {
            crate::Error::BadArgument(format!("data buffer of {data_length} bytes is too long"))
        })?;

        let mut header = SgIoHeader {
            interface_id: b'S' as i32,
            data_direction,
            command_length,
            max_sense_buffer_length: MAX_SENSE_BUFFER_LENGTH as u8,
            iovec_count: 0,
            data_length,
            data,
            command: request.command.as_ptr(),
            sense_buffer: sense_buffer.as_mut_ptr(),
            timeout: request
                .timeout
                .as_millis()
                .clamp(u32::MIN as u128, u32::MAX as u128) as u32,
            flags: 0,
            pack_id: 0,
            user_pointer: ptr::null_mut(),
            status: 0,
            masked_status: 0,
            message_status: 0,
            sense_buffer_written: 0,
            host_status: 0,
            driver_status: 0,
            residual_count: 0,
            duration: 0,
            info: 0,
        };

        let result = unsafe { libc::ioctl(self.file.as_raw_fd(), SG_IO as _, &mut header) };
        if result != 0 {
            return Err(io::Error::last_os_error().into());
        }

        if header.info & SG_INFO_OK_MASK != 0
            && (header.host_status != 0 || header.driver_status & !DRIVER_SENSE != 0)
        {
            warn!(
                host_status = header.host_status,
                driver_status = header.driver_status,
                "sg transport error"
            );
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!(
                    "sg transport error, host status {:#06x}, driver status {:#06x}",
                    header.host_status, header.driver_status
                ),
            )
            .into());
        }

        let residual = usize::try_from(header.residual_count).unwrap_or(0);

        Ok(ScsiResponse {
            status: Status::from(header.status),
            sense: SenseData::parse(&sense_buffer, header.sense_buffer_written as usize),
            transfered_data_length: (header.data_length as usize).saturating_sub(residual),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn layout_test() {
        assert_eq!(
            size_of::<SgIoHeader>(),
            88,
            concat!("Size of: ", stringify!(SgIoHeader))
        );
    }

    #[test]
    fn regular_file_test() {
        let path = std::env::temp_dir().join("atascsi-sg-regular-file");
        std::fs::write(&path, b"not a device").unwrap();

        assert!(matches!(
            SgDevice::open_readonly(&path),
            Err(crate::Error::NotBlockDevice(_))
        ));

        std::fs::remove_file(&path).unwrap();
    }
}
