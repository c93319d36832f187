//! Windows pass-through: `IOCTL_ATA_PASS_THROUGH_DIRECT` for ATA and
//! `IOCTL_SCSI_PASS_THROUGH_DIRECT` for SCSI, on a handle opened with
//! `CreateFileW`.

use std::{
    ffi::c_void,
    io,
    mem::{offset_of, size_of},
    os::windows::ffi::OsStrExt,
    path::{Path, PathBuf},
    ptr,
    time::Duration,
};

use tracing::{debug, warn};
use windows::{
    core::PCWSTR,
    Win32::{
        Foundation::{CloseHandle, GENERIC_READ, GENERIC_WRITE, HANDLE},
        Storage::{
            FileSystem::{
                CreateFileW, FILE_ATTRIBUTE_NORMAL, FILE_SHARE_READ, FILE_SHARE_WRITE,
                OPEN_EXISTING,
            },
            IscsiDisc::{
                ATA_PASS_THROUGH_DIRECT, IOCTL_ATA_PASS_THROUGH_DIRECT,
                IOCTL_SCSI_PASS_THROUGH_DIRECT, SCSI_IOCTL_DATA_IN, SCSI_IOCTL_DATA_OUT,
                SCSI_IOCTL_DATA_UNSPECIFIED, SCSI_PASS_THROUGH_DIRECT,
            },
        },
        System::{
            Ioctl::{FSCTL_DISMOUNT_VOLUME, FSCTL_LOCK_VOLUME, FSCTL_UNLOCK_VOLUME},
            IO::DeviceIoControl,
        },
    },
};

use crate::{
    ata::task_file::TaskFile,
    scsi::{
        sense::{SenseData, MAX_SENSE_BUFFER_LENGTH},
        Status,
    },
    transport::{
        AtaPassThrough, AtaRequest, DataBuffer, ScsiPassThrough, ScsiRequest, ScsiResponse,
    },
};

const MAX_COMMAND_LENGTH: usize = 16;

#[repr(C)]
struct ScsiPassThroughDirectWrapper {
    pass_through: SCSI_PASS_THROUGH_DIRECT,
    filler: u32,
    sense: [u8; MAX_SENSE_BUFFER_LENGTH],
}

/// A physical drive (`\\.\PhysicalDriveN`), CD-ROM (`\\.\CdRomN`) or volume
/// (`\\.\C:`) handle.
#[derive(Debug)]
pub struct WindowsDevice {
    path: PathBuf,
    handle: HANDLE,
}

impl WindowsDevice {
    pub fn open<P: AsRef<Path> + ?Sized>(path: &P) -> crate::Result<Self> {
        let path = path.as_ref();
        let wide: Vec<u16> = path
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        let handle = unsafe {
            CreateFileW(
                PCWSTR(wide.as_ptr()),
                GENERIC_READ.0 | GENERIC_WRITE.0,
                FILE_SHARE_READ | FILE_SHARE_WRITE,
                None,
                OPEN_EXISTING,
                FILE_ATTRIBUTE_NORMAL,
                HANDLE::default(),
            )
        }
        .map_err(io::Error::from)?;

        debug!(path = %path.display(), "opened device handle");

        Ok(Self {
            path: path.to_owned(),
            handle,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn control(
        &self,
        code: u32,
        input: Option<(*const c_void, u32)>,
        output: Option<(*mut c_void, u32)>,
    ) -> crate::Result<u32> {
        let mut bytes_returned = 0;

        unsafe {
            DeviceIoControl(
                self.handle,
                code,
                input.map(|(p, _)| p),
                input.map_or(0, |(_, n)| n),
                output.map(|(p, _)| p),
                output.map_or(0, |(_, n)| n),
                Some(&mut bytes_returned),
                None,
            )
        }
        .map_err(io::Error::from)?;

        Ok(bytes_returned)
    }
}

impl Drop for WindowsDevice {
    fn drop(&mut self) {
        if let Err(e) = unsafe { CloseHandle(self.handle) } {
            warn!(path = %self.path.display(), error = %e, "failed to close device handle");
        }
    }
}

fn timeout_seconds(timeout: Duration) -> u32 {
    match timeout.as_secs().clamp(u32::MIN as u64, u32::MAX as u64) {
        0 => 1,
        n => n as u32,
    }
}

fn data_length(data: &DataBuffer<'_>) -> crate::Result<u32> {
    u32::try_from(data.len()).map_err(|_| {
        crate::Error::BadArgument(format!("data buffer of {} bytes is too long", data.len()))
    })
}

fn data_pointer(data: DataBuffer<'_>) -> *mut c_void {
    match data {
        DataBuffer::None => ptr::null_mut(),
        DataBuffer::FromDevice(buffer) => buffer.as_mut_ptr().cast(),
        // the driver only reads from a to-device buffer
        DataBuffer::ToDevice(buffer) => buffer.as_ptr() as *mut _,
    }
}

impl AtaPassThrough for WindowsDevice {
    fn execute(&self, request: AtaRequest<'_>) -> crate::Result<(TaskFile, TaskFile)> {
        let AtaRequest {
            current,
            previous,
            data,
            flags,
            timeout,
        } = request;

        let mut pass_through = ATA_PASS_THROUGH_DIRECT {
            Length: size_of::<ATA_PASS_THROUGH_DIRECT>() as u16,
            AtaFlags: flags.bits(),
            DataTransferLength: data_length(&data)?,
            TimeOutValue: timeout_seconds(timeout),
            DataBuffer: data_pointer(data),
            PreviousTaskFile: previous.into_bytes(),
            CurrentTaskFile: current.into_bytes(),
            ..Default::default()
        };

        let size = size_of::<ATA_PASS_THROUGH_DIRECT>() as u32;
        let pointer = ptr::addr_of_mut!(pass_through).cast::<c_void>();
        self.control(
            IOCTL_ATA_PASS_THROUGH_DIRECT,
            Some((pointer as *const c_void, size)),
            Some((pointer, size)),
        )?;

        Ok((
            TaskFile::from_bytes(pass_through.CurrentTaskFile),
            TaskFile::from_bytes(pass_through.PreviousTaskFile),
        ))
    }

    fn lock_volume(&self) -> crate::Result<()> {
        self.control(FSCTL_LOCK_VOLUME, None, None).map(|_| ())
    }

    fn unlock_volume(&self) -> crate::Result<()> {
        self.control(FSCTL_UNLOCK_VOLUME, None, None).map(|_| ())
    }

    fn dismount_volume(&self) -> crate::Result<()> {
        self.control(FSCTL_DISMOUNT_VOLUME, None, None).map(|_| ())
    }
}

impl ScsiPassThrough for WindowsDevice {
    fn execute(&self, request: ScsiRequest<'_>) -> crate::Result<ScsiResponse> {
        if request.command.len() > MAX_COMMAND_LENGTH {
            return Err(crate::Error::BadArgument(format!(
                "command length is {}, max command length is {}",
                request.command.len(),
                MAX_COMMAND_LENGTH
            )));
        }

        let data_in = match request.data {
            DataBuffer::None => SCSI_IOCTL_DATA_UNSPECIFIED,
            DataBuffer::FromDevice(_) => SCSI_IOCTL_DATA_IN,
            DataBuffer::ToDevice(_) => SCSI_IOCTL_DATA_OUT,
        } as u8;

        let mut cdb = [0u8; MAX_COMMAND_LENGTH];
        cdb[..request.command.len()].copy_from_slice(request.command);

        let mut header = ScsiPassThroughDirectWrapper {
            pass_through: SCSI_PASS_THROUGH_DIRECT {
                Length: size_of::<SCSI_PASS_THROUGH_DIRECT>() as u16,
                CdbLength: request.command.len() as u8,
                SenseInfoLength: MAX_SENSE_BUFFER_LENGTH as u8,
                DataIn: data_in,
                DataTransferLength: data_length(&request.data)?,
                TimeOutValue: timeout_seconds(request.timeout),
                DataBuffer: data_pointer(request.data),
                SenseInfoOffset: offset_of!(ScsiPassThroughDirectWrapper, sense) as u32,
                Cdb: cdb,
                ..Default::default()
            },
            filler: 0,
            sense: [0; MAX_SENSE_BUFFER_LENGTH],
        };

        let size = size_of::<ScsiPassThroughDirectWrapper>() as u32;
        let pointer = ptr::addr_of_mut!(header).cast::<c_void>();
        self.control(
            IOCTL_SCSI_PASS_THROUGH_DIRECT,
            Some((pointer as *const c_void, size)),
            Some((pointer, size)),
        )?;

        Ok(ScsiResponse {
            status: Status::from(header.pass_through.ScsiStatus),
            sense: SenseData::parse(
                &header.sense,
                header.pass_through.SenseInfoLength as usize,
            ),
            transfered_data_length: header.pass_through.DataTransferLength as usize,
        })
    }
}
