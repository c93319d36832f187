pub mod sat;
pub mod sense;

use std::time::Duration;

use tracing::debug;

use crate::{
    command::Command,
    scsi::sense::SenseData,
    transport::{DataBuffer, ScsiPassThrough, ScsiRequest},
    DataDirection,
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(60_000);

/// A SCSI or MMC logical unit reached through `T`.
#[derive(Debug)]
pub struct Scsi<T> {
    transport: T,
    timeout: Duration,
}

impl<T> Scsi<T> {
    pub fn with_transport(transport: T) -> Self {
        Self {
            transport,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl<T: ScsiPassThrough> Scsi<T> {
    pub fn issue<C: Command>(&self, command: &C) -> crate::Result<C::Output> {
        let command_buffer = command.command();
        let mut data_buffer = command.data();
        data_buffer.resize(command.data_size() as usize, 0);

        let data = match (command.direction(), data_buffer.is_empty()) {
            (_, true) | (DataDirection::None, _) => DataBuffer::None,
            (DataDirection::FromDevice, false) => DataBuffer::FromDevice(&mut data_buffer),
            (DataDirection::ToDevice, false) => DataBuffer::ToDevice(&data_buffer),
        };

        debug!(
            operation_code = command_buffer.first().copied().unwrap_or_default(),
            data_length = data.len(),
            direction = ?data.direction(),
            "issuing scsi command"
        );

        let response = self.transport.execute(ScsiRequest {
            command: &command_buffer,
            data,
            timeout: self.timeout,
        })?;

        command.process_result(ResultData {
            transfered_data_length: usize::min(response.transfered_data_length, data_buffer.len()),
            data: &mut data_buffer,
            sense_buffer: &response.sense,
            status: response.status,
        })
    }
}

#[cfg(target_os = "linux")]
impl Scsi<crate::transport::sg::SgDevice> {
    pub fn new<P: AsRef<std::path::Path> + ?Sized>(path: &P) -> crate::Result<Self> {
        Ok(Self::with_transport(crate::transport::sg::SgDevice::open(
            path,
        )?))
    }

    pub fn new_readonly<P: AsRef<std::path::Path> + ?Sized>(path: &P) -> crate::Result<Self> {
        Ok(Self::with_transport(
            crate::transport::sg::SgDevice::open_readonly(path)?,
        ))
    }
}

#[cfg(target_os = "windows")]
impl Scsi<crate::transport::windows::WindowsDevice> {
    pub fn new<P: AsRef<std::path::Path> + ?Sized>(path: &P) -> crate::Result<Self> {
        Ok(Self::with_transport(
            crate::transport::windows::WindowsDevice::open(path)?,
        ))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Good,
    CheckCondition,
    ConditionMet,
    Busy,
    ReservationConflict,
    TaskSetFull,
    AcaActive,
    TaskAborted,
    Other(u8),
}

impl From<u8> for Status {
    fn from(value: u8) -> Self {
        match value {
            0x00 => Status::Good,
            0x02 => Status::CheckCondition,
            0x04 => Status::ConditionMet,
            0x08 => Status::Busy,
            0x18 => Status::ReservationConflict,
            0x28 => Status::TaskSetFull,
            0x30 => Status::AcaActive,
            0x40 => Status::TaskAborted,
            other => Status::Other(other),
        }
    }
}

impl From<Status> for u8 {
    fn from(value: Status) -> Self {
        match value {
            Status::Good => 0x00,
            Status::CheckCondition => 0x02,
            Status::ConditionMet => 0x04,
            Status::Busy => 0x08,
            Status::ReservationConflict => 0x18,
            Status::TaskSetFull => 0x28,
            Status::AcaActive => 0x30,
            Status::TaskAborted => 0x40,
            Status::Other(other) => other,
        }
    }
}

/// What a command sees after the transport returns.
#[derive(Debug)]
pub struct ResultData<'a> {
    pub transfered_data_length: usize,
    pub data: &'a mut Vec<u8>,
    pub sense_buffer: &'a SenseData,
    pub status: Status,
}

impl ResultData<'_> {
    pub fn check_common_error(&self) -> crate::Result<()> {
        match self.status {
            Status::Good | Status::ConditionMet => Ok(()),
            Status::CheckCondition => Err(crate::Error::Sense(self.sense_buffer.clone())),
            other => Err(crate::Error::ScsiStatus(other.into())),
        }
    }

    /// The bytes the device actually returned.
    pub fn received(&self) -> &[u8] {
        &self.data[..self.transfered_data_length]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockScsi;

    #[test]
    fn status_test() {
        for code in [0x00, 0x02, 0x04, 0x08, 0x18, 0x28, 0x30, 0x40, 0x22] {
            assert_eq!(u8::from(Status::from(code)), code);
        }
    }

    #[test]
    fn check_condition_test() {
        let mock = MockScsi::default();
        mock.push_sense(&[0x70, 0, 0x05, 0, 0, 0, 0, 10, 0, 0, 0, 0, 0x24, 0x00, 0, 0, 0, 0]);

        let scsi = Scsi::with_transport(&mock);
        let error = scsi.test_unit_ready().issue().unwrap_err();

        match error {
            crate::Error::Sense(sense) => {
                assert_eq!(sense.sense_key(), Some(0x05));
                assert_eq!(sense.additional_sense_code(), Some(0x24));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn status_error_test() {
        let mock = MockScsi::default();
        mock.push_status(0x08);

        let scsi = Scsi::with_transport(&mock);
        assert!(matches!(
            scsi.test_unit_ready().issue(),
            Err(crate::Error::ScsiStatus(0x08))
        ));
    }
}
