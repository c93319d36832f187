#![allow(dead_code)]

//! ATA commands carried inside SCSI ATA PASS-THROUGH(16) (SAT).
//!
//! CK_COND is always set so the translation layer returns the post-command
//! registers in an ATA Status Return sense descriptor.

use modular_bitfield_msb::prelude::*;
use tracing::trace;

use crate::{
    ata::task_file::{AtaStatus, TaskFile},
    scsi::{sense::AtaStatusReturn, Scsi, Status},
    transport::{AtaFlags, AtaPassThrough, AtaRequest, ScsiPassThrough, ScsiRequest},
    DataDirection,
};

/// Determines the protocol the SAT layer should use when talking to the ATA device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum AtaProtocol {
    /// Device Management - ATA hardware reset
    HardwareReset = 0x00,
    /// Device Management - ATA software reset
    SoftwareReset = 0x01,
    /// Non-Data
    NonData = 0x03,
    /// PIO Data-In
    PioDataIn = 0x04,
    /// PIO Data-Out
    PioDataOut = 0x05,
    /// DMA
    Dma = 0x06,
    /// Execute Device Diagnostic
    ExecuteDeviceDiagnostic = 0x08,
    /// Non-data command - Device Reset
    DeviceReset = 0x09,
    /// UDMA Data In
    UdmaDataIn = 0x0A,
    /// UDMA Data Out
    UdmaDataOut = 0x0B,
    /// NCQ (see SATA 3.3)
    Ncq = 0x0C,
    /// Return Response Information
    ReturnResponseInformation = 0x0F,
}

impl AtaProtocol {
    pub fn for_flags(flags: AtaFlags) -> Self {
        let dma = flags.contains(AtaFlags::USE_DMA);

        if flags.contains(AtaFlags::DATA_IN) {
            if dma {
                AtaProtocol::Dma
            } else {
                AtaProtocol::PioDataIn
            }
        } else if flags.contains(AtaFlags::DATA_OUT) {
            if dma {
                AtaProtocol::Dma
            } else {
                AtaProtocol::PioDataOut
            }
        } else {
            AtaProtocol::NonData
        }
    }
}

const OPERATION_CODE_16: u8 = 0x85;
const SAT_BLOCK_SIZE: usize = 512;

#[bitfield]
#[derive(Clone, Copy)]
struct CommandBuffer16 {
    operation_code: B8,
    obsolete_0: B3,
    protocol: B4,
    extend: B1,
    off_line: B2,
    ck_cond: B1,
    t_type: B1,
    t_dir: B1,
    byte_block: B1,
    t_length: B2,
    features_high: B8,
    features_low: B8,
    count_high: B8,
    count_low: B8,
    lba_3: B8,
    lba_0: B8,
    lba_4: B8,
    lba_1: B8,
    lba_5: B8,
    lba_2: B8,
    device: B8,
    command: B8,
    control: B8,
}

fn command_buffer(
    current: &TaskFile,
    previous: &TaskFile,
    flags: AtaFlags,
    direction: DataDirection,
    data_length: usize,
) -> CommandBuffer16 {
    let extend = flags.contains(AtaFlags::EXTENDED_COMMAND);
    let high = if extend { *previous } else { TaskFile::default() };

    // transfer length from the count field, in 512 byte blocks unless the
    // buffer says the device uses another logical sector size
    let (t_dir, t_length, byte_block) = match direction {
        DataDirection::None => (0, 0b00, 0),
        DataDirection::ToDevice => (0, 0b10, 1),
        DataDirection::FromDevice => (1, 0b10, 1),
    };
    let count = current.sector_count() as usize | (high.sector_count() as usize) << 8;
    let t_type = (direction != DataDirection::None && count * SAT_BLOCK_SIZE != data_length) as u8;

    CommandBuffer16::new()
        .with_operation_code(OPERATION_CODE_16)
        .with_protocol(AtaProtocol::for_flags(flags) as u8)
        .with_extend(extend.into())
        .with_ck_cond(1)
        .with_t_type(t_type)
        .with_t_dir(t_dir)
        .with_byte_block(byte_block)
        .with_t_length(t_length)
        .with_features_low(current.features())
        .with_features_high(high.features())
        .with_count_low(current.sector_count())
        .with_count_high(high.sector_count())
        .with_lba_0(current.sector_number())
        .with_lba_1(current.cylinder_low())
        .with_lba_2(current.cylinder_high())
        .with_lba_3(high.sector_number())
        .with_lba_4(high.cylinder_low())
        .with_lba_5(high.cylinder_high())
        .with_device(current.device_head())
        .with_command(current.command())
}

fn registers(status_return: &AtaStatusReturn) -> (TaskFile, TaskFile) {
    let mut current = TaskFile::default();
    current.set_features(status_return.error);
    current.set_sector_count(status_return.count as u8);
    current.set_lba_low24(status_return.lba as u32 & 0xFF_FFFF);
    current.set_device_head(status_return.device);
    current.set_command(status_return.status);

    let mut previous = TaskFile::default();
    if status_return.extend {
        previous.set_sector_count((status_return.count >> 8) as u8);
        previous.set_lba_low24((status_return.lba >> 24) as u32);
    }

    (current, previous)
}

impl<T: ScsiPassThrough> AtaPassThrough for Scsi<T> {
    fn execute(&self, request: AtaRequest<'_>) -> crate::Result<(TaskFile, TaskFile)> {
        let AtaRequest {
            current,
            previous,
            data,
            flags,
            timeout,
        } = request;

        let direction = data.direction();
        let data_length = data.len();
        let command = command_buffer(&current, &previous, flags, direction, data_length)
            .into_bytes();

        let response = self.transport().execute(ScsiRequest {
            command: &command,
            data,
            timeout,
        })?;

        let (current, previous) = match response.sense.ata_status_return() {
            Some(status_return) => {
                trace!(?status_return, "ata registers returned through sense data");
                registers(&status_return)
            }
            None => match response.status {
                // a bridge that ignores CK_COND still proves the data phase
                // completed, but the output registers are unknown
                Status::Good if direction != DataDirection::None => {
                    let mut status = TaskFile::default();
                    status.set_command(AtaStatus::DEVICE_READY.bits());
                    (status, TaskFile::default())
                }
                Status::Good => {
                    return Err(crate::Error::Decode(
                        "no ATA status return in the pass-through response".to_owned(),
                    ))
                }
                Status::CheckCondition => return Err(crate::Error::Sense(response.sense)),
                other => return Err(crate::Error::ScsiStatus(other.into())),
            },
        };

        if direction != DataDirection::None
            && current.error() == 0
            && response.transfered_data_length < data_length
        {
            return Err(crate::Error::Truncated {
                family: "ATA pass-through data",
                declared: data_length,
                available: response.transfered_data_length,
            });
        }

        Ok((current, previous))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ata::{device::AtaDevice, smart::SmartStatus, task_file::CommandFrame},
        transport::{mock::MockScsi, DataBuffer},
    };
    use std::{mem::size_of, time::Duration};

    const COMMAND_LENGTH_16: usize = 16;

    #[test]
    fn layout_test() {
        assert_eq!(
            size_of::<CommandBuffer16>(),
            COMMAND_LENGTH_16,
            concat!("Size of: ", stringify!(CommandBuffer16))
        );
    }

    #[test]
    fn read_dma_ext_translation_test() {
        let frame = CommandFrame::lba48(0x25, 0x0000_1122_3344, 2).unwrap();
        let cdb = command_buffer(
            &frame.current,
            &frame.previous,
            AtaFlags::DATA_IN | AtaFlags::USE_DMA | AtaFlags::EXTENDED_COMMAND,
            DataDirection::FromDevice,
            1024,
        )
        .into_bytes();

        assert_eq!(
            cdb,
            [0x85, 0x0D, 0x2E, 0x00, 0x00, 0x00, 0x02, 0x11, 0x44, 0x00, 0x33, 0x00, 0x22, 0x40, 0x25, 0x00]
        );
    }

    #[test]
    fn non_data_translation_test() {
        let frame = CommandFrame::new(0xE7);
        let cdb = command_buffer(
            &frame.current,
            &frame.previous,
            AtaFlags::DRDY_REQUIRED,
            DataDirection::None,
            0,
        )
        .into_bytes();

        assert_eq!(cdb[1], 0x03 << 1);
        assert_eq!(cdb[2], 0x20);
        assert_eq!(cdb[14], 0xE7);
    }

    #[test]
    fn status_return_test() {
        let mock = MockScsi::default();
        mock.push_sense(&[
            0x72, 0x01, 0x00, 0x1D, 0, 0, 0, 14, //
            0x09, 0x0C, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x4F, 0x00, 0xC2, 0x00, 0x50,
        ]);
        let scsi = Scsi::with_transport(&mock);

        let frame = CommandFrame::new(0xB0).with_features(0xDA);
        let request = AtaRequest::new(
            frame.current,
            frame.previous,
            DataBuffer::None,
            AtaFlags::DRDY_REQUIRED,
            Duration::from_secs(1),
        )
        .unwrap();

        let (current, _) = scsi.execute(request).unwrap();
        assert_eq!(current.cylinder(), 0xC24F);
        assert_eq!(current.error(), 0);
        assert_eq!(current.status(), AtaStatus::DEVICE_READY | AtaStatus::from_bits_retain(0x10));
        assert_eq!(mock.commands()[0][4], 0xDA);
    }

    #[test]
    fn sense_without_registers_test() {
        let mock = MockScsi::default();
        mock.push_sense(&[0x70, 0, 0x05, 0, 0, 0, 0, 10, 0, 0, 0, 0, 0x20, 0x00, 0, 0, 0, 0]);
        let scsi = Scsi::with_transport(&mock);

        let frame = CommandFrame::new(0xE7);
        let request = AtaRequest::new(
            frame.current,
            frame.previous,
            DataBuffer::None,
            AtaFlags::empty(),
            Duration::from_secs(1),
        )
        .unwrap();

        assert!(matches!(scsi.execute(request), Err(crate::Error::Sense(_))));
    }

    fn status_return_sense(cylinder: u16) -> [u8; 22] {
        let [high, low] = cylinder.to_be_bytes();
        [
            0x72, 0x01, 0x00, 0x1D, 0, 0, 0, 14, //
            0x09, 0x0C, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, low, 0x00, high, 0x00, 0x50,
        ]
    }

    #[test]
    fn good_without_registers_test() {
        let mock = MockScsi::default();
        let device = AtaDevice::with_transport(Scsi::with_transport(&mock));

        assert!(matches!(
            device.smart_return_status(),
            Err(crate::Error::Decode(_))
        ));
    }

    #[test]
    fn good_without_registers_data_in_test() {
        let mock = MockScsi::default();
        mock.push_data(&[0x5A; 512]);
        let scsi = Scsi::with_transport(&mock);

        let frame = CommandFrame::lba28(0x20, 7, 1).unwrap();
        let mut data = [0u8; 512];
        let request = AtaRequest::new(
            frame.current,
            frame.previous,
            DataBuffer::FromDevice(&mut data),
            AtaFlags::DATA_IN | AtaFlags::DRDY_REQUIRED,
            Duration::from_secs(1),
        )
        .unwrap();

        let (current, previous) = scsi.execute(request).unwrap();
        assert_eq!(current.error(), 0);
        assert_eq!(current.lba_low24(), 0);
        assert_eq!(previous, TaskFile::default());
        assert_eq!(data, [0x5A; 512]);
    }

    #[test]
    fn smart_status_through_bridge_test() {
        let mock = MockScsi::default();
        mock.push_sense(&status_return_sense(0x2CF4));
        let device = AtaDevice::with_transport(Scsi::with_transport(&mock));

        assert_eq!(
            device.smart_return_status().unwrap(),
            SmartStatus::ThresholdExceeded
        );
    }

    #[test]
    fn short_data_in_test() {
        let mock = MockScsi::default();
        mock.push_sense(&status_return_sense(0));
        let scsi = Scsi::with_transport(&mock);

        let frame = CommandFrame::lba28(0x20, 0, 1).unwrap();
        let mut data = [0xEEu8; 512];
        let request = AtaRequest::new(
            frame.current,
            frame.previous,
            DataBuffer::FromDevice(&mut data),
            AtaFlags::DATA_IN | AtaFlags::DRDY_REQUIRED,
            Duration::from_secs(1),
        )
        .unwrap();

        assert!(matches!(
            scsi.execute(request),
            Err(crate::Error::Truncated {
                declared: 512,
                available: 0,
                ..
            })
        ));
    }
}
