#![allow(dead_code)]

use modular_bitfield_msb::prelude::*;
use tracing::debug;

use crate::{
    command::{bitfield_bound_check, Command},
    scsi::{ResultData, Scsi},
    transport::ScsiPassThrough,
    DataDirection,
};

/// READ(10), READ(12) and READ(16) of whole logical blocks.
#[derive(Clone, Debug)]
pub struct ReadCommand<'a, T> {
    interface: &'a Scsi<T>,
    control: u8,
    group_number: u8,
    disable_page_out: bool,
    force_unit_access: bool,
    streaming: bool,
    logical_block_address: u64,
    transfer_length: u32,
    logical_block_size: u32,
}

impl<'a, T: ScsiPassThrough> ReadCommand<'a, T> {
    fn new(interface: &'a Scsi<T>) -> Self {
        Self {
            interface,
            control: 0,
            group_number: 0,
            disable_page_out: false,
            force_unit_access: false,
            streaming: false,
            logical_block_address: 0,
            transfer_length: 0,
            logical_block_size: 512,
        }
    }

    pub fn control(&mut self, value: u8) -> &mut Self {
        self.control = value;
        self
    }

    // group_number must be less than 0x40 for read(16) or less than 0x20 for others
    pub fn group_number(&mut self, value: u8) -> &mut Self {
        self.group_number = value;
        self
    }

    pub fn disable_page_out(&mut self, value: bool) -> &mut Self {
        self.disable_page_out = value;
        self
    }

    pub fn force_unit_access(&mut self, value: bool) -> &mut Self {
        self.force_unit_access = value;
        self
    }

    /// Stream playback on optical drives, READ(12) only.
    pub fn streaming(&mut self, value: bool) -> &mut Self {
        self.streaming = value;
        self
    }

    pub fn logical_block_address(&mut self, value: u64) -> &mut Self {
        self.logical_block_address = value;
        self
    }

    pub fn transfer_length(&mut self, value: u32) -> &mut Self {
        self.transfer_length = value;
        self
    }

    /// 512 unless set; 2048 for optical media.
    pub fn logical_block_size(&mut self, value: u32) -> &mut Self {
        self.logical_block_size = value;
        self
    }

    fn check(
        &self,
        group_number_bits: u32,
        logical_block_address_bits: u32,
        transfer_length_bits: u32,
    ) -> crate::Result<u32> {
        bitfield_bound_check!(self.group_number, group_number_bits, "group number")?;
        bitfield_bound_check!(
            self.logical_block_address,
            logical_block_address_bits,
            "logical block address"
        )?;
        bitfield_bound_check!(
            self.transfer_length,
            transfer_length_bits,
            "transfer length"
        )?;

        let total = self.transfer_length as u64 * self.logical_block_size as u64;
        bitfield_bound_check!(total, 32, "total transfer bytes")?;

        if self.streaming && transfer_length_bits != 32 {
            return Err(crate::Error::BadArgument(
                "streaming is only defined for read(12)".to_owned(),
            ));
        }

        Ok(total as u32)
    }

    pub fn issue_10(&mut self) -> crate::Result<Vec<u8>> {
        let allocation_length = self.check(5, 32, 16)?;

        let command_buffer = CommandBuffer10::new()
            .with_operation_code(OPERATION_CODE_10)
            .with_disable_page_out(self.disable_page_out.into())
            .with_force_unit_access(self.force_unit_access.into())
            .with_logical_block_address(self.logical_block_address as u32)
            .with_group_number(self.group_number)
            .with_transfer_length(self.transfer_length as u16)
            .with_control(self.control);

        self.submit(command_buffer.into_bytes().to_vec(), allocation_length)
    }

    pub fn issue_12(&mut self) -> crate::Result<Vec<u8>> {
        let allocation_length = self.check(5, 32, 32)?;

        let command_buffer = CommandBuffer12::new()
            .with_operation_code(OPERATION_CODE_12)
            .with_disable_page_out(self.disable_page_out.into())
            .with_force_unit_access(self.force_unit_access.into())
            .with_logical_block_address(self.logical_block_address as u32)
            .with_transfer_length(self.transfer_length)
            .with_streaming(self.streaming.into())
            .with_group_number(self.group_number)
            .with_control(self.control);

        self.submit(command_buffer.into_bytes().to_vec(), allocation_length)
    }

    pub fn issue_16(&mut self) -> crate::Result<Vec<u8>> {
        let allocation_length = self.check(6, 64, 32)?;

        let command_buffer = CommandBuffer16::new()
            .with_operation_code(OPERATION_CODE_16)
            .with_disable_page_out(self.disable_page_out.into())
            .with_force_unit_access(self.force_unit_access.into())
            .with_logical_block_address(self.logical_block_address)
            .with_transfer_length(self.transfer_length)
            .with_group_number(self.group_number)
            .with_control(self.control);

        self.submit(command_buffer.into_bytes().to_vec(), allocation_length)
    }

    fn submit(&self, command: Vec<u8>, allocation_length: u32) -> crate::Result<Vec<u8>> {
        debug!(
            lba = self.logical_block_address,
            blocks = self.transfer_length,
            "scsi read"
        );

        self.interface.issue(&ThisCommand {
            command,
            allocation_length,
        })
    }
}

impl<T: ScsiPassThrough> Scsi<T> {
    pub fn read(&self) -> ReadCommand<'_, T> {
        ReadCommand::new(self)
    }
}

const OPERATION_CODE_10: u8 = 0x28;
const OPERATION_CODE_12: u8 = 0xA8;
const OPERATION_CODE_16: u8 = 0x88;

#[bitfield]
#[derive(Clone, Copy)]
struct CommandBuffer10 {
    operation_code: B8,
    read_protect: B3,
    disable_page_out: B1,
    force_unit_access: B1,
    rebuild_assist_recovery_control: B1,
    obsolete: B2,
    logical_block_address: B32,
    reserved: B3,
    group_number: B5,
    transfer_length: B16,
    control: B8,
}

#[bitfield]
#[derive(Clone, Copy)]
struct CommandBuffer12 {
    operation_code: B8,
    read_protect: B3,
    disable_page_out: B1,
    force_unit_access: B1,
    rebuild_assist_recovery_control: B1,
    obsolete: B2,
    logical_block_address: B32,
    transfer_length: B32,
    streaming: B1,
    reserved: B2,
    group_number: B5,
    control: B8,
}

#[bitfield]
#[derive(Clone, Copy)]
struct CommandBuffer16 {
    operation_code: B8,
    read_protect: B3,
    disable_page_out: B1,
    force_unit_access: B1,
    rebuild_assist_recovery_control: B1,
    obsolete: B1,
    dld_2: B1,
    logical_block_address: B64,
    transfer_length: B32,
    dld_1: B1,
    dld_0: B1,
    group_number: B6,
    control: B8,
}

struct ThisCommand {
    command: Vec<u8>,
    allocation_length: u32,
}

impl Command for ThisCommand {
    type Output = Vec<u8>;

    fn direction(&self) -> DataDirection {
        DataDirection::FromDevice
    }

    fn command(&self) -> Vec<u8> {
        self.command.clone()
    }

    fn data_size(&self) -> u32 {
        self.allocation_length
    }

    fn process_result(&self, result: ResultData<'_>) -> crate::Result<Vec<u8>> {
        result.check_common_error()?;

        if result.transfered_data_length != self.allocation_length as usize {
            return Err(crate::Error::Truncated {
                family: "read data",
                declared: self.allocation_length as usize,
                available: result.transfered_data_length,
            });
        }

        Ok(std::mem::take(result.data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockScsi;
    use std::mem::size_of;

    const COMMAND_LENGTH_10: usize = 10;
    const COMMAND_LENGTH_12: usize = 12;
    const COMMAND_LENGTH_16: usize = 16;

    #[test]
    fn layout_test() {
        assert_eq!(
            size_of::<CommandBuffer10>(),
            COMMAND_LENGTH_10,
            concat!("Size of: ", stringify!(CommandBuffer10))
        );

        assert_eq!(
            size_of::<CommandBuffer12>(),
            COMMAND_LENGTH_12,
            concat!("Size of: ", stringify!(CommandBuffer12))
        );

        assert_eq!(
            size_of::<CommandBuffer16>(),
            COMMAND_LENGTH_16,
            concat!("Size of: ", stringify!(CommandBuffer16))
        );
    }

    #[test]
    fn read_10_test() {
        let mock = MockScsi::default();
        mock.push_data(&[0xA5; 2048]);
        let scsi = Scsi::with_transport(&mock);

        let data = scsi
            .read()
            .logical_block_address(0x10)
            .transfer_length(1)
            .logical_block_size(2048)
            .issue_10()
            .unwrap();
        assert_eq!(data, vec![0xA5; 2048]);
        assert_eq!(
            mock.commands()[0],
            vec![0x28, 0, 0, 0, 0, 0x10, 0, 0, 1, 0]
        );
    }

    #[test]
    fn read_12_streaming_test() {
        let mock = MockScsi::default();
        mock.push_data(&[0; 4096]);
        let scsi = Scsi::with_transport(&mock);

        scsi.read()
            .transfer_length(2)
            .logical_block_size(2048)
            .streaming(true)
            .issue_12()
            .unwrap();
        assert_eq!(mock.commands()[0][10], 0x80);

        assert!(matches!(
            scsi.read().streaming(true).issue_10(),
            Err(crate::Error::BadArgument(_))
        ));
    }

    #[test]
    fn read_16_test() {
        let mock = MockScsi::default();
        mock.push_data(&[0; 512]);
        let scsi = Scsi::with_transport(&mock);

        scsi.read()
            .logical_block_address(0x1_0000_0000)
            .transfer_length(1)
            .force_unit_access(true)
            .issue_16()
            .unwrap();

        let command = &mock.commands()[0];
        assert_eq!(command[0..2], [0x88, 0x08]);
        assert_eq!(command[2..10], [0, 0, 0, 1, 0, 0, 0, 0]);
        assert_eq!(command[10..14], [0, 0, 0, 1]);
    }

    #[test]
    fn bounds_test() {
        let mock = MockScsi::default();
        let scsi = Scsi::with_transport(&mock);

        assert!(matches!(
            scsi.read().logical_block_address(0x1_0000_0000).issue_10(),
            Err(crate::Error::ArgumentOutOfBounds(_))
        ));
        assert!(matches!(
            scsi.read().transfer_length(0x1_0000).issue_10(),
            Err(crate::Error::ArgumentOutOfBounds(_))
        ));
        assert!(mock.commands().is_empty());
    }

    #[test]
    fn short_transfer_test() {
        let mock = MockScsi::default();
        mock.push_data(&[0; 100]);
        let scsi = Scsi::with_transport(&mock);

        assert!(matches!(
            scsi.read().transfer_length(1).issue_10(),
            Err(crate::Error::Truncated {
                declared: 512,
                available: 100,
                ..
            })
        ));
    }
}
