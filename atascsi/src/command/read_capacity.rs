#![allow(dead_code)]

use modular_bitfield_msb::prelude::*;

use crate::{
    command::Command,
    scsi::{ResultData, Scsi},
    transport::ScsiPassThrough,
    DataDirection,
};

#[derive(Clone, Debug)]
pub struct ReadCapacityCommand<'a, T> {
    interface: &'a Scsi<T>,
    control: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadCapacity10Result {
    pub returned_logical_block_address: u32,
    pub block_length_in_bytes: u32,
}

impl ReadCapacity10Result {
    /// `true` when the medium is too large for the 10-byte form and READ
    /// CAPACITY(16) must be used.
    pub fn exceeds_32_bits(&self) -> bool {
        self.returned_logical_block_address == u32::MAX
    }

    pub fn capacity_in_bytes(&self) -> u64 {
        (self.returned_logical_block_address as u64 + 1) * self.block_length_in_bytes as u64
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadCapacity16Result {
    pub returned_logical_block_address: u64,
    pub logical_block_length_in_bytes: u32,
    pub protection_type: u8,
    pub protection_enabled: bool,
    pub logical_blocks_per_physical_block_exponent: u8,
    pub logical_block_provisioning_management_enabled: bool,
    pub logical_block_provisioning_read_zeros: bool,
    pub lowest_aligned_logical_block_address: u16,
}

impl ReadCapacity16Result {
    pub fn physical_block_length_in_bytes(&self) -> u64 {
        (self.logical_block_length_in_bytes as u64) << self.logical_blocks_per_physical_block_exponent
    }
}

impl<'a, T: ScsiPassThrough> ReadCapacityCommand<'a, T> {
    fn new(interface: &'a Scsi<T>) -> Self {
        Self {
            interface,
            control: 0,
        }
    }

    pub fn control(&mut self, value: u8) -> &mut Self {
        self.control = value;
        self
    }

    pub fn issue_10(&mut self) -> crate::Result<ReadCapacity10Result> {
        let command_buffer = CommandBuffer10::new()
            .with_operation_code(OPERATION_CODE_10)
            .with_control(self.control);

        let bytes = self.interface.issue(&ThisCommand {
            command: command_buffer.into_bytes().to_vec(),
            data_size: DATA_LENGTH_10,
        })?;
        let result = DataBuffer10::from_bytes(received(bytes)?);

        Ok(ReadCapacity10Result {
            returned_logical_block_address: result.returned_logical_block_address(),
            block_length_in_bytes: result.block_length_in_bytes(),
        })
    }

    pub fn issue_16(&mut self) -> crate::Result<ReadCapacity16Result> {
        let command_buffer = CommandBuffer16::new()
            .with_operation_code(OPERATION_CODE_16)
            .with_service_action(SERVICE_ACTION_16)
            .with_allocation_length(DATA_LENGTH_16 as u32)
            .with_control(self.control);

        let bytes = self.interface.issue(&ThisCommand {
            command: command_buffer.into_bytes().to_vec(),
            data_size: DATA_LENGTH_16,
        })?;
        let result = DataBuffer16::from_bytes(received(bytes)?);

        Ok(ReadCapacity16Result {
            returned_logical_block_address: result.returned_logical_block_address(),
            logical_block_length_in_bytes: result.logical_block_length_in_bytes(),
            protection_type: result.protection_type(),
            protection_enabled: result.protection_enabled() != 0,
            logical_blocks_per_physical_block_exponent: result
                .logical_blocks_per_physical_block_exponent(),
            logical_block_provisioning_management_enabled: result
                .logical_block_provisioning_management_enabled()
                != 0,
            logical_block_provisioning_read_zeros: result.logical_block_provisioning_read_zeros()
                != 0,
            lowest_aligned_logical_block_address: result.lowest_aligned_logical_block_address(),
        })
    }
}

impl<T: ScsiPassThrough> Scsi<T> {
    pub fn read_capacity(&self) -> ReadCapacityCommand<'_, T> {
        ReadCapacityCommand::new(self)
    }
}

/// The full parameter data, or `Truncated` when the device sent less.
fn received<const N: usize>(bytes: Vec<u8>) -> crate::Result<[u8; N]> {
    let available = bytes.len();
    bytes.try_into().map_err(|_| crate::Error::Truncated {
        family: "read capacity data",
        declared: N,
        available,
    })
}

const OPERATION_CODE_10: u8 = 0x25;
const OPERATION_CODE_16: u8 = 0x9E;
const SERVICE_ACTION_16: u8 = 0x10;
const DATA_LENGTH_10: usize = 8;
const DATA_LENGTH_16: usize = 32;

#[bitfield]
#[derive(Clone, Copy)]
struct CommandBuffer10 {
    operation_code: B8,
    reserved_0: B7,
    obsolete: B1,
    logical_block_address: B32,
    reserved_1: B16,
    reserved_2: B7,
    pmi: B1,
    control: B8,
}

#[bitfield]
#[derive(Clone, Copy)]
struct CommandBuffer16 {
    operation_code: B8,
    reserved_0: B3,
    service_action: B5,
    logical_block_address: B64,
    allocation_length: B32,
    reserved_1: B7,
    pmi: B1,
    control: B8,
}

#[bitfield]
#[derive(Clone, Copy)]
struct DataBuffer10 {
    returned_logical_block_address: B32,
    block_length_in_bytes: B32,
}

#[bitfield]
#[derive(Clone, Copy)]
struct DataBuffer16 {
    returned_logical_block_address: B64,
    logical_block_length_in_bytes: B32,
    reserved_0: B4,
    protection_type: B3,
    protection_enabled: B1,
    p_i_exponent: B4,
    logical_blocks_per_physical_block_exponent: B4,
    logical_block_provisioning_management_enabled: B1,
    logical_block_provisioning_read_zeros: B1,
    lowest_aligned_logical_block_address: B14,
    reserved_1: B128,
}

struct ThisCommand {
    command: Vec<u8>,
    data_size: usize,
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
        self.data_size as u32
    }

    fn process_result(&self, result: ResultData<'_>) -> crate::Result<Vec<u8>> {
        result.check_common_error()?;

        Ok(result.received().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockScsi;
    use std::mem::size_of;

    const COMMAND_LENGTH_10: usize = 10;
    const COMMAND_LENGTH_16: usize = 16;

    #[test]
    fn layout_test() {
        assert_eq!(
            size_of::<CommandBuffer10>(),
            COMMAND_LENGTH_10,
            concat!("Size of: ", stringify!(CommandBuffer10))
        );

        assert_eq!(
            size_of::<CommandBuffer16>(),
            COMMAND_LENGTH_16,
            concat!("Size of: ", stringify!(CommandBuffer16))
        );

        assert_eq!(
            size_of::<DataBuffer10>(),
            DATA_LENGTH_10,
            concat!("Size of: ", stringify!(DataBuffer10))
        );

        assert_eq!(
            size_of::<DataBuffer16>(),
            DATA_LENGTH_16,
            concat!("Size of: ", stringify!(DataBuffer16))
        );
    }

    #[test]
    fn issue_10_test() {
        let mock = MockScsi::default();
        mock.push_data(&[0x00, 0x23, 0x05, 0x3F, 0x00, 0x00, 0x08, 0x00]);
        let scsi = Scsi::with_transport(&mock);

        let result = scsi.read_capacity().issue_10().unwrap();
        assert_eq!(result.returned_logical_block_address, 0x0023_053F);
        assert_eq!(result.block_length_in_bytes, 2048);
        assert_eq!(result.capacity_in_bytes(), 0x0023_0540 * 2048);
        assert!(!result.exceeds_32_bits());
        assert_eq!(mock.commands()[0], vec![0x25, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn issue_16_test() {
        let mock = MockScsi::default();
        let mut data = vec![
            0x00, 0x00, 0x00, 0x01, 0xD1, 0xC0, 0xBE, 0xAF, 0x00, 0x00, 0x02, 0x00, 0x00, 0x03,
            0xC0, 0x00,
        ];
        data.resize(32, 0);
        mock.push_data(&data);
        let scsi = Scsi::with_transport(&mock);

        let result = scsi.read_capacity().issue_16().unwrap();
        assert_eq!(result.returned_logical_block_address, 0x0001_D1C0_BEAF);
        assert_eq!(result.logical_block_length_in_bytes, 512);
        assert_eq!(result.logical_blocks_per_physical_block_exponent, 3);
        assert_eq!(result.physical_block_length_in_bytes(), 4096);
        assert!(result.logical_block_provisioning_management_enabled);
        assert!(result.logical_block_provisioning_read_zeros);

        let command = &mock.commands()[0];
        assert_eq!(command[0..2], [0x9E, 0x10]);
        assert_eq!(command[10..14], [0, 0, 0, 32]);
    }

    #[test]
    fn short_data_test() {
        let mock = MockScsi::default();
        mock.push_data(&[0x00, 0x23, 0x05, 0x3F]);
        let scsi = Scsi::with_transport(&mock);

        assert!(matches!(
            scsi.read_capacity().issue_10(),
            Err(crate::Error::Truncated {
                declared: 8,
                available: 4,
                ..
            })
        ));
    }
}
