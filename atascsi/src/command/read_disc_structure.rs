#![allow(dead_code)]

use modular_bitfield_msb::prelude::*;

use crate::{
    command::{bitfield_bound_check, Command},
    mmc::disc_structure::{DiscStructure, PHYSICAL_FORMAT},
    scsi::{ResultData, Scsi},
    transport::ScsiPassThrough,
    DataDirection,
};

const DEFAULT_ALLOCATION_LENGTH: u16 = 4100;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum MediaType {
    #[default]
    Dvd = 0b0000,
    BluRay = 0b0001,
}

#[derive(Clone, Debug)]
pub struct ReadDiscStructureCommand<'a, T> {
    interface: &'a Scsi<T>,
    media_type: MediaType,
    address: u32,
    layer_number: u8,
    format: u8,
    authentication_grant_id: u8,
    allocation_length: u16,
    control: u8,
}

impl<'a, T: ScsiPassThrough> ReadDiscStructureCommand<'a, T> {
    fn new(interface: &'a Scsi<T>) -> Self {
        Self {
            interface,
            media_type: MediaType::Dvd,
            address: 0,
            layer_number: 0,
            format: PHYSICAL_FORMAT,
            authentication_grant_id: 0,
            allocation_length: DEFAULT_ALLOCATION_LENGTH,
            control: 0,
        }
    }

    pub fn media_type(&mut self, value: MediaType) -> &mut Self {
        self.media_type = value;
        self
    }

    pub fn address(&mut self, value: u32) -> &mut Self {
        self.address = value;
        self
    }

    pub fn layer_number(&mut self, value: u8) -> &mut Self {
        self.layer_number = value;
        self
    }

    pub fn format(&mut self, value: u8) -> &mut Self {
        self.format = value;
        self
    }

    // authentication_grant_id must be less than 0x04
    pub fn authentication_grant_id(&mut self, value: u8) -> &mut Self {
        self.authentication_grant_id = value;
        self
    }

    pub fn allocation_length(&mut self, value: u16) -> &mut Self {
        self.allocation_length = value;
        self
    }

    pub fn control(&mut self, value: u8) -> &mut Self {
        self.control = value;
        self
    }

    pub fn issue(&mut self) -> crate::Result<DiscStructure> {
        bitfield_bound_check!(self.authentication_grant_id, 2, "authentication grant id")?;

        let command_buffer = CommandBuffer::new()
            .with_operation_code(OPERATION_CODE)
            .with_media_type(self.media_type as u8)
            .with_address(self.address)
            .with_layer_number(self.layer_number)
            .with_format(self.format)
            .with_allocation_length(self.allocation_length)
            .with_authentication_grant_id(self.authentication_grant_id)
            .with_control(self.control);

        self.interface.issue(&ThisCommand {
            command_buffer,
            format: self.format,
        })
    }
}

impl<T: ScsiPassThrough> Scsi<T> {
    pub fn read_disc_structure(&self) -> ReadDiscStructureCommand<'_, T> {
        ReadDiscStructureCommand::new(self)
    }
}

const OPERATION_CODE: u8 = 0xAD;

#[bitfield]
#[derive(Clone, Copy)]
struct CommandBuffer {
    operation_code: B8,
    reserved_0: B4,
    media_type: B4,
    address: B32,
    layer_number: B8,
    format: B8,
    allocation_length: B16,
    authentication_grant_id: B2,
    reserved_1: B6,
    control: B8,
}

struct ThisCommand {
    command_buffer: CommandBuffer,
    format: u8,
}

impl Command for ThisCommand {
    type Output = DiscStructure;

    fn direction(&self) -> DataDirection {
        DataDirection::FromDevice
    }

    fn command(&self) -> Vec<u8> {
        self.command_buffer.into_bytes().to_vec()
    }

    fn data_size(&self) -> u32 {
        self.command_buffer.allocation_length().into()
    }

    fn process_result(&self, result: ResultData<'_>) -> crate::Result<DiscStructure> {
        result.check_common_error()?;

        DiscStructure::decode(self.format, result.received())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{mmc::disc_structure::COPYRIGHT, transport::mock::MockScsi};
    use std::mem::size_of;

    const COMMAND_LENGTH: usize = 12;

    #[test]
    fn layout_test() {
        assert_eq!(
            size_of::<CommandBuffer>(),
            COMMAND_LENGTH,
            concat!("Size of: ", stringify!(CommandBuffer))
        );
    }

    #[test]
    fn issue_test() {
        let mock = MockScsi::default();
        mock.push_data(&[0x00, 0x06, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00]);
        let scsi = Scsi::with_transport(&mock);

        let structure = scsi
            .read_disc_structure()
            .format(COPYRIGHT)
            .layer_number(1)
            .authentication_grant_id(2)
            .issue()
            .unwrap();
        assert!(matches!(structure, DiscStructure::Copyright(c) if c.protection_system_type == 1));

        assert_eq!(
            mock.commands()[0],
            vec![0xAD, 0x00, 0, 0, 0, 0, 0x01, 0x01, 0x10, 0x04, 0x80, 0x00]
        );

        assert!(matches!(
            scsi.read_disc_structure().authentication_grant_id(4).issue(),
            Err(crate::Error::ArgumentOutOfBounds(_))
        ));
    }
}
