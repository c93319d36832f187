#![allow(dead_code)]

use modular_bitfield_msb::prelude::*;

use crate::{
    command::Command,
    marshal::Marshal,
    mmc::feature::Configuration,
    scsi::{ResultData, Scsi},
    transport::ScsiPassThrough,
    DataDirection,
};

const DEFAULT_ALLOCATION_LENGTH: u16 = 0xFFF8;

/// Which feature descriptors the drive should return.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum RequestType {
    /// Every feature from the starting feature number on.
    #[default]
    All = 0b00,
    /// Only features with the current bit set.
    Current = 0b01,
    /// Exactly the starting feature.
    One = 0b10,
}

#[derive(Clone, Debug)]
pub struct GetConfigurationCommand<'a, T> {
    interface: &'a Scsi<T>,
    command_buffer: CommandBuffer,
}

impl<'a, T: ScsiPassThrough> GetConfigurationCommand<'a, T> {
    fn new(interface: &'a Scsi<T>) -> Self {
        Self {
            interface,
            command_buffer: CommandBuffer::new()
                .with_operation_code(OPERATION_CODE)
                .with_allocation_length(DEFAULT_ALLOCATION_LENGTH),
        }
    }

    pub fn request_type(&mut self, value: RequestType) -> &mut Self {
        self.command_buffer.set_request_type(value as u8);
        self
    }

    pub fn starting_feature_number(&mut self, value: u16) -> &mut Self {
        self.command_buffer.set_starting_feature_number(value);
        self
    }

    pub fn allocation_length(&mut self, value: u16) -> &mut Self {
        self.command_buffer.set_allocation_length(value);
        self
    }

    pub fn control(&mut self, value: u8) -> &mut Self {
        self.command_buffer.set_control(value);
        self
    }

    pub fn issue(&mut self) -> crate::Result<Configuration> {
        self.interface.issue(&ThisCommand {
            command_buffer: self.command_buffer,
        })
    }
}

impl<T: ScsiPassThrough> Scsi<T> {
    pub fn get_configuration(&self) -> GetConfigurationCommand<'_, T> {
        GetConfigurationCommand::new(self)
    }
}

const OPERATION_CODE: u8 = 0x46;

#[bitfield]
#[derive(Clone, Copy, Debug)]
struct CommandBuffer {
    operation_code: B8,
    reserved_0: B6,
    request_type: B2,
    starting_feature_number: B16,
    reserved_1: B24,
    allocation_length: B16,
    control: B8,
}

struct ThisCommand {
    command_buffer: CommandBuffer,
}

impl Command for ThisCommand {
    type Output = Configuration;

    fn direction(&self) -> DataDirection {
        DataDirection::FromDevice
    }

    fn command(&self) -> Vec<u8> {
        self.command_buffer.into_bytes().to_vec()
    }

    fn data_size(&self) -> u32 {
        self.command_buffer.allocation_length().into()
    }

    fn process_result(&self, result: ResultData<'_>) -> crate::Result<Configuration> {
        result.check_common_error()?;

        Configuration::from_bytes(result.received())
    }
}
