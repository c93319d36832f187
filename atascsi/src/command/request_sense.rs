#![allow(dead_code)]

use modular_bitfield_msb::prelude::*;

use crate::{
    command::Command,
    scsi::{
        sense::{SenseData, MAX_SENSE_BUFFER_LENGTH},
        ResultData, Scsi,
    },
    transport::ScsiPassThrough,
    DataDirection,
};

#[derive(Clone, Debug)]
pub struct RequestSenseCommand<'a, T> {
    interface: &'a Scsi<T>,
    command_buffer: CommandBuffer,
}

impl<'a, T: ScsiPassThrough> RequestSenseCommand<'a, T> {
    fn new(interface: &'a Scsi<T>) -> Self {
        Self {
            interface,
            command_buffer: CommandBuffer::new()
                .with_operation_code(OPERATION_CODE)
                .with_allocation_length(MAX_SENSE_BUFFER_LENGTH as u8),
        }
    }

    pub fn descriptor_format(&mut self, value: bool) -> &mut Self {
        self.command_buffer.set_descriptor_format(value.into());
        self
    }

    pub fn allocation_length(&mut self, value: u8) -> &mut Self {
        self.command_buffer.set_allocation_length(value);
        self
    }

    pub fn control(&mut self, value: u8) -> &mut Self {
        self.command_buffer.set_control(value);
        self
    }

    pub fn issue(&mut self) -> crate::Result<SenseData> {
        self.interface.issue(&ThisCommand {
            command_buffer: self.command_buffer,
        })
    }
}

impl<T: ScsiPassThrough> Scsi<T> {
    pub fn request_sense(&self) -> RequestSenseCommand<'_, T> {
        RequestSenseCommand::new(self)
    }
}

const OPERATION_CODE: u8 = 0x03;

#[bitfield]
#[derive(Clone, Copy, Debug)]
struct CommandBuffer {
    operation_code: B8,
    reserved_0: B7,
    descriptor_format: B1,
    reserved_1: B16,
    allocation_length: B8,
    control: B8,
}

struct ThisCommand {
    command_buffer: CommandBuffer,
}

impl Command for ThisCommand {
    type Output = SenseData;

    fn direction(&self) -> DataDirection {
        DataDirection::FromDevice
    }

    fn command(&self) -> Vec<u8> {
        self.command_buffer.into_bytes().to_vec()
    }

    fn data_size(&self) -> u32 {
        self.command_buffer.allocation_length().into()
    }

    fn process_result(&self, result: ResultData<'_>) -> crate::Result<SenseData> {
        result.check_common_error()?;

        Ok(SenseData::parse(result.received(), result.transfered_data_length))
    }
}
