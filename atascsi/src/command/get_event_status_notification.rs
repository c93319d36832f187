#![allow(dead_code)]

use modular_bitfield_msb::prelude::*;

use crate::{
    command::Command,
    mmc::event::{EventClasses, EventStatus},
    scsi::{ResultData, Scsi},
    transport::ScsiPassThrough,
    DataDirection,
};

/// Header plus the largest event descriptor.
const DEFAULT_ALLOCATION_LENGTH: u16 = 8;

/// Polls for the highest priority pending event among the requested classes.
#[derive(Clone, Debug)]
pub struct GetEventStatusNotificationCommand<'a, T> {
    interface: &'a Scsi<T>,
    command_buffer: CommandBuffer,
}

impl<'a, T: ScsiPassThrough> GetEventStatusNotificationCommand<'a, T> {
    fn new(interface: &'a Scsi<T>) -> Self {
        Self {
            interface,
            command_buffer: CommandBuffer::new()
                .with_operation_code(OPERATION_CODE)
                .with_polled(1)
                .with_allocation_length(DEFAULT_ALLOCATION_LENGTH),
        }
    }

    /// An empty set asks only for the supported classes.
    pub fn notification_class_request(&mut self, value: EventClasses) -> &mut Self {
        self.command_buffer
            .set_notification_class_request(value.bits());
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

    pub fn issue(&mut self) -> crate::Result<EventStatus> {
        self.interface.issue(&ThisCommand {
            command_buffer: self.command_buffer,
        })
    }
}

impl<T: ScsiPassThrough> Scsi<T> {
    pub fn get_event_status_notification(&self) -> GetEventStatusNotificationCommand<'_, T> {
        GetEventStatusNotificationCommand::new(self)
    }
}

const OPERATION_CODE: u8 = 0x4A;

#[bitfield]
#[derive(Clone, Copy, Debug)]
struct CommandBuffer {
    operation_code: B8,
    reserved_0: B7,
    polled: B1,
    reserved_1: B16,
    notification_class_request: B8,
    reserved_2: B16,
    allocation_length: B16,
    control: B8,
}

struct ThisCommand {
    command_buffer: CommandBuffer,
}

impl Command for ThisCommand {
    type Output = EventStatus;

    fn direction(&self) -> DataDirection {
        DataDirection::FromDevice
    }

    fn command(&self) -> Vec<u8> {
        self.command_buffer.into_bytes().to_vec()
    }

    fn data_size(&self) -> u32 {
        self.command_buffer.allocation_length().into()
    }

    fn process_result(&self, result: ResultData<'_>) -> crate::Result<EventStatus> {
        result.check_common_error()?;

        EventStatus::decode(result.received())
    }
}
