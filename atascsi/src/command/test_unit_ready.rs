#![allow(dead_code)]

use modular_bitfield_msb::prelude::*;

use crate::{
    command::Command,
    scsi::{ResultData, Scsi},
    transport::ScsiPassThrough,
    DataDirection,
};

#[derive(Clone, Debug)]
pub struct TestUnitReadyCommand<'a, T> {
    interface: &'a Scsi<T>,
    command_buffer: CommandBuffer,
}

impl<'a, T: ScsiPassThrough> TestUnitReadyCommand<'a, T> {
    fn new(interface: &'a Scsi<T>) -> Self {
        Self {
            interface,
            command_buffer: CommandBuffer::new().with_operation_code(OPERATION_CODE),
        }
    }

    pub fn control(&mut self, value: u8) -> &mut Self {
        self.command_buffer.set_control(value);
        self
    }

    /// Succeeds when the unit can accept medium access commands.
    pub fn issue(&mut self) -> crate::Result<()> {
        self.interface.issue(&ThisCommand {
            command_buffer: self.command_buffer,
        })
    }
}

impl<T: ScsiPassThrough> Scsi<T> {
    pub fn test_unit_ready(&self) -> TestUnitReadyCommand<'_, T> {
        TestUnitReadyCommand::new(self)
    }
}

const OPERATION_CODE: u8 = 0x00;

#[bitfield]
#[derive(Clone, Copy, Debug)]
struct CommandBuffer {
    operation_code: B8,
    reserved: B32,
    control: B8,
}

struct ThisCommand {
    command_buffer: CommandBuffer,
}

impl Command for ThisCommand {
    type Output = ();

    fn direction(&self) -> DataDirection {
        DataDirection::None
    }

    fn command(&self) -> Vec<u8> {
        self.command_buffer.into_bytes().to_vec()
    }

    fn process_result(&self, result: ResultData<'_>) -> crate::Result<()> {
        result.check_common_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockScsi;
    use std::mem::size_of;

    const COMMAND_LENGTH: usize = 6;

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
        let scsi = Scsi::with_transport(&mock);

        scsi.test_unit_ready().control(0x04).issue().unwrap();
        assert_eq!(mock.commands(), vec![vec![0x00, 0, 0, 0, 0, 0x04]]);
    }
}
