#![allow(dead_code)]

use modular_bitfield_msb::prelude::*;

use crate::{
    command::{bitfield_bound_check, Command},
    mmc::performance::{Performance, PERFORMANCE_DATA, WRITE_SPEED},
    scsi::{ResultData, Scsi},
    transport::ScsiPassThrough,
    DataDirection,
};

const HEADER_LENGTH: u32 = 8;
/// The longest descriptor of any kind.
const MAXIMUM_DESCRIPTOR_LENGTH: u32 = 16;
/// Nominal performance within 10%.
const DEFAULT_TOLERANCE: u8 = 0b10;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum ExceptionReporting {
    /// Nominal performance descriptors.
    #[default]
    Nominal = 0b00,
    /// Exceptions over the whole medium.
    Entire = 0b01,
    /// Exceptions from the starting LBA on.
    FromStart = 0b10,
}

#[derive(Clone, Debug)]
pub struct GetPerformanceCommand<'a, T> {
    interface: &'a Scsi<T>,
    performance_type: u8,
    tolerance: u8,
    write: bool,
    exceptions: ExceptionReporting,
    starting_lba: u32,
    maximum_number_of_descriptors: u16,
    control: u8,
}

impl<'a, T: ScsiPassThrough> GetPerformanceCommand<'a, T> {
    fn new(interface: &'a Scsi<T>) -> Self {
        Self {
            interface,
            performance_type: PERFORMANCE_DATA,
            tolerance: DEFAULT_TOLERANCE,
            write: false,
            exceptions: ExceptionReporting::Nominal,
            starting_lba: 0,
            maximum_number_of_descriptors: 32,
            control: 0,
        }
    }

    /// Performance data (00h) or write speed (03h); other types come back raw.
    pub fn performance_type(&mut self, value: u8) -> &mut Self {
        self.performance_type = value;
        self
    }

    // tolerance must be less than 0x04
    pub fn tolerance(&mut self, value: u8) -> &mut Self {
        self.tolerance = value;
        self
    }

    pub fn write(&mut self, value: bool) -> &mut Self {
        self.write = value;
        self
    }

    pub fn exceptions(&mut self, value: ExceptionReporting) -> &mut Self {
        self.exceptions = value;
        self
    }

    pub fn starting_lba(&mut self, value: u32) -> &mut Self {
        self.starting_lba = value;
        self
    }

    pub fn maximum_number_of_descriptors(&mut self, value: u16) -> &mut Self {
        self.maximum_number_of_descriptors = value;
        self
    }

    pub fn control(&mut self, value: u8) -> &mut Self {
        self.control = value;
        self
    }

    pub fn issue(&mut self) -> crate::Result<Performance> {
        bitfield_bound_check!(self.tolerance, 2, "tolerance")?;

        // the data type field only carries flags for performance data
        let data_type = if self.performance_type == PERFORMANCE_DATA {
            DataType::new()
                .with_tolerance(self.tolerance)
                .with_write(self.write.into())
                .with_except(self.exceptions as u8)
                .into_bytes()[0]
        } else {
            0
        };

        let command_buffer = CommandBuffer::new()
            .with_operation_code(OPERATION_CODE)
            .with_data_type(data_type)
            .with_starting_lba(self.starting_lba)
            .with_maximum_number_of_descriptors(self.maximum_number_of_descriptors)
            .with_performance_type(self.performance_type)
            .with_control(self.control);

        self.interface.issue(&ThisCommand {
            command_buffer,
            allocation_length: HEADER_LENGTH
                + self.maximum_number_of_descriptors as u32 * MAXIMUM_DESCRIPTOR_LENGTH,
        })
    }

    /// Shorthand for the write speed descriptors of the current medium.
    pub fn issue_write_speed(&mut self) -> crate::Result<Performance> {
        self.performance_type(WRITE_SPEED).issue()
    }
}

impl<T: ScsiPassThrough> Scsi<T> {
    pub fn get_performance(&self) -> GetPerformanceCommand<'_, T> {
        GetPerformanceCommand::new(self)
    }
}

const OPERATION_CODE: u8 = 0xAC;

#[bitfield]
#[derive(Clone, Copy)]
struct DataType {
    reserved: B3,
    tolerance: B2,
    write: B1,
    except: B2,
}

#[bitfield]
#[derive(Clone, Copy)]
struct CommandBuffer {
    operation_code: B8,
    data_type: B8,
    starting_lba: B32,
    reserved: B16,
    maximum_number_of_descriptors: B16,
    performance_type: B8,
    control: B8,
}

struct ThisCommand {
    command_buffer: CommandBuffer,
    allocation_length: u32,
}

impl Command for ThisCommand {
    type Output = Performance;

    fn direction(&self) -> DataDirection {
        DataDirection::FromDevice
    }

    fn command(&self) -> Vec<u8> {
        self.command_buffer.into_bytes().to_vec()
    }

    fn data_size(&self) -> u32 {
        self.allocation_length
    }

    fn process_result(&self, result: ResultData<'_>) -> crate::Result<Performance> {
        result.check_common_error()?;

        Performance::decode(self.command_buffer.performance_type(), result.received())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{mmc::performance::PerformanceDescriptors, transport::mock::MockScsi};
    use std::mem::size_of;

    const COMMAND_LENGTH: usize = 12;

    #[test]
    fn layout_test() {
        assert_eq!(
            size_of::<CommandBuffer>(),
            COMMAND_LENGTH,
            concat!("Size of: ", stringify!(CommandBuffer))
        );

        assert_eq!(size_of::<DataType>(), 1, concat!("Size of: ", stringify!(DataType)));
    }

    #[test]
    fn exceptions_test() {
        let mock = MockScsi::default();
        mock.push_data(&[
            0x00, 0x00, 0x00, 0x0A, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10, 0x00, 0x00, 0x05,
        ]);
        let scsi = Scsi::with_transport(&mock);

        let performance = scsi
            .get_performance()
            .exceptions(ExceptionReporting::Entire)
            .maximum_number_of_descriptors(4)
            .issue()
            .unwrap();
        assert!(matches!(
            performance.descriptors,
            PerformanceDescriptors::Exceptions(ref e) if e.len() == 1 && e[0].time == 5
        ));

        assert_eq!(
            mock.commands()[0],
            vec![0xAC, 0x11, 0, 0, 0, 0, 0, 0, 0x00, 0x04, 0x00, 0x00]
        );
    }

    #[test]
    fn write_speed_test() {
        let mock = MockScsi::default();
        mock.push_data(&[0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x00]);
        let scsi = Scsi::with_transport(&mock);

        let performance = scsi.get_performance().write(true).issue_write_speed().unwrap();
        assert_eq!(performance.descriptors, PerformanceDescriptors::WriteSpeed(vec![]));

        let command = &mock.commands()[0];
        assert_eq!(command[1], 0x00);
        assert_eq!(command[10], 0x03);
    }
}
