#![allow(dead_code)]

use modular_bitfield_msb::prelude::*;

use crate::{
    command::Command,
    mmc::toc::{Toc, TocFormat},
    scsi::{ResultData, Scsi},
    transport::ScsiPassThrough,
    DataDirection,
};

const DEFAULT_ALLOCATION_LENGTH: u16 = 0xFFFE;

#[derive(Clone, Debug)]
pub struct ReadTocCommand<'a, T> {
    interface: &'a Scsi<T>,
    format: TocFormat,
    msf: bool,
    track_session_number: u8,
    allocation_length: u16,
    control: u8,
}

impl<'a, T: ScsiPassThrough> ReadTocCommand<'a, T> {
    fn new(interface: &'a Scsi<T>) -> Self {
        Self {
            interface,
            format: TocFormat::Formatted,
            msf: false,
            track_session_number: 0,
            allocation_length: DEFAULT_ALLOCATION_LENGTH,
            control: 0,
        }
    }

    pub fn format(&mut self, value: TocFormat) -> &mut Self {
        self.format = value;
        self
    }

    /// Report addresses as minute/second/frame instead of LBA.
    pub fn msf(&mut self, value: bool) -> &mut Self {
        self.msf = value;
        self
    }

    /// First track (formatted TOC) or session (raw TOC) to report.
    pub fn track_session_number(&mut self, value: u8) -> &mut Self {
        self.track_session_number = value;
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

    pub fn issue(&mut self) -> crate::Result<Toc> {
        let command_buffer = CommandBuffer::new()
            .with_operation_code(OPERATION_CODE)
            .with_msf(self.msf.into())
            .with_format(self.format as u8)
            .with_track_session_number(self.track_session_number)
            .with_allocation_length(self.allocation_length)
            .with_control(self.control);

        self.interface.issue(&ThisCommand {
            command_buffer,
            format: self.format,
            msf: self.msf,
        })
    }
}

impl<T: ScsiPassThrough> Scsi<T> {
    pub fn read_toc(&self) -> ReadTocCommand<'_, T> {
        ReadTocCommand::new(self)
    }
}

const OPERATION_CODE: u8 = 0x43;

#[bitfield]
#[derive(Clone, Copy)]
struct CommandBuffer {
    operation_code: B8,
    reserved_0: B6,
    msf: B1,
    reserved_1: B1,
    reserved_2: B4,
    format: B4,
    reserved_3: B24,
    track_session_number: B8,
    allocation_length: B16,
    control: B8,
}

struct ThisCommand {
    command_buffer: CommandBuffer,
    format: TocFormat,
    msf: bool,
}

impl Command for ThisCommand {
    type Output = Toc;

    fn direction(&self) -> DataDirection {
        DataDirection::FromDevice
    }

    fn command(&self) -> Vec<u8> {
        self.command_buffer.into_bytes().to_vec()
    }

    fn data_size(&self) -> u32 {
        self.command_buffer.allocation_length().into()
    }

    fn process_result(&self, result: ResultData<'_>) -> crate::Result<Toc> {
        result.check_common_error()?;

        Toc::decode(self.format, self.msf, result.received())
    }
}
