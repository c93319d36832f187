#![allow(dead_code)]

use modular_bitfield_msb::prelude::*;

use crate::{
    command::{bitfield_bound_check, Command},
    marshal::Marshal,
    mode_page::ModeParameterList,
    scsi::{ResultData, Scsi},
    transport::ScsiPassThrough,
    DataDirection,
};

/// Requests every supported page.
pub const ALL_PAGES: u8 = 0x3F;

const DEFAULT_ALLOCATION_LENGTH: u16 = 4096;

#[derive(Clone, Debug)]
pub struct ModeSenseCommand<'a, T> {
    interface: &'a Scsi<T>,
    long_lba_accepted: bool,
    disable_block_descriptors: bool,
    page_control: PageControl,
    page_code: u8,
    subpage_code: u8,
    allocation_length: u16,
    control: u8,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum PageControl {
    #[default]
    Current = 0b00,
    Changeable = 0b01,
    Default = 0b10,
    Saved = 0b11,
}

impl<'a, T: ScsiPassThrough> ModeSenseCommand<'a, T> {
    fn new(interface: &'a Scsi<T>) -> Self {
        Self {
            interface,
            long_lba_accepted: false,
            disable_block_descriptors: false,
            page_control: PageControl::Current,
            page_code: ALL_PAGES,
            subpage_code: 0,
            allocation_length: DEFAULT_ALLOCATION_LENGTH,
            control: 0,
        }
    }

    pub fn long_lba_accepted(&mut self, value: bool) -> &mut Self {
        self.long_lba_accepted = value;
        self
    }

    pub fn disable_block_descriptors(&mut self, value: bool) -> &mut Self {
        self.disable_block_descriptors = value;
        self
    }

    pub fn page_control(&mut self, value: PageControl) -> &mut Self {
        self.page_control = value;
        self
    }

    // page_code must be less than 0x40
    pub fn page_code(&mut self, value: u8) -> &mut Self {
        self.page_code = value;
        self
    }

    pub fn subpage_code(&mut self, value: u8) -> &mut Self {
        self.subpage_code = value;
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

    pub fn issue_10(&mut self) -> crate::Result<ModeParameterList> {
        bitfield_bound_check!(self.page_code, 6, "page code")?;

        let command_buffer = CommandBuffer10::new()
            .with_operation_code(OPERATION_CODE_10)
            .with_long_lba_accepted(self.long_lba_accepted.into())
            .with_disable_block_descriptors(self.disable_block_descriptors.into())
            .with_page_control(self.page_control as u8)
            .with_page_code(self.page_code)
            .with_subpage_code(self.subpage_code)
            .with_allocation_length(self.allocation_length)
            .with_control(self.control);

        self.interface.issue(&ThisCommand { command_buffer })
    }
}

impl<T: ScsiPassThrough> Scsi<T> {
    pub fn mode_sense(&self) -> ModeSenseCommand<'_, T> {
        ModeSenseCommand::new(self)
    }
}

const OPERATION_CODE_10: u8 = 0x5A;

#[bitfield]
#[derive(Clone, Copy)]
struct CommandBuffer10 {
    operation_code: B8,
    reserved_0: B3,
    long_lba_accepted: B1,
    disable_block_descriptors: B1,
    reserved_1: B3,
    page_control: B2,
    page_code: B6,
    subpage_code: B8,
    reserved_2: B24,
    allocation_length: B16,
    control: B8,
}

struct ThisCommand {
    command_buffer: CommandBuffer10,
}

impl Command for ThisCommand {
    type Output = ModeParameterList;

    fn direction(&self) -> DataDirection {
        DataDirection::FromDevice
    }

    fn command(&self) -> Vec<u8> {
        self.command_buffer.into_bytes().to_vec()
    }

    fn data_size(&self) -> u32 {
        self.command_buffer.allocation_length().into()
    }

    fn process_result(&self, result: ResultData<'_>) -> crate::Result<ModeParameterList> {
        result.check_common_error()?;

        ModeParameterList::from_bytes(result.received())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mode_page::{ModePageBody, CACHING},
        transport::mock::MockScsi,
    };
    use std::mem::size_of;

    const COMMAND_LENGTH_10: usize = 10;

    #[test]
    fn layout_test() {
        assert_eq!(
            size_of::<CommandBuffer10>(),
            COMMAND_LENGTH_10,
            concat!("Size of: ", stringify!(CommandBuffer10))
        );
    }

    #[test]
    fn issue_test() {
        let mock = MockScsi::default();
        let mut data = vec![0x00, 0x1A, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
        data.extend_from_slice(&[0x08, 0x12, 0x04]);
        data.resize(28, 0);
        mock.push_data(&data);
        let scsi = Scsi::with_transport(&mock);

        let list = scsi
            .mode_sense()
            .page_code(CACHING)
            .page_control(PageControl::Changeable)
            .disable_block_descriptors(true)
            .issue_10()
            .unwrap();
        let ModePageBody::Caching(caching) = &list.page(CACHING).unwrap().body else {
            panic!("unexpected list {list:?}");
        };
        assert!(caching.write_cache_enabled());

        assert_eq!(
            mock.commands()[0],
            vec![0x5A, 0x08, 0x48, 0x00, 0, 0, 0, 0x10, 0x00, 0x00]
        );
    }

    #[test]
    fn page_code_bound_test() {
        let mock = MockScsi::default();
        let scsi = Scsi::with_transport(&mock);

        assert!(matches!(
            scsi.mode_sense().page_code(0x40).issue_10(),
            Err(crate::Error::ArgumentOutOfBounds(_))
        ));
    }
}
