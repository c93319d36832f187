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

#[derive(Clone, Debug)]
pub struct ModeSelectCommand<'a, T> {
    interface: &'a Scsi<T>,
    page_format: bool,
    saved_pages: bool,
    control: u8,
}

impl<'a, T: ScsiPassThrough> ModeSelectCommand<'a, T> {
    fn new(interface: &'a Scsi<T>) -> Self {
        Self {
            interface,
            page_format: true,
            saved_pages: false,
            control: 0,
        }
    }

    pub fn page_format(&mut self, value: bool) -> &mut Self {
        self.page_format = value;
        self
    }

    pub fn saved_pages(&mut self, value: bool) -> &mut Self {
        self.saved_pages = value;
        self
    }

    pub fn control(&mut self, value: u8) -> &mut Self {
        self.control = value;
        self
    }

    /// Sends `parameters`. The mode data length and every page's PS bit are
    /// reserved here and go out as zero.
    pub fn issue_10(&mut self, parameters: &ModeParameterList) -> crate::Result<()> {
        let mut parameters = parameters.clone();
        for page in &mut parameters.pages {
            page.parameters_saveable = false;
        }

        let mut data_buffer = parameters.to_bytes()?;
        data_buffer[0..2].fill(0);

        bitfield_bound_check!(data_buffer.len(), 16, "parameter list length")?;

        let command_buffer = CommandBuffer10::new()
            .with_operation_code(OPERATION_CODE_10)
            .with_page_format(self.page_format.into())
            .with_saved_pages(self.saved_pages.into())
            .with_parameter_list_length(data_buffer.len() as u16)
            .with_control(self.control);

        self.interface.issue(&ThisCommand {
            command_buffer,
            data_buffer,
        })
    }
}

impl<T: ScsiPassThrough> Scsi<T> {
    pub fn mode_select(&self) -> ModeSelectCommand<'_, T> {
        ModeSelectCommand::new(self)
    }
}

const OPERATION_CODE_10: u8 = 0x55;

#[bitfield]
#[derive(Clone, Copy)]
struct CommandBuffer10 {
    operation_code: B8,
    reserved_0: B3,
    page_format: B1,
    reserved_1: B3,
    saved_pages: B1,
    reserved_2: B40,
    parameter_list_length: B16,
    control: B8,
}

struct ThisCommand {
    command_buffer: CommandBuffer10,
    data_buffer: Vec<u8>,
}

impl Command for ThisCommand {
    type Output = ();

    fn direction(&self) -> DataDirection {
        DataDirection::ToDevice
    }

    fn command(&self) -> Vec<u8> {
        self.command_buffer.into_bytes().to_vec()
    }

    fn data(&self) -> Vec<u8> {
        self.data_buffer.clone()
    }

    fn data_size(&self) -> u32 {
        self.data_buffer.len() as u32
    }

    fn process_result(&self, result: ResultData<'_>) -> crate::Result<()> {
        result.check_common_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mode_page::{Caching, ModePage, ModePageBody},
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
        let scsi = Scsi::with_transport(&mock);

        let mut caching = Caching::default();
        caching.set_write_cache_enabled(true);
        let parameters = ModeParameterList {
            pages: vec![ModePage {
                parameters_saveable: true,
                body: ModePageBody::Caching(caching),
            }],
            ..Default::default()
        };

        scsi.mode_select().saved_pages(true).issue_10(&parameters).unwrap();

        let sent = &mock.sent()[0];
        assert_eq!(sent.len(), 28);
        assert_eq!(sent[0..2], [0, 0]);
        assert_eq!(sent[8..11], [0x08, 0x12, 0x04]);
        assert_eq!(
            mock.commands()[0],
            vec![0x55, 0x11, 0, 0, 0, 0, 0, 0x00, 28, 0x00]
        );
    }
}
