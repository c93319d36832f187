#![allow(dead_code)]

use modular_bitfield_msb::prelude::*;

use crate::{
    command::Command,
    marshal::Marshal,
    scsi::{ResultData, Scsi},
    transport::ScsiPassThrough,
    vpd::{InquiryData, VpdPage},
    DataDirection,
};

/// Largest standard INQUIRY response the additional length field can describe.
const STANDARD_ALLOCATION_LENGTH: u16 = u8::MAX as u16 + 5;
const VPD_ALLOCATION_LENGTH: u16 = 4096;

#[derive(Clone, Debug)]
pub struct InquiryCommand<'a, T> {
    interface: &'a Scsi<T>,
    command_buffer: CommandBuffer,
    allocation_length: Option<u16>,
}

impl<'a, T: ScsiPassThrough> InquiryCommand<'a, T> {
    fn new(interface: &'a Scsi<T>) -> Self {
        Self {
            interface,
            command_buffer: CommandBuffer::new().with_operation_code(OPERATION_CODE),
            allocation_length: None,
        }
    }

    /// Overrides the default allocation length. A response longer than this
    /// fails to decode.
    pub fn allocation_length(&mut self, value: u16) -> &mut Self {
        self.allocation_length = Some(value);
        self
    }

    pub fn control(&mut self, value: u8) -> &mut Self {
        self.command_buffer.set_control(value);
        self
    }

    pub fn issue(&mut self) -> crate::Result<InquiryData> {
        let bytes = self.issue_raw(None)?;
        InquiryData::from_bytes(&bytes)
    }

    /// Requests one vital product data page.
    pub fn issue_vpd(&mut self, page_code: u8) -> crate::Result<VpdPage> {
        let bytes = self.issue_raw(Some(page_code))?;
        let page = VpdPage::from_bytes(&bytes)?;

        if page.page_code() != page_code {
            return Err(crate::Error::Decode(format!(
                "requested vpd page {page_code:#04x}, device returned {:#04x}",
                page.page_code()
            )));
        }

        Ok(page)
    }

    /// The response bytes as received.
    pub fn issue_raw(&mut self, page_code: Option<u8>) -> crate::Result<Vec<u8>> {
        let allocation_length = self.allocation_length.unwrap_or(match page_code {
            Some(_) => VPD_ALLOCATION_LENGTH,
            None => STANDARD_ALLOCATION_LENGTH,
        });

        self.interface.issue(&ThisCommand {
            command_buffer: self
                .command_buffer
                .with_enable_vital_product_data(page_code.is_some().into())
                .with_page_code(page_code.unwrap_or(0))
                .with_allocation_length(allocation_length),
        })
    }
}

impl<T: ScsiPassThrough> Scsi<T> {
    pub fn inquiry(&self) -> InquiryCommand<'_, T> {
        InquiryCommand::new(self)
    }
}

const OPERATION_CODE: u8 = 0x12;

#[bitfield]
#[derive(Clone, Copy, Debug)]
struct CommandBuffer {
    operation_code: B8,
    reserved: B6,
    obsolete_command_support_data: B1,
    enable_vital_product_data: B1,
    page_code: B8,
    allocation_length: B16,
    control: B8,
}

struct ThisCommand {
    command_buffer: CommandBuffer,
}

impl Command for ThisCommand {
    type Output = Vec<u8>;

    fn direction(&self) -> DataDirection {
        DataDirection::FromDevice
    }

    fn command(&self) -> Vec<u8> {
        self.command_buffer.into_bytes().to_vec()
    }

    fn data_size(&self) -> u32 {
        self.command_buffer.allocation_length().into()
    }

    fn process_result(&self, result: ResultData<'_>) -> crate::Result<Vec<u8>> {
        result.check_common_error()?;

        Ok(result.received().to_vec())
    }
}
