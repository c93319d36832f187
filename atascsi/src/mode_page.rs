//! Mode parameter list (10-byte header form) and the mode page family.

use crate::{
    bits,
    buffer::{Buffer, BufferMut},
    marshal::{marshal_list, marshaled_list_size, unmarshal_list, Decoder, Family, Lookup, Marshal},
};

pub const MODE_PARAMETER_HEADER_10_LENGTH: usize = 8;

pub const READ_WRITE_ERROR_RECOVERY: u8 = 0x01;
pub const CACHING: u8 = 0x08;
pub const CD_DVD_CAPABILITIES: u8 = 0x2A;

const READ_WRITE_ERROR_RECOVERY_LENGTH: usize = 0x0A;
const CACHING_LENGTH: usize = 0x12;
const CD_DVD_CAPABILITIES_LEADING_LENGTH: usize = 14;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReadWriteErrorRecovery {
    /// AWRE, ARRE, TB, RC, EER, PER, DTE and DCR, most significant first.
    pub flags: u8,
    pub read_retry_count: u8,
    pub write_retry_count: u8,
    pub recovery_time_limit: u16,
}

impl ReadWriteErrorRecovery {
    pub fn automatic_write_reallocation(&self) -> bool {
        bits::get_bit(self.flags, 7)
    }

    pub fn automatic_read_reallocation(&self) -> bool {
        bits::get_bit(self.flags, 6)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Caching {
    pub flags: u8,
    pub retention_priority: u8,
    pub disable_prefetch_transfer_length: u16,
    pub minimum_prefetch: u16,
    pub maximum_prefetch: u16,
    pub maximum_prefetch_ceiling: u16,
    pub flags_2: u8,
    pub number_of_cache_segments: u8,
    pub cache_segment_size: u16,
}

impl Caching {
    pub fn write_cache_enabled(&self) -> bool {
        bits::get_bit(self.flags, 2)
    }

    pub fn set_write_cache_enabled(&mut self, value: bool) {
        self.flags = bits::set_bit(self.flags, 2, value);
    }

    pub fn read_cache_disabled(&self) -> bool {
        bits::get_bit(self.flags, 0)
    }
}

/// The leading, stable part of the MM capabilities page. The remainder, which
/// differs between MMC revisions, is kept raw.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CdDvdCapabilities {
    pub read_capabilities: u8,
    pub write_capabilities: u8,
    pub capabilities: [u8; 4],
    pub maximum_read_speed: u16,
    pub number_of_volume_levels: u16,
    pub buffer_size: u16,
    pub tail: Vec<u8>,
}

impl CdDvdCapabilities {
    pub fn dvd_ram_read(&self) -> bool {
        bits::get_bit(self.read_capabilities, 5)
    }

    pub fn dvd_r_read(&self) -> bool {
        bits::get_bit(self.read_capabilities, 4)
    }

    pub fn dvd_rom_read(&self) -> bool {
        bits::get_bit(self.read_capabilities, 3)
    }

    pub fn cd_rw_read(&self) -> bool {
        bits::get_bit(self.read_capabilities, 1)
    }

    pub fn dvd_r_write(&self) -> bool {
        bits::get_bit(self.write_capabilities, 4)
    }

    pub fn cd_r_write(&self) -> bool {
        bits::get_bit(self.write_capabilities, 0)
    }

    /// Buffer size in KiB.
    pub fn buffer_size_kib(&self) -> u16 {
        self.buffer_size
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModePageBody {
    ReadWriteErrorRecovery(ReadWriteErrorRecovery),
    Caching(Caching),
    CdDvdCapabilities(CdDvdCapabilities),
    Unknown {
        page_code: u8,
        /// Set for the sub-page format with its 16-bit page length.
        subpage_code: Option<u8>,
        bytes: Vec<u8>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModePage {
    pub parameters_saveable: bool,
    pub body: ModePageBody,
}

impl ModePage {
    pub fn new(body: ModePageBody) -> Self {
        Self {
            parameters_saveable: false,
            body,
        }
    }

    pub fn page_code(&self) -> u8 {
        match &self.body {
            ModePageBody::ReadWriteErrorRecovery(_) => READ_WRITE_ERROR_RECOVERY,
            ModePageBody::Caching(_) => CACHING,
            ModePageBody::CdDvdCapabilities(_) => CD_DVD_CAPABILITIES,
            ModePageBody::Unknown { page_code, .. } => *page_code,
        }
    }

    fn header_length(&self) -> usize {
        match &self.body {
            ModePageBody::Unknown {
                subpage_code: Some(_),
                ..
            } => 4,
            _ => 2,
        }
    }

    fn page_length(&self) -> usize {
        match &self.body {
            ModePageBody::ReadWriteErrorRecovery(_) => READ_WRITE_ERROR_RECOVERY_LENGTH,
            ModePageBody::Caching(_) => CACHING_LENGTH,
            ModePageBody::CdDvdCapabilities(page) => {
                CD_DVD_CAPABILITIES_LEADING_LENGTH - 2 + page.tail.len()
            }
            ModePageBody::Unknown { bytes, .. } => bytes.len(),
        }
    }
}

fn sub_page_format(byte_0: u8) -> bool {
    bits::get_bit(byte_0, 6)
}

/// Checks the page is at least as long as its fixed layout and returns the
/// parameters saveable bit with the body that follows the 2-byte header.
fn split(buffer: Buffer<'_>, minimum: usize) -> crate::Result<(bool, Buffer<'_>)> {
    let byte_0: u8 = buffer.read(0)?;
    let length: u8 = buffer.read(1)?;
    if (length as usize) < minimum {
        return Err(crate::Error::Decode(format!(
            "mode page {:#04x} of {length} bytes, at least {minimum} expected",
            bits::get_masked(byte_0, 0, 0x3F)
        )));
    }

    Ok((
        bits::get_bit(byte_0, 7),
        buffer.extract_segment(2, Some(length as usize))?,
    ))
}

fn read_write_error_recovery(buffer: Buffer<'_>) -> crate::Result<ModePage> {
    let (parameters_saveable, body) = split(buffer, READ_WRITE_ERROR_RECOVERY_LENGTH)?;
    Ok(ModePage {
        parameters_saveable,
        body: ModePageBody::ReadWriteErrorRecovery(ReadWriteErrorRecovery {
            flags: body.read(0)?,
            read_retry_count: body.read(1)?,
            write_retry_count: body.read(6)?,
            recovery_time_limit: body.read_be(8)?,
        }),
    })
}

fn caching(buffer: Buffer<'_>) -> crate::Result<ModePage> {
    let (parameters_saveable, body) = split(buffer, CACHING_LENGTH)?;
    Ok(ModePage {
        parameters_saveable,
        body: ModePageBody::Caching(Caching {
            flags: body.read(0)?,
            retention_priority: body.read(1)?,
            disable_prefetch_transfer_length: body.read_be(2)?,
            minimum_prefetch: body.read_be(4)?,
            maximum_prefetch: body.read_be(6)?,
            maximum_prefetch_ceiling: body.read_be(8)?,
            flags_2: body.read(10)?,
            number_of_cache_segments: body.read(11)?,
            cache_segment_size: body.read_be(12)?,
        }),
    })
}

fn cd_dvd_capabilities(buffer: Buffer<'_>) -> crate::Result<ModePage> {
    let (parameters_saveable, body) = split(buffer, CD_DVD_CAPABILITIES_LEADING_LENGTH - 2)?;
    Ok(ModePage {
        parameters_saveable,
        body: ModePageBody::CdDvdCapabilities(CdDvdCapabilities {
            read_capabilities: body.read(0)?,
            write_capabilities: body.read(1)?,
            capabilities: body.read_array(2)?,
            maximum_read_speed: body.read_be(6)?,
            number_of_volume_levels: body.read_be(8)?,
            buffer_size: body.read_be(10)?,
            tail: body
                .extract_segment(CD_DVD_CAPABILITIES_LEADING_LENGTH - 2, None)?
                .as_bytes()
                .to_vec(),
        }),
    })
}

fn unknown(buffer: Buffer<'_>) -> crate::Result<ModePage> {
    let byte_0: u8 = buffer.read(0)?;
    let (subpage_code, body) = if sub_page_format(byte_0) {
        let length: u16 = buffer.read_be(2)?;
        (
            Some(buffer.read(1)?),
            buffer.extract_segment(4, Some(length as usize))?,
        )
    } else {
        let length: u8 = buffer.read(1)?;
        (None, buffer.extract_segment(2, Some(length as usize))?)
    };

    Ok(ModePage {
        parameters_saveable: bits::get_bit(byte_0, 7),
        body: ModePageBody::Unknown {
            page_code: bits::get_masked(byte_0, 0, 0x3F),
            subpage_code,
            bytes: body.as_bytes().to_vec(),
        },
    })
}

impl Marshal for ModePage {
    fn unmarshal(buffer: Buffer<'_>) -> crate::Result<Self> {
        let length = Self::peek_length(buffer)?;
        let record = buffer.extract_segment(0, Some(length))?;
        let code = Self::peek_type_code(record)?;

        match Self::decoder(code) {
            Some(decoder) => decoder(record),
            None => unknown(record),
        }
    }

    fn marshal(&self, buffer: &mut BufferMut<'_>) -> crate::Result<()> {
        let page_length = self.page_length();
        let byte_0 = bits::put_masked(
            bits::set_bit(0, 7, self.parameters_saveable),
            self.page_code(),
            0,
            0x3F,
        );

        if let ModePageBody::Unknown {
            subpage_code: Some(subpage_code),
            ..
        } = &self.body
        {
            if page_length > u16::MAX as usize {
                return Err(crate::Error::BadArgument(format!(
                    "mode sub-page of {page_length} bytes does not fit the length field"
                )));
            }
            buffer.write(bits::set_bit(byte_0, 6, true), 0)?;
            buffer.write(*subpage_code, 1)?;
            buffer.write_be(page_length as u16, 2)?;
        } else {
            if page_length > u8::MAX as usize {
                return Err(crate::Error::BadArgument(format!(
                    "mode page of {page_length} bytes does not fit the length field"
                )));
            }
            buffer.write(byte_0, 0)?;
            buffer.write(page_length as u8, 1)?;
        }

        let mut body = buffer.extract_segment(self.header_length(), Some(page_length))?;
        body.fill(0, page_length, 0)?;
        match &self.body {
            ModePageBody::ReadWriteErrorRecovery(page) => {
                body.write(page.flags, 0)?;
                body.write(page.read_retry_count, 1)?;
                body.write(page.write_retry_count, 6)?;
                body.write_be(page.recovery_time_limit, 8)
            }
            ModePageBody::Caching(page) => {
                body.write(page.flags, 0)?;
                body.write(page.retention_priority, 1)?;
                body.write_be(page.disable_prefetch_transfer_length, 2)?;
                body.write_be(page.minimum_prefetch, 4)?;
                body.write_be(page.maximum_prefetch, 6)?;
                body.write_be(page.maximum_prefetch_ceiling, 8)?;
                body.write(page.flags_2, 10)?;
                body.write(page.number_of_cache_segments, 11)?;
                body.write_be(page.cache_segment_size, 12)
            }
            ModePageBody::CdDvdCapabilities(page) => {
                body.write(page.read_capabilities, 0)?;
                body.write(page.write_capabilities, 1)?;
                body.copy_from(2, &page.capabilities, 0, page.capabilities.len())?;
                body.write_be(page.maximum_read_speed, 6)?;
                body.write_be(page.number_of_volume_levels, 8)?;
                body.write_be(page.buffer_size, 10)?;
                body.copy_from(12, &page.tail, 0, page.tail.len())
            }
            ModePageBody::Unknown { bytes, .. } => body.copy_from(0, bytes, 0, bytes.len()),
        }
    }

    fn marshaled_size(&self) -> usize {
        self.header_length() + self.page_length()
    }
}

impl Family for ModePage {
    const NAME: &'static str = "mode page";

    /// Sub-page formatted pages carry bit 8 so they never match a page-0
    /// decoder.
    fn peek_type_code(buffer: Buffer<'_>) -> crate::Result<u16> {
        let byte_0: u8 = buffer.read(0)?;
        let code = bits::get_masked(byte_0, 0, 0x3F) as u16;
        if sub_page_format(byte_0) {
            Ok(0x100 | code)
        } else {
            Ok(code)
        }
    }

    fn peek_length(buffer: Buffer<'_>) -> crate::Result<usize> {
        let byte_0: u8 = buffer.read(0)?;
        if sub_page_format(byte_0) {
            Ok(4 + buffer.read_be::<u16>(2)? as usize)
        } else {
            Ok(2 + buffer.read::<u8>(1)? as usize)
        }
    }

    fn decoder(code: u16) -> Option<Decoder<Self>> {
        match code {
            0x01 => Some(read_write_error_recovery),
            0x08 => Some(caching),
            0x2A => Some(cd_dvd_capabilities),
            _ => Some(unknown),
        }
    }
}

/// MODE SENSE(10) / MODE SELECT(10) parameter data.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModeParameterList {
    pub medium_type: u8,
    pub device_specific_parameter: u8,
    pub long_lba: bool,
    /// Block descriptors, kept raw.
    pub block_descriptors: Vec<u8>,
    pub pages: Vec<ModePage>,
}

impl ModeParameterList {
    pub fn page(&self, page_code: u8) -> Option<&ModePage> {
        self.pages.iter().find(|p| p.page_code() == page_code)
    }

    pub fn write_protected(&self) -> bool {
        bits::get_bit(self.device_specific_parameter, 7)
    }
}

impl Marshal for ModeParameterList {
    fn unmarshal(buffer: Buffer<'_>) -> crate::Result<Self> {
        let length = buffer.read_be::<u16>(0)? as usize + 2;
        if length < MODE_PARAMETER_HEADER_10_LENGTH || length > buffer.len() {
            return Err(crate::Error::Truncated {
                family: "mode parameter list",
                declared: length,
                available: buffer.len(),
            });
        }

        let block_descriptor_length = buffer.read_be::<u16>(6)? as usize;
        let pages_offset = MODE_PARAMETER_HEADER_10_LENGTH + block_descriptor_length;
        if pages_offset > length {
            return Err(crate::Error::Truncated {
                family: "mode parameter list",
                declared: pages_offset,
                available: length,
            });
        }
        let pages = buffer.extract_segment(pages_offset, Some(length - pages_offset))?;

        Ok(Self {
            medium_type: buffer.read(2)?,
            device_specific_parameter: buffer.read(3)?,
            long_lba: bits::get_bit(buffer.read(4)?, 0),
            block_descriptors: buffer
                .extract_segment(MODE_PARAMETER_HEADER_10_LENGTH, Some(block_descriptor_length))?
                .as_bytes()
                .to_vec(),
            pages: unmarshal_list(pages, Lookup::Strict)?,
        })
    }

    fn marshal(&self, buffer: &mut BufferMut<'_>) -> crate::Result<()> {
        let size = self.marshaled_size();
        if size - 2 > u16::MAX as usize {
            return Err(crate::Error::BadArgument(format!(
                "mode parameter list of {size} bytes does not fit the length field"
            )));
        }

        buffer.write_be((size - 2) as u16, 0)?;
        buffer.write(self.medium_type, 2)?;
        buffer.write(self.device_specific_parameter, 3)?;
        buffer.write(bits::set_bit(0, 0, self.long_lba), 4)?;
        buffer.write(0u8, 5)?;
        buffer.write_be(self.block_descriptors.len() as u16, 6)?;
        buffer.copy_from(
            MODE_PARAMETER_HEADER_10_LENGTH,
            &self.block_descriptors,
            0,
            self.block_descriptors.len(),
        )?;

        let offset = MODE_PARAMETER_HEADER_10_LENGTH + self.block_descriptors.len();
        marshal_list(&self.pages, &mut buffer.extract_segment(offset, None)?)?;
        Ok(())
    }

    fn marshaled_size(&self) -> usize {
        MODE_PARAMETER_HEADER_10_LENGTH + self.block_descriptors.len() + marshaled_list_size(&self.pages)
    }
}
