//! Standard INQUIRY data and the Vital Product Data page family.
//!
//! Every VPD page starts with the peripheral byte, the page code and a
//! big-endian page length counting the bytes after the 4-byte header.

pub mod designator;

use crate::{
    bits,
    buffer::{Buffer, BufferMut},
    marshal::{
        marshal_list, marshaled_list_size, unmarshal_list, unmarshal_tagged, Decoder, Family,
        Lookup, Marshal,
    },
};

use self::designator::Designator;

const VPD_HEADER_LENGTH: usize = 4;

pub const SUPPORTED_PAGES: u8 = 0x00;
pub const UNIT_SERIAL_NUMBER: u8 = 0x80;
pub const DEVICE_IDENTIFICATION: u8 = 0x83;
pub const BLOCK_LIMITS: u8 = 0xB0;
pub const BLOCK_DEVICE_CHARACTERISTICS: u8 = 0xB1;

/// Page length of a current Block Limits page.
pub const BLOCK_LIMITS_PAGE_LENGTH: usize = 0x3C;
pub const BLOCK_DEVICE_CHARACTERISTICS_PAGE_LENGTH: usize = 0x3C;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlockLimits {
    pub write_same_non_zero: bool,
    pub maximum_compare_and_write_length: u8,
    pub optimal_transfer_length_granularity: u16,
    pub maximum_transfer_length: u32,
    pub optimal_transfer_length: u32,
    pub maximum_prefetch_length: u32,
    pub maximum_unmap_lba_count: u32,
    pub maximum_unmap_block_descriptor_count: u32,
    pub optimal_unmap_granularity: u32,
    pub unmap_granularity_alignment_valid: bool,
    pub unmap_granularity_alignment: u32,
    pub maximum_write_same_length: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlockDeviceCharacteristics {
    /// 1 for non-rotating media, otherwise revolutions per minute.
    pub medium_rotation_rate: u16,
    pub product_type: u8,
    pub write_after_block_erase_required: u8,
    pub write_after_cryptographic_erase_required: u8,
    pub nominal_form_factor: u8,
    pub zoned: u8,
    pub force_unit_access_behavior: bool,
    pub verify_byte_check_unmapped_lba_supported: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VpdBody {
    SupportedPages(Vec<u8>),
    UnitSerialNumber(String),
    DeviceIdentification(Vec<Designator>),
    /// `page_length` is kept because older devices return shorter pages.
    BlockLimits {
        limits: BlockLimits,
        page_length: u16,
    },
    BlockDeviceCharacteristics {
        characteristics: BlockDeviceCharacteristics,
        page_length: u16,
    },
    Unknown {
        page_code: u8,
        bytes: Vec<u8>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VpdPage {
    pub peripheral_qualifier: u8,
    pub peripheral_device_type: u8,
    pub body: VpdBody,
}

impl VpdPage {
    pub fn page_code(&self) -> u8 {
        match &self.body {
            VpdBody::SupportedPages(_) => SUPPORTED_PAGES,
            VpdBody::UnitSerialNumber(_) => UNIT_SERIAL_NUMBER,
            VpdBody::DeviceIdentification(_) => DEVICE_IDENTIFICATION,
            VpdBody::BlockLimits { .. } => BLOCK_LIMITS,
            VpdBody::BlockDeviceCharacteristics { .. } => BLOCK_DEVICE_CHARACTERISTICS,
            VpdBody::Unknown { page_code, .. } => *page_code,
        }
    }

    fn page_length(&self) -> usize {
        match &self.body {
            VpdBody::SupportedPages(pages) => pages.len(),
            VpdBody::UnitSerialNumber(serial) => serial.len(),
            VpdBody::DeviceIdentification(designators) => marshaled_list_size(designators),
            VpdBody::BlockLimits { page_length, .. }
            | VpdBody::BlockDeviceCharacteristics { page_length, .. } => *page_length as usize,
            VpdBody::Unknown { bytes, .. } => bytes.len(),
        }
    }
}

fn split(buffer: Buffer<'_>) -> crate::Result<(u8, u8, Buffer<'_>)> {
    let peripheral: u8 = buffer.read(0)?;
    let length: u16 = buffer.read_be(2)?;
    let body = buffer.extract_segment(VPD_HEADER_LENGTH, Some(length as usize))?;

    Ok((
        bits::get_masked(peripheral, 5, 0b111),
        bits::get_masked(peripheral, 0, 0x1F),
        body,
    ))
}

fn page(
    buffer: Buffer<'_>,
    decode: fn(Buffer<'_>) -> crate::Result<VpdBody>,
) -> crate::Result<VpdPage> {
    let (peripheral_qualifier, peripheral_device_type, body) = split(buffer)?;
    Ok(VpdPage {
        peripheral_qualifier,
        peripheral_device_type,
        body: decode(body)?,
    })
}

fn supported_pages(buffer: Buffer<'_>) -> crate::Result<VpdPage> {
    page(buffer, |body| Ok(VpdBody::SupportedPages(body.as_bytes().to_vec())))
}

fn unit_serial_number(buffer: Buffer<'_>) -> crate::Result<VpdPage> {
    page(buffer, |body| {
        Ok(VpdBody::UnitSerialNumber(body.to_ascii_string(0, body.len())?))
    })
}

fn device_identification(buffer: Buffer<'_>) -> crate::Result<VpdPage> {
    page(buffer, |body| {
        Ok(VpdBody::DeviceIdentification(unmarshal_list(
            body,
            Lookup::BestEffort,
        )?))
    })
}

/// Reads a big-endian field only when the page is long enough to carry it.
fn optional<T: crate::buffer::Scalar + crate::bits::BigEndian + Default>(
    body: Buffer<'_>,
    offset: usize,
) -> crate::Result<T> {
    if offset + std::mem::size_of::<T>() <= body.len() {
        body.read_be(offset)
    } else {
        Ok(T::default())
    }
}

// Offsets below are relative to the body, four bytes after the page start.
fn block_limits(buffer: Buffer<'_>) -> crate::Result<VpdPage> {
    page(buffer, |body| {
        let alignment: u32 = optional(body, 28)?;
        Ok(VpdBody::BlockLimits {
            limits: BlockLimits {
                write_same_non_zero: bits::get_bit(optional(body, 0)?, 0),
                maximum_compare_and_write_length: optional(body, 1)?,
                optimal_transfer_length_granularity: optional(body, 2)?,
                maximum_transfer_length: optional(body, 4)?,
                optimal_transfer_length: optional(body, 8)?,
                maximum_prefetch_length: optional(body, 12)?,
                maximum_unmap_lba_count: optional(body, 16)?,
                maximum_unmap_block_descriptor_count: optional(body, 20)?,
                optimal_unmap_granularity: optional(body, 24)?,
                unmap_granularity_alignment_valid: alignment >> 31 != 0,
                unmap_granularity_alignment: alignment & 0x7FFF_FFFF,
                maximum_write_same_length: optional(body, 32)?,
            },
            page_length: body.len() as u16,
        })
    })
}

fn block_device_characteristics(buffer: Buffer<'_>) -> crate::Result<VpdPage> {
    page(buffer, |body| {
        let byte_3: u8 = optional(body, 3)?;
        let byte_4: u8 = optional(body, 4)?;
        Ok(VpdBody::BlockDeviceCharacteristics {
            characteristics: BlockDeviceCharacteristics {
                medium_rotation_rate: optional(body, 0)?,
                product_type: optional(body, 2)?,
                write_after_block_erase_required: bits::get_masked(byte_3, 6, 0b11),
                write_after_cryptographic_erase_required: bits::get_masked(byte_3, 4, 0b11),
                nominal_form_factor: bits::get_masked(byte_3, 0, 0x0F),
                zoned: bits::get_masked(byte_4, 4, 0b11),
                force_unit_access_behavior: bits::get_bit(byte_4, 1),
                verify_byte_check_unmapped_lba_supported: bits::get_bit(byte_4, 0),
            },
            page_length: body.len() as u16,
        })
    })
}

fn unknown(buffer: Buffer<'_>) -> crate::Result<VpdPage> {
    let page_code: u8 = buffer.read(1)?;
    let (peripheral_qualifier, peripheral_device_type, body) = split(buffer)?;

    Ok(VpdPage {
        peripheral_qualifier,
        peripheral_device_type,
        body: VpdBody::Unknown {
            page_code,
            bytes: body.as_bytes().to_vec(),
        },
    })
}

impl Marshal for VpdPage {
    /// Pages without a dedicated decoder come back as [`VpdBody::Unknown`].
    fn unmarshal(buffer: Buffer<'_>) -> crate::Result<Self> {
        let length = Self::peek_length(buffer)?;
        if length > buffer.len() {
            return Err(crate::Error::Truncated {
                family: Self::NAME,
                declared: length,
                available: buffer.len(),
            });
        }

        let record = buffer.extract_segment(0, Some(length))?;
        match unmarshal_tagged::<Self>(record, Lookup::BestEffort)? {
            Some(page) => Ok(page),
            None => unknown(record),
        }
    }

    fn marshal(&self, buffer: &mut BufferMut<'_>) -> crate::Result<()> {
        let page_length = self.page_length();
        if page_length > u16::MAX as usize {
            return Err(crate::Error::BadArgument(format!(
                "vpd page of {page_length} bytes does not fit the length field"
            )));
        }

        let peripheral = bits::put_masked(
            bits::put_masked(0, self.peripheral_qualifier, 5, 0b111),
            self.peripheral_device_type,
            0,
            0x1F,
        );
        buffer.write(peripheral, 0)?;
        buffer.write(self.page_code(), 1)?;
        buffer.write_be(page_length as u16, 2)?;

        let mut body = buffer.extract_segment(VPD_HEADER_LENGTH, Some(page_length))?;
        match &self.body {
            VpdBody::SupportedPages(bytes) | VpdBody::Unknown { bytes, .. } => {
                body.copy_from(0, bytes, 0, bytes.len())
            }
            VpdBody::UnitSerialNumber(serial) => body.write_ascii(0, page_length, serial, b' '),
            VpdBody::DeviceIdentification(designators) => {
                marshal_list(designators, &mut body).map(|_| ())
            }
            VpdBody::BlockLimits { limits, .. } => {
                let mut full = [0u8; BLOCK_LIMITS_PAGE_LENGTH];
                let mut view = BufferMut::new(&mut full);
                view.write(bits::set_bit(0, 0, limits.write_same_non_zero), 0)?;
                view.write(limits.maximum_compare_and_write_length, 1)?;
                view.write_be(limits.optimal_transfer_length_granularity, 2)?;
                view.write_be(limits.maximum_transfer_length, 4)?;
                view.write_be(limits.optimal_transfer_length, 8)?;
                view.write_be(limits.maximum_prefetch_length, 12)?;
                view.write_be(limits.maximum_unmap_lba_count, 16)?;
                view.write_be(limits.maximum_unmap_block_descriptor_count, 20)?;
                view.write_be(limits.optimal_unmap_granularity, 24)?;
                view.write_be(
                    (limits.unmap_granularity_alignment_valid as u32) << 31
                        | limits.unmap_granularity_alignment & 0x7FFF_FFFF,
                    28,
                )?;
                view.write_be(limits.maximum_write_same_length, 32)?;
                copy_prefix(&mut body, &full)
            }
            VpdBody::BlockDeviceCharacteristics {
                characteristics: c,
                ..
            } => {
                let mut full = [0u8; BLOCK_DEVICE_CHARACTERISTICS_PAGE_LENGTH];
                let mut view = BufferMut::new(&mut full);
                view.write_be(c.medium_rotation_rate, 0)?;
                view.write(c.product_type, 2)?;
                let byte_3 = bits::put_masked(0, c.write_after_block_erase_required, 6, 0b11);
                let byte_3 =
                    bits::put_masked(byte_3, c.write_after_cryptographic_erase_required, 4, 0b11);
                let byte_3 = bits::put_masked(byte_3, c.nominal_form_factor, 0, 0x0F);
                view.write(byte_3, 3)?;
                let byte_4 = bits::put_masked(0, c.zoned, 4, 0b11);
                let byte_4 = bits::set_bit(byte_4, 1, c.force_unit_access_behavior);
                let byte_4 = bits::set_bit(byte_4, 0, c.verify_byte_check_unmapped_lba_supported);
                view.write(byte_4, 4)?;
                copy_prefix(&mut body, &full)
            }
        }
    }

    fn marshaled_size(&self) -> usize {
        VPD_HEADER_LENGTH + self.page_length()
    }
}

/// Copies as much of a full-length page as the target body holds, zero
/// filling anything past the full layout.
fn copy_prefix(body: &mut BufferMut<'_>, full: &[u8]) -> crate::Result<()> {
    let count = usize::min(body.len(), full.len());
    body.fill(0, body.len(), 0)?;
    body.copy_from(0, full, 0, count)
}

impl Family for VpdPage {
    const NAME: &'static str = "vpd page";

    fn peek_type_code(buffer: Buffer<'_>) -> crate::Result<u16> {
        Ok(buffer.read::<u8>(1)?.into())
    }

    fn peek_length(buffer: Buffer<'_>) -> crate::Result<usize> {
        Ok(VPD_HEADER_LENGTH + buffer.read_be::<u16>(2)? as usize)
    }

    fn decoder(code: u16) -> Option<Decoder<Self>> {
        match code as u8 {
            SUPPORTED_PAGES => Some(supported_pages),
            UNIT_SERIAL_NUMBER => Some(unit_serial_number),
            DEVICE_IDENTIFICATION => Some(device_identification),
            BLOCK_LIMITS => Some(block_limits),
            BLOCK_DEVICE_CHARACTERISTICS => Some(block_device_characteristics),
            _ => None,
        }
    }
}

const STANDARD_INQUIRY_LENGTH: usize = 36;

/// Standard INQUIRY data. Identification strings keep their space padding.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InquiryData {
    pub peripheral_qualifier: u8,
    pub peripheral_device_type: u8,
    pub removable_medium: bool,
    pub version: u8,
    pub normal_aca_supported: bool,
    pub hierarchical_support: bool,
    pub response_data_format: u8,
    /// Bytes 5 to 7, the capability flags.
    pub flags: [u8; 3],
    pub vendor_identification: String,
    pub product_identification: String,
    pub product_revision_level: String,
    /// Everything after the first 36 bytes, up to the declared length.
    pub additional: Vec<u8>,
}

impl InquiryData {
    pub fn vendor(&self) -> &str {
        self.vendor_identification.trim_end()
    }

    pub fn product(&self) -> &str {
        self.product_identification.trim_end()
    }

    pub fn revision(&self) -> &str {
        self.product_revision_level.trim_end()
    }
}

impl Marshal for InquiryData {
    fn unmarshal(buffer: Buffer<'_>) -> crate::Result<Self> {
        let length = buffer.read::<u8>(4)? as usize + 5;
        if length < STANDARD_INQUIRY_LENGTH || length > buffer.len() {
            return Err(crate::Error::Truncated {
                family: "inquiry data",
                declared: length,
                available: buffer.len(),
            });
        }

        let byte_0: u8 = buffer.read(0)?;
        let byte_1: u8 = buffer.read(1)?;
        let byte_3: u8 = buffer.read(3)?;

        Ok(Self {
            peripheral_qualifier: bits::get_masked(byte_0, 5, 0b111),
            peripheral_device_type: bits::get_masked(byte_0, 0, 0x1F),
            removable_medium: bits::get_bit(byte_1, 7),
            version: buffer.read(2)?,
            normal_aca_supported: bits::get_bit(byte_3, 5),
            hierarchical_support: bits::get_bit(byte_3, 4),
            response_data_format: bits::get_masked(byte_3, 0, 0x0F),
            flags: buffer.read_array(5)?,
            vendor_identification: buffer.to_ascii_string(8, 8)?,
            product_identification: buffer.to_ascii_string(16, 16)?,
            product_revision_level: buffer.to_ascii_string(32, 4)?,
            additional: buffer
                .extract_segment(STANDARD_INQUIRY_LENGTH, Some(length - STANDARD_INQUIRY_LENGTH))?
                .as_bytes()
                .to_vec(),
        })
    }

    fn marshal(&self, buffer: &mut BufferMut<'_>) -> crate::Result<()> {
        let size = self.marshaled_size();
        if size - 5 > u8::MAX as usize {
            return Err(crate::Error::BadArgument(format!(
                "inquiry data of {size} bytes does not fit the additional length field"
            )));
        }

        buffer.write(
            bits::put_masked(
                bits::put_masked(0, self.peripheral_qualifier, 5, 0b111),
                self.peripheral_device_type,
                0,
                0x1F,
            ),
            0,
        )?;
        buffer.write(bits::set_bit(0, 7, self.removable_medium), 1)?;
        buffer.write(self.version, 2)?;
        let byte_3 = bits::set_bit(0, 5, self.normal_aca_supported);
        let byte_3 = bits::set_bit(byte_3, 4, self.hierarchical_support);
        buffer.write(bits::put_masked(byte_3, self.response_data_format, 0, 0x0F), 3)?;
        buffer.write((size - 5) as u8, 4)?;
        buffer.copy_from(5, &self.flags, 0, self.flags.len())?;
        buffer.write_ascii(8, 8, &self.vendor_identification, b' ')?;
        buffer.write_ascii(16, 16, &self.product_identification, b' ')?;
        buffer.write_ascii(32, 4, &self.product_revision_level, b' ')?;
        buffer.copy_from(
            STANDARD_INQUIRY_LENGTH,
            &self.additional,
            0,
            self.additional.len(),
        )
    }

    fn marshaled_size(&self) -> usize {
        STANDARD_INQUIRY_LENGTH + self.additional.len()
    }
}
