//! Designators carried by the Device Identification VPD page.
//!
//! Header layout:
//!
//! | byte | bits 7..4           | bits 3..0       |
//! |------|---------------------|-----------------|
//! | 0    | protocol identifier | code set        |
//! | 1    | PIV, association    | designator type |
//! | 2    | reserved                              |
//! | 3    | designator length                     |

use crate::{
    bits,
    buffer::{Buffer, BufferMut},
    marshal::{unmarshal_tagged, Decoder, Family, Lookup, Marshal},
};

const HEADER_LENGTH: usize = 4;
const T10_VENDOR_ID_LENGTH: usize = 8;

pub const CODE_SET_BINARY: u8 = 0x1;
pub const CODE_SET_ASCII: u8 = 0x2;
pub const CODE_SET_UTF8: u8 = 0x3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Association {
    LogicalUnit,
    TargetPort,
    TargetDevice,
    Reserved,
}

impl Association {
    fn from_bits(value: u8) -> Self {
        match value & 0b11 {
            0 => Association::LogicalUnit,
            1 => Association::TargetPort,
            2 => Association::TargetDevice,
            _ => Association::Reserved,
        }
    }

    fn bits(self) -> u8 {
        match self {
            Association::LogicalUnit => 0,
            Association::TargetPort => 1,
            Association::TargetDevice => 2,
            Association::Reserved => 3,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DesignatorHeader {
    pub protocol_identifier: u8,
    pub code_set: u8,
    pub protocol_identifier_valid: bool,
    pub association: Association,
}

impl Default for DesignatorHeader {
    fn default() -> Self {
        Self {
            protocol_identifier: 0,
            code_set: CODE_SET_BINARY,
            protocol_identifier_valid: false,
            association: Association::LogicalUnit,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DesignatorBody {
    VendorSpecific(Vec<u8>),
    /// `vendor_id` is exactly eight characters, trailing spaces included.
    T10VendorId {
        vendor_id: String,
        vendor_specific: Vec<u8>,
    },
    /// 8, 12 or 16 bytes.
    Eui64(Vec<u8>),
    /// 8 or 16 bytes; the high nibble of the first byte is the NAA format.
    Naa(Vec<u8>),
    RelativeTargetPort(u16),
    TargetPortGroup(u16),
    LogicalUnitGroup(u16),
    Md5LogicalUnit(u128),
    ScsiNameString(String),
}

impl DesignatorBody {
    pub fn designator_type(&self) -> u8 {
        match self {
            DesignatorBody::VendorSpecific(_) => 0x0,
            DesignatorBody::T10VendorId { .. } => 0x1,
            DesignatorBody::Eui64(_) => 0x2,
            DesignatorBody::Naa(_) => 0x3,
            DesignatorBody::RelativeTargetPort(_) => 0x4,
            DesignatorBody::TargetPortGroup(_) => 0x5,
            DesignatorBody::LogicalUnitGroup(_) => 0x6,
            DesignatorBody::Md5LogicalUnit(_) => 0x7,
            DesignatorBody::ScsiNameString(_) => 0x8,
        }
    }

    fn length(&self) -> usize {
        match self {
            DesignatorBody::VendorSpecific(bytes)
            | DesignatorBody::Eui64(bytes)
            | DesignatorBody::Naa(bytes) => bytes.len(),
            DesignatorBody::T10VendorId {
                vendor_specific, ..
            } => T10_VENDOR_ID_LENGTH + vendor_specific.len(),
            DesignatorBody::RelativeTargetPort(_)
            | DesignatorBody::TargetPortGroup(_)
            | DesignatorBody::LogicalUnitGroup(_) => 4,
            DesignatorBody::Md5LogicalUnit(_) => 16,
            // null terminated, padded to a multiple of four
            DesignatorBody::ScsiNameString(name) => (name.len() + 1).next_multiple_of(4),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Designator {
    pub header: DesignatorHeader,
    pub body: DesignatorBody,
}

impl Designator {
    pub fn designator_type(&self) -> u8 {
        self.body.designator_type()
    }

    pub fn naa_format(&self) -> Option<u8> {
        match &self.body {
            DesignatorBody::Naa(bytes) => bytes.first().map(|b| b >> 4),
            _ => None,
        }
    }
}

/// Splits a record into its header and the body bounded by the length byte.
fn split(buffer: Buffer<'_>) -> crate::Result<(DesignatorHeader, Buffer<'_>)> {
    let byte_0: u8 = buffer.read(0)?;
    let byte_1: u8 = buffer.read(1)?;
    let length: u8 = buffer.read(3)?;

    let header = DesignatorHeader {
        protocol_identifier: bits::get_masked(byte_0, 4, 0x0F),
        code_set: bits::get_masked(byte_0, 0, 0x0F),
        protocol_identifier_valid: bits::get_bit(byte_1, 7),
        association: Association::from_bits(bits::get_masked(byte_1, 4, 0b11)),
    };

    Ok((header, buffer.extract_segment(HEADER_LENGTH, Some(length as usize))?))
}

fn fixed_length(body: Buffer<'_>, allowed: &[usize], name: &str) -> crate::Result<()> {
    if allowed.contains(&body.len()) {
        Ok(())
    } else {
        Err(crate::Error::Decode(format!(
            "{name} designator of {} bytes",
            body.len()
        )))
    }
}

fn vendor_specific(buffer: Buffer<'_>) -> crate::Result<Designator> {
    let (header, body) = split(buffer)?;
    Ok(Designator {
        header,
        body: DesignatorBody::VendorSpecific(body.as_bytes().to_vec()),
    })
}

fn t10_vendor_id(buffer: Buffer<'_>) -> crate::Result<Designator> {
    let (header, body) = split(buffer)?;
    Ok(Designator {
        header,
        body: DesignatorBody::T10VendorId {
            vendor_id: body.to_ascii_string(0, T10_VENDOR_ID_LENGTH)?,
            vendor_specific: body
                .extract_segment(T10_VENDOR_ID_LENGTH, None)?
                .as_bytes()
                .to_vec(),
        },
    })
}

fn eui64(buffer: Buffer<'_>) -> crate::Result<Designator> {
    let (header, body) = split(buffer)?;
    fixed_length(body, &[8, 12, 16], "eui-64")?;
    Ok(Designator {
        header,
        body: DesignatorBody::Eui64(body.as_bytes().to_vec()),
    })
}

fn naa(buffer: Buffer<'_>) -> crate::Result<Designator> {
    let (header, body) = split(buffer)?;
    fixed_length(body, &[8, 16], "naa")?;
    Ok(Designator {
        header,
        body: DesignatorBody::Naa(body.as_bytes().to_vec()),
    })
}

fn relative_target_port(buffer: Buffer<'_>) -> crate::Result<Designator> {
    let (header, body) = split(buffer)?;
    fixed_length(body, &[4], "relative target port")?;
    Ok(Designator {
        header,
        body: DesignatorBody::RelativeTargetPort(body.read_be(2)?),
    })
}

fn target_port_group(buffer: Buffer<'_>) -> crate::Result<Designator> {
    let (header, body) = split(buffer)?;
    fixed_length(body, &[4], "target port group")?;
    Ok(Designator {
        header,
        body: DesignatorBody::TargetPortGroup(body.read_be(2)?),
    })
}

fn logical_unit_group(buffer: Buffer<'_>) -> crate::Result<Designator> {
    let (header, body) = split(buffer)?;
    fixed_length(body, &[4], "logical unit group")?;
    Ok(Designator {
        header,
        body: DesignatorBody::LogicalUnitGroup(body.read_be(2)?),
    })
}

fn md5_logical_unit(buffer: Buffer<'_>) -> crate::Result<Designator> {
    let (header, body) = split(buffer)?;
    fixed_length(body, &[16], "md5 logical unit")?;
    Ok(Designator {
        header,
        body: DesignatorBody::Md5LogicalUnit(body.read_be(0)?),
    })
}

fn scsi_name_string(buffer: Buffer<'_>) -> crate::Result<Designator> {
    let (header, body) = split(buffer)?;
    Ok(Designator {
        header,
        body: DesignatorBody::ScsiNameString(body.to_utf8_string(0, body.len())?),
    })
}

impl Marshal for Designator {
    fn unmarshal(buffer: Buffer<'_>) -> crate::Result<Self> {
        let length = Self::peek_length(buffer)?;
        let record = buffer.extract_segment(0, Some(length))?;

        unmarshal_tagged::<Self>(record, Lookup::Strict)?.ok_or_else(|| {
            crate::Error::Decode("designator lookup returned no match".to_owned())
        })
    }

    fn marshal(&self, buffer: &mut BufferMut<'_>) -> crate::Result<()> {
        let length = self.body.length();
        if length > u8::MAX as usize {
            return Err(crate::Error::BadArgument(format!(
                "designator body of {length} bytes does not fit the length byte"
            )));
        }

        let header = &self.header;
        let byte_0 = bits::put_masked(
            bits::put_masked(0, header.protocol_identifier, 4, 0x0F),
            header.code_set,
            0,
            0x0F,
        );
        let byte_1 = bits::put_masked(
            bits::put_masked(
                bits::set_bit(0, 7, header.protocol_identifier_valid),
                header.association.bits(),
                4,
                0b11,
            ),
            self.designator_type(),
            0,
            0x0F,
        );

        buffer.write(byte_0, 0)?;
        buffer.write(byte_1, 1)?;
        buffer.write(0u8, 2)?;
        buffer.write(length as u8, 3)?;

        let mut body = buffer.extract_segment(HEADER_LENGTH, Some(length))?;
        match &self.body {
            DesignatorBody::VendorSpecific(bytes)
            | DesignatorBody::Eui64(bytes)
            | DesignatorBody::Naa(bytes) => body.copy_from(0, bytes, 0, bytes.len()),
            DesignatorBody::T10VendorId {
                vendor_id,
                vendor_specific,
            } => {
                body.write_ascii(0, T10_VENDOR_ID_LENGTH, vendor_id, b' ')?;
                body.copy_from(
                    T10_VENDOR_ID_LENGTH,
                    vendor_specific,
                    0,
                    vendor_specific.len(),
                )
            }
            DesignatorBody::RelativeTargetPort(value)
            | DesignatorBody::TargetPortGroup(value)
            | DesignatorBody::LogicalUnitGroup(value) => {
                body.write(0u16, 0)?;
                body.write_be(*value, 2)
            }
            DesignatorBody::Md5LogicalUnit(value) => body.write_be(*value, 0),
            DesignatorBody::ScsiNameString(name) => body.write_ascii(0, length, name, 0),
        }
    }

    fn marshaled_size(&self) -> usize {
        HEADER_LENGTH + self.body.length()
    }
}

impl Family for Designator {
    const NAME: &'static str = "designator";

    fn peek_type_code(buffer: Buffer<'_>) -> crate::Result<u16> {
        Ok(bits::get_masked(buffer.read(1)?, 0, 0x0F).into())
    }

    fn peek_length(buffer: Buffer<'_>) -> crate::Result<usize> {
        Ok(HEADER_LENGTH + buffer.read::<u8>(3)? as usize)
    }

    fn decoder(code: u16) -> Option<Decoder<Self>> {
        match code {
            0x0 => Some(vendor_specific),
            0x1 => Some(t10_vendor_id),
            0x2 => Some(eui64),
            0x3 => Some(naa),
            0x4 => Some(relative_target_port),
            0x5 => Some(target_port_group),
            0x6 => Some(logical_unit_group),
            0x7 => Some(md5_logical_unit),
            0x8 => Some(scsi_name_string),
            _ => None,
        }
    }
}
