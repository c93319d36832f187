//! Sense data in fixed (70h/71h) and descriptor (72h/73h) format.

use crate::{
    bits,
    buffer::{Buffer, BufferMut},
    marshal::{self, Decoder, Family, Lookup, Marshal},
};

pub const MAX_SENSE_BUFFER_LENGTH: usize = 252;

pub const SENSE_KEY_NO_SENSE: u8 = 0x00;
pub const SENSE_KEY_RECOVERED_ERROR: u8 = 0x01;
pub const SENSE_KEY_ABORTED_COMMAND: u8 = 0x0B;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SenseData {
    None,
    Fixed(FixedSenseData),
    Descriptor(DescriptorSenseData),
    Raw(Vec<u8>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FixedSenseData {
    pub current: bool,
    pub valid: bool,
    pub filemark: bool,
    pub end_of_medium: bool,
    pub incorrect_length_indicator: bool,
    pub sense_key: u8,
    pub information: u32,
    pub command_specific_information: u32,
    pub additional_sense_code: u8,
    pub additional_sense_code_qualifier: u8,
    pub field_replaceable_unit_code: u8,
    pub sense_key_specific: [u8; 3],
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DescriptorSenseData {
    pub current: bool,
    pub sense_key: u8,
    pub additional_sense_code: u8,
    pub additional_sense_code_qualifier: u8,
    pub descriptors: Vec<SenseDescriptor>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SenseDescriptor {
    Information { valid: bool, information: u64 },
    AtaStatusReturn(AtaStatusReturn),
    Other { code: u8, bytes: Vec<u8> },
}

/// The device registers returned by a SAT layer when CK_COND is set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AtaStatusReturn {
    pub extend: bool,
    pub error: u8,
    pub count: u16,
    pub lba: u64,
    pub device: u8,
    pub status: u8,
}

impl SenseData {
    pub fn parse(bytes: &[u8], length: usize) -> SenseData {
        let bytes = &bytes[..usize::min(length, bytes.len())];

        let Some(&first) = bytes.first() else {
            return SenseData::None;
        };

        let parsed = match first & 0x7F {
            0x70 | 0x71 => FixedSenseData::unmarshal(Buffer::new(bytes)).map(SenseData::Fixed),
            0x72 | 0x73 => {
                DescriptorSenseData::unmarshal(Buffer::new(bytes)).map(SenseData::Descriptor)
            }
            _ => return SenseData::Raw(bytes.to_vec()),
        };

        parsed.unwrap_or_else(|_| SenseData::Raw(bytes.to_vec()))
    }

    pub fn sense_key(&self) -> Option<u8> {
        match self {
            SenseData::Fixed(f) => Some(f.sense_key),
            SenseData::Descriptor(d) => Some(d.sense_key),
            _ => None,
        }
    }

    pub fn additional_sense_code(&self) -> Option<u8> {
        match self {
            SenseData::Fixed(f) => Some(f.additional_sense_code),
            SenseData::Descriptor(d) => Some(d.additional_sense_code),
            _ => None,
        }
    }

    pub fn additional_sense_code_qualifier(&self) -> Option<u8> {
        match self {
            SenseData::Fixed(f) => Some(f.additional_sense_code_qualifier),
            SenseData::Descriptor(d) => Some(d.additional_sense_code_qualifier),
            _ => None,
        }
    }

    pub fn ata_status_return(&self) -> Option<AtaStatusReturn> {
        match self {
            SenseData::Descriptor(d) => d.descriptors.iter().find_map(|d| match d {
                SenseDescriptor::AtaStatusReturn(r) => Some(*r),
                _ => None,
            }),
            SenseData::Fixed(f) => f.ata_status_return(),
            _ => None,
        }
    }
}

impl FixedSenseData {
    /// SAT places the low ATA registers in the information and command
    /// specific fields when it answers "ATA pass through information
    /// available" (00h/1Dh) in fixed format.
    fn ata_status_return(&self) -> Option<AtaStatusReturn> {
        if self.additional_sense_code != 0x00 || self.additional_sense_code_qualifier != 0x1D {
            return None;
        }

        let [error, status, device, count] = self.information.to_be_bytes();
        let [flags, lba_0, lba_1, lba_2] = self.command_specific_information.to_be_bytes();

        Some(AtaStatusReturn {
            extend: bits::get_bit(flags, 7),
            error,
            count: count as u16,
            lba: u32::from_le_bytes([lba_0, lba_1, lba_2, 0]) as u64,
            device,
            status,
        })
    }
}

impl Marshal for FixedSenseData {
    fn unmarshal(buffer: Buffer<'_>) -> crate::Result<Self> {
        let byte0: u8 = buffer.read(0)?;
        let byte2: u8 = buffer.read(2)?;

        Ok(Self {
            current: byte0 & 0x7F == 0x70,
            valid: bits::get_bit(byte0, 7),
            filemark: bits::get_bit(byte2, 7),
            end_of_medium: bits::get_bit(byte2, 6),
            incorrect_length_indicator: bits::get_bit(byte2, 5),
            sense_key: bits::get_masked(byte2, 0, 0x0F),
            information: buffer.read_be(3)?,
            command_specific_information: buffer.read_be(8).unwrap_or_default(),
            additional_sense_code: buffer.read(12).unwrap_or_default(),
            additional_sense_code_qualifier: buffer.read(13).unwrap_or_default(),
            field_replaceable_unit_code: buffer.read(14).unwrap_or_default(),
            sense_key_specific: buffer.read_array(15).unwrap_or_default(),
        })
    }

    fn marshal(&self, buffer: &mut BufferMut<'_>) -> crate::Result<()> {
        let code = if self.current { 0x70 } else { 0x71 };
        buffer.write(bits::set_bit(code, 7, self.valid), 0)?;
        buffer.write(0_u8, 1)?;

        let mut byte2 = bits::put_masked(0, self.sense_key, 0, 0x0F);
        byte2 = bits::set_bit(byte2, 7, self.filemark);
        byte2 = bits::set_bit(byte2, 6, self.end_of_medium);
        byte2 = bits::set_bit(byte2, 5, self.incorrect_length_indicator);
        buffer.write(byte2, 2)?;

        buffer.write_be(self.information, 3)?;
        buffer.write((self.marshaled_size() - 8) as u8, 7)?;
        buffer.write_be(self.command_specific_information, 8)?;
        buffer.write(self.additional_sense_code, 12)?;
        buffer.write(self.additional_sense_code_qualifier, 13)?;
        buffer.write(self.field_replaceable_unit_code, 14)?;
        buffer.copy_from(15, &self.sense_key_specific, 0, 3)
    }

    fn marshaled_size(&self) -> usize {
        18
    }
}

impl Marshal for DescriptorSenseData {
    fn unmarshal(buffer: Buffer<'_>) -> crate::Result<Self> {
        let byte0: u8 = buffer.read(0)?;
        let byte1: u8 = buffer.read(1)?;
        let additional_length = buffer.read::<u8>(7)? as usize;

        // devices may truncate the descriptor list to the allocation length
        let available = usize::min(additional_length, buffer.len().saturating_sub(8));
        let descriptors = marshal::unmarshal_list(
            buffer.extract_segment(8, Some(available))?,
            Lookup::Strict,
        )?;

        Ok(Self {
            current: byte0 & 0x7F == 0x72,
            sense_key: bits::get_masked(byte1, 0, 0x0F),
            additional_sense_code: buffer.read(2)?,
            additional_sense_code_qualifier: buffer.read(3)?,
            descriptors,
        })
    }

    fn marshal(&self, buffer: &mut BufferMut<'_>) -> crate::Result<()> {
        buffer.write(if self.current { 0x72_u8 } else { 0x73 }, 0)?;
        buffer.write(self.sense_key & 0x0F, 1)?;
        buffer.write(self.additional_sense_code, 2)?;
        buffer.write(self.additional_sense_code_qualifier, 3)?;
        buffer.fill(4, 3, 0)?;
        buffer.write(marshal::marshaled_list_size(&self.descriptors) as u8, 7)?;
        marshal::marshal_list(&self.descriptors, &mut buffer.extract_segment(8, None)?)?;
        Ok(())
    }

    fn marshaled_size(&self) -> usize {
        8 + marshal::marshaled_list_size(&self.descriptors)
    }
}

impl SenseDescriptor {
    fn unmarshal_information(buffer: Buffer<'_>) -> crate::Result<Self> {
        Ok(SenseDescriptor::Information {
            valid: bits::get_bit(buffer.read(2)?, 7),
            information: buffer.read_be(4)?,
        })
    }

    fn unmarshal_ata_status_return(buffer: Buffer<'_>) -> crate::Result<Self> {
        let byte = |offset| buffer.read::<u8>(offset);

        let lba = u64::from_be_bytes([
            0,
            0,
            byte(10)?,
            byte(8)?,
            byte(6)?,
            byte(11)?,
            byte(9)?,
            byte(7)?,
        ]);

        Ok(SenseDescriptor::AtaStatusReturn(AtaStatusReturn {
            extend: bits::get_bit(byte(2)?, 0),
            error: byte(3)?,
            count: u16::from_be_bytes([byte(4)?, byte(5)?]),
            lba,
            device: byte(12)?,
            status: byte(13)?,
        }))
    }

    fn unmarshal_other(buffer: Buffer<'_>) -> crate::Result<Self> {
        Ok(SenseDescriptor::Other {
            code: buffer.read(0)?,
            bytes: buffer.extract_segment(2, None)?.as_bytes().to_vec(),
        })
    }
}

impl Marshal for SenseDescriptor {
    fn unmarshal(buffer: Buffer<'_>) -> crate::Result<Self> {
        let code = Self::peek_type_code(buffer)?;
        let length = Self::peek_length(buffer)?;
        let record = buffer.extract_segment(0, Some(length))?;

        match Self::decoder(code) {
            Some(decoder) => decoder(record),
            None => Self::unmarshal_other(record),
        }
    }

    fn marshal(&self, buffer: &mut BufferMut<'_>) -> crate::Result<()> {
        buffer.write((self.marshaled_size() - 2) as u8, 1)?;

        match self {
            SenseDescriptor::Information { valid, information } => {
                buffer.write(0x00_u8, 0)?;
                buffer.write(bits::set_bit(0, 7, *valid), 2)?;
                buffer.write(0_u8, 3)?;
                buffer.write_be(*information, 4)
            }
            SenseDescriptor::AtaStatusReturn(r) => {
                let lba = r.lba.to_be_bytes();
                buffer.write(0x09_u8, 0)?;
                buffer.write(r.extend as u8, 2)?;
                buffer.write(r.error, 3)?;
                buffer.write_be(r.count, 4)?;
                buffer.write(lba[4], 6)?;
                buffer.write(lba[7], 7)?;
                buffer.write(lba[3], 8)?;
                buffer.write(lba[6], 9)?;
                buffer.write(lba[2], 10)?;
                buffer.write(lba[5], 11)?;
                buffer.write(r.device, 12)?;
                buffer.write(r.status, 13)
            }
            SenseDescriptor::Other { code, bytes } => {
                buffer.write(*code, 0)?;
                buffer.copy_from(2, bytes, 0, bytes.len())
            }
        }
    }

    fn marshaled_size(&self) -> usize {
        match self {
            SenseDescriptor::Information { .. } => 12,
            SenseDescriptor::AtaStatusReturn(_) => 14,
            SenseDescriptor::Other { bytes, .. } => 2 + bytes.len(),
        }
    }
}

impl Family for SenseDescriptor {
    const NAME: &'static str = "sense descriptor";

    fn peek_type_code(buffer: Buffer<'_>) -> crate::Result<u16> {
        Ok(buffer.read::<u8>(0)?.into())
    }

    fn peek_length(buffer: Buffer<'_>) -> crate::Result<usize> {
        Ok(buffer.read::<u8>(1)? as usize + 2)
    }

    fn decoder(code: u16) -> Option<Decoder<Self>> {
        match code {
            0x00 => Some(Self::unmarshal_information),
            0x09 => Some(Self::unmarshal_ata_status_return),
            _ => Some(Self::unmarshal_other),
        }
    }
}
