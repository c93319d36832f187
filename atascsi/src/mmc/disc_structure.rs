//! READ DISC STRUCTURE response formats.

use crate::{
    bits,
    buffer::{Buffer, BufferMut},
    marshal::{unmarshal_fixed_list, Decoder, Marshal},
};

use super::declared_extent;

pub const PHYSICAL_FORMAT: u8 = 0x00;
pub const COPYRIGHT: u8 = 0x01;
pub const BURST_CUTTING_AREA: u8 = 0x03;
pub const STRUCTURE_LIST: u8 = 0xFF;

const HEADER_LENGTH: usize = 4;

/// Layer descriptor of the physical format structure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhysicalFormat {
    pub book_type: u8,
    pub part_version: u8,
    pub disc_size: u8,
    pub maximum_rate: u8,
    pub number_of_layers: u8,
    pub track_path: bool,
    pub layer_type: u8,
    pub linear_density: u8,
    pub track_density: u8,
    pub data_start_sector: u32,
    pub data_end_sector: u32,
    pub layer_0_end_sector: u32,
    pub burst_cutting_area: bool,
    /// Media specific information, kept raw.
    pub media_specific: Vec<u8>,
}

impl PhysicalFormat {
    const LEADING_LENGTH: usize = 17;

    /// Opposite track path, the second layer runs outside-in.
    pub fn is_otp(&self) -> bool {
        self.track_path
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Copyright {
    pub protection_system_type: u8,
    /// Bit n set means playback is not permitted in region n + 1.
    pub region_management: u8,
}

impl Copyright {
    pub fn region_playable(&self, region: u8) -> bool {
        (1..=8).contains(&region) && !bits::get_bit(self.region_management, region as u32 - 1)
    }
}

/// Entry of the disc structure list (format FFh).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StructureListEntry {
    pub format_code: u8,
    pub sendable: bool,
    pub readable: bool,
    pub structure_length: u16,
}

impl StructureListEntry {
    pub const LENGTH: usize = 4;
}

impl Marshal for StructureListEntry {
    fn unmarshal(buffer: Buffer<'_>) -> crate::Result<Self> {
        let flags: u8 = buffer.read(1)?;
        Ok(Self {
            format_code: buffer.read(0)?,
            sendable: bits::get_bit(flags, 7),
            readable: bits::get_bit(flags, 6),
            structure_length: buffer.read_be(2)?,
        })
    }

    fn marshal(&self, buffer: &mut BufferMut<'_>) -> crate::Result<()> {
        buffer.write(self.format_code, 0)?;
        buffer.write(
            bits::set_bit(bits::set_bit(0, 7, self.sendable), 6, self.readable),
            1,
        )?;
        buffer.write_be(self.structure_length, 2)
    }

    fn marshaled_size(&self) -> usize {
        Self::LENGTH
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiscStructure {
    PhysicalFormat(PhysicalFormat),
    Copyright(Copyright),
    BurstCuttingArea(Vec<u8>),
    StructureList(Vec<StructureListEntry>),
    Unknown { format: u8, bytes: Vec<u8> },
}

impl DiscStructure {
    /// Decodes a response to a request for `format`. Formats without a
    /// decoder are kept raw.
    pub fn decode(format: u8, bytes: &[u8]) -> crate::Result<Self> {
        let buffer = Buffer::new(bytes);
        let declared = buffer.read_be::<u16>(0)? as usize;
        let body = declared_extent(buffer, 2, declared, "disc structure")?
            .extract_segment(HEADER_LENGTH, None)?;

        match decoder(format) {
            Some(decoder) => decoder(body),
            None => Ok(Self::Unknown {
                format,
                bytes: body.as_bytes().to_vec(),
            }),
        }
    }

    pub fn format(&self) -> u8 {
        match self {
            DiscStructure::PhysicalFormat(_) => PHYSICAL_FORMAT,
            DiscStructure::Copyright(_) => COPYRIGHT,
            DiscStructure::BurstCuttingArea(_) => BURST_CUTTING_AREA,
            DiscStructure::StructureList(_) => STRUCTURE_LIST,
            DiscStructure::Unknown { format, .. } => *format,
        }
    }
}

fn decoder(format: u8) -> Option<Decoder<DiscStructure>> {
    match format {
        PHYSICAL_FORMAT => Some(physical_format),
        COPYRIGHT => Some(copyright),
        BURST_CUTTING_AREA => Some(burst_cutting_area),
        STRUCTURE_LIST => Some(structure_list),
        _ => None,
    }
}

fn physical_format(buffer: Buffer<'_>) -> crate::Result<DiscStructure> {
    if buffer.len() < PhysicalFormat::LEADING_LENGTH {
        return Err(crate::Error::Truncated {
            family: "physical format",
            declared: PhysicalFormat::LEADING_LENGTH,
            available: buffer.len(),
        });
    }

    let book: u8 = buffer.read(0)?;
    let size: u8 = buffer.read(1)?;
    let layers: u8 = buffer.read(2)?;
    let density: u8 = buffer.read(3)?;
    Ok(DiscStructure::PhysicalFormat(PhysicalFormat {
        book_type: bits::get_masked(book, 4, 0x0F),
        part_version: bits::get_masked(book, 0, 0x0F),
        disc_size: bits::get_masked(size, 4, 0x0F),
        maximum_rate: bits::get_masked(size, 0, 0x0F),
        number_of_layers: bits::get_masked(layers, 5, 0x03) + 1,
        track_path: bits::get_bit(layers, 4),
        layer_type: bits::get_masked(layers, 0, 0x0F),
        linear_density: bits::get_masked(density, 4, 0x0F),
        track_density: bits::get_masked(density, 0, 0x0F),
        data_start_sector: buffer.read_be_u24(5)?,
        data_end_sector: buffer.read_be_u24(9)?,
        layer_0_end_sector: buffer.read_be_u24(13)?,
        burst_cutting_area: bits::get_bit(buffer.read(16)?, 7),
        media_specific: buffer
            .extract_segment(PhysicalFormat::LEADING_LENGTH, None)?
            .as_bytes()
            .to_vec(),
    }))
}

fn copyright(buffer: Buffer<'_>) -> crate::Result<DiscStructure> {
    Ok(DiscStructure::Copyright(Copyright {
        protection_system_type: buffer.read(0)?,
        region_management: buffer.read(1)?,
    }))
}

fn burst_cutting_area(buffer: Buffer<'_>) -> crate::Result<DiscStructure> {
    Ok(DiscStructure::BurstCuttingArea(buffer.as_bytes().to_vec()))
}

fn structure_list(buffer: Buffer<'_>) -> crate::Result<DiscStructure> {
    Ok(DiscStructure::StructureList(unmarshal_fixed_list(
        buffer,
        StructureListEntry::LENGTH,
        "disc structure list entry",
    )?))
}
