//! READ TOC/PMA/ATIP response formats.
//!
//! The response carries no format code of its own, so the decoder is chosen
//! by the format that was requested.

use crate::{
    bits,
    buffer::{Buffer, BufferMut},
    marshal::{unmarshal_fixed_list, Marshal},
};

use super::{declared_extent, Msf};

pub const LEAD_OUT_TRACK: u8 = 0xAA;

const HEADER_LENGTH: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum TocFormat {
    Formatted = 0b0000,
    MultiSession = 0b0001,
    Raw = 0b0010,
    Pma = 0b0011,
    Atip = 0b0100,
    CdText = 0b0101,
}

impl TryFrom<u8> for TocFormat {
    type Error = crate::Error;

    fn try_from(value: u8) -> crate::Result<Self> {
        Ok(match value {
            0b0000 => Self::Formatted,
            0b0001 => Self::MultiSession,
            0b0010 => Self::Raw,
            0b0011 => Self::Pma,
            0b0100 => Self::Atip,
            0b0101 => Self::CdText,
            _ => {
                return Err(crate::Error::UnknownTypeCode {
                    family: "toc format",
                    code: value.into(),
                })
            }
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackAddress {
    Lba(u32),
    Msf(Msf),
}

impl TrackAddress {
    pub fn lba(&self) -> i64 {
        match self {
            TrackAddress::Lba(lba) => *lba as i32 as i64,
            TrackAddress::Msf(msf) => msf.to_lba() as i64,
        }
    }
}

/// Track descriptor of the formatted TOC and the multi-session formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrackDescriptor {
    pub adr: u8,
    pub control: u8,
    pub track_number: u8,
    pub start_address: TrackAddress,
}

impl TrackDescriptor {
    pub const LENGTH: usize = 8;

    pub fn is_data_track(&self) -> bool {
        bits::get_bit(self.control, 2)
    }

    pub fn is_lead_out(&self) -> bool {
        self.track_number == LEAD_OUT_TRACK
    }

    fn decode(buffer: Buffer<'_>, msf: bool) -> crate::Result<Self> {
        let adr_control: u8 = buffer.read(1)?;
        Ok(Self {
            adr: bits::get_masked(adr_control, 4, 0x0F),
            control: bits::get_masked(adr_control, 0, 0x0F),
            track_number: buffer.read(2)?,
            start_address: if msf {
                TrackAddress::Msf(Msf::read(buffer, 5)?)
            } else {
                TrackAddress::Lba(buffer.read_be(4)?)
            },
        })
    }
}

/// Q sub-channel descriptor shared by the raw TOC and PMA formats.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QSubChannelDescriptor {
    /// Reserved in PMA descriptors.
    pub session_number: u8,
    pub adr: u8,
    pub control: u8,
    pub tno: u8,
    pub point: u8,
    pub address: Msf,
    pub zero: u8,
    pub point_address: Msf,
}

impl QSubChannelDescriptor {
    pub const LENGTH: usize = 11;
}

impl Marshal for QSubChannelDescriptor {
    fn unmarshal(buffer: Buffer<'_>) -> crate::Result<Self> {
        let adr_control: u8 = buffer.read(1)?;
        Ok(Self {
            session_number: buffer.read(0)?,
            adr: bits::get_masked(adr_control, 4, 0x0F),
            control: bits::get_masked(adr_control, 0, 0x0F),
            tno: buffer.read(2)?,
            point: buffer.read(3)?,
            address: Msf::read(buffer, 4)?,
            zero: buffer.read(7)?,
            point_address: Msf::read(buffer, 8)?,
        })
    }

    fn marshal(&self, buffer: &mut BufferMut<'_>) -> crate::Result<()> {
        buffer.write(self.session_number, 0)?;
        buffer.write(
            bits::put_masked(bits::put_masked(0, self.adr, 4, 0x0F), self.control, 0, 0x0F),
            1,
        )?;
        buffer.write(self.tno, 2)?;
        buffer.write(self.point, 3)?;
        for (offset, msf) in [(4, self.address), (8, self.point_address)] {
            buffer.write(msf.minute, offset)?;
            buffer.write(msf.second, offset + 1)?;
            buffer.write(msf.frame, offset + 2)?;
        }
        buffer.write(self.zero, 7)
    }

    fn marshaled_size(&self) -> usize {
        Self::LENGTH
    }
}

/// Absolute time in pregroove of a recordable disc.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Atip {
    pub indicative_target_writing_power: u8,
    pub reference_speed: u8,
    pub unrestricted_use: bool,
    /// `true` for rewritable media.
    pub disc_type: bool,
    pub disc_sub_type: u8,
    pub a1_valid: bool,
    pub a2_valid: bool,
    pub a3_valid: bool,
    pub lead_in_start: Msf,
    pub last_possible_lead_out_start: Msf,
    /// A1/A2/A3 values and S4 fields, kept raw.
    pub tail: Vec<u8>,
}

impl Atip {
    const LENGTH: usize = 24;
}

/// One CD-TEXT pack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CdTextPack {
    pub pack_type: u8,
    pub track_number: u8,
    pub sequence_number: u8,
    pub block_character_position: u8,
    pub text: [u8; 12],
    pub crc: u16,
}

impl CdTextPack {
    pub const LENGTH: usize = 18;

    pub fn is_double_byte(&self) -> bool {
        bits::get_bit(self.block_character_position, 7)
    }

    pub fn block_number(&self) -> u8 {
        bits::get_masked(self.block_character_position, 4, 0x07)
    }
}

impl Marshal for CdTextPack {
    fn unmarshal(buffer: Buffer<'_>) -> crate::Result<Self> {
        Ok(Self {
            pack_type: buffer.read(0)?,
            track_number: buffer.read(1)?,
            sequence_number: buffer.read(2)?,
            block_character_position: buffer.read(3)?,
            text: buffer.read_array(4)?,
            crc: buffer.read_be(16)?,
        })
    }

    fn marshal(&self, buffer: &mut BufferMut<'_>) -> crate::Result<()> {
        buffer.write(self.pack_type, 0)?;
        buffer.write(self.track_number, 1)?;
        buffer.write(self.sequence_number, 2)?;
        buffer.write(self.block_character_position, 3)?;
        buffer.copy_from(4, &self.text, 0, self.text.len())?;
        buffer.write_be(self.crc, 16)
    }

    fn marshaled_size(&self) -> usize {
        Self::LENGTH
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TocBody {
    Formatted(Vec<TrackDescriptor>),
    /// The first track of the last complete session.
    MultiSession(TrackDescriptor),
    Raw(Vec<QSubChannelDescriptor>),
    Pma(Vec<QSubChannelDescriptor>),
    Atip(Option<Atip>),
    CdText(Vec<CdTextPack>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Toc {
    /// First track, first complete session or reserved, depending on format.
    pub first: u8,
    pub last: u8,
    pub body: TocBody,
}

impl Toc {
    /// Decodes a response to a request for `format`. `msf` must match the
    /// request's MSF bit.
    pub fn decode(format: TocFormat, msf: bool, bytes: &[u8]) -> crate::Result<Self> {
        let buffer = Buffer::new(bytes);
        let declared = buffer.read_be::<u16>(0)? as usize;
        let extent = declared_extent(buffer, 2, declared, "toc")?;
        let descriptors = extent.extract_segment(HEADER_LENGTH, None)?;

        let body = match format {
            TocFormat::Formatted => TocBody::Formatted(track_descriptors(descriptors, msf)?),
            TocFormat::MultiSession => {
                let mut tracks = track_descriptors(descriptors, msf)?;
                if tracks.len() != 1 {
                    return Err(crate::Error::Decode(format!(
                        "multi-session toc with {} descriptors",
                        tracks.len()
                    )));
                }
                TocBody::MultiSession(tracks.remove(0))
            }
            TocFormat::Raw => TocBody::Raw(unmarshal_fixed_list(
                descriptors,
                QSubChannelDescriptor::LENGTH,
                "raw toc descriptor",
            )?),
            TocFormat::Pma => TocBody::Pma(unmarshal_fixed_list(
                descriptors,
                QSubChannelDescriptor::LENGTH,
                "pma descriptor",
            )?),
            TocFormat::Atip => TocBody::Atip(atip(descriptors)?),
            TocFormat::CdText => TocBody::CdText(unmarshal_fixed_list(
                descriptors,
                CdTextPack::LENGTH,
                "cd-text pack",
            )?),
        };

        Ok(Self {
            first: extent.read(2)?,
            last: extent.read(3)?,
            body,
        })
    }

    pub fn tracks(&self) -> &[TrackDescriptor] {
        match &self.body {
            TocBody::Formatted(tracks) => tracks,
            TocBody::MultiSession(track) => std::slice::from_ref(track),
            _ => &[],
        }
    }

    pub fn lead_out(&self) -> Option<&TrackDescriptor> {
        self.tracks().iter().find(|t| t.is_lead_out())
    }
}

fn track_descriptors(buffer: Buffer<'_>, msf: bool) -> crate::Result<Vec<TrackDescriptor>> {
    if buffer.len() % TrackDescriptor::LENGTH != 0 {
        return Err(crate::Error::Truncated {
            family: "toc track descriptor",
            declared: buffer.len().next_multiple_of(TrackDescriptor::LENGTH),
            available: buffer.len(),
        });
    }

    (0..buffer.len() / TrackDescriptor::LENGTH)
        .map(|index| {
            TrackDescriptor::decode(
                buffer.extract_segment(index * TrackDescriptor::LENGTH, Some(TrackDescriptor::LENGTH))?,
                msf,
            )
        })
        .collect()
}

/// Pressed media report no ATIP descriptor at all.
fn atip(buffer: Buffer<'_>) -> crate::Result<Option<Atip>> {
    if buffer.is_empty() {
        return Ok(None);
    }
    if buffer.len() < Atip::LENGTH {
        return Err(crate::Error::Truncated {
            family: "atip",
            declared: Atip::LENGTH,
            available: buffer.len(),
        });
    }

    let power: u8 = buffer.read(0)?;
    let use_flags: u8 = buffer.read(1)?;
    let disc: u8 = buffer.read(2)?;
    Ok(Some(Atip {
        indicative_target_writing_power: bits::get_masked(power, 4, 0x07),
        reference_speed: bits::get_masked(power, 0, 0x07),
        unrestricted_use: bits::get_bit(use_flags, 6),
        disc_type: bits::get_bit(disc, 6),
        disc_sub_type: bits::get_masked(disc, 3, 0x07),
        a1_valid: bits::get_bit(disc, 2),
        a2_valid: bits::get_bit(disc, 1),
        a3_valid: bits::get_bit(disc, 0),
        lead_in_start: Msf::read(buffer, 4)?,
        last_possible_lead_out_start: Msf::read(buffer, 8)?,
        tail: buffer.extract_segment(12, None)?.as_bytes().to_vec(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn formatted_toc() -> Vec<u8> {
        vec![
            0x00, 0x12, 0x01, 0x01, // header
            0x00, 0x14, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, // track 1
            0x00, 0x14, 0xAA, 0x00, 0x00, 0x05, 0x14, 0xC8, // lead-out
        ]
    }

    #[test]
    fn formatted_test() {
        let toc = Toc::decode(TocFormat::Formatted, false, &formatted_toc()).unwrap();
        assert_eq!((toc.first, toc.last), (1, 1));
        assert_eq!(toc.tracks().len(), 2);
        assert!(toc.tracks()[0].is_data_track());
        assert_eq!(toc.tracks()[0].adr, 1);

        let lead_out = toc.lead_out().unwrap();
        assert_eq!(lead_out.start_address, TrackAddress::Lba(0x0005_14C8));
        assert_eq!(lead_out.start_address.lba(), 0x0005_14C8);
    }

    #[test]
    fn formatted_msf_test() {
        let bytes = [
            0x00, 0x0A, 0x01, 0x01, 0x00, 0x10, 0x01, 0x00, 0x00, 0x00, 0x02, 0x00,
        ];
        let toc = Toc::decode(TocFormat::Formatted, true, &bytes).unwrap();
        let track = toc.tracks()[0];
        assert!(!track.is_data_track());
        assert_eq!(track.start_address, TrackAddress::Msf(Msf::new(0, 2, 0)));
        assert_eq!(track.start_address.lba(), 0);
    }

    #[test]
    fn multi_session_test() {
        let bytes = [
            0x00, 0x0A, 0x01, 0x02, 0x00, 0x14, 0x05, 0x00, 0x00, 0x01, 0x00, 0x00,
        ];
        let toc = Toc::decode(TocFormat::MultiSession, false, &bytes).unwrap();
        assert_eq!(toc.last, 2);
        assert!(matches!(
            toc.body,
            TocBody::MultiSession(TrackDescriptor {
                track_number: 5,
                start_address: TrackAddress::Lba(0x0001_0000),
                ..
            })
        ));

        let mut bytes = formatted_toc();
        bytes[2] = 1;
        assert!(matches!(
            Toc::decode(TocFormat::MultiSession, false, &bytes),
            Err(crate::Error::Decode(_))
        ));
    }

    #[test]
    fn raw_and_pma_test() {
        let descriptor = [
            0x01, 0x14, 0x00, 0xA0, 0x00, 0x00, 0x00, 0x00, 0x01, 0x20, 0x00,
        ];
        let mut bytes = vec![0x00, 0x0D, 0x01, 0x01];
        bytes.extend_from_slice(&descriptor);

        let toc = Toc::decode(TocFormat::Raw, false, &bytes).unwrap();
        let TocBody::Raw(descriptors) = &toc.body else {
            panic!("unexpected body {:?}", toc.body);
        };
        assert_eq!(descriptors[0].point, 0xA0);
        assert_eq!(descriptors[0].point_address, Msf::new(1, 0x20, 0));
        assert_eq!(descriptors[0].to_bytes().unwrap(), descriptor);

        assert!(matches!(
            Toc::decode(TocFormat::Pma, false, &bytes).unwrap().body,
            TocBody::Pma(ref d) if d.len() == 1
        ));

        bytes[1] += 1;
        bytes.push(0);
        assert!(matches!(
            Toc::decode(TocFormat::Pma, false, &bytes),
            Err(crate::Error::Truncated { .. })
        ));
    }

    #[test]
    fn atip_test() {
        let mut bytes = vec![0x00, 0x1A, 0x00, 0x00];
        bytes.extend_from_slice(&[
            0x52, 0x40, 0x44, 0x00, 0x61, 0x1A, 0x42, 0x00, 0x4F, 0x3B, 0x4A, 0x00,
        ]);
        bytes.extend_from_slice(&[0; 12]);

        let toc = Toc::decode(TocFormat::Atip, false, &bytes).unwrap();
        let TocBody::Atip(Some(atip)) = &toc.body else {
            panic!("unexpected body {:?}", toc.body);
        };
        assert_eq!(atip.indicative_target_writing_power, 5);
        assert_eq!(atip.reference_speed, 2);
        assert!(atip.unrestricted_use);
        assert!(atip.disc_type);
        assert!(atip.a1_valid);
        assert_eq!(atip.lead_in_start, Msf::new(0x61, 0x1A, 0x42));
        assert_eq!(atip.last_possible_lead_out_start, Msf::new(0x4F, 0x3B, 0x4A));
        assert_eq!(atip.tail.len(), 12);

        let pressed = [0x00, 0x02, 0x00, 0x00];
        assert_eq!(
            Toc::decode(TocFormat::Atip, false, &pressed).unwrap().body,
            TocBody::Atip(None)
        );
    }

    #[test]
    fn cd_text_test() {
        let mut bytes = vec![0x00, 0x14, 0x00, 0x00];
        bytes.extend_from_slice(&[0x80, 0x00, 0x00, 0x00]);
        bytes.extend_from_slice(b"Album Title\0");
        bytes.extend_from_slice(&[0x12, 0x34]);

        let toc = Toc::decode(TocFormat::CdText, false, &bytes).unwrap();
        let TocBody::CdText(packs) = &toc.body else {
            panic!("unexpected body {:?}", toc.body);
        };
        assert_eq!(packs[0].pack_type, 0x80);
        assert_eq!(&packs[0].text, b"Album Title\0");
        assert_eq!(packs[0].crc, 0x1234);
        assert!(!packs[0].is_double_byte());
    }

    #[test]
    fn format_code_test() {
        assert_eq!(TocFormat::try_from(4).unwrap(), TocFormat::Atip);
        assert!(matches!(
            TocFormat::try_from(6),
            Err(crate::Error::UnknownTypeCode { code: 6, .. })
        ));
    }
}
