//! GET PERFORMANCE response descriptors.
//!
//! The descriptor kind follows from the requested data type and, for
//! performance data, from the header's exceptions bit.

use crate::{
    bits,
    buffer::{Buffer, BufferMut},
    marshal::{unmarshal_fixed_list, Marshal},
};

use super::declared_extent;

pub const PERFORMANCE_DATA: u8 = 0x00;
pub const WRITE_SPEED: u8 = 0x03;

const HEADER_LENGTH: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PerformanceKind {
    Nominal,
    Exceptions,
    WriteSpeed,
}

impl PerformanceKind {
    fn descriptor_length(self) -> usize {
        match self {
            PerformanceKind::Nominal => NominalPerformance::LENGTH,
            PerformanceKind::Exceptions => PerformanceException::LENGTH,
            PerformanceKind::WriteSpeed => WriteSpeedDescriptor::LENGTH,
        }
    }
}

/// Speeds are in kB/s.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NominalPerformance {
    pub start_lba: u32,
    pub start_performance: u32,
    pub end_lba: u32,
    pub end_performance: u32,
}

impl NominalPerformance {
    pub const LENGTH: usize = 16;
}

impl Marshal for NominalPerformance {
    fn unmarshal(buffer: Buffer<'_>) -> crate::Result<Self> {
        Ok(Self {
            start_lba: buffer.read_be(0)?,
            start_performance: buffer.read_be(4)?,
            end_lba: buffer.read_be(8)?,
            end_performance: buffer.read_be(12)?,
        })
    }

    fn marshal(&self, buffer: &mut BufferMut<'_>) -> crate::Result<()> {
        buffer.write_be(self.start_lba, 0)?;
        buffer.write_be(self.start_performance, 4)?;
        buffer.write_be(self.end_lba, 8)?;
        buffer.write_be(self.end_performance, 12)
    }

    fn marshaled_size(&self) -> usize {
        Self::LENGTH
    }
}

/// A seek or other delay at `lba`, `time` in tenths of a millisecond.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PerformanceException {
    pub lba: u32,
    pub time: u16,
}

impl PerformanceException {
    pub const LENGTH: usize = 6;
}

impl Marshal for PerformanceException {
    fn unmarshal(buffer: Buffer<'_>) -> crate::Result<Self> {
        Ok(Self {
            lba: buffer.read_be(0)?,
            time: buffer.read_be(4)?,
        })
    }

    fn marshal(&self, buffer: &mut BufferMut<'_>) -> crate::Result<()> {
        buffer.write_be(self.lba, 0)?;
        buffer.write_be(self.time, 4)
    }

    fn marshaled_size(&self) -> usize {
        Self::LENGTH
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriteSpeedDescriptor {
    pub write_rotation_control: u8,
    pub restore_drive_defaults: bool,
    pub exact: bool,
    pub mount_rainier: bool,
    pub end_lba: u32,
    pub read_speed: u32,
    pub write_speed: u32,
}

impl WriteSpeedDescriptor {
    pub const LENGTH: usize = 16;
}

impl Marshal for WriteSpeedDescriptor {
    fn unmarshal(buffer: Buffer<'_>) -> crate::Result<Self> {
        let flags: u8 = buffer.read(0)?;
        Ok(Self {
            write_rotation_control: bits::get_masked(flags, 3, 0x03),
            restore_drive_defaults: bits::get_bit(flags, 2),
            exact: bits::get_bit(flags, 1),
            mount_rainier: bits::get_bit(flags, 0),
            end_lba: buffer.read_be(4)?,
            read_speed: buffer.read_be(8)?,
            write_speed: buffer.read_be(12)?,
        })
    }

    fn marshal(&self, buffer: &mut BufferMut<'_>) -> crate::Result<()> {
        let mut flags = bits::put_masked(0, self.write_rotation_control, 3, 0x03);
        flags = bits::set_bit(flags, 2, self.restore_drive_defaults);
        flags = bits::set_bit(flags, 1, self.exact);
        flags = bits::set_bit(flags, 0, self.mount_rainier);
        buffer.write(flags, 0)?;
        buffer.fill(1, 3, 0)?;
        buffer.write_be(self.end_lba, 4)?;
        buffer.write_be(self.read_speed, 8)?;
        buffer.write_be(self.write_speed, 12)
    }

    fn marshaled_size(&self) -> usize {
        Self::LENGTH
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PerformanceDescriptors {
    Nominal(Vec<NominalPerformance>),
    Exceptions(Vec<PerformanceException>),
    WriteSpeed(Vec<WriteSpeedDescriptor>),
    Unknown { data_type: u8, bytes: Vec<u8> },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Performance {
    /// Set when the descriptors describe write rather than read performance.
    pub write: bool,
    pub descriptors: PerformanceDescriptors,
}

impl Performance {
    pub fn kind(data_type: u8, exceptions: bool) -> Option<PerformanceKind> {
        match (data_type, exceptions) {
            (PERFORMANCE_DATA, false) => Some(PerformanceKind::Nominal),
            (PERFORMANCE_DATA, true) => Some(PerformanceKind::Exceptions),
            (WRITE_SPEED, _) => Some(PerformanceKind::WriteSpeed),
            _ => None,
        }
    }

    /// Decodes a response to a request for `data_type`.
    pub fn decode(data_type: u8, bytes: &[u8]) -> crate::Result<Self> {
        let buffer = Buffer::new(bytes);
        let declared = buffer.read_be::<u32>(0)? as usize;
        let extent = declared_extent(buffer, 4, declared, "performance header")?;
        if extent.len() < HEADER_LENGTH {
            return Err(crate::Error::Truncated {
                family: "performance header",
                declared: HEADER_LENGTH,
                available: extent.len(),
            });
        }

        let flags: u8 = extent.read(4)?;
        let body = extent.extract_segment(HEADER_LENGTH, None)?;
        let family = "performance descriptor";

        let descriptors = match Self::kind(data_type, bits::get_bit(flags, 0)) {
            Some(kind @ PerformanceKind::Nominal) => PerformanceDescriptors::Nominal(
                unmarshal_fixed_list(body, kind.descriptor_length(), family)?,
            ),
            Some(kind @ PerformanceKind::Exceptions) => PerformanceDescriptors::Exceptions(
                unmarshal_fixed_list(body, kind.descriptor_length(), family)?,
            ),
            Some(kind @ PerformanceKind::WriteSpeed) => PerformanceDescriptors::WriteSpeed(
                unmarshal_fixed_list(body, kind.descriptor_length(), family)?,
            ),
            None => PerformanceDescriptors::Unknown {
                data_type,
                bytes: body.as_bytes().to_vec(),
            },
        };

        Ok(Self {
            write: data_type == PERFORMANCE_DATA && bits::get_bit(flags, 1),
            descriptors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_header(flags: u8, body: &[u8]) -> Vec<u8> {
        let mut bytes = ((body.len() + 4) as u32).to_be_bytes().to_vec();
        bytes.extend_from_slice(&[flags, 0, 0, 0]);
        bytes.extend_from_slice(body);
        bytes
    }

    #[test]
    fn nominal_test() {
        let body = [
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x0A, 0xC8, 0x00, 0x23, 0x05, 0x3F, 0x00, 0x00,
            0x1A, 0x40,
        ];
        let performance = Performance::decode(PERFORMANCE_DATA, &with_header(0x02, &body)).unwrap();
        assert!(performance.write);
        assert_eq!(
            performance.descriptors,
            PerformanceDescriptors::Nominal(vec![NominalPerformance {
                start_lba: 0,
                start_performance: 2760,
                end_lba: 0x0023_053F,
                end_performance: 6720,
            }])
        );
    }

    #[test]
    fn exceptions_test() {
        let body = [0x00, 0x01, 0x00, 0x00, 0x00, 0x64, 0x00, 0x02, 0x00, 0x00, 0x01, 0x2C];
        let performance = Performance::decode(PERFORMANCE_DATA, &with_header(0x01, &body)).unwrap();
        assert!(!performance.write);
        assert_eq!(
            performance.descriptors,
            PerformanceDescriptors::Exceptions(vec![
                PerformanceException {
                    lba: 0x0001_0000,
                    time: 100
                },
                PerformanceException {
                    lba: 0x0002_0000,
                    time: 300
                },
            ])
        );

        assert!(matches!(
            Performance::decode(PERFORMANCE_DATA, &with_header(0x01, &body[..10])),
            Err(crate::Error::Truncated { .. })
        ));
    }

    #[test]
    fn write_speed_test() {
        let descriptor = WriteSpeedDescriptor {
            write_rotation_control: 1,
            restore_drive_defaults: false,
            exact: true,
            mount_rainier: false,
            end_lba: 0x0023_053F,
            read_speed: 11080,
            write_speed: 5540,
        };
        let body = descriptor.to_bytes().unwrap();
        assert_eq!(body[0], 0x0A);

        let performance = Performance::decode(WRITE_SPEED, &with_header(0, &body)).unwrap();
        assert_eq!(
            performance.descriptors,
            PerformanceDescriptors::WriteSpeed(vec![descriptor])
        );
    }

    #[test]
    fn unknown_type_test() {
        let performance = Performance::decode(0x05, &with_header(0, &[0x01, 0x02])).unwrap();
        assert_eq!(
            performance.descriptors,
            PerformanceDescriptors::Unknown {
                data_type: 0x05,
                bytes: vec![0x01, 0x02]
            }
        );
    }
}
