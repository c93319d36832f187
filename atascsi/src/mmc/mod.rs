//! Optical drive (MMC) response structures.

pub mod disc_structure;
pub mod event;
pub mod feature;
pub mod performance;
pub mod toc;

use crate::buffer::Buffer;

const FRAMES_PER_SECOND: i32 = 75;
const SECONDS_PER_MINUTE: i32 = 60;
/// Addresses at minute 90 and above lie in the lead-in area.
const LEAD_IN_MINUTE: u8 = 90;

/// Minute/second/frame address as reported with the MSF bit set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Msf {
    pub minute: u8,
    pub second: u8,
    pub frame: u8,
}

impl Msf {
    pub const fn new(minute: u8, second: u8, frame: u8) -> Self {
        Self {
            minute,
            second,
            frame,
        }
    }

    fn frames(&self) -> i32 {
        (self.minute as i32 * SECONDS_PER_MINUTE + self.second as i32) * FRAMES_PER_SECOND
            + self.frame as i32
    }

    pub fn to_lba(&self) -> i32 {
        if self.minute < LEAD_IN_MINUTE {
            self.frames() - 150
        } else {
            self.frames() - 450_150
        }
    }

    /// `None` for addresses no MSF triple can express.
    pub fn from_lba(lba: i32) -> Option<Self> {
        let frames = match lba {
            -150..=404_849 => lba + 150,
            -45_150..=-151 => lba + 450_150,
            _ => return None,
        };

        Some(Self {
            minute: (frames / (SECONDS_PER_MINUTE * FRAMES_PER_SECOND)) as u8,
            second: (frames / FRAMES_PER_SECOND % SECONDS_PER_MINUTE) as u8,
            frame: (frames % FRAMES_PER_SECOND) as u8,
        })
    }

    pub(crate) fn read(buffer: Buffer<'_>, offset: usize) -> crate::Result<Self> {
        let [minute, second, frame] = buffer.read_array(offset)?;
        Ok(Self::new(minute, second, frame))
    }
}

/// Returns the part of a response covered by its leading length field.
///
/// `declared` counts the bytes that follow the length field, which itself
/// occupies `field_length` bytes.
pub(crate) fn declared_extent<'a>(
    buffer: Buffer<'a>,
    field_length: usize,
    declared: usize,
    family: &'static str,
) -> crate::Result<Buffer<'a>> {
    let total = declared + field_length;
    if total > buffer.len() {
        return Err(crate::Error::Truncated {
            family,
            declared: total,
            available: buffer.len(),
        });
    }

    buffer.extract_segment(0, Some(total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msf_test() {
        assert_eq!(Msf::new(0, 2, 0).to_lba(), 0);
        assert_eq!(Msf::new(0, 0, 0).to_lba(), -150);
        assert_eq!(Msf::from_lba(0), Some(Msf::new(0, 2, 0)));
        assert_eq!(Msf::from_lba(16), Some(Msf::new(0, 2, 16)));

        let lead_out = Msf::from_lba(333_000).unwrap();
        assert_eq!(lead_out, Msf::new(74, 2, 0));
        assert_eq!(lead_out.to_lba(), 333_000);

        let lead_in = Msf::new(97, 26, 44);
        assert_eq!(Msf::from_lba(lead_in.to_lba()), Some(lead_in));

        assert_eq!(Msf::from_lba(404_850), None);
    }

    #[test]
    fn declared_extent_test() {
        let bytes = [0x00, 0x02, 0xAA, 0xBB, 0xCC];
        let extent = declared_extent(Buffer::new(&bytes), 2, 2, "test").unwrap();
        assert_eq!(extent.as_bytes(), &bytes[..4]);

        assert!(matches!(
            declared_extent(Buffer::new(&bytes), 2, 4, "test"),
            Err(crate::Error::Truncated {
                declared: 6,
                available: 5,
                ..
            })
        ));
    }
}
