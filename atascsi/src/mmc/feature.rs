//! GET CONFIGURATION feature header and feature descriptors.

use crate::{
    bits,
    buffer::{Buffer, BufferMut},
    marshal::{marshal_list, marshaled_list_size, unmarshal_list, Decoder, Family, Lookup, Marshal},
};

use super::declared_extent;

pub const PROFILE_LIST: u16 = 0x0000;
pub const CORE: u16 = 0x0001;
pub const MORPHING: u16 = 0x0002;
pub const REMOVABLE_MEDIUM: u16 = 0x0003;
pub const RANDOM_READABLE: u16 = 0x0010;

const FEATURE_HEADER_LENGTH: usize = 8;
const DESCRIPTOR_HEADER_LENGTH: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProfileDescriptor {
    pub profile: u16,
    pub current: bool,
}

impl ProfileDescriptor {
    pub const LENGTH: usize = 4;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Core {
    pub physical_interface_standard: u32,
    /// Only present from version 1 on.
    pub inquiry_2: bool,
    pub device_busy_event: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Morphing {
    pub operational_change_event: bool,
    pub asynchronous: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RemovableMedium {
    pub loading_mechanism_type: u8,
    pub load: bool,
    pub eject: bool,
    pub prevent_jumper: bool,
    pub lock: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RandomReadable {
    pub logical_block_size: u32,
    pub blocking: u16,
    pub page_present: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FeatureBody {
    ProfileList(Vec<ProfileDescriptor>),
    Core(Core),
    Morphing(Morphing),
    RemovableMedium(RemovableMedium),
    RandomReadable(RandomReadable),
    Unknown { feature_code: u16, bytes: Vec<u8> },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Feature {
    pub version: u8,
    pub persistent: bool,
    pub current: bool,
    pub body: FeatureBody,
}

impl Feature {
    pub fn feature_code(&self) -> u16 {
        match &self.body {
            FeatureBody::ProfileList(_) => PROFILE_LIST,
            FeatureBody::Core(_) => CORE,
            FeatureBody::Morphing(_) => MORPHING,
            FeatureBody::RemovableMedium(_) => REMOVABLE_MEDIUM,
            FeatureBody::RandomReadable(_) => RANDOM_READABLE,
            FeatureBody::Unknown { feature_code, .. } => *feature_code,
        }
    }

    fn additional_length(&self) -> usize {
        match &self.body {
            FeatureBody::ProfileList(profiles) => profiles.len() * ProfileDescriptor::LENGTH,
            FeatureBody::Core(_) => 8,
            FeatureBody::Morphing(_) | FeatureBody::RemovableMedium(_) => 4,
            FeatureBody::RandomReadable(_) => 8,
            FeatureBody::Unknown { bytes, .. } => bytes.len(),
        }
    }
}

/// Returns the flag byte and the descriptor body, checking it holds at least
/// `minimum` bytes.
fn split(buffer: Buffer<'_>, minimum: usize) -> crate::Result<(u8, Buffer<'_>)> {
    let flags: u8 = buffer.read(2)?;
    let length = buffer.read::<u8>(3)? as usize;
    if length < minimum {
        return Err(crate::Error::Decode(format!(
            "feature {:#06x} with {length} additional bytes, at least {minimum} expected",
            buffer.read_be::<u16>(0)?
        )));
    }

    Ok((
        flags,
        buffer.extract_segment(DESCRIPTOR_HEADER_LENGTH, Some(length))?,
    ))
}

fn feature(flags: u8, body: FeatureBody) -> Feature {
    Feature {
        version: bits::get_masked(flags, 2, 0x0F),
        persistent: bits::get_bit(flags, 1),
        current: bits::get_bit(flags, 0),
        body,
    }
}

fn profile_list(buffer: Buffer<'_>) -> crate::Result<Feature> {
    let (flags, body) = split(buffer, 0)?;
    if body.len() % ProfileDescriptor::LENGTH != 0 {
        return Err(crate::Error::Decode(format!(
            "profile list of {} bytes",
            body.len()
        )));
    }

    let profiles = (0..body.len() / ProfileDescriptor::LENGTH)
        .map(|index| {
            let offset = index * ProfileDescriptor::LENGTH;
            Ok(ProfileDescriptor {
                profile: body.read_be(offset)?,
                current: bits::get_bit(body.read(offset + 2)?, 0),
            })
        })
        .collect::<crate::Result<_>>()?;

    Ok(feature(flags, FeatureBody::ProfileList(profiles)))
}

fn core(buffer: Buffer<'_>) -> crate::Result<Feature> {
    let (flags, body) = split(buffer, 4)?;
    let options: u8 = if body.len() > 4 { body.read(4)? } else { 0 };
    Ok(feature(
        flags,
        FeatureBody::Core(Core {
            physical_interface_standard: body.read_be(0)?,
            inquiry_2: bits::get_bit(options, 1),
            device_busy_event: bits::get_bit(options, 0),
        }),
    ))
}

fn morphing(buffer: Buffer<'_>) -> crate::Result<Feature> {
    let (flags, body) = split(buffer, 4)?;
    let options: u8 = body.read(0)?;
    Ok(feature(
        flags,
        FeatureBody::Morphing(Morphing {
            operational_change_event: bits::get_bit(options, 1),
            asynchronous: bits::get_bit(options, 0),
        }),
    ))
}

fn removable_medium(buffer: Buffer<'_>) -> crate::Result<Feature> {
    let (flags, body) = split(buffer, 4)?;
    let options: u8 = body.read(0)?;
    Ok(feature(
        flags,
        FeatureBody::RemovableMedium(RemovableMedium {
            loading_mechanism_type: bits::get_masked(options, 5, 0x07),
            eject: bits::get_bit(options, 3),
            prevent_jumper: bits::get_bit(options, 2),
            load: bits::get_bit(options, 4),
            lock: bits::get_bit(options, 0),
        }),
    ))
}

fn random_readable(buffer: Buffer<'_>) -> crate::Result<Feature> {
    let (flags, body) = split(buffer, 8)?;
    Ok(feature(
        flags,
        FeatureBody::RandomReadable(RandomReadable {
            logical_block_size: body.read_be(0)?,
            blocking: body.read_be(4)?,
            page_present: bits::get_bit(body.read(6)?, 0),
        }),
    ))
}

fn unknown(buffer: Buffer<'_>) -> crate::Result<Feature> {
    let (flags, body) = split(buffer, 0)?;
    Ok(feature(
        flags,
        FeatureBody::Unknown {
            feature_code: buffer.read_be(0)?,
            bytes: body.as_bytes().to_vec(),
        },
    ))
}

impl Marshal for Feature {
    fn unmarshal(buffer: Buffer<'_>) -> crate::Result<Self> {
        let length = Self::peek_length(buffer)?;
        let record = buffer.extract_segment(0, Some(length))?;

        match Self::decoder(Self::peek_type_code(record)?) {
            Some(decoder) => decoder(record),
            None => unknown(record),
        }
    }

    fn marshal(&self, buffer: &mut BufferMut<'_>) -> crate::Result<()> {
        let length = self.additional_length();
        if length > u8::MAX as usize {
            return Err(crate::Error::BadArgument(format!(
                "feature of {length} additional bytes does not fit the length field"
            )));
        }

        buffer.write_be(self.feature_code(), 0)?;
        buffer.write(
            bits::set_bit(
                bits::set_bit(bits::put_masked(0, self.version, 2, 0x0F), 1, self.persistent),
                0,
                self.current,
            ),
            2,
        )?;
        buffer.write(length as u8, 3)?;

        let mut body = buffer.extract_segment(DESCRIPTOR_HEADER_LENGTH, Some(length))?;
        body.fill(0, length, 0)?;
        match &self.body {
            FeatureBody::ProfileList(profiles) => {
                for (index, profile) in profiles.iter().enumerate() {
                    let offset = index * ProfileDescriptor::LENGTH;
                    body.write_be(profile.profile, offset)?;
                    body.write(bits::set_bit(0, 0, profile.current), offset + 2)?;
                }
                Ok(())
            }
            FeatureBody::Core(core) => {
                body.write_be(core.physical_interface_standard, 0)?;
                body.write(
                    bits::set_bit(bits::set_bit(0, 1, core.inquiry_2), 0, core.device_busy_event),
                    4,
                )
            }
            FeatureBody::Morphing(morphing) => body.write(
                bits::set_bit(
                    bits::set_bit(0, 1, morphing.operational_change_event),
                    0,
                    morphing.asynchronous,
                ),
                0,
            ),
            FeatureBody::RemovableMedium(medium) => {
                let mut options = bits::put_masked(0, medium.loading_mechanism_type, 5, 0x07);
                options = bits::set_bit(options, 4, medium.load);
                options = bits::set_bit(options, 3, medium.eject);
                options = bits::set_bit(options, 2, medium.prevent_jumper);
                options = bits::set_bit(options, 0, medium.lock);
                body.write(options, 0)
            }
            FeatureBody::RandomReadable(readable) => {
                body.write_be(readable.logical_block_size, 0)?;
                body.write_be(readable.blocking, 4)?;
                body.write(bits::set_bit(0, 0, readable.page_present), 6)
            }
            FeatureBody::Unknown { bytes, .. } => body.copy_from(0, bytes, 0, bytes.len()),
        }
    }

    fn marshaled_size(&self) -> usize {
        DESCRIPTOR_HEADER_LENGTH + self.additional_length()
    }
}

impl Family for Feature {
    const NAME: &'static str = "feature";

    fn peek_type_code(buffer: Buffer<'_>) -> crate::Result<u16> {
        buffer.read_be(0)
    }

    fn peek_length(buffer: Buffer<'_>) -> crate::Result<usize> {
        Ok(DESCRIPTOR_HEADER_LENGTH + buffer.read::<u8>(3)? as usize)
    }

    fn decoder(code: u16) -> Option<Decoder<Self>> {
        match code {
            PROFILE_LIST => Some(profile_list),
            CORE => Some(core),
            MORPHING => Some(morphing),
            REMOVABLE_MEDIUM => Some(removable_medium),
            RANDOM_READABLE => Some(random_readable),
            _ => Some(unknown),
        }
    }
}

/// Response to GET CONFIGURATION.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Configuration {
    pub current_profile: u16,
    pub features: Vec<Feature>,
}

impl Configuration {
    pub fn feature(&self, feature_code: u16) -> Option<&Feature> {
        self.features
            .iter()
            .find(|f| f.feature_code() == feature_code)
    }

    pub fn profiles(&self) -> &[ProfileDescriptor] {
        match self.feature(PROFILE_LIST).map(|f| &f.body) {
            Some(FeatureBody::ProfileList(profiles)) => profiles,
            _ => &[],
        }
    }
}

impl Marshal for Configuration {
    fn unmarshal(buffer: Buffer<'_>) -> crate::Result<Self> {
        let declared = buffer.read_be::<u32>(0)? as usize;
        let extent = declared_extent(buffer, 4, declared, "feature header")?;
        if extent.len() < FEATURE_HEADER_LENGTH {
            return Err(crate::Error::Truncated {
                family: "feature header",
                declared: FEATURE_HEADER_LENGTH,
                available: extent.len(),
            });
        }

        Ok(Self {
            current_profile: extent.read_be(6)?,
            features: unmarshal_list(
                extent.extract_segment(FEATURE_HEADER_LENGTH, None)?,
                Lookup::Strict,
            )?,
        })
    }

    fn marshal(&self, buffer: &mut BufferMut<'_>) -> crate::Result<()> {
        buffer.write_be((self.marshaled_size() - 4) as u32, 0)?;
        buffer.write_be(0u16, 4)?;
        buffer.write_be(self.current_profile, 6)?;
        marshal_list(
            &self.features,
            &mut buffer.extract_segment(FEATURE_HEADER_LENGTH, None)?,
        )?;
        Ok(())
    }

    fn marshaled_size(&self) -> usize {
        FEATURE_HEADER_LENGTH + marshaled_list_size(&self.features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configuration() -> Vec<u8> {
        let mut bytes = vec![0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10];
        // profile list: DVD-ROM (current), CD-ROM
        bytes.extend_from_slice(&[0x00, 0x00, 0x03, 0x08, 0x00, 0x10, 0x01, 0x00, 0x00, 0x08, 0x00, 0x00]);
        // core, version 2, ATAPI
        bytes.extend_from_slice(&[0x00, 0x01, 0x0B, 0x08, 0x00, 0x00, 0x00, 0x02, 0x03, 0x00, 0x00, 0x00]);
        // removable medium, tray, eject, lock
        bytes.extend_from_slice(&[0x00, 0x03, 0x03, 0x04, 0x29, 0x00, 0x00, 0x00]);
        // random readable
        bytes.extend_from_slice(&[0x00, 0x10, 0x01, 0x08, 0x00, 0x00, 0x08, 0x00, 0x00, 0x10, 0x01, 0x00]);
        // vendor feature
        bytes.extend_from_slice(&[0xFF, 0x00, 0x00, 0x02, 0xAB, 0xCD]);

        let length = (bytes.len() - 4) as u32;
        bytes[..4].copy_from_slice(&length.to_be_bytes());
        bytes
    }

    #[test]
    fn configuration_test() {
        let bytes = configuration();
        let configuration = Configuration::from_bytes(&bytes).unwrap();

        assert_eq!(configuration.current_profile, 0x0010);
        assert_eq!(configuration.features.len(), 5);
        assert_eq!(
            configuration.profiles(),
            &[
                ProfileDescriptor {
                    profile: 0x0010,
                    current: true
                },
                ProfileDescriptor {
                    profile: 0x0008,
                    current: false
                },
            ]
        );

        let core = configuration.feature(CORE).unwrap();
        assert_eq!(core.version, 2);
        assert!(core.persistent && core.current);
        assert_eq!(
            core.body,
            FeatureBody::Core(Core {
                physical_interface_standard: 2,
                inquiry_2: true,
                device_busy_event: true,
            })
        );

        assert_eq!(
            configuration.feature(REMOVABLE_MEDIUM).unwrap().body,
            FeatureBody::RemovableMedium(RemovableMedium {
                loading_mechanism_type: 1,
                load: false,
                eject: true,
                prevent_jumper: false,
                lock: true,
            })
        );
        assert!(matches!(
            configuration.feature(RANDOM_READABLE).unwrap().body,
            FeatureBody::RandomReadable(RandomReadable {
                logical_block_size: 2048,
                blocking: 16,
                page_present: true
            })
        ));
        assert!(matches!(
            configuration.feature(0xFF00).unwrap().body,
            FeatureBody::Unknown { ref bytes, .. } if bytes == &[0xAB, 0xCD]
        ));

        assert_eq!(configuration.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn short_feature_test() {
        let bytes = [0x00, 0x10, 0x01, 0x04, 0x00, 0x00, 0x08, 0x00];
        assert!(matches!(
            Feature::from_bytes(&bytes),
            Err(crate::Error::Decode(_))
        ));
    }

    #[test]
    fn truncated_header_test() {
        let mut bytes = configuration();
        bytes.truncate(20);
        assert!(matches!(
            Configuration::from_bytes(&bytes),
            Err(crate::Error::Truncated { .. })
        ));
    }
}
