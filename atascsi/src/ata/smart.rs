//! SMART data structures: attribute table, threshold table and the self-test
//! log. All three are 512-byte pages with a two's complement checksum in the
//! last byte.

use crate::{
    buffer::{Buffer, BufferMut},
    marshal::{unmarshal_fixed_list, Marshal},
};

pub const SMART_PAGE_LENGTH: usize = 512;

const ATTRIBUTE_TABLE_OFFSET: usize = 2;
const ATTRIBUTE_LENGTH: usize = 12;
const ATTRIBUTE_COUNT: usize = 30;

const OFFLINE_COLLECTION_STATUS: usize = 362;
const SELF_TEST_EXECUTION_STATUS: usize = 363;
const OFFLINE_COLLECTION_TIME: usize = 364;
const OFFLINE_COLLECTION_CAPABILITY: usize = 367;
const SMART_CAPABILITY: usize = 368;
const ERROR_LOGGING_CAPABILITY: usize = 370;
const SHORT_SELF_TEST_TIME: usize = 372;
const EXTENDED_SELF_TEST_TIME: usize = 373;

const SELF_TEST_DESCRIPTOR_LENGTH: usize = 24;
const SELF_TEST_DESCRIPTOR_COUNT: usize = 21;
const SELF_TEST_INDEX: usize = 508;

const CHECKSUM: usize = 511;

/// Log address of the SMART self-test log.
pub const SELF_TEST_LOG_ADDRESS: u8 = 0x06;

/// Result of SMART RETURN STATUS.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SmartStatus {
    ThresholdNotExceeded,
    ThresholdExceeded,
}

/// Subcommands for SMART EXECUTE OFF-LINE IMMEDIATE, carried in the LBA low
/// register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum OfflineRoutine {
    OfflineCollection = 0x00,
    ShortSelfTest = 0x01,
    ExtendedSelfTest = 0x02,
    ConveyanceSelfTest = 0x03,
    AbortSelfTest = 0x7F,
    ShortSelfTestCaptive = 0x81,
    ExtendedSelfTestCaptive = 0x82,
    ConveyanceSelfTestCaptive = 0x83,
}

fn checksum_valid(buffer: Buffer<'_>) -> crate::Result<bool> {
    let page = buffer.extract_segment(0, Some(SMART_PAGE_LENGTH))?;
    Ok(page.as_bytes().iter().fold(0_u8, |a, b| a.wrapping_add(*b)) == 0)
}

fn check_page(buffer: Buffer<'_>, name: &str) -> crate::Result<()> {
    if checksum_valid(buffer)? {
        Ok(())
    } else {
        Err(crate::Error::Decode(format!("{name} checksum mismatch")))
    }
}

fn seal_page(buffer: &mut BufferMut<'_>) -> crate::Result<()> {
    buffer.write(0_u8, CHECKSUM)?;
    let page = buffer.as_buffer().extract_segment(0, Some(SMART_PAGE_LENGTH))?;
    let sum = page.as_bytes().iter().fold(0_u8, |a, b| a.wrapping_add(*b));
    buffer.write(sum.wrapping_neg(), CHECKSUM)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SmartAttribute {
    pub id: u8,
    pub flags: u16,
    pub current: u8,
    pub worst: u8,
    pub raw: [u8; 6],
    pub reserved: u8,
}

impl SmartAttribute {
    pub fn prefailure(&self) -> bool {
        self.flags & 0x0001 != 0
    }

    pub fn online(&self) -> bool {
        self.flags & 0x0002 != 0
    }

    /// The raw counter as a 48-bit little-endian value.
    pub fn raw_value(&self) -> u64 {
        self.raw
            .iter()
            .rev()
            .fold(0, |value, byte| value << 8 | *byte as u64)
    }
}

impl Marshal for SmartAttribute {
    fn unmarshal(buffer: Buffer<'_>) -> crate::Result<Self> {
        Ok(Self {
            id: buffer.read(0)?,
            flags: u16::from_le(buffer.read(1)?),
            current: buffer.read(3)?,
            worst: buffer.read(4)?,
            raw: buffer.read_array(5)?,
            reserved: buffer.read(11)?,
        })
    }

    fn marshal(&self, buffer: &mut BufferMut<'_>) -> crate::Result<()> {
        buffer.write(self.id, 0)?;
        buffer.write(self.flags.to_le(), 1)?;
        buffer.write(self.current, 3)?;
        buffer.write(self.worst, 4)?;
        buffer.copy_from(5, &self.raw, 0, self.raw.len())?;
        buffer.write(self.reserved, 11)
    }

    fn marshaled_size(&self) -> usize {
        ATTRIBUTE_LENGTH
    }
}

/// SMART READ DATA. Attribute slots with id zero are unused and dropped.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SmartData {
    pub revision: u16,
    pub attributes: Vec<SmartAttribute>,
    pub offline_collection_status: u8,
    pub self_test_execution_status: u8,
    pub offline_collection_time: u16,
    pub offline_collection_capability: u8,
    pub smart_capability: u16,
    pub error_logging_capability: u8,
    pub short_self_test_time: u8,
    pub extended_self_test_time: u8,
}

impl SmartData {
    pub fn attribute(&self, id: u8) -> Option<&SmartAttribute> {
        self.attributes.iter().find(|a| a.id == id)
    }

    /// Percent of the running self-test left to complete, in steps of ten.
    pub fn self_test_remaining(&self) -> u8 {
        (self.self_test_execution_status & 0x0F) * 10
    }

    pub fn self_test_in_progress(&self) -> bool {
        self.self_test_execution_status >> 4 == 0x0F
    }
}

impl Marshal for SmartData {
    fn unmarshal(buffer: Buffer<'_>) -> crate::Result<Self> {
        check_page(buffer, "smart data")?;

        let table = buffer.extract_segment(
            ATTRIBUTE_TABLE_OFFSET,
            Some(ATTRIBUTE_COUNT * ATTRIBUTE_LENGTH),
        )?;
        let attributes = unmarshal_fixed_list::<SmartAttribute>(table, ATTRIBUTE_LENGTH, "smart attribute")?
            .into_iter()
            .filter(|a| a.id != 0)
            .collect();

        Ok(Self {
            revision: u16::from_le(buffer.read(0)?),
            attributes,
            offline_collection_status: buffer.read(OFFLINE_COLLECTION_STATUS)?,
            self_test_execution_status: buffer.read(SELF_TEST_EXECUTION_STATUS)?,
            offline_collection_time: u16::from_le(buffer.read(OFFLINE_COLLECTION_TIME)?),
            offline_collection_capability: buffer.read(OFFLINE_COLLECTION_CAPABILITY)?,
            smart_capability: u16::from_le(buffer.read(SMART_CAPABILITY)?),
            error_logging_capability: buffer.read(ERROR_LOGGING_CAPABILITY)?,
            short_self_test_time: buffer.read(SHORT_SELF_TEST_TIME)?,
            extended_self_test_time: buffer.read(EXTENDED_SELF_TEST_TIME)?,
        })
    }

    fn marshal(&self, buffer: &mut BufferMut<'_>) -> crate::Result<()> {
        if self.attributes.len() > ATTRIBUTE_COUNT {
            return Err(crate::Error::BadArgument(format!(
                "at most {ATTRIBUTE_COUNT} smart attributes fit a page, {} given",
                self.attributes.len()
            )));
        }

        buffer.fill(0, SMART_PAGE_LENGTH, 0)?;
        buffer.write(self.revision.to_le(), 0)?;
        for (index, attribute) in self.attributes.iter().enumerate() {
            let offset = ATTRIBUTE_TABLE_OFFSET + index * ATTRIBUTE_LENGTH;
            attribute.marshal(&mut buffer.extract_segment(offset, Some(ATTRIBUTE_LENGTH))?)?;
        }
        buffer.write(self.offline_collection_status, OFFLINE_COLLECTION_STATUS)?;
        buffer.write(self.self_test_execution_status, SELF_TEST_EXECUTION_STATUS)?;
        buffer.write(self.offline_collection_time.to_le(), OFFLINE_COLLECTION_TIME)?;
        buffer.write(self.offline_collection_capability, OFFLINE_COLLECTION_CAPABILITY)?;
        buffer.write(self.smart_capability.to_le(), SMART_CAPABILITY)?;
        buffer.write(self.error_logging_capability, ERROR_LOGGING_CAPABILITY)?;
        buffer.write(self.short_self_test_time, SHORT_SELF_TEST_TIME)?;
        buffer.write(self.extended_self_test_time, EXTENDED_SELF_TEST_TIME)?;

        seal_page(buffer)
    }

    fn marshaled_size(&self) -> usize {
        SMART_PAGE_LENGTH
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SmartThreshold {
    pub id: u8,
    pub threshold: u8,
}

/// SMART READ THRESHOLDS. Entries line up with the attribute table slots.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SmartThresholds {
    pub revision: u16,
    pub thresholds: Vec<SmartThreshold>,
}

impl SmartThresholds {
    pub fn threshold(&self, id: u8) -> Option<u8> {
        self.thresholds
            .iter()
            .find(|t| t.id == id)
            .map(|t| t.threshold)
    }
}

impl Marshal for SmartThresholds {
    fn unmarshal(buffer: Buffer<'_>) -> crate::Result<Self> {
        check_page(buffer, "smart thresholds")?;

        let mut thresholds = vec![];
        for index in 0..ATTRIBUTE_COUNT {
            let offset = ATTRIBUTE_TABLE_OFFSET + index * ATTRIBUTE_LENGTH;
            let id: u8 = buffer.read(offset)?;
            if id != 0 {
                thresholds.push(SmartThreshold {
                    id,
                    threshold: buffer.read(offset + 1)?,
                });
            }
        }

        Ok(Self {
            revision: u16::from_le(buffer.read(0)?),
            thresholds,
        })
    }

    fn marshal(&self, buffer: &mut BufferMut<'_>) -> crate::Result<()> {
        if self.thresholds.len() > ATTRIBUTE_COUNT {
            return Err(crate::Error::BadArgument(format!(
                "at most {ATTRIBUTE_COUNT} smart thresholds fit a page, {} given",
                self.thresholds.len()
            )));
        }

        buffer.fill(0, SMART_PAGE_LENGTH, 0)?;
        buffer.write(self.revision.to_le(), 0)?;
        for (index, entry) in self.thresholds.iter().enumerate() {
            let offset = ATTRIBUTE_TABLE_OFFSET + index * ATTRIBUTE_LENGTH;
            buffer.write(entry.id, offset)?;
            buffer.write(entry.threshold, offset + 1)?;
        }

        seal_page(buffer)
    }

    fn marshaled_size(&self) -> usize {
        SMART_PAGE_LENGTH
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SelfTestDescriptor {
    /// Value of the LBA low register when the test was started.
    pub routine: u8,
    pub execution_status: u8,
    pub life_timestamp: u16,
    pub checkpoint: u8,
    pub failing_lba: u32,
}

impl SelfTestDescriptor {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Upper nibble of the execution status; zero means the test passed.
    pub fn result(&self) -> u8 {
        self.execution_status >> 4
    }
}

impl Marshal for SelfTestDescriptor {
    fn unmarshal(buffer: Buffer<'_>) -> crate::Result<Self> {
        Ok(Self {
            routine: buffer.read(0)?,
            execution_status: buffer.read(1)?,
            life_timestamp: u16::from_le(buffer.read(2)?),
            checkpoint: buffer.read(4)?,
            failing_lba: u32::from_le(buffer.read(5)?),
        })
    }

    fn marshal(&self, buffer: &mut BufferMut<'_>) -> crate::Result<()> {
        buffer.fill(0, SELF_TEST_DESCRIPTOR_LENGTH, 0)?;
        buffer.write(self.routine, 0)?;
        buffer.write(self.execution_status, 1)?;
        buffer.write(self.life_timestamp.to_le(), 2)?;
        buffer.write(self.checkpoint, 4)?;
        buffer.write(self.failing_lba.to_le(), 5)
    }

    fn marshaled_size(&self) -> usize {
        SELF_TEST_DESCRIPTOR_LENGTH
    }
}

/// The SMART self-test log (log address 06h).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SelfTestLog {
    pub revision: u16,
    /// All 21 slots in storage order.
    pub descriptors: Vec<SelfTestDescriptor>,
    /// One-based slot of the most recent entry, zero for an empty log.
    pub index: u8,
}

impl SelfTestLog {
    /// Non-empty entries, most recent first.
    pub fn entries(&self) -> Vec<SelfTestDescriptor> {
        let count = self.descriptors.len();
        if self.index == 0 || self.index as usize > count {
            return vec![];
        }

        (0..count)
            .map(|age| self.descriptors[(self.index as usize - 1 + count - age) % count])
            .filter(|d| !d.is_empty())
            .collect()
    }
}

impl Marshal for SelfTestLog {
    fn unmarshal(buffer: Buffer<'_>) -> crate::Result<Self> {
        check_page(buffer, "self-test log")?;

        let table = buffer.extract_segment(
            ATTRIBUTE_TABLE_OFFSET,
            Some(SELF_TEST_DESCRIPTOR_COUNT * SELF_TEST_DESCRIPTOR_LENGTH),
        )?;

        Ok(Self {
            revision: u16::from_le(buffer.read(0)?),
            descriptors: unmarshal_fixed_list(
                table,
                SELF_TEST_DESCRIPTOR_LENGTH,
                "self-test descriptor",
            )?,
            index: buffer.read(SELF_TEST_INDEX)?,
        })
    }

    fn marshal(&self, buffer: &mut BufferMut<'_>) -> crate::Result<()> {
        if self.descriptors.len() > SELF_TEST_DESCRIPTOR_COUNT {
            return Err(crate::Error::BadArgument(format!(
                "at most {SELF_TEST_DESCRIPTOR_COUNT} self-test descriptors fit the log, {} given",
                self.descriptors.len()
            )));
        }

        buffer.fill(0, SMART_PAGE_LENGTH, 0)?;
        buffer.write(self.revision.to_le(), 0)?;
        for (index, descriptor) in self.descriptors.iter().enumerate() {
            let offset = ATTRIBUTE_TABLE_OFFSET + index * SELF_TEST_DESCRIPTOR_LENGTH;
            descriptor.marshal(
                &mut buffer.extract_segment(offset, Some(SELF_TEST_DESCRIPTOR_LENGTH))?,
            )?;
        }
        buffer.write(self.index, SELF_TEST_INDEX)?;

        seal_page(buffer)
    }

    fn marshaled_size(&self) -> usize {
        SMART_PAGE_LENGTH
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temperature() -> SmartAttribute {
        SmartAttribute {
            id: 194,
            flags: 0x0022,
            current: 110,
            worst: 95,
            raw: [37, 0, 14, 0, 45, 0],
            reserved: 0,
        }
    }

    #[test]
    fn attribute_test() {
        let mut page = [0u8; 512];
        page[0] = 0x10;
        page[2..14].copy_from_slice(&[194, 0x22, 0x00, 110, 95, 37, 0, 14, 0, 45, 0, 0]);
        page[363] = 0xF3;
        page[372] = 2;
        let sum = page.iter().fold(0_u8, |a, b| a.wrapping_add(*b));
        page[511] = sum.wrapping_neg();

        let data = SmartData::from_bytes(&page).unwrap();
        assert_eq!(data.revision, 0x10);
        assert_eq!(data.attributes, vec![temperature()]);
        assert!(data.attribute(194).unwrap().online());
        assert!(!data.attribute(194).unwrap().prefailure());
        assert_eq!(data.attribute(194).unwrap().raw_value(), 0x2D_000E_0025);
        assert!(data.self_test_in_progress());
        assert_eq!(data.self_test_remaining(), 30);
        assert_eq!(data.short_self_test_time, 2);

        assert_eq!(data.to_bytes().unwrap(), page.to_vec());
    }

    #[test]
    fn checksum_test() {
        let mut page = SmartData {
            attributes: vec![temperature()],
            ..Default::default()
        }
        .to_bytes()
        .unwrap();

        page[100] ^= 0xFF;
        assert!(matches!(
            SmartData::from_bytes(&page),
            Err(crate::Error::Decode(_))
        ));
    }

    #[test]
    fn thresholds_test() {
        let thresholds = SmartThresholds {
            revision: 0x10,
            thresholds: vec![
                SmartThreshold { id: 1, threshold: 51 },
                SmartThreshold { id: 5, threshold: 140 },
            ],
        };

        let bytes = thresholds.to_bytes().unwrap();
        assert_eq!(bytes[14], 5);
        assert_eq!(bytes[15], 140);

        let decoded = SmartThresholds::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.threshold(5), Some(140));
        assert_eq!(decoded.threshold(9), None);
    }

    #[test]
    fn self_test_log_test() {
        let mut descriptors = vec![SelfTestDescriptor::default(); SELF_TEST_DESCRIPTOR_COUNT];
        descriptors[0] = SelfTestDescriptor {
            routine: 0x01,
            execution_status: 0x00,
            life_timestamp: 1200,
            ..Default::default()
        };
        descriptors[1] = SelfTestDescriptor {
            routine: 0x02,
            execution_status: 0x70,
            life_timestamp: 1300,
            checkpoint: 0,
            failing_lba: 0x0012_3456,
        };

        let log = SelfTestLog {
            revision: 1,
            descriptors,
            index: 2,
        };

        let bytes = log.to_bytes().unwrap();
        assert_eq!(bytes[SELF_TEST_INDEX], 2);

        let decoded = SelfTestLog::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, log);

        let entries = decoded.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].failing_lba, 0x0012_3456);
        assert_eq!(entries[0].result(), 7);
        assert_eq!(entries[1].life_timestamp, 1200);
    }
}
