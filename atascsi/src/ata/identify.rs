//! IDENTIFY DEVICE data: 256 little-endian words.

use crate::{
    buffer::{Buffer, BufferMut},
    marshal::Marshal,
};

pub const IDENTIFY_DATA_LENGTH: usize = 512;

const WORD_SERIAL_NUMBER: usize = 10;
const WORD_FIRMWARE_REVISION: usize = 23;
const WORD_MODEL_NUMBER: usize = 27;
const WORD_CAPABILITIES: usize = 49;
const WORD_LBA28_SECTORS: usize = 60;
const WORD_COMMAND_SET_SUPPORTED: usize = 83;
const WORD_COMMAND_SET_ENABLED: usize = 86;
const WORD_LBA48_SECTORS: usize = 100;
const WORD_SECTOR_SIZE: usize = 106;
const WORD_LOGICAL_SECTOR_SIZE: usize = 117;
const WORD_INTEGRITY: usize = 255;

const INTEGRITY_SIGNATURE: u8 = 0xA5;

const DEFAULT_LOGICAL_SECTOR_SIZE: u32 = 512;
/// Largest logical sector size accepted from words 117-118.
pub const MAX_LOGICAL_SECTOR_SIZE: u32 = 1 << 16;

#[derive(Clone, PartialEq, Eq)]
pub struct IdentifyDeviceData {
    words: [u16; 256],
}

impl Default for IdentifyDeviceData {
    fn default() -> Self {
        Self { words: [0; 256] }
    }
}

impl std::fmt::Debug for IdentifyDeviceData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentifyDeviceData")
            .field("model_number", &self.model_number())
            .field("serial_number", &self.serial_number())
            .field("firmware_revision", &self.firmware_revision())
            .field("user_addressable_sectors", &self.user_addressable_sectors())
            .field("logical_sector_size", &self.logical_sector_size())
            .field("supports_lba48", &self.supports_lba48())
            .field("supports_dma", &self.supports_dma())
            .finish()
    }
}

impl IdentifyDeviceData {
    pub fn from_words(words: [u16; 256]) -> Self {
        Self { words }
    }

    pub fn words(&self) -> &[u16; 256] {
        &self.words
    }

    pub fn word(&self, index: usize) -> u16 {
        self.words[index]
    }

    fn word_bit(&self, index: usize, bit: u32) -> bool {
        self.words[index] >> bit & 1 != 0
    }

    fn dword(&self, index: usize) -> u32 {
        self.words[index] as u32 | (self.words[index + 1] as u32) << 16
    }

    fn qword(&self, index: usize) -> u64 {
        self.dword(index) as u64 | (self.dword(index + 2) as u64) << 32
    }

    /// ATA strings store two characters per word, first character in the high byte.
    fn string(&self, index: usize, words: usize) -> String {
        self.words[index..index + words]
            .iter()
            .flat_map(|w| w.to_be_bytes())
            .map(|b| b as char)
            .collect::<String>()
            .trim()
            .to_owned()
    }

    pub fn serial_number(&self) -> String {
        self.string(WORD_SERIAL_NUMBER, 10)
    }

    pub fn firmware_revision(&self) -> String {
        self.string(WORD_FIRMWARE_REVISION, 4)
    }

    pub fn model_number(&self) -> String {
        self.string(WORD_MODEL_NUMBER, 20)
    }

    pub fn supports_dma(&self) -> bool {
        self.word_bit(WORD_CAPABILITIES, 8)
    }

    pub fn supports_lba(&self) -> bool {
        self.word_bit(WORD_CAPABILITIES, 9)
    }

    pub fn supports_lba48(&self) -> bool {
        self.word_bit(WORD_COMMAND_SET_SUPPORTED, 10)
    }

    pub fn lba48_enabled(&self) -> bool {
        self.word_bit(WORD_COMMAND_SET_ENABLED, 10)
    }

    /// 48-bit commands are only issued when word 86 reports the feature set
    /// enabled; a device configuration overlay can leave it supported but off.
    pub fn lba48_usable(&self) -> bool {
        self.supports_lba48() && self.lba48_enabled()
    }

    pub fn supports_smart(&self) -> bool {
        self.word_bit(82, 0)
    }

    pub fn lba28_sectors(&self) -> u32 {
        self.dword(WORD_LBA28_SECTORS)
    }

    pub fn lba48_sectors(&self) -> u64 {
        self.qword(WORD_LBA48_SECTORS)
    }

    /// Number of addressable sectors, the highest LBA plus one.
    pub fn user_addressable_sectors(&self) -> u64 {
        if self.lba48_usable() && self.lba48_sectors() != 0 {
            self.lba48_sectors()
        } else {
            self.lba28_sectors() as u64
        }
    }

    /// Word 106 is only meaningful with bit 14 set and bit 15 clear.
    fn sector_size_word_valid(&self) -> bool {
        self.words[WORD_SECTOR_SIZE] & 0xC000 == 0x4000
    }

    /// Size from words 117-118, `Err` when it is not a multiple of 512 up to
    /// [`MAX_LOGICAL_SECTOR_SIZE`].
    fn declared_logical_sector_size(&self) -> crate::Result<u32> {
        if !self.sector_size_word_valid() || !self.word_bit(WORD_SECTOR_SIZE, 12) {
            return Ok(DEFAULT_LOGICAL_SECTOR_SIZE);
        }

        match self.dword(WORD_LOGICAL_SECTOR_SIZE) {
            0 => Ok(DEFAULT_LOGICAL_SECTOR_SIZE),
            words => words
                .checked_mul(2)
                .filter(|size| {
                    *size <= MAX_LOGICAL_SECTOR_SIZE && size % DEFAULT_LOGICAL_SECTOR_SIZE == 0
                })
                .ok_or_else(|| {
                    crate::Error::Decode(format!(
                        "implausible logical sector size of {words} words"
                    ))
                }),
        }
    }

    /// Falls back to 512 bytes when words 117-118 hold an implausible size;
    /// decoding through [`Marshal`] rejects such data instead.
    pub fn logical_sector_size(&self) -> u32 {
        self.declared_logical_sector_size()
            .unwrap_or(DEFAULT_LOGICAL_SECTOR_SIZE)
    }

    pub fn logical_sectors_per_physical_sector(&self) -> u32 {
        if self.sector_size_word_valid() && self.word_bit(WORD_SECTOR_SIZE, 13) {
            1 << (self.words[WORD_SECTOR_SIZE] & 0x0F)
        } else {
            1
        }
    }

    /// `None` when the device does not provide the integrity word.
    pub fn checksum_valid(&self) -> Option<bool> {
        let [signature, _] = self.words[WORD_INTEGRITY].to_le_bytes();
        if signature != INTEGRITY_SIGNATURE {
            return None;
        }

        let sum = self
            .words
            .iter()
            .flat_map(|w| w.to_le_bytes())
            .fold(0_u8, u8::wrapping_add);

        Some(sum == 0)
    }

    /// Sets the integrity word so that [`Self::checksum_valid`] holds.
    pub fn seal(&mut self) {
        self.words[WORD_INTEGRITY] = INTEGRITY_SIGNATURE as u16;
        let sum = self
            .words
            .iter()
            .flat_map(|w| w.to_le_bytes())
            .fold(0_u8, u8::wrapping_add);
        self.words[WORD_INTEGRITY] = u16::from_le_bytes([INTEGRITY_SIGNATURE, sum.wrapping_neg()]);
    }
}

impl Marshal for IdentifyDeviceData {
    /// Fails when the integrity word is present and does not match.
    fn unmarshal(buffer: Buffer<'_>) -> crate::Result<Self> {
        let mut words = [0u16; 256];
        for (index, word) in words.iter_mut().enumerate() {
            *word = u16::from_le(buffer.read(index * 2)?);
        }

        let data = Self { words };
        if data.checksum_valid() == Some(false) {
            return Err(crate::Error::Decode(
                "identify device data checksum mismatch".to_owned(),
            ));
        }
        data.declared_logical_sector_size()?;

        Ok(data)
    }

    fn marshal(&self, buffer: &mut BufferMut<'_>) -> crate::Result<()> {
        for (index, word) in self.words.iter().enumerate() {
            buffer.write(word.to_le(), index * 2)?;
        }
        Ok(())
    }

    fn marshaled_size(&self) -> usize {
        IDENTIFY_DATA_LENGTH
    }
}

/// Builder for identify data, mostly useful for emulating devices.
#[derive(Clone, Debug, Default)]
pub struct IdentifyBuilder {
    data: IdentifyDeviceData,
}

impl IdentifyBuilder {
    pub fn new() -> Self {
        let mut builder = Self::default();
        builder.data.words[WORD_CAPABILITIES] = 1 << 9;
        builder
    }

    fn put_string(&mut self, index: usize, words: usize, text: &str) {
        let mut bytes = vec![b' '; words * 2];
        let used = usize::min(text.len(), bytes.len());
        bytes[..used].copy_from_slice(&text.as_bytes()[..used]);

        for (word, pair) in self.data.words[index..index + words]
            .iter_mut()
            .zip(bytes.chunks(2))
        {
            *word = u16::from_be_bytes([pair[0], pair[1]]);
        }
    }

    pub fn model_number(&mut self, text: &str) -> &mut Self {
        self.put_string(WORD_MODEL_NUMBER, 20, text);
        self
    }

    pub fn serial_number(&mut self, text: &str) -> &mut Self {
        self.put_string(WORD_SERIAL_NUMBER, 10, text);
        self
    }

    pub fn firmware_revision(&mut self, text: &str) -> &mut Self {
        self.put_string(WORD_FIRMWARE_REVISION, 4, text);
        self
    }

    pub fn dma(&mut self, value: bool) -> &mut Self {
        let word = &mut self.data.words[WORD_CAPABILITIES];
        *word = (*word & !(1 << 8)) | (value as u16) << 8;
        self
    }

    pub fn sectors(&mut self, sectors: u64, lba48: bool) -> &mut Self {
        let lba28 = u64::min(sectors, 0x0FFF_FFFF) as u32;
        self.data.words[WORD_LBA28_SECTORS] = lba28 as u16;
        self.data.words[WORD_LBA28_SECTORS + 1] = (lba28 >> 16) as u16;

        for (i, word) in self.data.words[WORD_LBA48_SECTORS..WORD_LBA48_SECTORS + 4]
            .iter_mut()
            .enumerate()
        {
            *word = if lba48 { (sectors >> (16 * i)) as u16 } else { 0 };
        }

        for index in [WORD_COMMAND_SET_SUPPORTED, WORD_COMMAND_SET_ENABLED] {
            let word = &mut self.data.words[index];
            *word = (*word & !(1 << 10)) | (lba48 as u16) << 10;
        }
        self
    }

    pub fn logical_sector_size(&mut self, size: u32) -> &mut Self {
        if size == 512 {
            self.data.words[WORD_SECTOR_SIZE] = 0x4000;
            return self;
        }

        self.data.words[WORD_SECTOR_SIZE] = 0x4000 | 1 << 12;
        let words = size / 2;
        self.data.words[WORD_LOGICAL_SECTOR_SIZE] = words as u16;
        self.data.words[WORD_LOGICAL_SECTOR_SIZE + 1] = (words >> 16) as u16;
        self
    }

    pub fn build(&self) -> IdentifyDeviceData {
        let mut data = self.data.clone();
        data.seal();
        data
    }
}
