//! ATA register images and the 28-bit / 48-bit command frames built from them.

use std::fmt;

use bitflags::bitflags;

use crate::{
    bits,
    buffer::{Buffer, BufferMut},
    command::bitfield_bound_check,
    marshal::Marshal,
};

const FEATURES: usize = 0;
const SECTOR_COUNT: usize = 1;
const SECTOR_NUMBER: usize = 2;
const CYLINDER: usize = 3;
const DEVICE_HEAD: usize = 5;
const COMMAND: usize = 6;

pub const TASK_FILE_LENGTH: usize = 8;

/// Device/head bit selecting LBA addressing.
pub const DEVICE_LBA: u8 = 0x40;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct AtaStatus: u8 {
        const ERROR = 0x01;
        const DATA_REQUEST = 0x08;
        const DEVICE_FAULT = 0x20;
        const DEVICE_READY = 0x40;
        const BUSY = 0x80;
    }
}

/// The 8-byte register image exchanged with the pass-through layer.
///
/// Offset 0 is features on the way in and error on the way out, offset 6 is
/// command in and status out. The cylinder at offset 3 is a plain native
/// 16-bit value.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct TaskFile([u8; TASK_FILE_LENGTH]);

impl TaskFile {
    pub const fn from_bytes(bytes: [u8; TASK_FILE_LENGTH]) -> Self {
        Self(bytes)
    }

    pub const fn into_bytes(self) -> [u8; TASK_FILE_LENGTH] {
        self.0
    }

    pub fn features(&self) -> u8 {
        self.0[FEATURES]
    }

    pub fn set_features(&mut self, value: u8) {
        self.0[FEATURES] = value;
    }

    pub fn error(&self) -> u8 {
        self.0[FEATURES]
    }

    pub fn sector_count(&self) -> u8 {
        self.0[SECTOR_COUNT]
    }

    pub fn set_sector_count(&mut self, value: u8) {
        self.0[SECTOR_COUNT] = value;
    }

    pub fn sector_number(&self) -> u8 {
        self.0[SECTOR_NUMBER]
    }

    pub fn set_sector_number(&mut self, value: u8) {
        self.0[SECTOR_NUMBER] = value;
    }

    pub fn cylinder(&self) -> u16 {
        u16::from_ne_bytes([self.0[CYLINDER], self.0[CYLINDER + 1]])
    }

    pub fn set_cylinder(&mut self, value: u16) {
        self.0[CYLINDER..CYLINDER + 2].copy_from_slice(&value.to_ne_bytes());
    }

    pub fn cylinder_low(&self) -> u8 {
        self.cylinder() as u8
    }

    pub fn cylinder_high(&self) -> u8 {
        (self.cylinder() >> 8) as u8
    }

    pub fn device_head(&self) -> u8 {
        self.0[DEVICE_HEAD]
    }

    pub fn set_device_head(&mut self, value: u8) {
        self.0[DEVICE_HEAD] = value;
    }

    /// Head number or LBA bits 24..28, bits 0..4 of device/head.
    pub fn head(&self) -> u8 {
        bits::get_masked(self.device_head(), 0, 0x0F)
    }

    pub fn set_head(&mut self, value: u8) {
        self.0[DEVICE_HEAD] = bits::put_masked(self.device_head(), value, 0, 0x0F);
    }

    pub fn command(&self) -> u8 {
        self.0[COMMAND]
    }

    pub fn set_command(&mut self, value: u8) {
        self.0[COMMAND] = value;
    }

    pub fn status(&self) -> AtaStatus {
        AtaStatus::from_bits_retain(self.0[COMMAND])
    }

    /// The 24 address bits held by sector number and cylinder.
    pub fn lba_low24(&self) -> u32 {
        self.sector_number() as u32 | (self.cylinder() as u32) << 8
    }

    /// Truncates to 24 bits.
    pub fn set_lba_low24(&mut self, lba: u32) {
        self.set_sector_number(lba as u8);
        self.set_cylinder((lba >> 8) as u16);
    }
}

impl fmt::Debug for TaskFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskFile")
            .field("features_error", &format_args!("{:#04x}", self.features()))
            .field("sector_count", &self.sector_count())
            .field("sector_number", &self.sector_number())
            .field("cylinder", &format_args!("{:#06x}", self.cylinder()))
            .field("device_head", &format_args!("{:#04x}", self.device_head()))
            .field("command_status", &format_args!("{:#04x}", self.command()))
            .finish()
    }
}

impl Marshal for TaskFile {
    fn unmarshal(buffer: Buffer<'_>) -> crate::Result<Self> {
        Ok(Self(buffer.read_array(0)?))
    }

    fn marshal(&self, buffer: &mut BufferMut<'_>) -> crate::Result<()> {
        buffer.copy_from(0, &self.0, 0, TASK_FILE_LENGTH)
    }

    fn marshaled_size(&self) -> usize {
        TASK_FILE_LENGTH
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Addressing {
    Lba28,
    Lba48,
}

impl Addressing {
    /// Width of the LBA a frame of this shape can carry.
    pub const fn lba_bits(self) -> u32 {
        match self {
            Addressing::Lba28 => 24,
            Addressing::Lba48 => 48,
        }
    }

    pub const fn count_bits(self) -> u32 {
        match self {
            Addressing::Lba28 => 8,
            Addressing::Lba48 => 16,
        }
    }

    /// Sectors a raw count field stands for: zero means the largest transfer.
    pub const fn transfer_sectors(self, count: u32) -> u32 {
        if count == 0 {
            1 << self.count_bits()
        } else {
            count
        }
    }

    pub const fn max_transfer_sectors(self) -> u32 {
        1 << self.count_bits()
    }
}

/// The register pair for one command. `previous` is only transmitted for
/// 48-bit commands and holds the high halves of LBA, count and features.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandFrame {
    pub current: TaskFile,
    pub previous: TaskFile,
    pub addressing: Addressing,
}

impl CommandFrame {
    /// A frame without an address, for commands such as IDENTIFY DEVICE.
    pub fn new(command: u8) -> Self {
        let mut current = TaskFile::default();
        current.set_command(command);

        Self {
            current,
            previous: TaskFile::default(),
            addressing: Addressing::Lba28,
        }
    }

    /// `count` of zero requests 256 sectors.
    pub fn lba28(command: u8, lba: u64, count: u32) -> crate::Result<Self> {
        bitfield_bound_check!(lba, 24, "28-bit command lba")?;
        bitfield_bound_check!(count, 8, "28-bit command sector count")?;

        let mut frame = Self::new(command);
        frame.current.set_lba_low24(lba as u32);
        frame.current.set_sector_count(count as u8);
        frame.current.set_device_head(DEVICE_LBA);

        Ok(frame)
    }

    /// `count` of zero requests 65536 sectors.
    pub fn lba48(command: u8, lba: u64, count: u32) -> crate::Result<Self> {
        bitfield_bound_check!(lba, 48, "48-bit command lba")?;
        bitfield_bound_check!(count, 16, "48-bit command sector count")?;

        let mut frame = Self::new(command);
        frame.addressing = Addressing::Lba48;
        frame.current.set_lba_low24((lba & 0xFF_FFFF) as u32);
        frame.previous.set_lba_low24((lba >> 24) as u32);
        frame.current.set_sector_count(count as u8);
        frame.previous.set_sector_count((count >> 8) as u8);
        frame.current.set_device_head(DEVICE_LBA);

        Ok(frame)
    }

    pub fn addressed(
        addressing: Addressing,
        command: u8,
        lba: u64,
        count: u32,
    ) -> crate::Result<Self> {
        match addressing {
            Addressing::Lba28 => Self::lba28(command, lba, count),
            Addressing::Lba48 => Self::lba48(command, lba, count),
        }
    }

    /// Rebuilds a frame from a register pair returned by the device.
    pub fn from_registers(current: TaskFile, previous: TaskFile, addressing: Addressing) -> Self {
        Self {
            current,
            previous,
            addressing,
        }
    }

    pub fn with_features(mut self, features: u16) -> Self {
        self.current.set_features(features as u8);
        if self.addressing == Addressing::Lba48 {
            self.previous.set_features((features >> 8) as u8);
        }
        self
    }

    pub fn lba(&self) -> u64 {
        match self.addressing {
            Addressing::Lba28 => self.current.lba_low24() as u64,
            Addressing::Lba48 => {
                self.current.lba_low24() as u64 | (self.previous.lba_low24() as u64) << 24
            }
        }
    }

    /// The raw count field, zero included.
    pub fn sector_count(&self) -> u32 {
        match self.addressing {
            Addressing::Lba28 => self.current.sector_count() as u32,
            Addressing::Lba48 => {
                self.current.sector_count() as u32 | (self.previous.sector_count() as u32) << 8
            }
        }
    }

    pub fn transfer_sectors(&self) -> u32 {
        self.addressing.transfer_sectors(self.sector_count())
    }
}
