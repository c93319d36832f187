//! Sub-byte field accessors and byte order conversion.
//!
//! All functions are total. Masked setters truncate values wider than the
//! mask, range checking is left to the caller.

#[inline]
pub const fn get_bit(byte: u8, index: u32) -> bool {
    (byte >> index) & 1 != 0
}

#[inline]
pub const fn set_bit(byte: u8, index: u32, value: bool) -> u8 {
    if value {
        byte | (1 << index)
    } else {
        byte & !(1 << index)
    }
}

/// Extracts `(byte >> shift) & mask`. `mask` is given unshifted.
#[inline]
pub const fn get_masked(byte: u8, shift: u32, mask: u8) -> u8 {
    (byte >> shift) & mask
}

#[inline]
pub const fn put_masked(byte: u8, value: u8, shift: u32, mask: u8) -> u8 {
    (byte & !(mask << shift)) | ((value & mask) << shift)
}

/// Conversion between native and big-endian representation.
///
/// `u128` stands in for 16-byte identifier blocks (NAA extended names and
/// similar), which travel in network order like every other SCSI field.
pub trait BigEndian: Copy {
    fn to_big_endian(self) -> Self;
    fn from_big_endian(self) -> Self;
}

macro_rules! impl_big_endian {
    ($($t:ty),*) => {
        $(
            impl BigEndian for $t {
                #[inline]
                fn to_big_endian(self) -> Self {
                    self.to_be()
                }

                #[inline]
                fn from_big_endian(self) -> Self {
                    <$t>::from_be(self)
                }
            }
        )*
    };
}

impl_big_endian!(u8, u16, u32, u64, u128, i16, i32, i64);

/// Reads a 24-bit big-endian value, as used by MSF addresses and several MMC
/// length fields.
#[inline]
pub const fn u24_from_be_bytes(bytes: [u8; 3]) -> u32 {
    (bytes[0] as u32) << 16 | (bytes[1] as u32) << 8 | bytes[2] as u32
}

#[inline]
pub const fn u24_to_be_bytes(value: u32) -> [u8; 3] {
    [(value >> 16) as u8, (value >> 8) as u8, value as u8]
}
