//! Bounds-checked views used by all marshaling code.
//!
//! A view never owns its memory and never outlives the call that created it.
//! Every accessor checks `offset + size <= len` and reports
//! [`Error::OutOfRange`] otherwise; segments can only narrow a view.

use crate::{bits::BigEndian, Error, Result};

/// A fixed-size value that can be copied in and out of a view in native byte
/// order.
pub trait Scalar: Copy {
    const SIZE: usize;

    fn read_ne(bytes: &[u8]) -> Self;
    fn write_ne(self, bytes: &mut [u8]);
}

macro_rules! impl_scalar {
    ($($t:ty),*) => {
        $(
            impl Scalar for $t {
                const SIZE: usize = std::mem::size_of::<$t>();

                fn read_ne(bytes: &[u8]) -> Self {
                    let mut array = [0u8; std::mem::size_of::<$t>()];
                    array.copy_from_slice(&bytes[..Self::SIZE]);
                    <$t>::from_ne_bytes(array)
                }

                fn write_ne(self, bytes: &mut [u8]) {
                    bytes[..Self::SIZE].copy_from_slice(&self.to_ne_bytes());
                }
            }
        )*
    };
}

impl_scalar!(u8, u16, u32, u64, u128, i8, i16, i32, i64);

fn check_range(offset: usize, size: usize, length: usize) -> Result<()> {
    match offset.checked_add(size) {
        Some(end) if end <= length => Ok(()),
        _ => Err(Error::OutOfRange {
            offset,
            size,
            length,
        }),
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Buffer<'a> {
    bytes: &'a [u8],
}

impl<'a> Buffer<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn read<T: Scalar>(&self, offset: usize) -> Result<T> {
        check_range(offset, T::SIZE, self.len())?;
        Ok(T::read_ne(&self.bytes[offset..]))
    }

    pub fn read_be<T: Scalar + BigEndian>(&self, offset: usize) -> Result<T> {
        Ok(self.read::<T>(offset)?.from_big_endian())
    }

    pub fn read_be_u24(&self, offset: usize) -> Result<u32> {
        Ok(crate::bits::u24_from_be_bytes(self.read_array(offset)?))
    }

    pub fn read_array<const N: usize>(&self, offset: usize) -> Result<[u8; N]> {
        check_range(offset, N, self.len())?;
        let mut array = [0; N];
        array.copy_from_slice(&self.bytes[offset..offset + N]);
        Ok(array)
    }

    pub fn copy_to(
        &self,
        offset: usize,
        dest: &mut [u8],
        dest_offset: usize,
        count: usize,
    ) -> Result<()> {
        check_range(offset, count, self.len())?;
        check_range(dest_offset, count, dest.len())?;
        dest[dest_offset..dest_offset + count]
            .copy_from_slice(&self.bytes[offset..offset + count]);
        Ok(())
    }

    /// `None` for `length` yields the remainder of the view.
    pub fn extract_segment(&self, offset: usize, length: Option<usize>) -> Result<Buffer<'a>> {
        let length = match length {
            Some(length) => length,
            None => self.len().checked_sub(offset).ok_or(Error::OutOfRange {
                offset,
                size: 0,
                length: self.len(),
            })?,
        };
        check_range(offset, length, self.len())?;
        Ok(Buffer::new(&self.bytes[offset..offset + length]))
    }

    fn until_nul(&self, offset: usize, length: usize) -> Result<&'a [u8]> {
        check_range(offset, length, self.len())?;
        let bytes = &self.bytes[offset..offset + length];
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(&bytes[..end])
    }

    /// ASCII decode up to the first NUL. Padding spaces are kept, bytes above
    /// 0x7F are a decode error.
    pub fn to_ascii_string(&self, offset: usize, length: usize) -> Result<String> {
        let bytes = self.until_nul(offset, length)?;
        if !bytes.is_ascii() {
            return Err(Error::Decode(format!(
                "non-ascii byte in text field at offset {offset}"
            )));
        }
        Ok(bytes.iter().map(|&b| b as char).collect())
    }

    /// UTF-8 decode up to the first NUL.
    pub fn to_utf8_string(&self, offset: usize, length: usize) -> Result<String> {
        let bytes = self.until_nul(offset, length)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::Decode(format!("invalid utf-8 at offset {offset}: {e}")))
    }
}

#[derive(Debug)]
pub struct BufferMut<'a> {
    bytes: &'a mut [u8],
}

impl<'a> BufferMut<'a> {
    pub fn new(bytes: &'a mut [u8]) -> Self {
        Self { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_buffer(&self) -> Buffer<'_> {
        Buffer::new(self.bytes)
    }

    pub fn read<T: Scalar>(&self, offset: usize) -> Result<T> {
        self.as_buffer().read(offset)
    }

    pub fn write<T: Scalar>(&mut self, value: T, offset: usize) -> Result<()> {
        check_range(offset, T::SIZE, self.len())?;
        value.write_ne(&mut self.bytes[offset..]);
        Ok(())
    }

    pub fn write_be<T: Scalar + BigEndian>(&mut self, value: T, offset: usize) -> Result<()> {
        self.write(value.to_big_endian(), offset)
    }

    pub fn write_be_u24(&mut self, value: u32, offset: usize) -> Result<()> {
        self.copy_from(offset, &crate::bits::u24_to_be_bytes(value), 0, 3)
    }

    pub fn copy_from(
        &mut self,
        offset: usize,
        source: &[u8],
        source_offset: usize,
        count: usize,
    ) -> Result<()> {
        check_range(offset, count, self.len())?;
        check_range(source_offset, count, source.len())?;
        self.bytes[offset..offset + count]
            .copy_from_slice(&source[source_offset..source_offset + count]);
        Ok(())
    }

    pub fn fill(&mut self, offset: usize, count: usize, value: u8) -> Result<()> {
        check_range(offset, count, self.len())?;
        self.bytes[offset..offset + count].fill(value);
        Ok(())
    }

    /// Writes `text` into a `length` byte field, padding with `pad`.
    pub fn write_ascii(&mut self, offset: usize, length: usize, text: &str, pad: u8) -> Result<()> {
        check_range(offset, length, self.len())?;
        let text = text.as_bytes();
        let used = usize::min(text.len(), length);
        self.bytes[offset..offset + used].copy_from_slice(&text[..used]);
        self.bytes[offset + used..offset + length].fill(pad);
        Ok(())
    }

    pub fn extract_segment(&mut self, offset: usize, length: Option<usize>) -> Result<BufferMut<'_>> {
        let total = self.len();
        let length = match length {
            Some(length) => length,
            None => total.checked_sub(offset).ok_or(Error::OutOfRange {
                offset,
                size: 0,
                length: total,
            })?,
        };
        check_range(offset, length, total)?;
        Ok(BufferMut::new(&mut self.bytes[offset..offset + length]))
    }
}
