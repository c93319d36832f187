//! The record contract shared by every wire structure, plus the type-code
//! dispatch and list loop used by pages that pack records back to back.

use tracing::warn;

use crate::{
    buffer::{Buffer, BufferMut},
    Error, Result,
};

pub trait Marshal: Sized {
    /// Decodes a record from a view that starts at the record's first byte.
    /// The view may be longer than the record.
    fn unmarshal(buffer: Buffer<'_>) -> Result<Self>;

    /// Encodes into a view that starts at the record's first byte. Writes at
    /// most `marshaled_size()` bytes, recomputing any length fields.
    fn marshal(&self, buffer: &mut BufferMut<'_>) -> Result<()>;

    /// Encoded size in bytes. For a decoded record this equals the number of
    /// bytes the decode consumed.
    fn marshaled_size(&self) -> usize;

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::unmarshal(Buffer::new(bytes))
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = vec![0; self.marshaled_size()];
        self.marshal(&mut BufferMut::new(&mut bytes))?;
        Ok(bytes)
    }
}

pub type Decoder<T> = fn(Buffer<'_>) -> Result<T>;

/// How a lookup treats a type code with no registered decoder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lookup {
    /// Fail with [`Error::UnknownTypeCode`].
    Strict,
    /// Report no match so the caller can skip the record.
    BestEffort,
}

/// A set of record shapes selected by a type code stored in a common header.
pub trait Family: Marshal {
    const NAME: &'static str;

    /// Reads the type code without consuming it; the selected decoder sees the
    /// header again.
    fn peek_type_code(buffer: Buffer<'_>) -> Result<u16>;

    /// Total size of the record at the start of `buffer`, header included, as
    /// declared by the record itself.
    fn peek_length(buffer: Buffer<'_>) -> Result<usize>;

    fn decoder(code: u16) -> Option<Decoder<Self>>;
}

/// Decodes one record of family `F` from `buffer`, which must be exactly the
/// record's extent.
pub fn unmarshal_tagged<F: Family>(buffer: Buffer<'_>, lookup: Lookup) -> Result<Option<F>> {
    let code = F::peek_type_code(buffer)?;

    match F::decoder(code) {
        Some(decoder) => decoder(buffer).map(Some),
        None => match lookup {
            Lookup::Strict => Err(Error::UnknownTypeCode {
                family: F::NAME,
                code,
            }),
            Lookup::BestEffort => Ok(None),
        },
    }
}

/// Decodes records back to back until `buffer` is exhausted. `buffer` must be
/// bounded by the list's declared byte length.
pub fn unmarshal_list<F: Family>(buffer: Buffer<'_>, lookup: Lookup) -> Result<Vec<F>> {
    let mut records = vec![];
    let mut offset = 0;

    while offset < buffer.len() {
        let rest = buffer.extract_segment(offset, None)?;
        let length = F::peek_length(rest)?;

        if length == 0 {
            return Err(Error::Decode(format!("{} record of zero length", F::NAME)));
        }

        if length > rest.len() {
            return Err(Error::Truncated {
                family: F::NAME,
                declared: length,
                available: rest.len(),
            });
        }

        let record = rest.extract_segment(0, Some(length))?;
        match unmarshal_tagged::<F>(record, lookup)? {
            Some(value) => records.push(value),
            None => warn!(
                family = F::NAME,
                code = F::peek_type_code(record)?,
                offset,
                "skipping record with unknown type code"
            ),
        }

        offset += length;
    }

    Ok(records)
}

/// Splits `buffer` into fixed-size records. A trailing fragment shorter than
/// `size` is an error.
pub fn unmarshal_fixed_list<T: Marshal>(
    buffer: Buffer<'_>,
    size: usize,
    family: &'static str,
) -> Result<Vec<T>> {
    if size == 0 {
        return Err(Error::Decode(format!("{family} record of zero length")));
    }

    let mut records = Vec::with_capacity(buffer.len() / size);
    let mut offset = 0;

    while offset < buffer.len() {
        let available = buffer.len() - offset;
        if available < size {
            return Err(Error::Truncated {
                family,
                declared: size,
                available,
            });
        }

        records.push(T::unmarshal(buffer.extract_segment(offset, Some(size))?)?);
        offset += size;
    }

    Ok(records)
}

pub fn marshaled_list_size<T: Marshal>(records: &[T]) -> usize {
    records.iter().map(Marshal::marshaled_size).sum()
}

/// Writes each record followed immediately by the next. Returns the number of
/// bytes written.
pub fn marshal_list<T: Marshal>(records: &[T], buffer: &mut BufferMut<'_>) -> Result<usize> {
    let mut offset = 0;

    for record in records {
        let size = record.marshaled_size();
        record.marshal(&mut buffer.extract_segment(offset, Some(size))?)?;
        offset += size;
    }

    Ok(offset)
}
