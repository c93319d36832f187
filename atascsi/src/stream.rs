//! Byte-addressed random access over a sector-addressed ATA device.

use std::io::{self, Read, Seek, SeekFrom, Write};

use tracing::trace;

use crate::{
    ata::{device::AtaDevice, task_file::Addressing},
    transport::AtaPassThrough,
};

/// A read-only cursor over the user-addressable sectors of a device.
///
/// Reads that start and end on sector boundaries go straight into the
/// caller's buffer; all others go through a scratch buffer covering the
/// enclosing sectors.
#[derive(Debug)]
pub struct SectorStream<'d, T> {
    device: &'d AtaDevice<T>,
    position: u64,
}

impl<T: AtaPassThrough> AtaDevice<T> {
    pub fn stream(&self) -> SectorStream<'_, T> {
        SectorStream::new(self)
    }
}

impl<'d, T: AtaPassThrough> SectorStream<'d, T> {
    pub fn new(device: &'d AtaDevice<T>) -> Self {
        Self {
            device,
            position: 0,
        }
    }

    pub fn device(&self) -> &'d AtaDevice<T> {
        self.device
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Capacity in bytes: IDENTIFY's user-addressable sector count (the
    /// highest LBA plus one) times the logical sector size. Sectors behind a
    /// host protected area are not included, see
    /// [`AtaDevice::read_native_max_address`].
    pub fn len(&self) -> crate::Result<u64> {
        let capabilities = self.device.capabilities()?;
        Ok(capabilities.sectors * capabilities.logical_sector_size as u64)
    }

    pub fn is_empty(&self) -> crate::Result<bool> {
        Ok(self.len()? == 0)
    }

    /// The medium has a fixed capacity.
    pub fn set_len(&mut self, _length: u64) -> crate::Result<()> {
        Err(crate::Error::NotSupported("resizing a sector-addressed stream"))
    }

    /// Reads one byte, `None` at the end of the medium.
    pub fn read_byte(&mut self) -> crate::Result<Option<u8>> {
        let mut byte = [0u8; 1];
        match self.read_clamped(&mut byte)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }

    fn read_clamped(&mut self, buffer: &mut [u8]) -> crate::Result<usize> {
        let length = self.len()?;
        if self.position >= length || buffer.is_empty() {
            return Ok(0);
        }

        let count = u64::min(buffer.len() as u64, length - self.position) as usize;
        self.read_at(self.position, &mut buffer[..count])?;
        self.position += count as u64;

        Ok(count)
    }

    /// Fills `buffer` from byte `position`. The range must lie on the medium.
    fn read_at(&self, position: u64, buffer: &mut [u8]) -> crate::Result<()> {
        let sector_size = self.device.logical_sector_size()? as u64;

        if position % sector_size == 0 && buffer.len() as u64 % sector_size == 0 {
            trace!(position, length = buffer.len(), "aligned read");
            return self.read_sectors(position / sector_size, buffer);
        }

        let first = position / sector_size;
        let end = (position + buffer.len() as u64).div_ceil(sector_size);
        let skip = (position - first * sector_size) as usize;

        trace!(
            position,
            length = buffer.len(),
            first_sector = first,
            sectors = end - first,
            "unaligned read through scratch buffer"
        );

        let mut scratch = vec![0u8; ((end - first) * sector_size) as usize];
        self.read_sectors(first, &mut scratch)?;

        let length = buffer.len();
        buffer.copy_from_slice(&scratch[skip..skip + length]);
        Ok(())
    }

    /// Reads whole sectors into `buffer`, splitting at the largest transfer
    /// one command can carry.
    fn read_sectors(&self, lba: u64, buffer: &mut [u8]) -> crate::Result<()> {
        let capabilities = self.device.capabilities()?;
        let addressing = capabilities.transfer_mode().addressing;
        let sector_size = capabilities.logical_sector_size as usize;
        let max_sectors = addressing.max_transfer_sectors() as usize;

        for (index, chunk) in buffer.chunks_mut(max_sectors * sector_size).enumerate() {
            let sectors = chunk.len() / sector_size;
            let lba = lba + (index * max_sectors) as u64;
            self.device
                .read_sectors(lba, count_field(addressing, sectors as u32), chunk)?;
        }

        Ok(())
    }
}

/// The count register value for `sectors`, using zero for the largest transfer.
fn count_field(addressing: Addressing, sectors: u32) -> u32 {
    if sectors == addressing.max_transfer_sectors() {
        0
    } else {
        sectors
    }
}

impl<T: AtaPassThrough> Read for SectorStream<'_, T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_clamped(buf)?)
    }
}

impl<T: AtaPassThrough> Seek for SectorStream<'_, T> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let (base, offset) = match pos {
            SeekFrom::Start(position) => {
                self.position = position;
                return Ok(position);
            }
            SeekFrom::Current(offset) => (self.position, offset),
            SeekFrom::End(offset) => (self.len()?, offset),
        };

        match base.checked_add_signed(offset) {
            Some(position) => {
                self.position = position;
                Ok(position)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )),
        }
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        Ok(self.position)
    }
}

/// Write-back is not supported; every write fails.
impl<T: AtaPassThrough> Write for SectorStream<'_, T> {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(crate::Error::NotSupported("writing through a sector-addressed stream").into())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{mock::MockAta, AtaFlags};

    fn data_requests(mock: &MockAta) -> Vec<crate::transport::mock::RecordedRequest> {
        // drop IDENTIFY DEVICE
        mock.requests()
            .into_iter()
            .filter(|r| r.current.command() != 0xEC)
            .collect()
    }

    #[test]
    fn aligned_read_test() {
        let mock = MockAta::with_disk(512, 64, true, true);
        let device = AtaDevice::with_transport(&mock);
        let mut stream = device.stream();

        let mut buffer = [0u8; 512];
        assert_eq!(stream.read(&mut buffer).unwrap(), 512);
        assert_eq!(buffer.to_vec(), mock.media(0, 512));
        assert_eq!(stream.position(), 512);

        let requests = data_requests(&mock);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].current.command(), 0x25);
        assert!(requests[0]
            .flags
            .contains(AtaFlags::USE_DMA | AtaFlags::EXTENDED_COMMAND | AtaFlags::DATA_IN));
        assert_eq!(requests[0].frame().lba(), 0);
        assert_eq!(requests[0].frame().sector_count(), 1);
    }

    #[test]
    fn unaligned_read_test() {
        let mock = MockAta::with_disk(512, 64, true, true);
        let device = AtaDevice::with_transport(&mock);
        let mut stream = device.stream();

        stream.seek(SeekFrom::Start(5)).unwrap();
        let mut buffer = [0u8; 10];
        assert_eq!(stream.read(&mut buffer).unwrap(), 10);
        assert_eq!(buffer.to_vec(), mock.media(5, 10));
        assert_eq!(buffer[0], 5);

        let requests = data_requests(&mock);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].frame().lba(), 0);
        assert_eq!(requests[0].data_length, 512);
    }

    #[test]
    fn sector_spanning_read_test() {
        let mock = MockAta::with_disk(512, 64, false, false);
        let device = AtaDevice::with_transport(&mock);
        let mut stream = device.stream();

        stream.seek(SeekFrom::Start(1000)).unwrap();
        let mut buffer = [0u8; 700];
        stream.read_exact(&mut buffer).unwrap();
        assert_eq!(buffer.to_vec(), mock.media(1000, 700));

        let requests = data_requests(&mock);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].current.command(), 0x20);
        assert_eq!(requests[0].frame().lba(), 1);
        assert_eq!(requests[0].frame().sector_count(), 3);
    }

    #[test]
    fn chunked_read_test() {
        let mock = MockAta::with_disk(512, 512, false, true);
        let device = AtaDevice::with_transport(&mock);
        let mut stream = device.stream();

        let mut buffer = vec![0u8; 300 * 512];
        stream.read_exact(&mut buffer).unwrap();
        assert_eq!(buffer, mock.media(0, 300 * 512));

        let requests = data_requests(&mock);
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].frame().sector_count(), 0);
        assert_eq!(requests[0].data_length, 256 * 512);
        assert_eq!(requests[1].frame().lba(), 256);
        assert_eq!(requests[1].frame().sector_count(), 44);
    }

    #[test]
    fn end_of_medium_test() {
        let mock = MockAta::with_disk(512, 4, true, false);
        let device = AtaDevice::with_transport(&mock);
        let mut stream = device.stream();

        assert_eq!(stream.len().unwrap(), 2048);
        assert_eq!(stream.seek(SeekFrom::End(-3)).unwrap(), 2045);

        let mut buffer = [0u8; 10];
        assert_eq!(stream.read(&mut buffer).unwrap(), 3);
        assert_eq!(&buffer[..3], &mock.media(2045, 3)[..]);
        assert_eq!(stream.read(&mut buffer).unwrap(), 0);
        assert_eq!(stream.read_byte().unwrap(), None);
    }

    #[test]
    fn read_byte_test() {
        let mock = MockAta::with_disk(4096, 4, true, false);
        let device = AtaDevice::with_transport(&mock);
        let mut stream = device.stream();

        stream.seek(SeekFrom::Start(4097)).unwrap();
        assert_eq!(stream.read_byte().unwrap(), Some(mock.media(4097, 1)[0]));
        assert_eq!(stream.stream_position().unwrap(), 4098);
        assert_eq!(data_requests(&mock)[0].data_length, 4096);
    }

    #[test]
    fn length_test() {
        let mock = MockAta::with_disk(4096, 10, true, false);
        let device = AtaDevice::with_transport(&mock);
        let stream = device.stream();

        // highest LBA 9
        assert_eq!(stream.len().unwrap(), 10 * 4096);
        assert!(!stream.is_empty().unwrap());
    }

    #[test]
    fn seek_test() {
        let mock = MockAta::with_disk(512, 4, true, false);
        let device = AtaDevice::with_transport(&mock);
        let mut stream = device.stream();

        assert_eq!(stream.seek(SeekFrom::Start(100)).unwrap(), 100);
        assert_eq!(stream.seek(SeekFrom::Current(-40)).unwrap(), 60);
        assert!(stream.seek(SeekFrom::Current(-61)).is_err());
        assert_eq!(stream.position(), 60);
        assert_eq!(stream.seek(SeekFrom::End(0)).unwrap(), 2048);
    }

    #[test]
    fn write_rejected_test() {
        let mock = MockAta::with_disk(512, 4, true, false);
        let device = AtaDevice::with_transport(&mock);
        let mut stream = device.stream();

        let error = stream.write(&[0; 512]).unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::Unsupported);
        assert!(matches!(
            stream.set_len(0),
            Err(crate::Error::NotSupported(_))
        ));
        assert!(mock.requests().is_empty());
    }
}
