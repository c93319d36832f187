use std::{cell::OnceCell, time::Duration};

use tracing::{debug, trace};

use crate::{
    ata::{
        identify::{IdentifyDeviceData, IDENTIFY_DATA_LENGTH},
        smart::{
            OfflineRoutine, SelfTestLog, SmartData, SmartStatus, SmartThresholds,
            SELF_TEST_LOG_ADDRESS, SMART_PAGE_LENGTH,
        },
        task_file::{Addressing, CommandFrame},
    },
    marshal::Marshal,
    scsi::DEFAULT_TIMEOUT,
    transport::{AtaFlags, AtaPassThrough, AtaRequest, DataBuffer},
};

const IDENTIFY_DEVICE: u8 = 0xEC;
const READ_SECTORS: u8 = 0x20;
const READ_SECTORS_EXT: u8 = 0x24;
const READ_DMA: u8 = 0xC8;
const READ_DMA_EXT: u8 = 0x25;
const WRITE_SECTORS: u8 = 0x30;
const WRITE_SECTORS_EXT: u8 = 0x34;
const WRITE_DMA: u8 = 0xCA;
const WRITE_DMA_EXT: u8 = 0x35;
const FLUSH_CACHE: u8 = 0xE7;
const FLUSH_CACHE_EXT: u8 = 0xEA;
const READ_NATIVE_MAX_ADDRESS: u8 = 0xF8;
const READ_NATIVE_MAX_ADDRESS_EXT: u8 = 0x27;

const SMART: u8 = 0xB0;
const SMART_READ_DATA: u8 = 0xD0;
const SMART_READ_THRESHOLDS: u8 = 0xD1;
const SMART_EXECUTE_OFFLINE_IMMEDIATE: u8 = 0xD4;
const SMART_READ_LOG: u8 = 0xD5;
const SMART_ENABLE_OPERATIONS: u8 = 0xD8;
const SMART_DISABLE_OPERATIONS: u8 = 0xD9;
const SMART_RETURN_STATUS: u8 = 0xDA;

/// Cylinder value that unlocks the SMART feature set.
const SMART_KEY: u16 = 0xC24F;
const SMART_THRESHOLD_EXCEEDED: u16 = 0x2CF4;

/// Facts read once from IDENTIFY DEVICE.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    pub logical_sector_size: u32,
    pub lba48: bool,
    pub dma: bool,
    pub sectors: u64,
}

impl Capabilities {
    pub fn from_identify(data: &IdentifyDeviceData) -> Self {
        Self {
            logical_sector_size: data.logical_sector_size(),
            lba48: data.lba48_usable(),
            dma: data.supports_dma(),
            sectors: data.user_addressable_sectors(),
        }
    }

    pub fn transfer_mode(&self) -> TransferMode {
        TransferMode {
            addressing: if self.lba48 {
                Addressing::Lba48
            } else {
                Addressing::Lba28
            },
            dma: self.dma,
        }
    }
}

/// Addressing width and data transfer protocol of a read or write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransferMode {
    pub addressing: Addressing,
    pub dma: bool,
}

impl TransferMode {
    fn read_command(self) -> u8 {
        match (self.addressing, self.dma) {
            (Addressing::Lba28, false) => READ_SECTORS,
            (Addressing::Lba48, false) => READ_SECTORS_EXT,
            (Addressing::Lba28, true) => READ_DMA,
            (Addressing::Lba48, true) => READ_DMA_EXT,
        }
    }

    fn write_command(self) -> u8 {
        match (self.addressing, self.dma) {
            (Addressing::Lba28, false) => WRITE_SECTORS,
            (Addressing::Lba48, false) => WRITE_SECTORS_EXT,
            (Addressing::Lba28, true) => WRITE_DMA,
            (Addressing::Lba48, true) => WRITE_DMA_EXT,
        }
    }
}

/// An ATA device reached through `T`.
///
/// Commands are issued one at a time from the calling thread. The capability
/// cache is filled by the first command that needs it and never refreshed.
#[derive(Debug)]
pub struct AtaDevice<T> {
    transport: T,
    timeout: Duration,
    capabilities: OnceCell<Capabilities>,
}

impl<T> AtaDevice<T> {
    pub fn with_transport(transport: T) -> Self {
        Self {
            transport,
            timeout: DEFAULT_TIMEOUT,
            capabilities: OnceCell::new(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(target_os = "linux")]
impl AtaDevice<crate::Scsi<crate::transport::sg::SgDevice>> {
    /// Opens a SCSI generic node and talks ATA through SAT.
    pub fn new<P: AsRef<std::path::Path> + ?Sized>(path: &P) -> crate::Result<Self> {
        Ok(Self::with_transport(crate::Scsi::new(path)?))
    }
}

#[cfg(target_os = "windows")]
impl AtaDevice<crate::transport::windows::WindowsDevice> {
    pub fn new<P: AsRef<std::path::Path> + ?Sized>(path: &P) -> crate::Result<Self> {
        Ok(Self::with_transport(
            crate::transport::windows::WindowsDevice::open(path)?,
        ))
    }
}

impl<T: AtaPassThrough> AtaDevice<T> {
    /// Issues one command and returns the post-command registers.
    ///
    /// A non-zero error register fails with [`crate::Error::Ata`].
    pub fn execute(
        &self,
        frame: &CommandFrame,
        data: DataBuffer<'_>,
        dma: bool,
    ) -> crate::Result<CommandFrame> {
        let mut flags = AtaFlags::DRDY_REQUIRED;
        match &data {
            DataBuffer::None => {}
            DataBuffer::FromDevice(_) => flags |= AtaFlags::DATA_IN,
            DataBuffer::ToDevice(_) => flags |= AtaFlags::DATA_OUT,
        }
        if frame.addressing == Addressing::Lba48 {
            flags |= AtaFlags::EXTENDED_COMMAND;
        }
        if dma {
            flags |= AtaFlags::USE_DMA;
        }

        debug!(
            command = frame.current.command(),
            features = frame.current.features(),
            lba = frame.lba(),
            count = frame.sector_count(),
            ?flags,
            data_length = data.len(),
            "issuing ata command"
        );

        let request = AtaRequest::new(frame.current, frame.previous, data, flags, self.timeout)?;
        let (current, previous) = self.transport.execute(request)?;

        if current.error() != 0 {
            debug!(
                error = current.error(),
                status = current.command(),
                "ata command failed"
            );
            return Err(crate::Error::Ata {
                error: current.error(),
                status: current.command(),
            });
        }

        Ok(CommandFrame::from_registers(
            current,
            previous,
            frame.addressing,
        ))
    }

    pub fn identify_device(&self) -> crate::Result<IdentifyDeviceData> {
        // the device ignores the count, SAT bridges size the transfer from it
        let mut frame = CommandFrame::new(IDENTIFY_DEVICE);
        frame.current.set_sector_count(1);

        let mut data = [0u8; IDENTIFY_DATA_LENGTH];
        self.execute(
            &frame,
            DataBuffer::FromDevice(&mut data),
            false,
        )?;

        IdentifyDeviceData::from_bytes(&data)
    }

    pub fn capabilities(&self) -> crate::Result<Capabilities> {
        if let Some(capabilities) = self.capabilities.get() {
            return Ok(*capabilities);
        }

        let capabilities = Capabilities::from_identify(&self.identify_device()?);
        trace!(?capabilities, "caching device capabilities");

        Ok(*self.capabilities.get_or_init(|| capabilities))
    }

    pub fn logical_sector_size(&self) -> crate::Result<u32> {
        Ok(self.capabilities()?.logical_sector_size)
    }

    pub fn supports_lba48(&self) -> crate::Result<bool> {
        Ok(self.capabilities()?.lba48)
    }

    pub fn supports_dma(&self) -> crate::Result<bool> {
        Ok(self.capabilities()?.dma)
    }

    fn addressing(&self) -> crate::Result<Addressing> {
        Ok(self.capabilities()?.transfer_mode().addressing)
    }

    /// `count` follows the ATA convention: zero is the largest transfer the
    /// mode allows. `buffer` must hold at least that many sectors.
    pub fn read_sectors_with(
        &self,
        mode: TransferMode,
        lba: u64,
        count: u32,
        buffer: &mut [u8],
    ) -> crate::Result<()> {
        let frame = CommandFrame::addressed(mode.addressing, mode.read_command(), lba, count)?;
        let length = self.transfer_length(&frame, buffer.len())?;

        self.execute(
            &frame,
            DataBuffer::FromDevice(&mut buffer[..length]),
            mode.dma,
        )?;
        Ok(())
    }

    /// Reads with the addressing and protocol the device reports.
    pub fn read_sectors(&self, lba: u64, count: u32, buffer: &mut [u8]) -> crate::Result<()> {
        self.read_sectors_with(self.capabilities()?.transfer_mode(), lba, count, buffer)
    }

    pub fn write_sectors_with(
        &self,
        mode: TransferMode,
        lba: u64,
        count: u32,
        buffer: &[u8],
    ) -> crate::Result<()> {
        let frame = CommandFrame::addressed(mode.addressing, mode.write_command(), lba, count)?;
        let length = self.transfer_length(&frame, buffer.len())?;

        self.execute(&frame, DataBuffer::ToDevice(&buffer[..length]), mode.dma)?;
        Ok(())
    }

    pub fn write_sectors(&self, lba: u64, count: u32, buffer: &[u8]) -> crate::Result<()> {
        self.write_sectors_with(self.capabilities()?.transfer_mode(), lba, count, buffer)
    }

    fn transfer_length(&self, frame: &CommandFrame, available: usize) -> crate::Result<usize> {
        let required = frame.transfer_sectors() as usize * self.logical_sector_size()? as usize;
        if available < required {
            return Err(crate::Error::BufferTooSmall {
                required,
                available,
            });
        }
        Ok(required)
    }

    pub fn flush_cache(&self) -> crate::Result<()> {
        let frame = match self.addressing()? {
            Addressing::Lba28 => CommandFrame::new(FLUSH_CACHE),
            Addressing::Lba48 => {
                let mut frame = CommandFrame::new(FLUSH_CACHE_EXT);
                frame.addressing = Addressing::Lba48;
                frame
            }
        };

        self.execute(&frame, DataBuffer::None, false)?;
        Ok(())
    }

    /// The highest native LBA, before any host protected area.
    pub fn read_native_max_address(&self) -> crate::Result<u64> {
        let addressing = self.addressing()?;
        let command = match addressing {
            Addressing::Lba28 => READ_NATIVE_MAX_ADDRESS,
            Addressing::Lba48 => READ_NATIVE_MAX_ADDRESS_EXT,
        };
        let mut frame = CommandFrame::addressed(addressing, command, 0, 0)?;
        frame.current.set_sector_count(0);

        let result = self.execute(&frame, DataBuffer::None, false)?;
        Ok(match addressing {
            // bits 24..27 come back in the device/head register
            Addressing::Lba28 => result.lba() | (result.current.head() as u64) << 24,
            Addressing::Lba48 => result.lba(),
        })
    }

    fn smart_frame(feature: u8) -> CommandFrame {
        let mut frame = CommandFrame::new(SMART).with_features(feature as u16);
        frame.current.set_cylinder(SMART_KEY);
        frame
    }

    fn smart_read_page(&self, feature: u8, address: u8) -> crate::Result<[u8; SMART_PAGE_LENGTH]> {
        let mut frame = Self::smart_frame(feature);
        frame.current.set_sector_count(1);
        frame.current.set_sector_number(address);

        let mut page = [0u8; SMART_PAGE_LENGTH];
        self.execute(&frame, DataBuffer::FromDevice(&mut page), false)?;
        Ok(page)
    }

    pub fn smart_read_data(&self) -> crate::Result<SmartData> {
        SmartData::from_bytes(&self.smart_read_page(SMART_READ_DATA, 0)?)
    }

    pub fn smart_read_thresholds(&self) -> crate::Result<SmartThresholds> {
        SmartThresholds::from_bytes(&self.smart_read_page(SMART_READ_THRESHOLDS, 0)?)
    }

    /// Reads `sectors` sectors of SMART log `address`.
    pub fn smart_read_log(&self, address: u8, sectors: u8) -> crate::Result<Vec<u8>> {
        let mut frame = Self::smart_frame(SMART_READ_LOG);
        frame.current.set_sector_count(sectors);
        frame.current.set_sector_number(address);

        let length = Addressing::Lba28.transfer_sectors(sectors as u32) as usize * SMART_PAGE_LENGTH;
        let mut log = vec![0u8; length];
        self.execute(&frame, DataBuffer::FromDevice(&mut log), false)?;
        Ok(log)
    }

    pub fn smart_self_test_log(&self) -> crate::Result<SelfTestLog> {
        SelfTestLog::from_bytes(&self.smart_read_page(SMART_READ_LOG, SELF_TEST_LOG_ADDRESS)?)
    }

    pub fn smart_execute_offline(&self, routine: OfflineRoutine) -> crate::Result<()> {
        let mut frame = Self::smart_frame(SMART_EXECUTE_OFFLINE_IMMEDIATE);
        frame.current.set_sector_number(routine as u8);

        self.execute(&frame, DataBuffer::None, false)?;
        Ok(())
    }

    pub fn smart_enable(&self) -> crate::Result<()> {
        self.execute(&Self::smart_frame(SMART_ENABLE_OPERATIONS), DataBuffer::None, false)?;
        Ok(())
    }

    pub fn smart_disable(&self) -> crate::Result<()> {
        self.execute(&Self::smart_frame(SMART_DISABLE_OPERATIONS), DataBuffer::None, false)?;
        Ok(())
    }

    /// Fails with [`crate::Error::Decode`] when the device answers with
    /// neither status signature.
    pub fn smart_return_status(&self) -> crate::Result<SmartStatus> {
        let result = self.execute(&Self::smart_frame(SMART_RETURN_STATUS), DataBuffer::None, false)?;

        match result.current.cylinder() {
            SMART_KEY => Ok(SmartStatus::ThresholdNotExceeded),
            SMART_THRESHOLD_EXCEEDED => Ok(SmartStatus::ThresholdExceeded),
            other => Err(crate::Error::Decode(format!(
                "unexpected smart return status signature {other:#06x}"
            ))),
        }
    }

    pub fn lock_volume(&self) -> crate::Result<()> {
        self.transport.lock_volume()
    }

    pub fn unlock_volume(&self) -> crate::Result<()> {
        self.transport.unlock_volume()
    }

    pub fn dismount_volume(&self) -> crate::Result<()> {
        self.transport.dismount_volume()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ata::task_file::TaskFile, transport::mock::MockAta};

    #[test]
    fn capabilities_cached_test() {
        let mock = MockAta::with_disk(4096, 1000, true, true);
        let device = AtaDevice::with_transport(&mock);

        assert_eq!(device.logical_sector_size().unwrap(), 4096);
        assert!(device.supports_lba48().unwrap());
        assert!(device.supports_dma().unwrap());
        assert_eq!(device.capabilities().unwrap().sectors, 1000);

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].current.command(), IDENTIFY_DEVICE);
        assert_eq!(requests[0].flags, AtaFlags::DRDY_REQUIRED | AtaFlags::DATA_IN);
        assert_eq!(requests[0].data_length, 512);
    }

    #[test]
    fn read_mode_selection_test() {
        let modes = [
            (false, false, READ_SECTORS),
            (true, false, READ_SECTORS_EXT),
            (false, true, READ_DMA),
            (true, true, READ_DMA_EXT),
        ];

        for (lba48, dma, command) in modes {
            let mock = MockAta::with_disk(512, 64, lba48, dma);
            let device = AtaDevice::with_transport(&mock);

            let mut buffer = [0u8; 1024];
            device.read_sectors(3, 2, &mut buffer).unwrap();
            assert_eq!(buffer.to_vec(), mock.media(3 * 512, 1024));

            let request = mock.requests()[1];
            assert_eq!(request.current.command(), command);
            assert_eq!(request.flags.contains(AtaFlags::USE_DMA), dma);
            assert_eq!(request.flags.contains(AtaFlags::EXTENDED_COMMAND), lba48);
            assert_eq!(request.frame().lba(), 3);
            assert_eq!(request.data_length, 1024);
        }
    }

    #[test]
    fn zero_count_test() {
        let mock = MockAta::with_disk(512, 1024, false, false);
        let device = AtaDevice::with_transport(&mock);

        let mut small = vec![0u8; 255 * 512];
        assert!(matches!(
            device.read_sectors(0, 0, &mut small),
            Err(crate::Error::BufferTooSmall {
                required: 131072,
                available: 130560
            })
        ));

        let mut buffer = vec![0u8; 256 * 512];
        device.read_sectors(0, 0, &mut buffer).unwrap();
        assert_eq!(mock.requests().last().unwrap().data_length, 256 * 512);
    }

    #[test]
    fn lba28_range_test() {
        let mock = MockAta::with_disk(512, 64, false, false);
        let device = AtaDevice::with_transport(&mock);

        let mut buffer = [0u8; 512];
        assert!(matches!(
            device.read_sectors(1 << 24, 1, &mut buffer),
            Err(crate::Error::ArgumentOutOfBounds(_))
        ));
        // only IDENTIFY went out
        assert_eq!(mock.requests().len(), 1);
    }

    #[test]
    fn write_test() {
        let mock = MockAta::with_disk(512, 16, true, false);
        let device = AtaDevice::with_transport(&mock);

        device.write_sectors(2, 1, &[0xAB; 512]).unwrap();
        assert_eq!(mock.media(1024, 512), vec![0xAB; 512]);
        assert_eq!(mock.requests()[1].current.command(), WRITE_SECTORS_EXT);
        assert!(mock.requests()[1].flags.contains(AtaFlags::DATA_OUT));
    }

    #[test]
    fn error_register_test() {
        let mock = MockAta::with_disk(512, 16, true, true);
        let device = AtaDevice::with_transport(&mock);
        device.capabilities().unwrap();

        let mut current = TaskFile::default();
        current.set_features(0x40);
        current.set_command(0x51);
        mock.set_reply(current, TaskFile::default());

        let mut buffer = [0u8; 512];
        match device.read_sectors(0, 1, &mut buffer) {
            Err(crate::Error::Ata { error, status }) => {
                assert_eq!(error, 0x40);
                assert_eq!(status, 0x51);
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn native_max_test() {
        let mock = MockAta::with_disk(512, 0x0123_4567, false, false);
        let device = AtaDevice::with_transport(&mock);
        assert_eq!(device.read_native_max_address().unwrap(), 0x0123_4566);

        let mock = MockAta::with_disk(512, 0x12_3456_7890, true, false);
        let device = AtaDevice::with_transport(&mock);
        assert_eq!(device.read_native_max_address().unwrap(), 0x12_3456_788F);
    }

    #[test]
    fn smart_return_status_test() {
        let mock = MockAta::with_disk(512, 16, true, false);
        let device = AtaDevice::with_transport(&mock);
        assert_eq!(
            device.smart_return_status().unwrap(),
            SmartStatus::ThresholdNotExceeded
        );

        mock.set_smart_exceeded(true);
        assert_eq!(
            device.smart_return_status().unwrap(),
            SmartStatus::ThresholdExceeded
        );

        let request = mock.requests()[0];
        assert_eq!(request.current.command(), SMART);
        assert_eq!(request.current.features(), SMART_RETURN_STATUS);
        assert_eq!(request.current.cylinder(), SMART_KEY);

        let mut current = TaskFile::default();
        current.set_cylinder(0x1234);
        mock.set_reply(current, TaskFile::default());
        assert!(matches!(
            device.smart_return_status(),
            Err(crate::Error::Decode(_))
        ));
    }

    #[test]
    fn smart_read_test() {
        let mock = MockAta::with_disk(512, 16, true, false);
        let device = AtaDevice::with_transport(&mock);

        let thresholds = SmartThresholds {
            revision: 1,
            thresholds: vec![crate::ata::smart::SmartThreshold { id: 5, threshold: 36 }],
        };
        mock.set_smart_page(SMART_READ_THRESHOLDS, 0, thresholds.to_bytes().unwrap());
        mock.set_smart_page(
            SMART_READ_LOG,
            SELF_TEST_LOG_ADDRESS,
            SelfTestLog::default().to_bytes().unwrap(),
        );

        assert_eq!(device.smart_read_thresholds().unwrap(), thresholds);
        assert!(device.smart_self_test_log().unwrap().entries().is_empty());

        let request = mock.requests()[1];
        assert_eq!(request.current.sector_count(), 1);
        assert_eq!(request.current.sector_number(), SELF_TEST_LOG_ADDRESS);
        assert_eq!(request.flags, AtaFlags::DRDY_REQUIRED | AtaFlags::DATA_IN);

        // no page configured, device aborts
        assert!(matches!(
            device.smart_read_data(),
            Err(crate::Error::Ata { error: 0x04, .. })
        ));
    }

    #[test]
    fn smart_offline_test() {
        let mock = MockAta::with_disk(512, 16, true, false);
        let device = AtaDevice::with_transport(&mock);

        device.smart_execute_offline(OfflineRoutine::ShortSelfTest).unwrap();
        device.smart_enable().unwrap();

        let requests = mock.requests();
        assert_eq!(requests[0].current.features(), SMART_EXECUTE_OFFLINE_IMMEDIATE);
        assert_eq!(requests[0].current.sector_number(), 0x01);
        assert_eq!(requests[1].current.features(), SMART_ENABLE_OPERATIONS);
    }

    #[test]
    fn volume_test() {
        let mock = MockAta::with_disk(512, 16, true, false);
        let device = AtaDevice::with_transport(&mock);
        assert!(matches!(
            device.lock_volume(),
            Err(crate::Error::NotSupported(_))
        ));
    }
}
