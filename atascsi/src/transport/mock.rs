//! In-memory pass-through devices for tests.

use std::{
    cell::{Cell, RefCell},
    collections::{HashMap, VecDeque},
};

use crate::{
    ata::{
        identify::{IdentifyBuilder, IdentifyDeviceData},
        task_file::{Addressing, AtaStatus, CommandFrame, TaskFile},
    },
    marshal::Marshal,
    scsi::{sense::SenseData, Status},
    transport::{
        AtaFlags, AtaPassThrough, AtaRequest, DataBuffer, ScsiPassThrough, ScsiRequest,
        ScsiResponse,
    },
};

#[derive(Clone, Debug, Default)]
struct Reply {
    status: u8,
    sense: Vec<u8>,
    data: Vec<u8>,
}

/// Plays back queued replies and records every CDB it receives. An empty
/// queue answers GOOD with no data.
#[derive(Debug, Default)]
pub(crate) struct MockScsi {
    replies: RefCell<VecDeque<Reply>>,
    commands: RefCell<Vec<Vec<u8>>>,
    sent: RefCell<Vec<Vec<u8>>>,
}

impl MockScsi {
    pub fn push_data(&self, data: &[u8]) {
        self.replies.borrow_mut().push_back(Reply {
            data: data.to_vec(),
            ..Default::default()
        });
    }

    pub fn push_sense(&self, sense: &[u8]) {
        self.replies.borrow_mut().push_back(Reply {
            status: u8::from(Status::CheckCondition),
            sense: sense.to_vec(),
            ..Default::default()
        });
    }

    pub fn push_status(&self, status: u8) {
        self.replies.borrow_mut().push_back(Reply {
            status,
            ..Default::default()
        });
    }

    pub fn commands(&self) -> Vec<Vec<u8>> {
        self.commands.borrow().clone()
    }

    /// Parameter data of every data-out command, in order.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.borrow().clone()
    }
}

impl ScsiPassThrough for MockScsi {
    fn execute(&self, request: ScsiRequest<'_>) -> crate::Result<ScsiResponse> {
        self.commands.borrow_mut().push(request.command.to_vec());
        let reply = self.replies.borrow_mut().pop_front().unwrap_or_default();

        let transfered_data_length = match request.data {
            DataBuffer::None => 0,
            DataBuffer::FromDevice(buffer) => {
                let length = usize::min(buffer.len(), reply.data.len());
                buffer[..length].copy_from_slice(&reply.data[..length]);
                length
            }
            DataBuffer::ToDevice(buffer) => {
                self.sent.borrow_mut().push(buffer.to_vec());
                buffer.len()
            }
        };

        Ok(ScsiResponse {
            status: Status::from(reply.status),
            sense: SenseData::parse(&reply.sense, reply.sense.len()),
            transfered_data_length,
        })
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct RecordedRequest {
    pub current: TaskFile,
    pub previous: TaskFile,
    pub flags: AtaFlags,
    pub data_length: usize,
}

impl RecordedRequest {
    pub fn frame(&self) -> CommandFrame {
        let addressing = if self.flags.contains(AtaFlags::EXTENDED_COMMAND) {
            Addressing::Lba48
        } else {
            Addressing::Lba28
        };
        CommandFrame::from_registers(self.current, self.previous, addressing)
    }
}

const ERROR_ABORTED: u8 = 0x04;
const ERROR_ID_NOT_FOUND: u8 = 0x10;

/// An emulated ATA disk. Sectors never written read back as `offset % 251`.
#[derive(Debug)]
pub(crate) struct MockAta {
    identify: IdentifyDeviceData,
    sector_size: usize,
    sectors: u64,
    written: RefCell<HashMap<u64, Vec<u8>>>,
    smart_pages: RefCell<HashMap<(u8, u8), Vec<u8>>>,
    smart_exceeded: Cell<bool>,
    reply: RefCell<Option<(TaskFile, TaskFile)>>,
    requests: RefCell<Vec<RecordedRequest>>,
}

impl MockAta {
    pub fn with_disk(sector_size: u32, sectors: u64, lba48: bool, dma: bool) -> Self {
        let identify = IdentifyBuilder::new()
            .model_number("MOCK DISK")
            .serial_number("0123456789")
            .firmware_revision("1.0")
            .dma(dma)
            .sectors(sectors, lba48)
            .logical_sector_size(sector_size)
            .build();

        Self {
            identify,
            sector_size: sector_size as usize,
            sectors,
            written: RefCell::new(HashMap::new()),
            smart_pages: RefCell::new(HashMap::new()),
            smart_exceeded: Cell::new(false),
            reply: RefCell::new(None),
            requests: RefCell::new(vec![]),
        }
    }

    /// `length` bytes of media content starting at byte `offset`.
    pub fn media(&self, offset: u64, length: usize) -> Vec<u8> {
        let sector_size = self.sector_size as u64;
        let written = self.written.borrow();

        (offset..offset + length as u64)
            .map(|position| match written.get(&(position / sector_size)) {
                Some(sector) => sector[(position % sector_size) as usize],
                None => (position % 251) as u8,
            })
            .collect()
    }

    /// Data returned by SMART subcommand `feature`, keyed by the log address
    /// for READ LOG and zero otherwise.
    pub fn set_smart_page(&self, feature: u8, address: u8, page: Vec<u8>) {
        self.smart_pages.borrow_mut().insert((feature, address), page);
    }

    pub fn set_smart_exceeded(&self, value: bool) {
        self.smart_exceeded.set(value);
    }

    /// Registers returned for the next command instead of executing it.
    pub fn set_reply(&self, current: TaskFile, previous: TaskFile) {
        *self.reply.borrow_mut() = Some((current, previous));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.borrow().clone()
    }

    /// Byte length of the transfer `frame` describes, if it stays on the media.
    fn transfer_length(&self, frame: &CommandFrame) -> Option<usize> {
        let end = frame.lba() + frame.transfer_sectors() as u64;
        (end <= self.sectors).then(|| frame.transfer_sectors() as usize * self.sector_size)
    }

    fn smart(&self, frame: &CommandFrame, data: DataBuffer<'_>, current: &mut TaskFile) -> u8 {
        if frame.current.cylinder() != 0xC24F {
            return ERROR_ABORTED;
        }

        let feature = frame.current.features();
        match (feature, data) {
            (0xDA, DataBuffer::None) => {
                if self.smart_exceeded.get() {
                    current.set_cylinder(0x2CF4);
                }
                0
            }
            (0xD4 | 0xD8 | 0xD9, DataBuffer::None) => 0,
            (0xD0 | 0xD1, DataBuffer::FromDevice(buffer)) => {
                self.copy_smart_page((feature, 0), buffer)
            }
            (0xD5, DataBuffer::FromDevice(buffer)) => {
                self.copy_smart_page((feature, frame.current.sector_number()), buffer)
            }
            _ => ERROR_ABORTED,
        }
    }

    fn copy_smart_page(&self, key: (u8, u8), buffer: &mut [u8]) -> u8 {
        match self.smart_pages.borrow().get(&key) {
            Some(page) => {
                let length = usize::min(page.len(), buffer.len());
                buffer[..length].copy_from_slice(&page[..length]);
                0
            }
            None => ERROR_ABORTED,
        }
    }
}

impl AtaPassThrough for MockAta {
    fn execute(&self, request: AtaRequest<'_>) -> crate::Result<(TaskFile, TaskFile)> {
        let recorded = RecordedRequest {
            current: request.current,
            previous: request.previous,
            flags: request.flags,
            data_length: request.data.len(),
        };
        self.requests.borrow_mut().push(recorded);

        if let Some(reply) = self.reply.borrow_mut().take() {
            return Ok(reply);
        }

        let frame = recorded.frame();
        let mut current = request.current;
        let mut previous = request.previous;

        let error = match (frame.current.command(), request.data) {
            (0xEC, DataBuffer::FromDevice(buffer)) => {
                let bytes = self.identify.to_bytes()?;
                let length = usize::min(bytes.len(), buffer.len());
                buffer[..length].copy_from_slice(&bytes[..length]);
                0
            }
            (0x20 | 0x24 | 0xC8 | 0x25, DataBuffer::FromDevice(buffer)) => {
                match self.transfer_length(&frame) {
                    Some(length) if length == buffer.len() => {
                        let offset = frame.lba() * self.sector_size as u64;
                        buffer.copy_from_slice(&self.media(offset, length));
                        0
                    }
                    _ => ERROR_ID_NOT_FOUND,
                }
            }
            (0x30 | 0x34 | 0xCA | 0x35, DataBuffer::ToDevice(buffer)) => {
                match self.transfer_length(&frame) {
                    Some(length) if length == buffer.len() => {
                        let mut written = self.written.borrow_mut();
                        for (index, sector) in buffer.chunks(self.sector_size).enumerate() {
                            written.insert(frame.lba() + index as u64, sector.to_vec());
                        }
                        0
                    }
                    _ => ERROR_ID_NOT_FOUND,
                }
            }
            (0xE7 | 0xEA, DataBuffer::None) => 0,
            (0xF8, DataBuffer::None) => {
                let max = self.sectors - 1;
                current.set_lba_low24(max as u32);
                current.set_head((max >> 24) as u8);
                0
            }
            (0x27, DataBuffer::None) => {
                let max = self.sectors - 1;
                current.set_lba_low24((max & 0xFF_FFFF) as u32);
                previous.set_lba_low24((max >> 24) as u32);
                0
            }
            (0xB0, data) => self.smart(&frame, data, &mut current),
            _ => ERROR_ABORTED,
        };

        current.set_features(error);
        let status = if error == 0 {
            AtaStatus::DEVICE_READY
        } else {
            AtaStatus::DEVICE_READY | AtaStatus::ERROR
        };
        current.set_command(status.bits());

        Ok((current, previous))
    }
}
