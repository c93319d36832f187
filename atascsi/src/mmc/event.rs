//! GET EVENT STATUS NOTIFICATION response.

use bitflags::bitflags;

use crate::{bits, buffer::Buffer, marshal::Decoder};

use super::declared_extent;

const HEADER_LENGTH: usize = 4;
const DESCRIPTOR_LENGTH: usize = 4;

bitflags! {
    /// Event class request and support mask.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct EventClasses: u8 {
        const OPERATIONAL_CHANGE = 1 << 1;
        const POWER_MANAGEMENT = 1 << 2;
        const EXTERNAL_REQUEST = 1 << 3;
        const MEDIA = 1 << 4;
        const MULTI_HOST = 1 << 5;
        const DEVICE_BUSY = 1 << 6;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OperationalChange {
    pub event_code: u8,
    pub persistent_prevented: bool,
    pub operational_status: u8,
    pub operational_change: u16,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PowerManagement {
    pub event_code: u8,
    pub power_status: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExternalRequest {
    pub event_code: u8,
    pub persistent_prevented: bool,
    pub external_request_status: u8,
    pub external_request: u16,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MediaEvent {
    pub event_code: u8,
    pub media_present: bool,
    pub door_or_tray_open: bool,
    pub start_slot: u8,
    pub end_slot: u8,
}

impl MediaEvent {
    pub const NO_CHANGE: u8 = 0x0;
    pub const EJECT_REQUEST: u8 = 0x1;
    pub const NEW_MEDIA: u8 = 0x2;
    pub const MEDIA_REMOVAL: u8 = 0x3;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MultiHost {
    pub event_code: u8,
    pub persistent_prevented: bool,
    pub multi_host_status: u8,
    pub multi_host_priority: u16,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceBusy {
    pub event_code: u8,
    pub busy_status: u8,
    /// Expected time until ready, in tenths of a second.
    pub time: u16,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    OperationalChange(OperationalChange),
    PowerManagement(PowerManagement),
    ExternalRequest(ExternalRequest),
    Media(MediaEvent),
    MultiHost(MultiHost),
    DeviceBusy(DeviceBusy),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EventStatus {
    pub no_event_available: bool,
    pub supported_classes: EventClasses,
    /// `None` when no event was reported.
    pub event: Option<Event>,
}

impl EventStatus {
    pub fn decode(bytes: &[u8]) -> crate::Result<Self> {
        let buffer = Buffer::new(bytes);
        let declared = buffer.read_be::<u16>(0)? as usize;
        let extent = declared_extent(buffer, 2, declared, "event status header")?;
        if extent.len() < HEADER_LENGTH {
            return Err(crate::Error::Truncated {
                family: "event status header",
                declared: HEADER_LENGTH,
                available: extent.len(),
            });
        }

        let notification: u8 = extent.read(2)?;
        let no_event_available = bits::get_bit(notification, 7);
        let class = bits::get_masked(notification, 0, 0x07);
        let descriptor = extent.extract_segment(HEADER_LENGTH, None)?;

        let event = if no_event_available || class == 0 || descriptor.is_empty() {
            None
        } else {
            let decoder = decoder(class).ok_or(crate::Error::UnknownTypeCode {
                family: "event class",
                code: class.into(),
            })?;
            if descriptor.len() < DESCRIPTOR_LENGTH {
                return Err(crate::Error::Truncated {
                    family: "event descriptor",
                    declared: DESCRIPTOR_LENGTH,
                    available: descriptor.len(),
                });
            }
            Some(decoder(descriptor)?)
        };

        Ok(Self {
            no_event_available,
            supported_classes: EventClasses::from_bits_truncate(extent.read(3)?),
            event,
        })
    }
}

fn decoder(class: u8) -> Option<Decoder<Event>> {
    match class {
        1 => Some(operational_change),
        2 => Some(power_management),
        3 => Some(external_request),
        4 => Some(media),
        5 => Some(multi_host),
        6 => Some(device_busy),
        _ => None,
    }
}

fn event_code(buffer: Buffer<'_>) -> crate::Result<u8> {
    Ok(bits::get_masked(buffer.read(0)?, 0, 0x0F))
}

/// Persistent prevented flag and the 4-bit status of byte 1.
fn status(buffer: Buffer<'_>) -> crate::Result<(bool, u8)> {
    let byte: u8 = buffer.read(1)?;
    Ok((bits::get_bit(byte, 7), bits::get_masked(byte, 0, 0x0F)))
}

fn operational_change(buffer: Buffer<'_>) -> crate::Result<Event> {
    let (persistent_prevented, operational_status) = status(buffer)?;
    Ok(Event::OperationalChange(OperationalChange {
        event_code: event_code(buffer)?,
        persistent_prevented,
        operational_status,
        operational_change: buffer.read_be(2)?,
    }))
}

fn power_management(buffer: Buffer<'_>) -> crate::Result<Event> {
    Ok(Event::PowerManagement(PowerManagement {
        event_code: event_code(buffer)?,
        power_status: buffer.read(1)?,
    }))
}

fn external_request(buffer: Buffer<'_>) -> crate::Result<Event> {
    let (persistent_prevented, external_request_status) = status(buffer)?;
    Ok(Event::ExternalRequest(ExternalRequest {
        event_code: event_code(buffer)?,
        persistent_prevented,
        external_request_status,
        external_request: buffer.read_be(2)?,
    }))
}

fn media(buffer: Buffer<'_>) -> crate::Result<Event> {
    let status: u8 = buffer.read(1)?;
    Ok(Event::Media(MediaEvent {
        event_code: event_code(buffer)?,
        media_present: bits::get_bit(status, 1),
        door_or_tray_open: bits::get_bit(status, 0),
        start_slot: buffer.read(2)?,
        end_slot: buffer.read(3)?,
    }))
}

fn multi_host(buffer: Buffer<'_>) -> crate::Result<Event> {
    let (persistent_prevented, multi_host_status) = status(buffer)?;
    Ok(Event::MultiHost(MultiHost {
        event_code: event_code(buffer)?,
        persistent_prevented,
        multi_host_status,
        multi_host_priority: buffer.read_be(2)?,
    }))
}

fn device_busy(buffer: Buffer<'_>) -> crate::Result<Event> {
    Ok(Event::DeviceBusy(DeviceBusy {
        event_code: event_code(buffer)?,
        busy_status: buffer.read(1)?,
        time: buffer.read_be(2)?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_event_test() {
        let bytes = [0x00, 0x06, 0x04, 0x5E, 0x02, 0x02, 0x00, 0x00];
        let status = EventStatus::decode(&bytes).unwrap();

        assert!(!status.no_event_available);
        assert!(status
            .supported_classes
            .contains(EventClasses::MEDIA | EventClasses::OPERATIONAL_CHANGE));
        assert!(!status.supported_classes.contains(EventClasses::MULTI_HOST));
        assert_eq!(
            status.event,
            Some(Event::Media(MediaEvent {
                event_code: MediaEvent::NEW_MEDIA,
                media_present: true,
                door_or_tray_open: false,
                start_slot: 0,
                end_slot: 0,
            }))
        );
    }

    #[test]
    fn no_event_test() {
        let bytes = [0x00, 0x02, 0x80, 0x10];
        let status = EventStatus::decode(&bytes).unwrap();
        assert!(status.no_event_available);
        assert_eq!(status.supported_classes, EventClasses::MEDIA);
        assert_eq!(status.event, None);
    }

    #[test]
    fn device_busy_test() {
        let bytes = [0x00, 0x06, 0x06, 0x40, 0x01, 0x01, 0x00, 0x32];
        let status = EventStatus::decode(&bytes).unwrap();
        assert_eq!(
            status.event,
            Some(Event::DeviceBusy(DeviceBusy {
                event_code: 1,
                busy_status: 1,
                time: 50,
            }))
        );
    }

    #[test]
    fn operational_change_test() {
        let bytes = [0x00, 0x06, 0x01, 0x02, 0x02, 0x81, 0x00, 0x02];
        let status = EventStatus::decode(&bytes).unwrap();
        assert_eq!(
            status.event,
            Some(Event::OperationalChange(OperationalChange {
                event_code: 2,
                persistent_prevented: true,
                operational_status: 1,
                operational_change: 2,
            }))
        );
    }

    #[test]
    fn unknown_class_test() {
        let bytes = [0x00, 0x06, 0x07, 0x00, 0x00, 0x00, 0x00, 0x00];
        assert!(matches!(
            EventStatus::decode(&bytes),
            Err(crate::Error::UnknownTypeCode { code: 7, .. })
        ));

        let short = [0x00, 0x04, 0x04, 0x10, 0x02, 0x02];
        assert!(matches!(
            EventStatus::decode(&short),
            Err(crate::Error::Truncated { .. })
        ));
    }
}
