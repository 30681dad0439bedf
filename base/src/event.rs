//! Bus event records.
//!
//! Each completed bus cycle which passes the log filter is recorded
//! in an 8-byte record.  Host-side tools receive the valid prefix of
//! the event log as raw bytes, so the record layout is a wire format:
//!
//! | offset | size | field |
//! | ------ | ---- | ----- |
//! | 0      | 4    | address (little-endian, low 20 bits significant) |
//! | 4      | 2    | data (little-endian) |
//! | 6      | 1    | kind (see [`EventKind`]) |
//! | 7      | 1    | flags (bit 0: BHE# was low) |
use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

#[cfg(test)]
use test_strategy::Arbitrary;

use super::address::Address;
use super::error::RecordError;

pub const RECORD_SIZE: usize = 8;

/// Set in [`BusEvent::flags`] when the byte-enable line (BHE#) was
/// asserted, that is, low.
pub const FLAG_BYTE_ENABLE: u8 = 0x01;

/// Transfers are padded out to a whole block with SUB (0x1A) bytes, so
/// a received log may end with records consisting only of padding.
const PADDING_RECORD: [u8; RECORD_SIZE] = [0x1A; RECORD_SIZE];

/// The kind of bus cycle a record describes.
///
/// `Unused` marks the first entry beyond the end of the valid part of
/// the log.  No real bus cycle ever produces it.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(test, derive(Arbitrary))]
pub enum EventKind {
    Unused = 0,
    MemRead = 1,
    MemWrite = 2,
    IoRead = 3,
    IoWrite = 4,
}

impl EventKind {
    #[must_use]
    pub fn is_io(&self) -> bool {
        matches!(self, EventKind::IoRead | EventKind::IoWrite)
    }

    #[must_use]
    pub fn is_memory(&self) -> bool {
        matches!(self, EventKind::MemRead | EventKind::MemWrite)
    }

    /// The two-letter abbreviation used in log listings.
    #[must_use]
    pub fn mnemonic(&self) -> &'static str {
        match self {
            EventKind::Unused => "--",
            EventKind::MemRead => "RD",
            EventKind::MemWrite => "WR",
            EventKind::IoRead => "IR",
            EventKind::IoWrite => "IW",
        }
    }

    #[must_use]
    pub fn for_cycle(is_io: bool, is_write: bool) -> EventKind {
        match (is_io, is_write) {
            (false, false) => EventKind::MemRead,
            (false, true) => EventKind::MemWrite,
            (true, false) => EventKind::IoRead,
            (true, true) => EventKind::IoWrite,
        }
    }
}

impl TryFrom<u8> for EventKind {
    type Error = u8;
    fn try_from(n: u8) -> Result<EventKind, u8> {
        match n {
            0 => Ok(EventKind::Unused),
            1 => Ok(EventKind::MemRead),
            2 => Ok(EventKind::MemWrite),
            3 => Ok(EventKind::IoRead),
            4 => Ok(EventKind::IoWrite),
            other => Err(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(test, derive(Arbitrary))]
pub struct BusEvent {
    pub address: Address,
    pub data: u16,
    pub kind: EventKind,
    pub flags: u8,
}

impl BusEvent {
    pub const UNUSED: BusEvent = BusEvent {
        address: Address::ZERO,
        data: 0,
        kind: EventKind::Unused,
        flags: 0,
    };

    #[must_use]
    pub fn new(address: Address, data: u16, kind: EventKind, byte_enable: bool) -> BusEvent {
        BusEvent {
            address,
            data,
            kind,
            flags: if byte_enable { FLAG_BYTE_ENABLE } else { 0 },
        }
    }

    #[must_use]
    pub fn is_unused(&self) -> bool {
        self.kind == EventKind::Unused
    }

    #[must_use]
    pub fn byte_enable(&self) -> bool {
        self.flags & FLAG_BYTE_ENABLE != 0
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut out = [0_u8; RECORD_SIZE];
        out[0..4].copy_from_slice(&self.address.bits().to_le_bytes());
        out[4..6].copy_from_slice(&self.data.to_le_bytes());
        out[6] = self.kind as u8;
        out[7] = self.flags;
        out
    }

    /// Decodes one record.  `index` is only used to describe the
    /// position of a bad record in the returned error.
    pub fn from_bytes(index: usize, raw: &[u8; RECORD_SIZE]) -> Result<BusEvent, RecordError> {
        let address_bits = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
        let address = Address::try_from(address_bits).map_err(|_| RecordError::AddressOutOfRange {
            index,
            address: address_bits,
        })?;
        let kind =
            EventKind::try_from(raw[6]).map_err(|kind| RecordError::InvalidKind { index, kind })?;
        Ok(BusEvent {
            address,
            data: u16::from_le_bytes([raw[4], raw[5]]),
            kind,
            flags: raw[7],
        })
    }
}

impl Display for BusEvent {
    /// Formats the event the way the monitor lists it: `AAAAA|B|TY|DDDD`.
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(
            f,
            "{}|{}|{}|{:04X}",
            self.address,
            if self.byte_enable() { "B" } else { "-" },
            self.kind.mnemonic(),
            self.data
        )
    }
}

/// Decodes the valid entries of a raw event log as sent by the
/// monitor.  Decoding stops at the first `Unused` record or at the
/// first record consisting entirely of transfer padding.
pub fn decode_log(raw: &[u8]) -> Result<Vec<BusEvent>, RecordError> {
    let mut events = Vec::with_capacity(raw.len() / RECORD_SIZE);
    let mut chunks = raw.chunks_exact(RECORD_SIZE);
    for (index, chunk) in chunks.by_ref().enumerate() {
        let mut record = [0_u8; RECORD_SIZE];
        record.copy_from_slice(chunk);
        if record == PADDING_RECORD {
            return Ok(events);
        }
        let event = BusEvent::from_bytes(index, &record)?;
        if event.is_unused() {
            return Ok(events);
        }
        events.push(event);
    }
    if chunks.remainder().iter().all(|&b| b == 0x1A) {
        Ok(events)
    } else {
        Err(RecordError::Truncated { len: raw.len() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_strategy::proptest;

    #[test]
    fn test_record_layout() {
        let ev = BusEvent::new(
            Address::from(0x1234_u16).wrapping_add(0xA_0000),
            0xBEEF,
            EventKind::IoWrite,
            true,
        );
        assert_eq!(ev.to_bytes(), [0x34, 0x12, 0x0A, 0x00, 0xEF, 0xBE, 4, 1]);
    }

    #[test]
    fn test_unused_is_all_zero() {
        assert_eq!(BusEvent::UNUSED.to_bytes(), [0_u8; RECORD_SIZE]);
    }

    #[test]
    fn test_display_matches_monitor_listing() {
        let ev = BusEvent::new(Address::from(0x100_u16), 0x0003, EventKind::MemWrite, true);
        assert_eq!(ev.to_string(), "00100|B|WR|0003");
        let ev = BusEvent::new(Address::from(0x2F8_u16), 0x00FF, EventKind::IoRead, false);
        assert_eq!(ev.to_string(), "002F8|-|IR|00FF");
    }

    #[test]
    fn test_decode_stops_at_padding() {
        let mut raw = Vec::new();
        for data in [1, 2] {
            let ev = BusEvent::new(Address::ZERO, data, EventKind::MemRead, false);
            raw.extend_from_slice(&ev.to_bytes());
        }
        raw.resize(128, 0x1A);
        let events = decode_log(&raw).expect("padded log should decode");
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].data, 2);
    }

    #[test]
    fn test_decode_stops_at_unused() {
        let mut raw = BusEvent::new(Address::ZERO, 7, EventKind::IoRead, false).to_bytes().to_vec();
        raw.extend_from_slice(&[0_u8; RECORD_SIZE * 3]);
        assert_eq!(decode_log(&raw).map(|v| v.len()), Ok(1));
    }

    #[test]
    fn test_decode_rejects_bad_kind() {
        let mut raw = BusEvent::new(Address::ZERO, 7, EventKind::IoRead, false).to_bytes();
        raw[6] = 9;
        assert_eq!(
            decode_log(&raw),
            Err(RecordError::InvalidKind { index: 0, kind: 9 })
        );
    }

    #[test]
    fn test_decode_rejects_partial_record() {
        let raw = [1_u8, 0, 0];
        assert_eq!(decode_log(&raw), Err(RecordError::Truncated { len: 3 }));
    }

    #[proptest]
    fn record_bytes_decode_to_same_event(ev: BusEvent) {
        assert_eq!(BusEvent::from_bytes(0, &ev.to_bytes()), Ok(ev));
    }
}
