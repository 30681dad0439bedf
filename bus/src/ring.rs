//! The event log: a fixed number of bus event records, filled from
//! the front and never overwritten.
use std::error::Error;
use std::fmt::{self, Display, Formatter};

use base::prelude::*;

/// The number of records the monitor has room for.
pub const DEFAULT_LOG_CAPACITY: usize = 4000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFull {
    pub capacity: usize,
}

impl Display for LogFull {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "event log is full ({} entries)", self.capacity)
    }
}

impl Error for LogFull {}

#[derive(Debug, Clone)]
pub struct EventRing {
    slots: Box<[BusEvent]>,
    len: usize,
}

impl EventRing {
    pub fn new(capacity: usize) -> EventRing {
        EventRing {
            slots: vec![BusEvent::UNUSED; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len >= self.slots.len()
    }

    /// Marks every slot unused.
    pub fn clear(&mut self) {
        self.slots.fill(BusEvent::UNUSED);
        self.len = 0;
    }

    pub fn push(&mut self, event: BusEvent) -> Result<(), LogFull> {
        match self.slots.get_mut(self.len) {
            Some(slot) => {
                *slot = event;
                self.len += 1;
                Ok(())
            }
            None => Err(LogFull {
                capacity: self.capacity(),
            }),
        }
    }

    /// The valid entries, oldest first.
    pub fn entries(&self) -> &[BusEvent] {
        &self.slots[..self.len]
    }

    /// Every slot, including the unused ones after the valid entries.
    pub fn slots(&self) -> &[BusEvent] {
        &self.slots
    }

    /// Counts the entries before the first unused slot.  This is how
    /// the valid length is recovered from the raw slots.
    pub fn scan_len(&self) -> usize {
        self.slots
            .iter()
            .position(BusEvent::is_unused)
            .unwrap_or(self.slots.len())
    }

    /// The valid entries in their 8-byte wire format.
    pub fn wire_bytes(&self) -> Vec<u8> {
        self.entries().iter().flat_map(BusEvent::to_bytes).collect()
    }
}

impl Default for EventRing {
    fn default() -> Self {
        EventRing::new(DEFAULT_LOG_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(n: u32) -> BusEvent {
        BusEvent::new(Address::truncating(n), n as u16, EventKind::MemRead, false)
    }

    #[test]
    fn test_full_ring_refuses() {
        let mut ring = EventRing::new(3);
        for n in 0..3 {
            ring.push(event(n)).expect("room left");
        }
        assert!(ring.is_full());
        assert_eq!(ring.push(event(3)), Err(LogFull { capacity: 3 }));
        assert_eq!(ring.entries(), &[event(0), event(1), event(2)]);
    }

    #[test]
    fn test_clear() {
        let mut ring = EventRing::new(4);
        ring.push(event(1)).expect("room left");
        ring.push(event(2)).expect("room left");
        assert_eq!(ring.scan_len(), 2);
        ring.clear();
        assert!(ring.is_empty());
        assert_eq!(ring.scan_len(), 0);
        assert!(ring.slots().iter().all(BusEvent::is_unused));
    }

    #[test]
    fn test_wire_bytes_decode() {
        let mut ring = EventRing::default();
        assert_eq!(ring.capacity(), DEFAULT_LOG_CAPACITY);
        ring.push(BusEvent::new(addr!(0x2F8), 0x41, EventKind::IoWrite, false))
            .expect("room left");
        ring.push(BusEvent::new(addr!(0xFFFF0), 0xEA90, EventKind::MemRead, true))
            .expect("room left");
        let raw = ring.wire_bytes();
        assert_eq!(raw.len(), 2 * RECORD_SIZE);
        assert_eq!(&raw[..8], &[0xF8, 0x02, 0, 0, 0x41, 0, 4, 0]);
        assert_eq!(decode_log(&raw).expect("valid log"), ring.entries());
    }
}
