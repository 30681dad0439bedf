//! The processor's RAM.
//!
//! The controller has far less memory than the processor can address,
//! so the 20-bit physical address space is folded onto a smaller
//! power-of-two sized array: address `a` refers to cell
//! `a & (RAM_SIZE - 1)`.  Accesses never fail, they just alias.
//!
//! Cells are relaxed atomic bytes.  Normally only one thread touches
//! the store at a time (ownership moves with the run request), but in
//! HIDOS mode the request dispatcher reads and writes the guest's
//! memory while the bus engine is running.  The ordering which makes
//! that sound comes from the mailbox, not from the cells themselves.
use std::error::Error;
use std::fmt::{self, Debug, Display, Formatter};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use base::prelude::*;

pub const DEFAULT_RAM_SIZE: usize = 0x20000;

/// The largest store that makes sense: the whole 20-bit space.
pub const MAX_RAM_SIZE: usize = 1 << 20;

/// RAM is initialised to HLT, so a processor which runs off the end
/// of its program stops producing bus cycles.
pub const HALT_OPCODE: u8 = 0xF4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadRamSize {
    pub size: usize,
}

impl Display for BadRamSize {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(
            f,
            "RAM size {:#x} is not a power of two between 2 and {MAX_RAM_SIZE:#x}",
            self.size
        )
    }
}

impl Error for BadRamSize {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageTooLarge {
    pub image_len: usize,
    pub ram_size: usize,
}

impl Display for ImageTooLarge {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(
            f,
            "image of {} bytes does not fit in {} bytes of RAM",
            self.image_len, self.ram_size
        )
    }
}

impl Error for ImageTooLarge {}

pub struct BackingStore {
    cells: Arc<[AtomicU8]>,
    mask: u32,
}

impl Debug for BackingStore {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_struct("BackingStore")
            .field("size", &self.size())
            .finish_non_exhaustive()
    }
}

impl Default for BackingStore {
    fn default() -> Self {
        BackingStore::allocate(DEFAULT_RAM_SIZE)
    }
}

impl BackingStore {
    /// Creates a store of `size` bytes, filled with HLT.
    pub fn new(size: usize) -> Result<BackingStore, BadRamSize> {
        if size < 2 || size > MAX_RAM_SIZE || !size.is_power_of_two() {
            return Err(BadRamSize { size });
        }
        Ok(BackingStore::allocate(size))
    }

    /// `size` must already have been validated.
    fn allocate(size: usize) -> BackingStore {
        BackingStore {
            cells: (0..size).map(|_| AtomicU8::new(HALT_OPCODE)).collect(),
            mask: (size - 1) as u32,
        }
    }

    /// A second handle on the same cells, for the HIDOS dispatcher.
    pub(crate) fn shared_handle(&self) -> BackingStore {
        BackingStore {
            cells: Arc::clone(&self.cells),
            mask: self.mask,
        }
    }

    pub fn size(&self) -> usize {
        self.cells.len()
    }

    pub fn map_address(&self, address: Address) -> usize {
        (address.bits() & self.mask) as usize
    }

    fn cell(&self, address: Address) -> &AtomicU8 {
        &self.cells[self.map_address(address)]
    }

    pub fn read_byte(&self, address: Address) -> u8 {
        self.cell(address).load(Ordering::Relaxed)
    }

    pub fn write_byte(&self, address: Address, value: u8) {
        self.cell(address).store(value, Ordering::Relaxed);
    }

    /// Little-endian word at `address` and `address + 1`.  No
    /// alignment is imposed.
    pub fn read_word(&self, address: Address) -> u16 {
        u16::from_le_bytes([
            self.read_byte(address),
            self.read_byte(address.wrapping_add(1)),
        ])
    }

    pub fn write_word(&self, address: Address, value: u16) {
        let [low, high] = value.to_le_bytes();
        self.write_byte(address, low);
        self.write_byte(address.wrapping_add(1), high);
    }

    pub fn read_u32(&self, address: Address) -> u32 {
        let low = self.read_word(address);
        let high = self.read_word(address.wrapping_add(2));
        u32::from(low) | (u32::from(high) << 16)
    }

    pub fn write_u32(&self, address: Address, value: u32) {
        self.write_word(address, (value & 0xFFFF) as u16);
        self.write_word(address.wrapping_add(2), (value >> 16) as u16);
    }

    pub fn read_range(&self, start: Address, len: usize) -> Vec<u8> {
        (0..len)
            .map(|offset| self.read_byte(start.wrapping_add(offset as u32)))
            .collect()
    }

    pub fn write_range(&self, start: Address, bytes: &[u8]) {
        for (offset, &b) in bytes.iter().enumerate() {
            self.write_byte(start.wrapping_add(offset as u32), b);
        }
    }

    pub fn fill(&self, value: u8) {
        for cell in self.cells.iter() {
            cell.store(value, Ordering::Relaxed);
        }
    }

    /// A copy of the whole store, in cell order.
    pub fn snapshot(&self) -> Vec<u8> {
        self.cells
            .iter()
            .map(|cell| cell.load(Ordering::Relaxed))
            .collect()
    }

    /// Copies `image` to the start of RAM.  Nothing is changed if it
    /// does not fit.
    pub fn load(&self, image: &[u8]) -> Result<(), ImageTooLarge> {
        if image.len() > self.size() {
            return Err(ImageTooLarge {
                image_len: image.len(),
                ram_size: self.size(),
            });
        }
        for (cell, &b) in self.cells.iter().zip(image.iter()) {
            cell.store(b, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Applies a write cycle the way a 16-bit memory with two byte
    /// lanes would.  The low lane (even addresses) is selected by
    /// A0 being low, the high lane (odd addresses) by BHE# being low.
    /// On the high lane the byte travels on AD8-15.
    pub fn apply_bus_write(&self, address: Address, data: u16, bhe_asserted: bool) {
        let [low, high] = data.to_le_bytes();
        match (bhe_asserted, address.is_odd()) {
            (true, false) => {
                self.write_byte(address, low);
                self.write_byte(address.wrapping_add(1), high);
            }
            (true, true) => self.write_byte(address, high),
            (false, false) => self.write_byte(address, low),
            (false, true) => (),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_strategy::proptest;

    fn store() -> BackingStore {
        BackingStore::new(DEFAULT_RAM_SIZE).expect("default size is valid")
    }

    #[test]
    fn test_initially_halt() {
        let ram = BackingStore::new(0x10000).expect("64K is valid");
        assert_eq!(ram.size(), 0x10000);
        assert!(ram.snapshot().iter().all(|&b| b == HALT_OPCODE));
    }

    #[test]
    fn test_bad_sizes() {
        for size in [0, 1, 3, 0x18000, MAX_RAM_SIZE * 2] {
            assert_eq!(BackingStore::new(size).unwrap_err(), BadRamSize { size });
        }
    }

    #[test]
    fn test_word_access_little_endian() {
        let ram = store();
        ram.write_word(addr!(0x100), 0xBEEF);
        assert_eq!(ram.read_byte(addr!(0x100)), 0xEF);
        assert_eq!(ram.read_byte(addr!(0x101)), 0xBE);
        ram.write_u32(addr!(0x200), 0x1234_5678);
        assert_eq!(ram.read_word(addr!(0x200)), 0x5678);
        assert_eq!(ram.read_u32(addr!(0x200)), 0x1234_5678);
    }

    #[test]
    fn test_word_wraps_at_end_of_ram() {
        let ram = store();
        ram.write_word(addr!(0x1FFFF), 0xA55A);
        assert_eq!(ram.read_byte(addr!(0x1FFFF)), 0x5A);
        assert_eq!(ram.read_byte(Address::ZERO), 0xA5);
    }

    #[test]
    fn test_word_write_even() {
        let ram = store();
        ram.apply_bus_write(addr!(0x400), 0x1234, true);
        assert_eq!(ram.read_range(addr!(0x3FF), 4), vec![HALT_OPCODE, 0x34, 0x12, HALT_OPCODE]);
    }

    #[test]
    fn test_high_byte_write_odd() {
        let ram = store();
        ram.apply_bus_write(addr!(0x401), 0x1234, true);
        assert_eq!(ram.read_range(addr!(0x400), 3), vec![HALT_OPCODE, 0x12, HALT_OPCODE]);
    }

    #[test]
    fn test_low_byte_write_even() {
        let ram = store();
        ram.apply_bus_write(addr!(0x400), 0x1234, false);
        assert_eq!(ram.read_range(addr!(0x3FF), 3), vec![HALT_OPCODE, 0x34, HALT_OPCODE]);
    }

    #[test]
    fn test_no_lane_selected() {
        let ram = store();
        ram.apply_bus_write(addr!(0x401), 0x1234, false);
        assert!(ram.snapshot().iter().all(|&b| b == HALT_OPCODE));
    }

    #[test]
    fn test_load() {
        let ram = BackingStore::new(16).expect("16 is valid");
        ram.load(&[1, 2, 3]).expect("fits");
        assert_eq!(ram.read_range(Address::ZERO, 4), vec![1, 2, 3, HALT_OPCODE]);
        assert_eq!(
            ram.load(&[0; 17]),
            Err(ImageTooLarge {
                image_len: 17,
                ram_size: 16
            })
        );
        assert_eq!(ram.read_byte(addr!(3)), HALT_OPCODE);
    }

    #[test]
    fn test_fill_and_shared_handle() {
        let ram = store();
        let other = ram.shared_handle();
        ram.fill(0);
        assert_eq!(other.read_word(addr!(0x1234)), 0);
        other.write_byte(addr!(0x10), 9);
        assert_eq!(ram.read_byte(addr!(0x10)), 9);
    }

    #[proptest]
    fn read_after_write(#[strategy(0_u32..=Address::MASK)] bits: u32, value: u8) {
        let ram = store();
        let a = Address::truncating(bits);
        ram.write_byte(a, value);
        assert_eq!(ram.read_byte(a), value);
    }

    #[proptest]
    fn mapping_aliases(#[strategy(0_u32..=Address::MASK)] bits: u32) {
        let ram = store();
        let a = Address::truncating(bits);
        let alias = a.wrapping_add(DEFAULT_RAM_SIZE as u32);
        assert_eq!(ram.map_address(a), ram.map_address(alias));
        assert!(ram.map_address(a) < ram.size());
    }
}
