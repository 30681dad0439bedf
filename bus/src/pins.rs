//! The hardware contract between the controller and the processor.
//!
//! All of the processor's bus signals are wired to GPIO pins of the
//! controller, so that a single read of the GPIO input register gives
//! a consistent view of the whole bus:
//!
//! | GPIO  | Signal   | Notes                                      |
//! | ----- | -------- | ------------------------------------------ |
//! | 0-15  | AD0-AD15 | address, then data; driven by us on reads  |
//! | 16    | ALE      | active high                                |
//! | 17    | RD#      | active low                                 |
//! | 18    | WR#      | active low                                 |
//! | 19    | M/IO#    | polarity given by [`MemIoPolarity`]        |
//! | 20    | BHE#     | active low                                 |
//! | 21    | CLK      | processor clock output                     |
//! | 22    | RESET    | output, active high                        |
//! | 26-29 | A16-A19  | upper address bits                         |
use std::fmt::{self, Debug, Formatter};

use base::prelude::*;

pub const PIN_AD_BASE: u32 = 0;
pub const PIN_ALE: u32 = 16;
pub const PIN_RD: u32 = 17;
pub const PIN_WR: u32 = 18;
pub const PIN_IOM: u32 = 19;
pub const PIN_BHE: u32 = 20;
pub const PIN_CLK_OUT: u32 = 21;
pub const PIN_RESET: u32 = 22;
pub const PIN_A16: u32 = 26;

const AD_MASK: u32 = 0xFFFF << PIN_AD_BASE;
const HIGH_ADDRESS_MASK: u32 = 0xF << PIN_A16;

/// Which level of the M/IO# line indicates an I/O cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemIoPolarity {
    /// Low means I/O (the 8086 `M/IO#` convention).
    LowMeansIo,
    /// High means I/O (the 8088 `IO/M#` convention).
    HighMeansIo,
}

/// The polarity the board is wired for.
pub const MEMIO_POLARITY: MemIoPolarity = MemIoPolarity::LowMeansIo;

/// The state of every bus pin at one instant.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PinSnapshot(u32);

fn bit(pin: u32) -> u32 {
    1 << pin
}

impl PinSnapshot {
    pub const fn from_bits(bits: u32) -> PinSnapshot {
        PinSnapshot(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// The bus with nothing happening on it: all active-low controls
    /// high, ALE low, a memory cycle indicated, AD pulled up.
    pub fn idle(polarity: MemIoPolarity) -> PinSnapshot {
        let released = AD_MASK | bit(PIN_RD) | bit(PIN_WR) | bit(PIN_BHE);
        PinSnapshot(released).with_io(false, polarity)
    }

    fn level(self, pin: u32) -> bool {
        self.0 & bit(pin) != 0
    }

    fn with_level(self, pin: u32, high: bool) -> PinSnapshot {
        if high {
            PinSnapshot(self.0 | bit(pin))
        } else {
            PinSnapshot(self.0 & !bit(pin))
        }
    }

    pub fn ale(self) -> bool {
        self.level(PIN_ALE)
    }

    pub fn rd_asserted(self) -> bool {
        !self.level(PIN_RD)
    }

    pub fn wr_asserted(self) -> bool {
        !self.level(PIN_WR)
    }

    /// True when BHE# is low, i.e. the high byte lane is in use.
    pub fn bhe_asserted(self) -> bool {
        !self.level(PIN_BHE)
    }

    pub fn is_io(self, polarity: MemIoPolarity) -> bool {
        match polarity {
            MemIoPolarity::LowMeansIo => !self.level(PIN_IOM),
            MemIoPolarity::HighMeansIo => self.level(PIN_IOM),
        }
    }

    /// The 20-bit address, valid while ALE is high.
    pub fn address(self) -> Address {
        let low = (self.0 & AD_MASK) >> PIN_AD_BASE;
        let high = (self.0 & HIGH_ADDRESS_MASK) >> PIN_A16;
        Address::truncating(low | (high << 16))
    }

    /// AD0-AD15.
    pub fn data(self) -> u16 {
        ((self.0 & AD_MASK) >> PIN_AD_BASE) as u16
    }

    pub fn reset(self) -> bool {
        self.level(PIN_RESET)
    }

    #[must_use]
    pub fn with_ale(self, high: bool) -> PinSnapshot {
        self.with_level(PIN_ALE, high)
    }

    #[must_use]
    pub fn with_rd(self, asserted: bool) -> PinSnapshot {
        self.with_level(PIN_RD, !asserted)
    }

    #[must_use]
    pub fn with_wr(self, asserted: bool) -> PinSnapshot {
        self.with_level(PIN_WR, !asserted)
    }

    #[must_use]
    pub fn with_bhe(self, asserted: bool) -> PinSnapshot {
        self.with_level(PIN_BHE, !asserted)
    }

    #[must_use]
    pub fn with_io(self, is_io: bool, polarity: MemIoPolarity) -> PinSnapshot {
        let high = match polarity {
            MemIoPolarity::LowMeansIo => !is_io,
            MemIoPolarity::HighMeansIo => is_io,
        };
        self.with_level(PIN_IOM, high)
    }

    /// Places `address` on AD0-15 and A16-19.
    #[must_use]
    pub fn with_address(self, address: Address) -> PinSnapshot {
        let bits = address.bits();
        let cleared = self.0 & !(AD_MASK | HIGH_ADDRESS_MASK);
        let low = (bits & 0xFFFF) << PIN_AD_BASE;
        let high = ((bits >> 16) & 0xF) << PIN_A16;
        PinSnapshot(cleared | low | high)
    }

    #[must_use]
    pub fn with_data(self, data: u16) -> PinSnapshot {
        PinSnapshot((self.0 & !AD_MASK) | (u32::from(data) << PIN_AD_BASE))
    }

    #[must_use]
    pub fn with_reset(self, asserted: bool) -> PinSnapshot {
        self.with_level(PIN_RESET, asserted)
    }
}

impl Debug for PinSnapshot {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_struct("PinSnapshot")
            .field("ale", &self.ale())
            .field("rd", &self.rd_asserted())
            .field("wr", &self.wr_asserted())
            .field("bhe", &self.bhe_asserted())
            .field("iom", &self.level(PIN_IOM))
            .field("ad", &format_args!("{:04X}", self.data()))
            .field("a16_19", &format_args!("{:X}", (self.0 & HIGH_ADDRESS_MASK) >> PIN_A16))
            .finish()
    }
}

/// Access to the bus pins.  On the controller this is the GPIO
/// block; under test it is a simulated processor.
pub trait BusPins {
    /// Reads every pin at once.
    fn sample(&mut self) -> PinSnapshot;

    /// Switches AD0-15 to outputs and drives `data` onto them.
    fn drive(&mut self, data: u16);

    /// Returns AD0-15 to inputs.
    fn release(&mut self);

    fn set_reset(&mut self, asserted: bool);
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_strategy::proptest;

    #[test]
    fn test_idle() {
        let idle = PinSnapshot::idle(MEMIO_POLARITY);
        assert!(!idle.ale());
        assert!(!idle.rd_asserted());
        assert!(!idle.wr_asserted());
        assert!(!idle.bhe_asserted());
        assert!(!idle.is_io(MemIoPolarity::LowMeansIo));
        assert_eq!(idle.data(), 0xFFFF);
    }

    #[test]
    fn test_address_uses_upper_pins() {
        let bits = 0x1234 | (0b1010 << PIN_A16) | bit(PIN_ALE);
        let snapshot = PinSnapshot::from_bits(bits);
        assert!(snapshot.ale());
        assert_eq!(snapshot.address(), addr!(0xA1234));
        assert_eq!(snapshot.data(), 0x1234);
    }

    #[test]
    fn test_polarity() {
        let low = PinSnapshot::from_bits(0);
        let high = PinSnapshot::from_bits(bit(PIN_IOM));
        assert!(low.is_io(MemIoPolarity::LowMeansIo));
        assert!(!high.is_io(MemIoPolarity::LowMeansIo));
        assert!(!low.is_io(MemIoPolarity::HighMeansIo));
        assert!(high.is_io(MemIoPolarity::HighMeansIo));
        for polarity in [MemIoPolarity::LowMeansIo, MemIoPolarity::HighMeansIo] {
            let s = PinSnapshot::idle(polarity);
            assert!(s.with_io(true, polarity).is_io(polarity));
            assert!(!s.with_io(false, polarity).is_io(polarity));
        }
    }

    #[proptest]
    fn address_survives_placement(#[strategy(0_u32..=Address::MASK)] bits: u32, data: u16) {
        let a = Address::truncating(bits);
        let s = PinSnapshot::idle(MEMIO_POLARITY).with_address(a);
        assert_eq!(s.address(), a);
        let s = s.with_data(data);
        assert_eq!(s.data(), data);
        assert!(!s.rd_asserted());
    }
}
