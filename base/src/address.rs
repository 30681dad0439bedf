//! Physical addresses on the processor's bus are 20 bits wide.  The
//! low 16 bits are multiplexed with the data lines (AD0-AD15) and the
//! top four come from dedicated lines (A16-A19).  I/O port addresses
//! use the same type; their top bits are simply zero.
use std::fmt::{self, Debug, Display, Formatter, UpperHex};

use serde::{Deserialize, Serialize};

#[cfg(test)]
use test_strategy::Arbitrary;

use super::error::ConversionFailed;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
#[cfg_attr(test, derive(Arbitrary))]
pub struct Address(#[cfg_attr(test, strategy(0_u32..=Address::MASK))] u32);

impl Address {
    pub const MASK: u32 = 0xF_FFFF;
    pub const ZERO: Address = Address(0);
    pub const MAX: Address = Address(Address::MASK);

    /// Compile-time checked constructor; see the [`addr!`](crate::addr) macro.
    #[must_use]
    pub const fn new<const N: u32>() -> Address {
        struct Helper<const M: u32>;
        impl<const M: u32> Helper<M> {
            const A: Address = {
                if M > Address::MASK {
                    panic!("input value is out of range")
                } else {
                    Address(M)
                }
            };
        }
        Helper::<N>::A
    }

    /// Keeps only the low 20 bits of `bits`, which is what the
    /// hardware does when a computed address overflows.
    #[must_use]
    pub const fn truncating(bits: u32) -> Address {
        Address(bits & Address::MASK)
    }

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// The state of address line A0.  On a 16-bit bus an odd address
    /// selects the high byte lane.
    #[must_use]
    pub const fn is_odd(self) -> bool {
        self.0 & 1 != 0
    }

    /// The address of the word containing this byte.
    #[must_use]
    pub const fn word_aligned(self) -> Address {
        Address(self.0 & !1)
    }

    /// Address arithmetic wraps within the 20-bit space.
    #[must_use]
    pub const fn wrapping_add(self, delta: u32) -> Address {
        Address(self.0.wrapping_add(delta) & Address::MASK)
    }
}

impl TryFrom<u32> for Address {
    type Error = ConversionFailed;
    fn try_from(bits: u32) -> Result<Address, ConversionFailed> {
        if bits > Address::MASK {
            Err(ConversionFailed::TooLarge)
        } else {
            Ok(Address(bits))
        }
    }
}

impl From<u16> for Address {
    fn from(bits: u16) -> Address {
        Address(u32::from(bits))
    }
}

impl From<Address> for u32 {
    fn from(a: Address) -> u32 {
        a.0
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{:05X}", self.0)
    }
}

impl Debug for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "Address({:05X})", self.0)
    }
}

impl UpperHex for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        UpperHex::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_strategy::proptest;

    #[test]
    fn test_try_from_rejects_21_bits() {
        assert_eq!(Address::try_from(0x10_0000_u32), Err(ConversionFailed::TooLarge));
        assert_eq!(Address::try_from(0xF_FFFF_u32), Ok(Address::MAX));
    }

    #[test]
    fn test_display_is_five_hex_digits() {
        assert_eq!(Address::from(0x2F8_u16).to_string(), "002F8");
        assert_eq!(Address::MAX.to_string(), "FFFFF");
    }

    #[test]
    fn test_wrapping_add() {
        assert_eq!(Address::MAX.wrapping_add(1), Address::ZERO);
        assert_eq!(Address::MAX.wrapping_add(2), Address::from(1_u16));
    }

    #[proptest]
    fn word_aligned_is_even_and_close(a: Address) {
        let w = a.word_aligned();
        assert!(!w.is_odd());
        assert!(a.bits() - w.bits() <= 1);
    }

    #[proptest]
    fn serde_round_trips_through_u32(a: Address) {
        let bits: u32 = a.into();
        assert_eq!(Address::try_from(bits), Ok(a));
    }
}
