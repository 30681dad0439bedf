//! Basic error reporting.

use std::error::Error;
use std::fmt::{self, Debug, Display, Formatter};

/// Represents a failure to convert a number into one of the
/// fixed-width types defined in the base crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConversionFailed {
    TooLarge,
}

impl Error for ConversionFailed {}

impl Display for ConversionFailed {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            ConversionFailed::TooLarge => f.write_str("value is too large"),
        }
    }
}

/// A bus event record (in its 8-byte wire form) could not be decoded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordError {
    /// The kind byte of record number `index` is not one we know.
    InvalidKind { index: usize, kind: u8 },

    /// The address field of record number `index` has bits set above
    /// bit 19.
    AddressOutOfRange { index: usize, address: u32 },

    /// The input ended part-way through a record.
    Truncated { len: usize },
}

impl Display for RecordError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            RecordError::InvalidKind { index, kind } => {
                write!(f, "record {index} has unknown kind {kind:#04x}")
            }
            RecordError::AddressOutOfRange { index, address } => {
                write!(f, "record {index} has address {address:#x} which does not fit in 20 bits")
            }
            RecordError::Truncated { len } => {
                write!(f, "log data of {len} bytes ends part-way through a record")
            }
        }
    }
}

impl Error for RecordError {}
