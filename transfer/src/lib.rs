//! Reliable transfer of binary payloads over an unreliable byte
//! stream.
//!
//! The protocol is XMODEM with a 16-bit CRC: the payload is cut into
//! 128-byte blocks, each sent as
//!
//! ```text
//! [SOH][block#][~block#][128 data bytes][CRC hi][CRC lo]
//! ```
//!
//! and individually acknowledged.  Block numbers start at 1 and wrap
//! at 255.  The receiver starts the transfer by sending `C`; the
//! sender finishes it with EOT.  Either side gives up by sending CAN
//! twice.
//!
//! The protocol is symmetric in the sense that the same code runs on
//! the monitor and on the host; which end sends is decided only by
//! who calls [`send`] and who calls [`receive`].

mod config;
mod crc;
mod error;
mod frame;
mod receive;
mod send;
mod session;

pub mod link;

pub use config::TransferConfig;
pub use crc::crc16_xmodem;
pub use error::TransferError;
pub use frame::{ACK, BLOCK_SIZE, CAN, CRC_REQUEST, EOT, FRAME_LEN, NAK, PAD, SOH};
pub use link::ByteLink;
pub use receive::receive;
pub use send::send;
