//! Control bytes and block framing.
use super::crc::crc16_xmodem;

/// Start of a 128-byte block.
pub const SOH: u8 = 0x01;
/// End of transmission.
pub const EOT: u8 = 0x04;
/// Positive acknowledgement.
pub const ACK: u8 = 0x06;
/// Negative acknowledgement; asks for the block to be sent again.
pub const NAK: u8 = 0x15;
/// Cancel.  Sent twice to abort a transfer.
pub const CAN: u8 = 0x18;
/// Sent by the receiver to say it is ready and wants CRC (rather than
/// checksum) blocks.
pub const CRC_REQUEST: u8 = b'C';
/// The final block is filled out with SUB characters.
pub const PAD: u8 = 0x1A;

pub const BLOCK_SIZE: usize = 128;

/// SOH, block number, its complement, data, two CRC bytes.
pub const FRAME_LEN: usize = 3 + BLOCK_SIZE + 2;

/// Builds the frame for one block.  `chunk` may be shorter than a
/// block (at the end of the payload), in which case it is padded.
pub(crate) fn encode_block(number: u8, chunk: &[u8]) -> [u8; FRAME_LEN] {
    debug_assert!(chunk.len() <= BLOCK_SIZE);
    let mut frame = [PAD; FRAME_LEN];
    frame[0] = SOH;
    frame[1] = number;
    frame[2] = !number;
    frame[3..3 + chunk.len()].copy_from_slice(chunk);
    let crc = crc16_xmodem(&frame[3..3 + BLOCK_SIZE]);
    frame[3 + BLOCK_SIZE..].copy_from_slice(&crc.to_be_bytes());
    frame
}

/// The outcome of validating a received frame.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum BlockCheck {
    /// Block number and complement agree and the CRC matches.
    Intact(u8),
    /// The block number and its complement disagree.
    BadNumber,
    /// The data does not match its CRC.
    BadCrc(u8),
}

pub(crate) fn check_block(frame: &[u8; FRAME_LEN]) -> BlockCheck {
    let number = frame[1];
    if frame[2] != !number {
        return BlockCheck::BadNumber;
    }
    let expected = crc16_xmodem(&frame[3..3 + BLOCK_SIZE]);
    let received = u16::from_be_bytes([frame[3 + BLOCK_SIZE], frame[4 + BLOCK_SIZE]]);
    if expected == received {
        BlockCheck::Intact(number)
    } else {
        BlockCheck::BadCrc(number)
    }
}

pub(crate) fn block_data(frame: &[u8; FRAME_LEN]) -> &[u8] {
    &frame[3..3 + BLOCK_SIZE]
}
