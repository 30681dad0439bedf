use tracing::{event, Level};

use super::config::TransferConfig;
use super::error::TransferError;
use super::frame::{
    block_data, check_block, BlockCheck, ACK, CAN, CRC_REQUEST, EOT, FRAME_LEN, NAK, PAD, SOH,
};
use super::link::{cancel_confirmed, send_cancel, ByteLink};
use super::session::{Role, TransferSession};

enum Start {
    /// SOH seen; the rest of block 1 follows.
    FirstBlock,
    /// The sender had nothing to send.
    Empty,
}

#[derive(Debug, Clone, Copy)]
enum State {
    /// SOH has been read; read the rest of the frame.
    ReadBlock,
    /// Waiting for the next SOH, or EOT.
    AwaitFrame,
}

fn handshake<L: ByteLink + ?Sized>(
    link: &mut L,
    config: &TransferConfig,
) -> Result<Start, TransferError> {
    for attempt in 1..=config.receive_handshake_retries {
        link.write_all(&[CRC_REQUEST])?;
        match link.read_byte(config.receive_handshake_timeout)? {
            Some(SOH) => return Ok(Start::FirstBlock),
            Some(EOT) => return Ok(Start::Empty),
            Some(CAN) => {
                if cancel_confirmed(link, config.byte_timeout)? {
                    return Err(TransferError::Cancelled);
                }
            }
            Some(other) => {
                event!(
                    Level::DEBUG,
                    "handshake attempt {attempt}: ignoring byte {other:#04x}"
                );
            }
            None => {
                event!(Level::DEBUG, "handshake attempt {attempt}: no response");
            }
        }
    }
    Err(TransferError::NoHandshake)
}

/// Reads the 132 bytes that follow SOH.  Returns `None` if any of
/// them fails to arrive in time.
fn read_frame<L: ByteLink + ?Sized>(
    link: &mut L,
    config: &TransferConfig,
) -> Result<Option<[u8; FRAME_LEN]>, TransferError> {
    let mut frame = [0_u8; FRAME_LEN];
    frame[0] = SOH;
    for slot in frame.iter_mut().skip(1) {
        match link.read_byte(config.byte_timeout)? {
            Some(byte) => *slot = byte,
            None => return Ok(None),
        }
    }
    Ok(Some(frame))
}

/// Asks for a resend.  Fails once too many consecutive resends have
/// been needed, after telling the sender to give up.
fn reject<L: ByteLink + ?Sized>(
    link: &mut L,
    session: &mut TransferSession,
) -> Result<State, TransferError> {
    link.write_all(&[NAK])?;
    if session.fail() {
        event!(
            Level::WARN,
            "{}: too many errors at block {}, cancelling",
            session.role(),
            session.next_block()
        );
        send_cancel(link)?;
        Err(TransferError::RetriesExhausted {
            block: session.next_block(),
        })
    } else {
        event!(
            Level::DEBUG,
            "{}: requested resend of block {} (retry {})",
            session.role(),
            session.next_block(),
            session.retries()
        );
        Ok(State::AwaitFrame)
    }
}

/// Acknowledges EOT and swallows any repeats of it.  The sender may
/// already have gone away, so errors are not interesting here.
fn finish<L: ByteLink + ?Sized>(
    link: &mut L,
    config: &TransferConfig,
) -> Result<(), TransferError> {
    link.write_all(&[ACK])?;
    if let Err(e) = link.flush_input(config.eot_drain) {
        event!(Level::DEBUG, "ignoring link error after EOT: {e}");
    }
    Ok(())
}

/// Copies as much of `data` as fits into `dest` at `offset`.  The part
/// that does not fit must be padding.  Returns the number of bytes
/// stored, or `None` if payload would be lost.
fn store_block(dest: &mut [u8], offset: usize, data: &[u8]) -> Option<usize> {
    let room = dest.len().saturating_sub(offset);
    let fits = data.len().min(room);
    if data[fits..].iter().any(|&b| b != PAD) {
        return None;
    }
    dest[offset..offset + fits].copy_from_slice(&data[..fits]);
    Some(fits)
}

/// Receives a payload into `dest`, returning the number of bytes
/// stored.  Blocks are stored whole while there is room, so the end
/// of the final block may hold the sender's padding; padding which
/// would not fit is dropped.  A payload too big for `dest` is refused
/// (the sender is sent CAN CAN) and the bytes already stored are left
/// in place.
pub fn receive<L: ByteLink + ?Sized>(
    link: &mut L,
    dest: &mut [u8],
    config: &TransferConfig,
) -> Result<usize, TransferError> {
    let mut session = TransferSession::new(Role::Receiver, config.receive_max_retries);
    match handshake(link, config)? {
        Start::Empty => {
            finish(link, config)?;
            event!(Level::INFO, "receive complete, sender had no data");
            return Ok(0);
        }
        Start::FirstBlock => (),
    }

    let mut received: usize = 0;
    let mut state = State::ReadBlock;
    loop {
        state = match state {
            State::ReadBlock => match read_frame(link, config)? {
                None => {
                    event!(
                        Level::DEBUG,
                        "timeout inside block {}",
                        session.next_block()
                    );
                    link.flush_input(config.flush_quiet)?;
                    reject(link, &mut session)?
                }
                Some(frame) => match check_block(&frame) {
                    BlockCheck::Intact(number) if session.expects(number) => {
                        let Some(stored) = store_block(dest, received, block_data(&frame)) else {
                            event!(
                                Level::WARN,
                                "block {number} would overflow the {} byte destination",
                                dest.len()
                            );
                            send_cancel(link)?;
                            return Err(TransferError::Overflow {
                                capacity: dest.len(),
                            });
                        };
                        received += stored;
                        session.advance();
                        event!(Level::TRACE, "accepted block {number}");
                        link.write_all(&[ACK])?;
                        State::AwaitFrame
                    }
                    BlockCheck::Intact(number) if session.is_duplicate(number) => {
                        event!(Level::DEBUG, "block {number} received twice, acknowledging");
                        session.reset_retries();
                        link.write_all(&[ACK])?;
                        State::AwaitFrame
                    }
                    bad => {
                        event!(
                            Level::DEBUG,
                            "bad frame while expecting block {}: {bad:?}",
                            session.next_block()
                        );
                        reject(link, &mut session)?
                    }
                },
            },
            State::AwaitFrame => match link.read_byte(config.frame_timeout)? {
                Some(SOH) => State::ReadBlock,
                Some(EOT) => {
                    finish(link, config)?;
                    event!(
                        Level::INFO,
                        "receive complete, {} blocks ({received} bytes)",
                        session.blocks_done()
                    );
                    return Ok(received);
                }
                Some(CAN) if cancel_confirmed(link, config.byte_timeout)? => {
                    event!(Level::WARN, "sender cancelled the transfer");
                    return Err(TransferError::Cancelled);
                }
                Some(other) => {
                    event!(Level::DEBUG, "unexpected byte {other:#04x} between blocks");
                    link.flush_input(config.flush_quiet)?;
                    reject(link, &mut session)?
                }
                None => reject(link, &mut session)?,
            },
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{encode_block, BLOCK_SIZE};
    use crate::link::ScriptedLink;

    #[test]
    fn test_empty_transfer() {
        let mut link = ScriptedLink::new();
        link.push_bytes(&[EOT]);
        let mut dest = [0_u8; 16];
        assert_eq!(receive(&mut link, &mut dest, &TransferConfig::default()).unwrap(), 0);
        assert_eq!(link.written(), &[CRC_REQUEST, ACK]);
    }

    #[test]
    fn test_silent_sender() {
        let config = TransferConfig::default();
        let mut link = ScriptedLink::new();
        let mut dest = [0_u8; 16];
        assert!(matches!(
            receive(&mut link, &mut dest, &config),
            Err(TransferError::NoHandshake)
        ));
        assert_eq!(
            link.written().len(),
            config.receive_handshake_retries as usize
        );
        assert!(link.written().iter().all(|&b| b == CRC_REQUEST));
    }

    #[test]
    fn test_duplicate_block_not_appended() {
        let first = encode_block(1, &[0x11; BLOCK_SIZE]);
        let second = encode_block(2, &[0x22; BLOCK_SIZE]);
        let mut link = ScriptedLink::new();
        link.push_bytes(&first)
            .push_bytes(&first)
            .push_bytes(&second)
            .push_bytes(&[EOT]);
        let mut dest = vec![0_u8; 4 * BLOCK_SIZE];
        let got = receive(&mut link, &mut dest, &TransferConfig::default()).unwrap();
        assert_eq!(got, 2 * BLOCK_SIZE);
        assert!(dest[..BLOCK_SIZE].iter().all(|&b| b == 0x11));
        assert!(dest[BLOCK_SIZE..2 * BLOCK_SIZE].iter().all(|&b| b == 0x22));
        assert!(dest[2 * BLOCK_SIZE..].iter().all(|&b| b == 0));
        assert_eq!(link.written(), &[CRC_REQUEST, ACK, ACK, ACK, ACK]);
    }

    #[test]
    fn test_corrupt_block_is_nakked_then_accepted() {
        let good = encode_block(1, b"hello");
        let mut bad = good;
        bad[10] ^= 0xFF;
        let mut link = ScriptedLink::new();
        link.push_bytes(&bad)
            .push_bytes(&good)
            .push_bytes(&[EOT]);
        let mut dest = vec![0_u8; BLOCK_SIZE];
        assert_eq!(
            receive(&mut link, &mut dest, &TransferConfig::default()).unwrap(),
            BLOCK_SIZE
        );
        assert_eq!(&dest[..5], b"hello");
        assert_eq!(link.written(), &[CRC_REQUEST, NAK, ACK, ACK]);
    }

    #[test]
    fn test_truncated_block_resyncs() {
        let good = encode_block(1, b"data");
        let mut link = ScriptedLink::new();
        link.push_bytes(&good[..50])
            .push_timeout()
            // consumed by the flush
            .push_timeout()
            .push_bytes(&good)
            .push_bytes(&[EOT]);
        let mut dest = vec![0_u8; BLOCK_SIZE];
        assert_eq!(
            receive(&mut link, &mut dest, &TransferConfig::default()).unwrap(),
            BLOCK_SIZE
        );
        assert_eq!(link.written(), &[CRC_REQUEST, NAK, ACK, ACK]);
    }

    #[test]
    fn test_overflow_cancels() {
        let mut link = ScriptedLink::new();
        link.push_bytes(&encode_block(1, &[1; BLOCK_SIZE]))
            .push_bytes(&encode_block(2, &[2; BLOCK_SIZE]));
        let mut dest = vec![0_u8; BLOCK_SIZE + 10];
        assert!(matches!(
            receive(&mut link, &mut dest, &TransferConfig::default()),
            Err(TransferError::Overflow { capacity }) if capacity == BLOCK_SIZE + 10
        ));
        assert_eq!(link.written(), &[CRC_REQUEST, ACK, CAN, CAN]);
        assert!(dest[..BLOCK_SIZE].iter().all(|&b| b == 1));
    }

    #[test]
    fn test_padding_beyond_destination_is_dropped() {
        let mut link = ScriptedLink::new();
        link.push_bytes(&encode_block(1, &[0x55; BLOCK_SIZE]))
            .push_bytes(&encode_block(2, b"tail"))
            .push_bytes(&[EOT]);
        let mut dest = vec![0_u8; BLOCK_SIZE + 4];
        assert_eq!(
            receive(&mut link, &mut dest, &TransferConfig::default()).unwrap(),
            BLOCK_SIZE + 4
        );
        assert!(dest[..BLOCK_SIZE].iter().all(|&b| b == 0x55));
        assert_eq!(&dest[BLOCK_SIZE..], b"tail");
        assert_eq!(link.written(), &[CRC_REQUEST, ACK, ACK, ACK]);
    }

    #[test]
    fn test_data_beyond_destination_overflows() {
        let mut link = ScriptedLink::new();
        link.push_bytes(&encode_block(1, b"tail!"));
        let mut dest = vec![0_u8; 4];
        assert!(matches!(
            receive(&mut link, &mut dest, &TransferConfig::default()),
            Err(TransferError::Overflow { capacity: 4 })
        ));
        assert_eq!(link.written(), &[CRC_REQUEST, CAN, CAN]);
        assert_eq!(dest, [0, 0, 0, 0]);
    }

    #[test]
    fn test_store_block() {
        let mut dest = [0_u8; 6];
        assert_eq!(store_block(&mut dest, 0, &[1, 2, 3, 4]), Some(4));
        assert_eq!(store_block(&mut dest, 4, &[5, 6, PAD, PAD]), Some(2));
        assert_eq!(dest, [1, 2, 3, 4, 5, 6]);
        assert_eq!(store_block(&mut dest, 6, &[PAD, PAD]), Some(0));
        assert_eq!(store_block(&mut dest, 5, &[9, 9]), None);
        assert_eq!(dest[5], 6);
    }

    #[test]
    fn test_sender_cancel() {
        let mut link = ScriptedLink::new();
        link.push_bytes(&encode_block(1, &[])).push_bytes(&[CAN, CAN]);
        let mut dest = vec![0_u8; BLOCK_SIZE];
        assert!(matches!(
            receive(&mut link, &mut dest, &TransferConfig::default()),
            Err(TransferError::Cancelled)
        ));
    }

    #[test]
    fn test_retries_exhausted() {
        let config = TransferConfig {
            receive_max_retries: 3,
            ..TransferConfig::default()
        };
        let mut link = ScriptedLink::new();
        link.push_bytes(&encode_block(1, &[]));
        let mut dest = vec![0_u8; 2 * BLOCK_SIZE];
        assert!(matches!(
            receive(&mut link, &mut dest, &config),
            Err(TransferError::RetriesExhausted { block: 2 })
        ));
        assert_eq!(link.written(), &[CRC_REQUEST, ACK, NAK, NAK, NAK, CAN, CAN]);
    }
}
