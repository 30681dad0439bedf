use tracing::{event, Level};

use super::config::TransferConfig;
use super::error::TransferError;
use super::frame::{encode_block, ACK, BLOCK_SIZE, CAN, CRC_REQUEST, EOT, NAK};
use super::link::{cancel_confirmed, send_cancel, ByteLink};
use super::session::{Role, TransferSession};

fn await_receiver<L: ByteLink + ?Sized>(
    link: &mut L,
    config: &TransferConfig,
) -> Result<(), TransferError> {
    for attempt in 1..=config.send_handshake_retries {
        match link.read_byte(config.send_handshake_timeout)? {
            Some(CRC_REQUEST) => return Ok(()),
            Some(CAN) => {
                if cancel_confirmed(link, config.byte_timeout)? {
                    return Err(TransferError::Cancelled);
                }
            }
            Some(other) => {
                event!(
                    Level::DEBUG,
                    "handshake attempt {attempt}: expected 'C', got {other:#04x}"
                );
            }
            None => {
                event!(Level::DEBUG, "handshake attempt {attempt}: receiver is silent");
            }
        }
    }
    event!(Level::WARN, "receiver never asked for data, cancelling");
    send_cancel(link)?;
    Err(TransferError::NoHandshake)
}

fn send_block<L: ByteLink + ?Sized>(
    link: &mut L,
    session: &mut TransferSession,
    chunk: &[u8],
    config: &TransferConfig,
) -> Result<(), TransferError> {
    let number = session.next_block();
    let frame = encode_block(number, chunk);
    loop {
        link.write_all(&frame)?;
        match link.read_byte(config.ack_timeout)? {
            Some(ACK) => {
                event!(Level::TRACE, "block {number} acknowledged");
                session.advance();
                return Ok(());
            }
            Some(CAN) if cancel_confirmed(link, config.byte_timeout)? => {
                event!(Level::WARN, "receiver cancelled the transfer at block {number}");
                return Err(TransferError::Cancelled);
            }
            Some(NAK) => {
                event!(Level::DEBUG, "block {number} was refused");
            }
            Some(other) => {
                event!(Level::DEBUG, "block {number}: unexpected reply {other:#04x}");
            }
            None => {
                event!(Level::DEBUG, "block {number}: no reply");
            }
        }
        if session.fail() {
            event!(
                Level::WARN,
                "{}: block {number} not acknowledged after {} attempts, cancelling",
                session.role(),
                session.retries()
            );
            send_cancel(link)?;
            return Err(TransferError::RetriesExhausted { block: number });
        }
    }
}

fn send_eot<L: ByteLink + ?Sized>(
    link: &mut L,
    config: &TransferConfig,
) -> Result<(), TransferError> {
    for attempt in 1..=config.eot_retries {
        link.write_all(&[EOT])?;
        match link.read_byte(config.eot_timeout)? {
            Some(ACK) => return Ok(()),
            Some(CAN) if cancel_confirmed(link, config.byte_timeout)? => {
                return Err(TransferError::Cancelled);
            }
            reply => {
                event!(Level::DEBUG, "EOT attempt {attempt}: reply {reply:?}");
            }
        }
    }
    Err(TransferError::EotNotAcknowledged)
}

/// Sends `src` to a receiver.  The final block is padded out with
/// 0x1A.
pub fn send<L: ByteLink + ?Sized>(
    link: &mut L,
    src: &[u8],
    config: &TransferConfig,
) -> Result<(), TransferError> {
    await_receiver(link, config)?;
    // The receiver repeats its 'C' until it hears from us, so there
    // may be several queued up.
    let stale = link.flush_input(config.flush_quiet)?;
    if stale > 0 {
        event!(Level::DEBUG, "discarded {stale} bytes after the handshake");
    }

    let mut session = TransferSession::new(Role::Sender, config.block_retries);
    for chunk in src.chunks(BLOCK_SIZE) {
        send_block(link, &mut session, chunk, config)?;
    }
    send_eot(link, config)?;
    event!(
        Level::INFO,
        "send complete, {} blocks ({} bytes)",
        session.blocks_done(),
        src.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::ScriptedLink;
    use crate::FRAME_LEN;

    /// A receiver that asks once and then goes quiet long enough for
    /// the purge to finish.
    fn ready_link() -> ScriptedLink {
        let mut link = ScriptedLink::new();
        link.push_bytes(&[CRC_REQUEST]).push_timeout();
        link
    }

    #[test]
    fn test_empty_payload_goes_straight_to_eot() {
        let mut link = ready_link();
        link.push_bytes(&[ACK]);
        send(&mut link, &[], &TransferConfig::default()).unwrap();
        assert_eq!(link.written(), &[EOT]);
    }

    #[test]
    fn test_stale_handshake_bytes_are_purged() {
        let mut link = ScriptedLink::new();
        link.push_bytes(&[CRC_REQUEST, CRC_REQUEST, CRC_REQUEST])
            .push_timeout()
            .push_bytes(&[ACK, ACK]);
        send(&mut link, b"x", &TransferConfig::default()).unwrap();
        let written = link.written();
        assert_eq!(written.len(), FRAME_LEN + 1);
        assert_eq!(written[FRAME_LEN], EOT);
    }

    #[test]
    fn test_nak_causes_resend() {
        let mut link = ready_link();
        link.push_bytes(&[NAK, ACK, ACK, ACK]);
        send(&mut link, &[7; 200], &TransferConfig::default()).unwrap();
        let written = link.written();
        assert_eq!(written.len(), 3 * FRAME_LEN + 1);
        assert_eq!(&written[..FRAME_LEN], &written[FRAME_LEN..2 * FRAME_LEN]);
        assert_eq!(written[2 * FRAME_LEN + 1], 2);
    }

    #[test]
    fn test_never_acknowledged() {
        let config = TransferConfig::default();
        let mut link = ready_link();
        assert!(matches!(
            send(&mut link, &[1; 10], &config),
            Err(TransferError::RetriesExhausted { block: 1 })
        ));
        let written = link.written();
        let frames = config.block_retries as usize * FRAME_LEN;
        assert_eq!(written.len(), frames + 2);
        assert_eq!(&written[frames..], &[CAN, CAN]);
    }

    #[test]
    fn test_no_receiver() {
        let mut link = ScriptedLink::new();
        assert!(matches!(
            send(&mut link, b"abc", &TransferConfig::default()),
            Err(TransferError::NoHandshake)
        ));
        assert_eq!(link.written(), &[CAN, CAN]);
    }

    #[test]
    fn test_receiver_cancels() {
        let mut link = ready_link();
        link.push_bytes(&[CAN, CAN]);
        assert!(matches!(
            send(&mut link, b"abc", &TransferConfig::default()),
            Err(TransferError::Cancelled)
        ));
    }

    #[test]
    fn test_eot_not_acknowledged() {
        let config = TransferConfig::default();
        let mut link = ready_link();
        link.push_bytes(&[ACK]);
        assert!(matches!(
            send(&mut link, b"abc", &config),
            Err(TransferError::EotNotAcknowledged)
        ));
        let eots = link.written().len() - FRAME_LEN;
        assert_eq!(eots, config.eot_retries as usize);
    }
}
