use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::io;

#[derive(Debug)]
pub enum TransferError {
    /// The other end never started the transfer (no `C` for a
    /// sender, no SOH for a receiver).
    NoHandshake,

    /// The other end sent CAN CAN.
    Cancelled,

    /// The sender had more data than the destination could hold.
    /// The sender was told with CAN CAN.
    Overflow { capacity: usize },

    /// Too many consecutive failures; the last block number involved
    /// is given.
    RetriesExhausted { block: u8 },

    /// All blocks were acknowledged but EOT never was.
    EotNotAcknowledged,

    /// The underlying byte link failed.
    Link(io::Error),
}

impl Display for TransferError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            TransferError::NoHandshake => f.write_str("no response from the other end"),
            TransferError::Cancelled => f.write_str("transfer cancelled by the other end"),
            TransferError::Overflow { capacity } => {
                write!(f, "incoming data exceeds the destination size of {capacity} bytes")
            }
            TransferError::RetriesExhausted { block } => {
                write!(f, "too many errors, gave up at block {block}")
            }
            TransferError::EotNotAcknowledged => {
                f.write_str("end of transmission was not acknowledged")
            }
            TransferError::Link(e) => write!(f, "link failure: {e}"),
        }
    }
}

impl Error for TransferError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TransferError::Link(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for TransferError {
    fn from(e: io::Error) -> TransferError {
        TransferError::Link(e)
    }
}
