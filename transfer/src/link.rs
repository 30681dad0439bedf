//! The byte stream a transfer runs over.
//!
//! On the monitor this is the USB serial console; on the host it is
//! usually stdin/stdout.  Tests use [`ScriptedLink`] (a canned
//! sequence of incoming bytes and timeouts) or a pair of
//! [`MemoryLink`]s joined back to back.
use std::collections::{BTreeSet, VecDeque};
use std::io;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use super::frame::CAN;

pub trait ByteLink {
    /// Waits up to `timeout` for one byte.  `Ok(None)` means the wait
    /// timed out.
    fn read_byte(&mut self, timeout: Duration) -> io::Result<Option<u8>>;

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Discards incoming bytes until the line has been quiet for
    /// `quiet`.  Returns the number of bytes discarded.
    fn flush_input(&mut self, quiet: Duration) -> io::Result<usize> {
        let mut discarded = 0;
        while self.read_byte(quiet)?.is_some() {
            discarded += 1;
        }
        Ok(discarded)
    }
}

/// Aborts the transfer: CAN twice.
pub(crate) fn send_cancel<L: ByteLink + ?Sized>(link: &mut L) -> io::Result<()> {
    link.write_all(&[CAN, CAN])
}

/// Having just read one CAN, checks whether a second follows.  A
/// lone CAN is treated as line noise.
pub(crate) fn cancel_confirmed<L: ByteLink + ?Sized>(
    link: &mut L,
    timeout: Duration,
) -> io::Result<bool> {
    Ok(link.read_byte(timeout)? == Some(CAN))
}

/// A link whose incoming side is a fixed script.  Each `None` in the
/// script is delivered as one timeout; once the script is used up
/// every read times out.  Everything written is kept for inspection.
#[derive(Debug, Default)]
pub struct ScriptedLink {
    incoming: VecDeque<Option<u8>>,
    written: Vec<u8>,
}

impl ScriptedLink {
    pub fn new() -> ScriptedLink {
        ScriptedLink::default()
    }

    /// Queues bytes to be read.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> &mut ScriptedLink {
        self.incoming.extend(bytes.iter().copied().map(Some));
        self
    }

    /// Queues a single timeout.
    pub fn push_timeout(&mut self) -> &mut ScriptedLink {
        self.incoming.push_back(None);
        self
    }

    pub fn written(&self) -> &[u8] {
        &self.written
    }

    /// How much of the script has not been read yet.
    pub fn remaining(&self) -> usize {
        self.incoming.len()
    }
}

impl ByteLink for ScriptedLink {
    fn read_byte(&mut self, _timeout: Duration) -> io::Result<Option<u8>> {
        Ok(self.incoming.pop_front().flatten())
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.written.extend_from_slice(bytes);
        Ok(())
    }
}

/// One end of an in-memory full-duplex link.  Reads block on a
/// channel with a real timeout, so the two ends are normally used
/// from different threads.
#[derive(Debug)]
pub struct MemoryLink {
    rx: Receiver<u8>,
    tx: Sender<u8>,
    sent: usize,
    corrupt: BTreeSet<usize>,
    drop: BTreeSet<usize>,
}

impl MemoryLink {
    /// Creates two connected ends: what one writes the other reads.
    pub fn pair() -> (MemoryLink, MemoryLink) {
        let (a_tx, b_rx) = mpsc::channel();
        let (b_tx, a_rx) = mpsc::channel();
        (MemoryLink::new(a_rx, a_tx), MemoryLink::new(b_rx, b_tx))
    }

    fn new(rx: Receiver<u8>, tx: Sender<u8>) -> MemoryLink {
        MemoryLink {
            rx,
            tx,
            sent: 0,
            corrupt: BTreeSet::new(),
            drop: BTreeSet::new(),
        }
    }

    /// The outgoing byte with the given (zero-based) index will have
    /// all its bits flipped in transit.
    pub fn corrupt_outgoing(&mut self, index: usize) -> &mut MemoryLink {
        self.corrupt.insert(index);
        self
    }

    /// The outgoing byte with the given (zero-based) index will be
    /// lost in transit.
    pub fn drop_outgoing(&mut self, index: usize) -> &mut MemoryLink {
        self.drop.insert(index);
        self
    }

    /// Number of bytes written so far, including any lost ones.
    pub fn bytes_sent(&self) -> usize {
        self.sent
    }
}

fn disconnected() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "other end of the link has gone")
}

impl ByteLink for MemoryLink {
    fn read_byte(&mut self, timeout: Duration) -> io::Result<Option<u8>> {
        match self.rx.recv_timeout(timeout) {
            Ok(byte) => Ok(Some(byte)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(disconnected()),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        for &byte in bytes {
            let index = self.sent;
            self.sent += 1;
            if self.drop.contains(&index) {
                continue;
            }
            let byte = if self.corrupt.contains(&index) { !byte } else { byte };
            self.tx.send(byte).map_err(|_| disconnected())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHORT: Duration = Duration::from_millis(20);

    #[test]
    fn test_scripted_timeouts() {
        let mut link = ScriptedLink::new();
        link.push_bytes(b"ab").push_timeout().push_bytes(b"c");
        assert_eq!(link.read_byte(SHORT).unwrap(), Some(b'a'));
        assert_eq!(link.flush_input(SHORT).unwrap(), 1);
        assert_eq!(link.read_byte(SHORT).unwrap(), Some(b'c'));
        assert_eq!(link.read_byte(SHORT).unwrap(), None);
        assert_eq!(link.remaining(), 0);
    }

    #[test]
    fn test_memory_pair_faults() {
        let (mut a, mut b) = MemoryLink::pair();
        a.corrupt_outgoing(1).drop_outgoing(2);
        a.write_all(&[1, 2, 3, 4]).unwrap();
        assert_eq!(a.bytes_sent(), 4);
        assert_eq!(b.read_byte(SHORT).unwrap(), Some(1));
        assert_eq!(b.read_byte(SHORT).unwrap(), Some(!2));
        assert_eq!(b.read_byte(SHORT).unwrap(), Some(4));
        assert_eq!(b.read_byte(SHORT).unwrap(), None);
    }

    #[test]
    fn test_memory_pair_disconnect() {
        let (a, mut b) = MemoryLink::pair();
        drop(a);
        assert_eq!(
            b.read_byte(SHORT).unwrap_err().kind(),
            io::ErrorKind::BrokenPipe
        );
    }
}
