//! A transfer link over standard input and output, for running a
//! transfer through a serial terminal program or a pipe.
use std::io::{self, Read, Stdout, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use tracing::{event, Level};

use transfer::ByteLink;

pub struct StdioLink {
    incoming: Receiver<u8>,
    stdout: Stdout,
}

/// Starts a thread which reads standard input and hands each byte
/// over the returned channel, so that reads can time out.  The
/// channel disconnects when standard input is closed.
pub fn spawn_stdin_reader() -> io::Result<Receiver<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            let mut stdin = io::stdin().lock();
            let mut buf = [0_u8; 512];
            loop {
                match stdin.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        for &b in &buf[..n] {
                            if tx.send(b).is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => (),
                    Err(e) => {
                        event!(Level::WARN, "failed to read standard input: {e}");
                        break;
                    }
                }
            }
        })?;
    Ok(rx)
}

impl StdioLink {
    pub fn new() -> io::Result<StdioLink> {
        Ok(StdioLink {
            incoming: spawn_stdin_reader()?,
            stdout: io::stdout(),
        })
    }
}

impl ByteLink for StdioLink {
    fn read_byte(&mut self, timeout: Duration) -> io::Result<Option<u8>> {
        match self.incoming.recv_timeout(timeout) {
            Ok(b) => Ok(Some(b)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "standard input was closed",
            )),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut handle = self.stdout.lock();
        handle.write_all(bytes).and_then(|()| handle.flush())
    }
}
