//! The HIDOS guest's console, connected to the terminal.
use std::io::{self, Stdout, Write};
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::thread;
use std::time::Duration;

use tracing::{event, Level};

use bus::bridge::Console;

use crate::stdio_link::spawn_stdin_reader;

/// A console whose keyboard is a channel of bytes and whose screen
/// is any writer.
#[derive(Debug)]
pub struct StreamConsole<W> {
    incoming: Receiver<u8>,
    output: W,
    input_closed: bool,
}

impl<W: Write> StreamConsole<W> {
    pub fn new(incoming: Receiver<u8>, output: W) -> StreamConsole<W> {
        StreamConsole {
            incoming,
            output,
            input_closed: false,
        }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    fn note_closed(&mut self) {
        if !self.input_closed {
            event!(Level::INFO, "console input closed");
            self.input_closed = true;
        }
    }
}

impl StreamConsole<Stdout> {
    pub fn stdio() -> io::Result<StreamConsole<Stdout>> {
        Ok(StreamConsole::new(spawn_stdin_reader()?, io::stdout()))
    }
}

impl<W: Write> Console for StreamConsole<W> {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.output.write_all(bytes)?;
        self.output.flush()
    }

    fn poll(&mut self) -> Option<u8> {
        match self.incoming.try_recv() {
            Ok(b) => Some(b),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.note_closed();
                None
            }
        }
    }

    fn wait(&mut self, timeout: Duration) -> Option<u8> {
        if self.input_closed {
            // Nothing more will arrive; don't turn the wait into a
            // busy loop either.
            thread::sleep(timeout);
            return None;
        }
        match self.incoming.recv_timeout(timeout) {
            Ok(b) => Some(b),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                self.note_closed();
                None
            }
        }
    }
}
