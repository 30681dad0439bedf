//! Device `CO`: the guest's console.
//!
//! Input is never waited for except by `RW`, which the guest issues
//! from its idle loop.  A byte seen by a poll is held until the guest
//! consumes it with `R1`.
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;
use std::time::Duration;

use base::prelude::*;

use super::{code, Device, DeviceError, RequestBlock, OFFSET_BUFFER};
use crate::memory::BackingStore;

const CMD_WRITE_ONE: u16 = code(b"W1");
const CMD_WRITE: u16 = code(b"WR");
const CMD_READ_POLL: u16 = code(b"RP");
const CMD_READ_ONE: u16 = code(b"R1");
const CMD_READ_WAIT: u16 = code(b"RW");

/// `RW` only actually waits after this many consecutive idle calls.
const IDLE_CALLS_BEFORE_WAIT: u32 = 16;
const WAIT_TIMEOUT: Duration = Duration::from_millis(10);

/// Marks a held byte as present (so that NUL can be held too).
const BYTE_PRESENT: u16 = 0x100;

/// The terminal the guest talks to.
pub trait Console {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// A byte of input, if one is available right now.
    fn poll(&mut self) -> Option<u8>;

    /// Waits up to `timeout` for a byte of input.
    fn wait(&mut self, timeout: Duration) -> Option<u8>;
}

#[derive(Debug, Default)]
struct Buffers {
    input: VecDeque<u8>,
    output: Vec<u8>,
}

/// A console backed by memory.  Clones share the same buffers, so a
/// test can keep one clone while the device owns another.
#[derive(Debug, Clone, Default)]
pub struct BufferConsole {
    buffers: Rc<RefCell<Buffers>>,
}

impl BufferConsole {
    pub fn new() -> BufferConsole {
        BufferConsole::default()
    }

    pub fn push_input(&self, bytes: &[u8]) {
        self.buffers.borrow_mut().input.extend(bytes);
    }

    pub fn output(&self) -> Vec<u8> {
        self.buffers.borrow().output.clone()
    }
}

impl Console for BufferConsole {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.buffers.borrow_mut().output.extend_from_slice(bytes);
        Ok(())
    }

    fn poll(&mut self) -> Option<u8> {
        self.buffers.borrow_mut().input.pop_front()
    }

    fn wait(&mut self, _timeout: Duration) -> Option<u8> {
        self.poll()
    }
}

#[derive(Debug)]
pub struct ConsoleDevice<K> {
    console: K,
    idle_calls: u32,
    held: u16,
}

impl<K: Console> ConsoleDevice<K> {
    pub fn new(console: K) -> ConsoleDevice<K> {
        ConsoleDevice {
            console,
            idle_calls: 0,
            held: 0,
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), DeviceError> {
        self.idle_calls = 0;
        self.console.write(bytes).map_err(DeviceError::Console)
    }
}

impl<K: Console> Device for ConsoleDevice<K> {
    fn name(&self) -> &'static str {
        "console"
    }

    fn handle(&mut self, ram: &BackingStore, request: &RequestBlock) -> Result<(), DeviceError> {
        if request.index != 0 {
            return Err(DeviceError::BadIndex(request.index));
        }
        match request.command {
            CMD_WRITE_ONE => {
                let byte = ram.read_byte(request.field(OFFSET_BUFFER));
                self.write(&[byte])
            }
            CMD_WRITE => {
                let size = request.size(ram);
                if size as usize > ram.size() {
                    return Err(DeviceError::BadSize(size));
                }
                let bytes = ram.read_range(Address::truncating(request.target(ram)), size as usize);
                self.write(&bytes)
            }
            CMD_READ_POLL | CMD_READ_ONE => {
                if self.held == 0 {
                    if let Some(byte) = self.console.poll() {
                        self.held = BYTE_PRESENT | u16::from(byte);
                    }
                }
                if self.held != 0 {
                    self.idle_calls = 0;
                }
                request.set_result(ram, self.held);
                if request.command == CMD_READ_ONE {
                    self.held = 0;
                }
                Ok(())
            }
            CMD_READ_WAIT => {
                if self.held != 0 {
                    self.idle_calls = 0;
                } else if self.idle_calls < IDLE_CALLS_BEFORE_WAIT {
                    self.idle_calls += 1;
                } else if let Some(byte) = self.console.wait(WAIT_TIMEOUT) {
                    self.held = BYTE_PRESENT | u16::from(byte);
                    self.idle_calls = 0;
                }
                Ok(())
            }
            other => Err(DeviceError::UnknownCommand(other)),
        }
    }
}
