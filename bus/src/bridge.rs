//! The HIDOS I/O bridge.
//!
//! HIDOS is a DOS-compatible guest whose BIOS does no device I/O of
//! its own.  Instead it fills in a request block in memory and hands
//! the block's paragraph number to the host by writing it to I/O port
//! 0x86.  It then polls port 0x88 until that reads zero, at which
//! point the results are in the request block.
//!
//! ## Request block
//!
//! | Offset | Size | Field                                         |
//! | ------ | ---- | --------------------------------------------- |
//! | 0      | 2    | device code, two ASCII letters (high, low)    |
//! | 2      | 2    | sub-index (drive number etc.)                 |
//! | 4      | 2    | command, two ASCII letters                    |
//! | 6      | 4    | buffer argument, also where results go        |
//! | 10     | 4    | target address                                |
//! | 14     | 4    | size                                          |
//!
//! The bus engine owns the two ports (see [`Mailbox`]); the
//! [`Dispatcher`] runs on the control thread and carries out the
//! requests.  Only one request can be outstanding.
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{self, Debug, Display, Formatter};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::thread;

use tracing::{event, span, Level};

use base::prelude::*;

use crate::clock::Clock;
use crate::memory::BackingStore;

mod dev_clock;
mod dev_console;
mod dev_disk;
mod dev_init;
mod dev_stub;

#[cfg(test)]
mod tests;

pub use dev_clock::{calendar_reading, CalendarReading, ClockDevice};
pub use dev_console::{BufferConsole, Console, ConsoleDevice};
pub use dev_disk::DiskDevice;
pub use dev_init::InitDevice;
pub use dev_stub::NullDevice;

/// Writing a paragraph number here submits a request.
pub const REQUEST_PORT: Address = addr!(0x86);

/// Reads 1 while a request is being serviced, else 0.
pub const STATUS_PORT: Address = addr!(0x88);

/// Packs a two-letter code the way the guest stores it.
pub const fn code(name: &[u8; 2]) -> u16 {
    ((name[0] as u16) << 8) | name[1] as u16
}

pub const DEV_INIT: u16 = code(b"IN");
pub const DEV_DISK: u16 = code(b"DI");
pub const DEV_CONSOLE: u16 = code(b"CO");
pub const DEV_AUX: u16 = code(b"AU");
pub const DEV_CLOCK: u16 = code(b"CL");
pub const DEV_PRINTER: u16 = code(b"PR");

/// Shows a code as its two letters, if it is printable.
pub fn code_name(value: u16) -> String {
    let [high, low] = value.to_be_bytes();
    if high.is_ascii_graphic() && low.is_ascii_graphic() {
        format!("{}{}", char::from(high), char::from(low))
    } else {
        format!("{value:#06x}")
    }
}

/// The single-request hand-off between the bus engine (which sees the
/// port accesses) and the dispatcher.
#[derive(Debug, Default)]
pub struct Mailbox {
    value: AtomicU16,
    pending: AtomicBool,
    finished: AtomicBool,
}

impl Mailbox {
    pub fn new() -> Mailbox {
        Mailbox::default()
    }

    /// A write to [`REQUEST_PORT`].  The release store publishes the
    /// guest's request block along with the value.
    pub fn post(&self, value: u16) {
        self.value.store(value, Ordering::Relaxed);
        self.pending.store(true, Ordering::Release);
    }

    /// The value read from [`STATUS_PORT`].
    pub fn status(&self) -> u16 {
        u16::from(self.pending.load(Ordering::Acquire))
    }

    /// The posted value, if a request is waiting.
    pub fn take(&self) -> Option<u16> {
        if self.pending.load(Ordering::Acquire) {
            Some(self.value.load(Ordering::Relaxed))
        } else {
            None
        }
    }

    /// Called by the dispatcher once the results are in memory.
    pub fn complete(&self) {
        self.pending.store(false, Ordering::Release);
    }

    /// Called by the engine when the run ends.
    pub fn finish(&self) {
        self.finished.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

pub const OFFSET_DEVICE: u32 = 0;
pub const OFFSET_INDEX: u32 = 2;
pub const OFFSET_COMMAND: u32 = 4;
pub const OFFSET_BUFFER: u32 = 6;
pub const OFFSET_TARGET: u32 = 10;
pub const OFFSET_SIZE: u32 = 14;

/// A request block in guest memory.  The first three fields are read
/// when the request arrives; the rest are read by the device handler
/// as it needs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestBlock {
    origin: Address,
    pub device: u16,
    pub index: u16,
    pub command: u16,
}

impl RequestBlock {
    /// The block's address: the posted value is a paragraph number.
    pub fn locate(paragraph: u16) -> Address {
        Address::truncating(u32::from(paragraph) << 4)
    }

    pub fn read(ram: &BackingStore, paragraph: u16) -> RequestBlock {
        let origin = RequestBlock::locate(paragraph);
        RequestBlock {
            origin,
            device: ram.read_word(origin.wrapping_add(OFFSET_DEVICE)),
            index: ram.read_word(origin.wrapping_add(OFFSET_INDEX)),
            command: ram.read_word(origin.wrapping_add(OFFSET_COMMAND)),
        }
    }

    pub fn origin(&self) -> Address {
        self.origin
    }

    pub fn field(&self, offset: u32) -> Address {
        self.origin.wrapping_add(offset)
    }

    pub fn buffer(&self, ram: &BackingStore) -> u32 {
        ram.read_u32(self.field(OFFSET_BUFFER))
    }

    pub fn target(&self, ram: &BackingStore) -> u32 {
        ram.read_u32(self.field(OFFSET_TARGET))
    }

    pub fn size(&self, ram: &BackingStore) -> u32 {
        ram.read_u32(self.field(OFFSET_SIZE))
    }

    /// Stores a 16-bit result in the buffer field.
    pub fn set_result(&self, ram: &BackingStore, value: u16) {
        ram.write_word(self.field(OFFSET_BUFFER), value);
    }

    pub fn set_result32(&self, ram: &BackingStore, value: u32) {
        ram.write_u32(self.field(OFFSET_BUFFER), value);
    }
}

#[derive(Debug)]
pub enum DeviceError {
    UnknownDevice(u16),
    UnknownCommand(u16),
    BadIndex(u16),
    BadSize(u32),
    Console(io::Error),
}

impl Display for DeviceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            DeviceError::UnknownDevice(dev) => write!(f, "unknown device {}", code_name(*dev)),
            DeviceError::UnknownCommand(cmd) => write!(f, "unknown command {}", code_name(*cmd)),
            DeviceError::BadIndex(idx) => write!(f, "sub-index {idx} is not supported"),
            DeviceError::BadSize(size) => write!(f, "size {size} is not valid for this command"),
            DeviceError::Console(e) => write!(f, "console I/O failed: {e}"),
        }
    }
}

impl Error for DeviceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DeviceError::Console(e) => Some(e),
            _ => None,
        }
    }
}

pub trait Device {
    fn name(&self) -> &'static str;

    /// Carries out `request`, leaving any results in guest memory.
    fn handle(&mut self, ram: &BackingStore, request: &RequestBlock) -> Result<(), DeviceError>;
}

/// The devices the guest can address, by device code.
pub struct DeviceManager {
    devices: BTreeMap<u16, Box<dyn Device>>,
}

impl Debug for DeviceManager {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        let mut list = f.debug_map();
        for (code, device) in self.devices.iter() {
            list.entry(&code_name(*code), &device.name());
        }
        list.finish()
    }
}

impl Default for DeviceManager {
    fn default() -> Self {
        DeviceManager::new()
    }
}

impl DeviceManager {
    pub fn new() -> DeviceManager {
        DeviceManager {
            devices: BTreeMap::new(),
        }
    }

    pub fn attach(&mut self, device_code: u16, device: Box<dyn Device>) {
        event!(
            Level::DEBUG,
            "attaching {} as device {}",
            device.name(),
            code_name(device_code)
        );
        self.devices.insert(device_code, device);
    }

    pub fn dispatch(
        &mut self,
        ram: &BackingStore,
        request: &RequestBlock,
    ) -> Result<(), DeviceError> {
        match self.devices.get_mut(&request.device) {
            Some(device) => device.handle(ram, request),
            None => Err(DeviceError::UnknownDevice(request.device)),
        }
    }
}

/// Attaches the standard set of devices.
pub fn set_up_devices<K, C>(
    devices: &mut DeviceManager,
    ram_size: usize,
    disk_image: Vec<u8>,
    console: K,
    clock: C,
) where
    K: Console + 'static,
    C: Clock + 'static,
{
    devices.attach(DEV_INIT, Box::new(InitDevice::new(ram_size)));
    devices.attach(DEV_DISK, Box::new(DiskDevice::new(disk_image)));
    devices.attach(DEV_CONSOLE, Box::new(ConsoleDevice::new(console)));
    devices.attach(DEV_AUX, Box::new(NullDevice::new("auxiliary")));
    devices.attach(DEV_CLOCK, Box::new(ClockDevice::new(clock)));
    devices.attach(DEV_PRINTER, Box::new(NullDevice::new("printer")));
}

/// Spins this many times waiting for a request before starting to
/// yield the CPU.
const SPINS_BEFORE_YIELD: u32 = 1000;

/// Carries out the requests posted to a [`Mailbox`].
#[derive(Debug)]
pub struct Dispatcher {
    devices: DeviceManager,
    ram: BackingStore,
    log_level: u8,
    served: u64,
}

impl Dispatcher {
    /// `log_level` 0 reports every request at INFO; anything higher
    /// reports them at DEBUG only.
    pub fn new(devices: DeviceManager, ram: BackingStore, log_level: u8) -> Dispatcher {
        Dispatcher {
            devices,
            ram,
            log_level,
            served: 0,
        }
    }

    pub fn requests_served(&self) -> u64 {
        self.served
    }

    /// Handles the request whose block is at paragraph `paragraph`.
    /// Failures are logged; the guest sees whatever the device left
    /// in the block.
    pub fn handle(&mut self, paragraph: u16) {
        let request = RequestBlock::read(&self.ram, paragraph);
        let span = span!(
            Level::ERROR,
            "hidos",
            dev = %code_name(request.device),
            cmd = %code_name(request.command)
        );
        let _enter = span.enter();
        if self.log_level == 0 {
            event!(
                Level::INFO,
                "request at {} index {}",
                request.origin(),
                request.index
            );
        } else {
            event!(
                Level::DEBUG,
                "request at {} index {}",
                request.origin(),
                request.index
            );
        }
        self.served += 1;
        if let Err(e) = self.devices.dispatch(&self.ram, &request) {
            event!(
                Level::WARN,
                "request failed: {e} (device {:#06x}, index {}, command {:#06x})",
                request.device,
                request.index,
                request.command
            );
        }
    }

    /// Serves requests until the engine reports the end of the run.
    /// Returns the number of requests served.
    pub fn serve(&mut self, mailbox: &Mailbox) -> u64 {
        let mut idle: u32 = 0;
        loop {
            // Read this before looking for a request, so that a
            // request posted just before the run ended is not missed.
            let finished = mailbox.is_finished();
            if let Some(paragraph) = mailbox.take() {
                self.handle(paragraph);
                mailbox.complete();
                idle = 0;
                continue;
            }
            if finished {
                return self.served;
            }
            if idle < SPINS_BEFORE_YIELD {
                idle += 1;
                std::hint::spin_loop();
            } else {
                thread::yield_now();
            }
        }
    }
}
