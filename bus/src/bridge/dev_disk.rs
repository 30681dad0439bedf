//! Device `DI`: a single read-only disk backed by an in-memory image.
use tracing::{event, Level};

use base::prelude::*;

use super::{code, Device, DeviceError, RequestBlock};
use crate::memory::BackingStore;

const CMD_READ: u16 = code(b"RD");
const CMD_WRITE: u16 = code(b"WR");
const CMD_MEDIA_CHANGE: u16 = code(b"CH");

const FAILED: u16 = 0;
const SUCCEEDED: u16 = 1;

#[derive(Debug)]
pub struct DiskDevice {
    image: Vec<u8>,
}

impl DiskDevice {
    pub fn new(image: Vec<u8>) -> DiskDevice {
        DiskDevice { image }
    }

    /// Copies part of the image into guest memory.  Returns false
    /// (and copies nothing) if the request reaches outside the image
    /// or is bigger than RAM.
    fn read(&self, ram: &BackingStore, offset: u32, target: u32, size: u32) -> bool {
        let start = offset as usize;
        let len = size as usize;
        let Some(end) = start.checked_add(len) else {
            return false;
        };
        match self.image.get(start..end) {
            Some(sectors) if len <= ram.size() => {
                ram.write_range(Address::truncating(target), sectors);
                true
            }
            _ => false,
        }
    }
}

impl Device for DiskDevice {
    fn name(&self) -> &'static str {
        "disk"
    }

    fn handle(&mut self, ram: &BackingStore, request: &RequestBlock) -> Result<(), DeviceError> {
        if request.index != 0 {
            // There is only one drive; the others report failure.
            request.set_result(ram, FAILED);
            return Ok(());
        }
        match request.command {
            CMD_READ => {
                let offset = request.buffer(ram);
                let target = request.target(ram);
                let size = request.size(ram);
                event!(
                    Level::DEBUG,
                    "disk read: {size} bytes from image offset {offset:#x} to {target:#07x}"
                );
                if self.read(ram, offset, target, size) {
                    request.set_result(ram, SUCCEEDED);
                } else {
                    event!(
                        Level::WARN,
                        "disk read of {size} bytes at {offset:#x} is beyond the {} byte image",
                        self.image.len()
                    );
                    request.set_result(ram, FAILED);
                }
            }
            CMD_WRITE => {
                event!(Level::DEBUG, "refusing write to read-only disk");
                request.set_result(ram, FAILED);
            }
            CMD_MEDIA_CHANGE => request.set_result(ram, SUCCEEDED),
            other => return Err(DeviceError::UnknownCommand(other)),
        }
        Ok(())
    }
}
