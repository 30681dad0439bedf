//! Devices which are present but never have anything to say
//! (auxiliary port, printer).
use super::{code, Device, DeviceError, RequestBlock};
use crate::memory::BackingStore;

const CMD_READ_POLL: u16 = code(b"RP");

#[derive(Debug)]
pub struct NullDevice {
    name: &'static str,
}

impl NullDevice {
    pub fn new(name: &'static str) -> NullDevice {
        NullDevice { name }
    }
}

impl Device for NullDevice {
    fn name(&self) -> &'static str {
        self.name
    }

    fn handle(&mut self, ram: &BackingStore, request: &RequestBlock) -> Result<(), DeviceError> {
        if request.index != 0 {
            return Err(DeviceError::BadIndex(request.index));
        }
        if request.command == CMD_READ_POLL {
            // No data (or, for the printer, not ready).
            request.set_result(ram, 0);
        }
        Ok(())
    }
}
