//! Device `IN`: answers the BIOS's questions about the machine while
//! it boots.
use super::{code, Device, DeviceError, RequestBlock};
use crate::memory::BackingStore;

const CMD_DISKS: u16 = code(b"DI");
const CMD_RAM_SIZE: u16 = code(b"RA");
const CMD_DOS_SEGMENT: u16 = code(b"DO");

/// MSDOS.SYS is loaded at a fixed physical address.
const DOS_LOAD_ADDRESS: u32 = 0x18000;

#[derive(Debug)]
pub struct InitDevice {
    ram_size: usize,
}

impl InitDevice {
    pub fn new(ram_size: usize) -> InitDevice {
        InitDevice { ram_size }
    }
}

impl Device for InitDevice {
    fn name(&self) -> &'static str {
        "init"
    }

    fn handle(&mut self, ram: &BackingStore, request: &RequestBlock) -> Result<(), DeviceError> {
        if request.index != 0 {
            return Err(DeviceError::BadIndex(request.index));
        }
        match request.command {
            CMD_DISKS => request.set_result(ram, 1),
            CMD_RAM_SIZE => {
                // The top paragraph is not reported as usable.
                let usable = u32::try_from(self.ram_size)
                    .unwrap_or(u32::MAX)
                    .saturating_sub(0xF);
                request.set_result32(ram, usable);
            }
            CMD_DOS_SEGMENT => request.set_result(ram, (DOS_LOAD_ADDRESS >> 4) as u16),
            other => return Err(DeviceError::UnknownCommand(other)),
        }
        Ok(())
    }
}
