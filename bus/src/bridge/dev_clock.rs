//! Device `CL`: the real-time clock.  There is no battery-backed
//! clock, so the date starts at 1980-01-01 00:00 when the dispatcher
//! starts and advances from there.
use std::time::Duration;

use base::prelude::*;

use super::{code, Device, DeviceError, RequestBlock};
use crate::clock::Clock;
use crate::memory::BackingStore;

const CMD_READ: u16 = code(b"RD");
const CMD_WRITE: u16 = code(b"WR");

/// The guest asks for three 32-bit values.
const READING_SIZE: u32 = 12;

/// 1980-01-01 counted in days from 1970-01-01.
pub const EPOCH_1980_DAYS: u32 = 3652;

const SECONDS_PER_DAY: u64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarReading {
    /// Days since 1970-01-01.
    pub days: u32,
    pub seconds_of_day: u32,
    pub micros: u32,
}

pub fn calendar_reading(elapsed: Duration) -> CalendarReading {
    let seconds = elapsed.as_secs();
    let whole_days = u32::try_from(seconds / SECONDS_PER_DAY).unwrap_or(u32::MAX);
    CalendarReading {
        days: EPOCH_1980_DAYS.saturating_add(whole_days),
        seconds_of_day: (seconds % SECONDS_PER_DAY) as u32,
        micros: elapsed.subsec_micros(),
    }
}

#[derive(Debug)]
pub struct ClockDevice<C> {
    clock: C,
}

impl<C: Clock> ClockDevice<C> {
    pub fn new(clock: C) -> ClockDevice<C> {
        ClockDevice { clock }
    }
}

impl<C: Clock> Device for ClockDevice<C> {
    fn name(&self) -> &'static str {
        "clock"
    }

    fn handle(&mut self, ram: &BackingStore, request: &RequestBlock) -> Result<(), DeviceError> {
        if request.index != 0 {
            return Err(DeviceError::BadIndex(request.index));
        }
        let size = request.size(ram);
        if size != READING_SIZE {
            return Err(DeviceError::BadSize(size));
        }
        match request.command {
            CMD_READ => {
                let reading = calendar_reading(self.clock.now());
                let target = Address::truncating(request.target(ram));
                ram.write_u32(target, reading.days);
                ram.write_u32(target.wrapping_add(4), reading.seconds_of_day);
                ram.write_u32(target.wrapping_add(8), reading.micros);
                Ok(())
            }
            // Setting the clock is accepted but has no effect.
            CMD_WRITE => Ok(()),
            other => Err(DeviceError::UnknownCommand(other)),
        }
    }
}

#[test]
fn test_calendar_reading() {
    assert_eq!(
        calendar_reading(Duration::ZERO),
        CalendarReading {
            days: 3652,
            seconds_of_day: 0,
            micros: 0
        }
    );
    let elapsed = Duration::from_secs(2 * 86_400 + 3_661) + Duration::from_micros(250_001);
    assert_eq!(
        calendar_reading(elapsed),
        CalendarReading {
            days: 3654,
            seconds_of_day: 3_661,
            micros: 250_001
        }
    );
}
