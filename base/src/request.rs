//! Run requests and their results.
//!
//! A run request tells the bus engine how to log and when to stop.
//! Exactly one result is produced for each request.
use std::fmt::{self, Display, Formatter};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::address::Address;
use super::event::BusEvent;

/// The I/O port of the (virtual) second serial port, COM2.  In
/// `ComLog` mode only I/O cycles at this port are logged, which
/// isolates that device's traffic.
pub const COM_PORT: Address = Address::new::<0x2F8>();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunMode {
    /// Service the bus, log nothing.
    NoLog,
    /// Log every memory and I/O cycle.
    FullLog,
    /// Log I/O cycles only.
    IoLog,
    /// Log I/O cycles at [`COM_PORT`] only.
    ComLog,
    /// Service the bus with the HIDOS I/O bridge attached; nothing is
    /// logged.
    HidosVm,
}

impl RunMode {
    #[must_use]
    pub fn is_logging(&self) -> bool {
        matches!(self, RunMode::FullLog | RunMode::IoLog | RunMode::ComLog)
    }

    /// Decides whether a completed cycle belongs in the event log.
    #[must_use]
    pub fn should_log(&self, event: &BusEvent) -> bool {
        match self {
            RunMode::NoLog | RunMode::HidosVm => false,
            RunMode::FullLog => true,
            RunMode::IoLog => event.kind.is_io(),
            RunMode::ComLog => event.kind.is_io() && event.address == COM_PORT,
        }
    }
}

impl Display for RunMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.write_str(match self {
            RunMode::NoLog => "no log",
            RunMode::FullLog => "full log",
            RunMode::IoLog => "I/O log",
            RunMode::ComLog => "COM2 log",
            RunMode::HidosVm => "HIDOS",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CycleLimit {
    /// Run until stopped, until the processor stops producing bus
    /// cycles, or (when logging) until the log is full.
    Unbounded,
    Cycles(u64),
}

impl CycleLimit {
    #[must_use]
    pub fn reached(&self, executed: u64) -> bool {
        match self {
            CycleLimit::Unbounded => false,
            CycleLimit::Cycles(n) => executed >= *n,
        }
    }
}

impl From<Option<u64>> for CycleLimit {
    /// `None` (and, following the monitor's convention, zero) means
    /// unbounded.
    fn from(n: Option<u64>) -> CycleLimit {
        match n {
            None | Some(0) => CycleLimit::Unbounded,
            Some(n) => CycleLimit::Cycles(n),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunRequest {
    pub mode: RunMode,
    pub cycle_limit: CycleLimit,
}

impl RunRequest {
    #[must_use]
    pub fn new(mode: RunMode, cycle_limit: CycleLimit) -> RunRequest {
        RunRequest { mode, cycle_limit }
    }
}

/// Why a run ended.  None of these is a fault: a processor which has
/// halted simply stops producing bus cycles, and the timeouts are how
/// that is noticed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Termination {
    StopRequested,
    CycleLimit,
    LogFull,
    /// ALE was not seen within the latch timeout.
    NoLatch,
    /// Neither RD# nor WR# was seen within the strobe timeout.
    NoStrobe,
}

impl Display for Termination {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.write_str(match self {
            Termination::StopRequested => "stop requested",
            Termination::CycleLimit => "cycle limit reached",
            Termination::LogFull => "event log full",
            Termination::NoLatch => "bus timeout (no ALE)",
            Termination::NoStrobe => "bus timeout (no RD/WR)",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub bus_cycles_executed: u64,
    pub elapsed: Duration,
    pub termination: Termination,
}

impl Display for RunResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(
            f,
            "{} bus cycles executed in {} us ({})",
            self.bus_cycles_executed,
            self.elapsed.as_micros(),
            self.termination
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;

    fn ev(kind: EventKind, addr: u16) -> BusEvent {
        BusEvent::new(Address::from(addr), 0, kind, false)
    }

    #[test]
    fn test_io_log_filter() {
        assert!(!RunMode::IoLog.should_log(&ev(EventKind::MemRead, 0x2F8)));
        assert!(!RunMode::IoLog.should_log(&ev(EventKind::MemWrite, 0x2F8)));
        assert!(RunMode::IoLog.should_log(&ev(EventKind::IoRead, 0x60)));
        assert!(RunMode::IoLog.should_log(&ev(EventKind::IoWrite, 0x2F8)));
    }

    #[test]
    fn test_com_log_filter() {
        assert!(RunMode::ComLog.should_log(&ev(EventKind::IoWrite, 0x2F8)));
        assert!(RunMode::ComLog.should_log(&ev(EventKind::IoRead, 0x2F8)));
        assert!(!RunMode::ComLog.should_log(&ev(EventKind::IoWrite, 0x2F9)));
        assert!(!RunMode::ComLog.should_log(&ev(EventKind::MemWrite, 0x2F8)));
    }

    #[test]
    fn test_non_logging_modes() {
        for mode in [RunMode::NoLog, RunMode::HidosVm] {
            assert!(!mode.is_logging());
            assert!(!mode.should_log(&ev(EventKind::IoWrite, 0x2F8)));
        }
        assert!(RunMode::FullLog.should_log(&ev(EventKind::MemRead, 0)));
    }

    #[test]
    fn test_cycle_limit() {
        assert!(!CycleLimit::Unbounded.reached(u64::MAX));
        assert!(!CycleLimit::Cycles(3).reached(2));
        assert!(CycleLimit::Cycles(3).reached(3));
        assert_eq!(CycleLimit::from(Some(0)), CycleLimit::Unbounded);
        assert_eq!(CycleLimit::from(Some(5)), CycleLimit::Cycles(5));
    }
}
