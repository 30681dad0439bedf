//! A simulated processor which plays back a fixed list of bus cycles.
//!
//! Each call to [`BusPins::sample`] moves the simulated processor one
//! step through the current cycle:
//!
//! 1. ALE high with the address on the bus;
//! 2. ALE low, address still on the bus;
//! 3. RD# or WR# asserted (for a write, the data is on the bus);
//! 4. the strobe released.
//!
//! An [`CycleKind::AddressOnly`] cycle stops after step 2, which is
//! what the engine sees when the processor aborts a cycle.  Once the
//! script is exhausted the bus stays idle, so the engine's ALE timeout
//! ends the run.  Asserting RESET restarts the script.
use serde::{Deserialize, Serialize};

use base::prelude::*;

use crate::pins::{BusPins, MemIoPolarity, PinSnapshot, MEMIO_POLARITY};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CycleKind {
    MemRead,
    MemWrite,
    IoRead,
    IoWrite,
    /// ALE, but no strobe follows.
    AddressOnly,
}

impl CycleKind {
    fn is_io(&self) -> bool {
        matches!(self, CycleKind::IoRead | CycleKind::IoWrite)
    }

    fn is_write(&self) -> bool {
        matches!(self, CycleKind::MemWrite | CycleKind::IoWrite)
    }
}

/// One bus cycle in a stimulus script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScriptedCycle {
    pub kind: CycleKind,
    pub address: Address,
    /// The value written; ignored for reads.
    #[serde(default)]
    pub data: u16,
    /// Whether BHE# is asserted (low).
    #[serde(default)]
    pub bhe: bool,
}

impl ScriptedCycle {
    pub fn mem_read(address: Address, bhe: bool) -> ScriptedCycle {
        ScriptedCycle {
            kind: CycleKind::MemRead,
            address,
            data: 0,
            bhe,
        }
    }

    pub fn mem_write(address: Address, data: u16, bhe: bool) -> ScriptedCycle {
        ScriptedCycle {
            kind: CycleKind::MemWrite,
            address,
            data,
            bhe,
        }
    }

    pub fn io_read(port: Address) -> ScriptedCycle {
        ScriptedCycle {
            kind: CycleKind::IoRead,
            address: port,
            data: 0,
            bhe: false,
        }
    }

    pub fn io_write(port: Address, data: u16) -> ScriptedCycle {
        ScriptedCycle {
            kind: CycleKind::IoWrite,
            address: port,
            data,
            bhe: false,
        }
    }

    pub fn address_only(address: Address) -> ScriptedCycle {
        ScriptedCycle {
            kind: CycleKind::AddressOnly,
            address,
            data: 0,
            bhe: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Latch,
    AddressHold,
    Strobe,
    Release,
}

#[derive(Debug)]
pub struct ScriptedProcessor {
    script: Vec<ScriptedCycle>,
    polarity: MemIoPolarity,
    position: usize,
    phase: Phase,
    reset: bool,
    driven: Option<u16>,
    /// For each read cycle, what was on the data lines when the
    /// processor released RD#.
    observed: Vec<Option<u16>>,
    contention: u32,
}

impl ScriptedProcessor {
    pub fn new(script: Vec<ScriptedCycle>) -> ScriptedProcessor {
        ScriptedProcessor::with_polarity(script, MEMIO_POLARITY)
    }

    pub fn with_polarity(
        script: Vec<ScriptedCycle>,
        polarity: MemIoPolarity,
    ) -> ScriptedProcessor {
        ScriptedProcessor {
            script,
            polarity,
            position: 0,
            phase: Phase::Latch,
            reset: false,
            driven: None,
            observed: Vec::new(),
            contention: 0,
        }
    }

    /// The values read by the processor, one per completed read cycle
    /// (over all runs).  `None` means nothing was driving the bus.
    pub fn observed(&self) -> &[Option<u16>] {
        &self.observed
    }

    /// How many times the data lines were driven while the processor
    /// was itself driving them.
    pub fn contention(&self) -> u32 {
        self.contention
    }

    pub fn is_finished(&self) -> bool {
        self.position >= self.script.len()
    }

    pub fn in_reset(&self) -> bool {
        self.reset
    }

    fn idle(&self) -> PinSnapshot {
        PinSnapshot::idle(self.polarity).with_reset(self.reset)
    }

    fn next_cycle(&mut self) {
        self.position += 1;
        self.phase = Phase::Latch;
    }

    fn bus_data(&self) -> u16 {
        self.driven.unwrap_or(0xFFFF)
    }
}

impl BusPins for ScriptedProcessor {
    fn sample(&mut self) -> PinSnapshot {
        if self.reset {
            return self.idle();
        }
        let cycle = match self.script.get(self.position) {
            Some(cycle) => *cycle,
            None => return self.idle(),
        };
        let base = self
            .idle()
            .with_io(cycle.kind.is_io(), self.polarity)
            .with_bhe(cycle.bhe);
        match self.phase {
            Phase::Latch => {
                self.phase = Phase::AddressHold;
                base.with_address(cycle.address).with_ale(true)
            }
            Phase::AddressHold => {
                if cycle.kind == CycleKind::AddressOnly {
                    self.next_cycle();
                } else {
                    self.phase = Phase::Strobe;
                }
                base.with_address(cycle.address)
            }
            Phase::Strobe => {
                self.phase = Phase::Release;
                if cycle.kind.is_write() {
                    base.with_wr(true).with_data(cycle.data)
                } else {
                    base.with_rd(true).with_data(self.bus_data())
                }
            }
            Phase::Release => {
                self.next_cycle();
                if cycle.kind.is_write() {
                    base.with_data(cycle.data)
                } else {
                    self.observed.push(self.driven);
                    base.with_data(self.bus_data())
                }
            }
        }
    }

    fn drive(&mut self, data: u16) {
        let processor_driving = self
            .script
            .get(self.position)
            .is_some_and(|cycle| cycle.kind.is_write() && self.phase != Phase::Latch);
        if processor_driving {
            self.contention += 1;
        }
        self.driven = Some(data);
    }

    fn release(&mut self) {
        self.driven = None;
    }

    fn set_reset(&mut self, asserted: bool) {
        self.reset = asserted;
        if asserted {
            self.position = 0;
            self.phase = Phase::Latch;
            self.driven = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_cycle_phases() {
        let mut cpu = ScriptedProcessor::new(vec![ScriptedCycle::mem_read(addr!(0x12345), true)]);
        let latch = cpu.sample();
        assert!(latch.ale());
        assert_eq!(latch.address(), addr!(0x12345));
        assert!(!latch.is_io(MEMIO_POLARITY));
        assert!(latch.bhe_asserted());

        let hold = cpu.sample();
        assert!(!hold.ale());
        assert!(!hold.rd_asserted());

        assert!(cpu.sample().rd_asserted());
        cpu.drive(0xBEEF);
        let release = cpu.sample();
        assert!(!release.rd_asserted());
        cpu.release();
        assert_eq!(cpu.observed(), &[Some(0xBEEF)]);
        assert!(cpu.is_finished());
        assert_eq!(cpu.sample(), PinSnapshot::idle(MEMIO_POLARITY));
    }

    #[test]
    fn test_write_cycle_keeps_data_after_strobe() {
        let mut cpu = ScriptedProcessor::new(vec![ScriptedCycle::io_write(addr!(0x2F8), 0x41)]);
        assert!(cpu.sample().is_io(MEMIO_POLARITY));
        cpu.sample();
        let strobe = cpu.sample();
        assert!(strobe.wr_asserted());
        assert_eq!(strobe.data(), 0x41);
        let release = cpu.sample();
        assert!(!release.wr_asserted());
        assert_eq!(release.data(), 0x41);
        assert_eq!(cpu.contention(), 0);
    }

    #[test]
    fn test_contention_is_counted() {
        let mut cpu = ScriptedProcessor::new(vec![ScriptedCycle::mem_write(addr!(0x10), 1, true)]);
        cpu.sample();
        cpu.sample();
        cpu.sample();
        cpu.drive(0);
        assert_eq!(cpu.contention(), 1);
    }

    #[test]
    fn test_address_only_cycle() {
        let mut cpu = ScriptedProcessor::new(vec![
            ScriptedCycle::address_only(addr!(0x100)),
            ScriptedCycle::io_read(addr!(0x60)),
        ]);
        assert!(cpu.sample().ale());
        assert!(!cpu.sample().ale());
        let next = cpu.sample();
        assert!(next.ale());
        assert_eq!(next.address(), addr!(0x60));
    }

    #[test]
    fn test_reset_restarts_script() {
        let mut cpu = ScriptedProcessor::new(vec![ScriptedCycle::io_read(addr!(0x60))]);
        cpu.sample();
        cpu.set_reset(true);
        let held = cpu.sample();
        assert!(held.reset());
        assert!(!held.ale());
        cpu.set_reset(false);
        let latch = cpu.sample();
        assert!(latch.ale());
        assert_eq!(latch.address(), addr!(0x60));
    }

    #[test]
    fn test_polarity() {
        let mut cpu = ScriptedProcessor::with_polarity(
            vec![ScriptedCycle::io_read(addr!(0x60))],
            MemIoPolarity::HighMeansIo,
        );
        let latch = cpu.sample();
        assert!(latch.is_io(MemIoPolarity::HighMeansIo));
        assert!(!latch.is_io(MemIoPolarity::LowMeansIo));
    }
}
