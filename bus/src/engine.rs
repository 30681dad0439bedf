//! The bus cycle engine: watches the processor's control lines and
//! answers its memory and I/O cycles.
//!
//! Each bus cycle goes through these states:
//!
//! 1. wait (with a timeout) for ALE, and latch the address and the
//!    memory/IO indicator from the snapshot which showed it;
//! 2. wait (without a timeout) for ALE to drop;
//! 3. wait (with a timeout) for RD# or WR#.  For a read we drive the
//!    data lines until RD# rises; for a write we sample them once WR#
//!    rises.  If ALE rises instead, the processor has started a new
//!    cycle and we treat it as the next latch.
//!
//! A processor which has halted stops producing ALE, so the ALE
//! timeout is the normal way for a run to end.
use std::fmt::{self, Debug, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{event, span, Level};

use base::prelude::*;

use crate::bridge::{Mailbox, REQUEST_PORT, STATUS_PORT};
use crate::clock::Clock;
use crate::memory::{BackingStore, BadRamSize};
use crate::pins::{BusPins, MemIoPolarity, PinSnapshot, MEMIO_POLARITY};
use crate::ring::EventRing;


/// What an I/O read returns when nothing answers it; the data lines
/// are pulled up.
pub const FLOATING_BUS: u16 = 0xFFFF;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long to wait for ALE before deciding the processor has
    /// stopped.
    pub ale_timeout: Duration,
    /// How long to wait for RD# or WR# after the address phase.
    pub strobe_timeout: Duration,
    /// Delay between seeing RD# and driving the data lines.  Without
    /// it the processor may still be driving the address.
    pub settle_delay: Duration,
    /// How long RESET is held at the start of a run.
    pub reset_pulse: Duration,
    pub polarity: MemIoPolarity,
}

impl Default for EngineConfig {
    fn default() -> EngineConfig {
        EngineConfig {
            ale_timeout: Duration::from_millis(100),
            strobe_timeout: Duration::from_millis(100),
            settle_delay: Duration::from_micros(3),
            reset_pulse: Duration::from_millis(1),
            polarity: MEMIO_POLARITY,
        }
    }
}

/// The state which moves between the host and the engine: RAM and
/// the event log.
#[derive(Debug)]
pub struct Workspace {
    pub ram: BackingStore,
    pub log: EventRing,
}

impl Workspace {
    pub fn new(ram_size: usize, log_capacity: usize) -> Result<Workspace, BadRamSize> {
        Ok(Workspace {
            ram: BackingStore::new(ram_size)?,
            log: EventRing::new(log_capacity),
        })
    }
}

impl Default for Workspace {
    fn default() -> Workspace {
        Workspace {
            ram: BackingStore::default(),
            log: EventRing::default(),
        }
    }
}

enum CycleOutcome {
    Completed,
    /// ALE rose before any strobe; this snapshot latches the next
    /// cycle.
    Resync(PinSnapshot),
    NoStrobe,
}

/// Everything the engine needs to decide what to do with one cycle.
struct CycleContext<'a> {
    mode: RunMode,
    workspace: &'a mut Workspace,
    mailbox: Option<&'a Mailbox>,
}

impl CycleContext<'_> {
    fn bridge(&self) -> Option<&Mailbox> {
        match self.mode {
            RunMode::HidosVm => self.mailbox,
            _ => None,
        }
    }

    fn record(&mut self, event: BusEvent) {
        event!(Level::TRACE, "{event}");
        if self.mode.should_log(&event) {
            if let Err(e) = self.workspace.log.push(event) {
                // The run stops at the next cycle boundary.
                event!(Level::DEBUG, "{e}");
            }
        }
    }
}

pub struct BusEngine<P, C> {
    pins: P,
    clock: C,
    config: EngineConfig,
}

impl<P, C> Debug for BusEngine<P, C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_struct("BusEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<P: BusPins, C: Clock> BusEngine<P, C> {
    pub fn new(pins: P, clock: C, config: EngineConfig) -> BusEngine<P, C> {
        BusEngine {
            pins,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn pins(&self) -> &P {
        &self.pins
    }

    pub fn into_parts(self) -> (P, C) {
        (self.pins, self.clock)
    }

    fn pulse_reset(&mut self) {
        self.pins.set_reset(true);
        self.clock.consume(&self.config.reset_pulse);
        self.pins.set_reset(false);
    }

    fn await_ale(&mut self) -> Option<PinSnapshot> {
        let deadline = self.clock.now() + self.config.ale_timeout;
        loop {
            let snapshot = self.pins.sample();
            if snapshot.ale() {
                return Some(snapshot);
            }
            if self.clock.now() >= deadline {
                return None;
            }
        }
    }

    fn bus_cycle(&mut self, latch: PinSnapshot, ctx: &mut CycleContext<'_>) -> CycleOutcome {
        let address = latch.address();
        let is_io = latch.is_io(self.config.polarity);

        while self.pins.sample().ale() {}

        let deadline = self.clock.now() + self.config.strobe_timeout;
        loop {
            let strobe = self.pins.sample();
            if strobe.rd_asserted() {
                self.read_cycle(address, is_io, strobe, ctx);
                return CycleOutcome::Completed;
            }
            if strobe.wr_asserted() {
                self.write_cycle(address, is_io, strobe, ctx);
                return CycleOutcome::Completed;
            }
            if strobe.ale() {
                return CycleOutcome::Resync(strobe);
            }
            if self.clock.now() >= deadline {
                return CycleOutcome::NoStrobe;
            }
        }
    }

    fn read_cycle(
        &mut self,
        address: Address,
        is_io: bool,
        strobe: PinSnapshot,
        ctx: &mut CycleContext<'_>,
    ) {
        self.clock.consume(&self.config.settle_delay);
        let data = if is_io {
            match ctx.bridge() {
                Some(mailbox) if address == STATUS_PORT => mailbox.status(),
                _ => FLOATING_BUS,
            }
        } else {
            // The processor picks the byte lane(s) it wants.
            ctx.workspace.ram.read_word(address.word_aligned())
        };
        self.pins.drive(data);
        ctx.record(BusEvent::new(
            address,
            data,
            EventKind::for_cycle(is_io, false),
            strobe.bhe_asserted(),
        ));
        while self.pins.sample().rd_asserted() {}
        self.pins.release();
    }

    fn write_cycle(
        &mut self,
        address: Address,
        is_io: bool,
        strobe: PinSnapshot,
        ctx: &mut CycleContext<'_>,
    ) {
        let released = loop {
            let snapshot = self.pins.sample();
            if !snapshot.wr_asserted() {
                break snapshot;
            }
        };
        let data = released.data();
        let bhe = strobe.bhe_asserted();
        if is_io {
            if let Some(mailbox) = ctx.bridge() {
                if address == REQUEST_PORT {
                    mailbox.post(data);
                }
            }
        } else {
            ctx.workspace.ram.apply_bus_write(address, data, bhe);
        }
        ctx.record(BusEvent::new(
            address,
            data,
            EventKind::for_cycle(is_io, true),
            bhe,
        ));
    }

    /// Services bus cycles until one of the conditions in
    /// [`Termination`] occurs.  `mailbox` is only consulted in HIDOS
    /// mode; when given, it is told when the run is over.
    pub fn run(
        &mut self,
        request: &RunRequest,
        workspace: &mut Workspace,
        mailbox: Option<&Mailbox>,
        stop: &AtomicBool,
    ) -> RunResult {
        let span = span!(Level::INFO, "run", mode = %request.mode);
        let _enter = span.enter();
        let start = self.clock.now();
        event!(
            Level::INFO,
            "starting run, cycle limit {:?}",
            request.cycle_limit
        );

        let logging = request.mode.is_logging();
        if logging {
            workspace.log.clear();
        }
        self.pulse_reset();

        let mut ctx = CycleContext {
            mode: request.mode,
            workspace,
            mailbox,
        };
        let mut executed: u64 = 0;
        let mut pending: Option<PinSnapshot> = None;
        let termination = loop {
            if stop.load(Ordering::Acquire) {
                break Termination::StopRequested;
            }
            if request.cycle_limit.reached(executed) {
                break Termination::CycleLimit;
            }
            if logging && ctx.workspace.log.is_full() {
                break Termination::LogFull;
            }
            let latch = match pending.take() {
                Some(snapshot) => snapshot,
                None => match self.await_ale() {
                    Some(snapshot) => snapshot,
                    None => break Termination::NoLatch,
                },
            };
            match self.bus_cycle(latch, &mut ctx) {
                CycleOutcome::Completed => executed += 1,
                CycleOutcome::Resync(snapshot) => {
                    event!(
                        Level::DEBUG,
                        "ALE rose again before RD/WR (address {}), resynchronising",
                        latch.address()
                    );
                    pending = Some(snapshot);
                }
                CycleOutcome::NoStrobe => break Termination::NoStrobe,
            }
        };

        self.pins.set_reset(true);
        if let Some(mailbox) = mailbox {
            mailbox.finish();
        }
        let result = RunResult {
            bus_cycles_executed: executed,
            elapsed: self.clock.now().saturating_sub(start),
            termination,
        };
        event!(Level::INFO, "run ended: {result}");
        result
    }
}
