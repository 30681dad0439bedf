//! The bus monitor: it plays the part of RAM and I/O devices for a
//! V30 (or 8086) processor by watching and driving its bus pins.
//!
//! The pieces are:
//!
//! - [`engine`]: the bus cycle engine, which answers the processor's
//!   memory and I/O cycles and optionally logs them;
//! - [`session`]: runs the engine on its own thread and hands RAM
//!   and the event log back and forth;
//! - [`bridge`]: the HIDOS I/O bridge through which a guest BIOS asks
//!   the host to do its disk and console I/O;
//! - [`sim`]: a scripted processor, for driving the engine without
//!   hardware.

pub mod bridge;
pub mod clockgen;
pub mod engine;
pub mod memory;
pub mod pins;
pub mod ring;
pub mod session;
pub mod sim;

mod clock;

pub use clock::{BasicClock, Clock, SteppingClock};
pub use engine::{BusEngine, EngineConfig, Workspace, FLOATING_BUS};
pub use memory::{BackingStore, BadRamSize, ImageTooLarge, DEFAULT_RAM_SIZE};
pub use ring::{EventRing, LogFull, DEFAULT_LOG_CAPACITY};
pub use session::{Session, SessionError, StopHandle};
