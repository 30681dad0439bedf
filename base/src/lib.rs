//! The `base` crate defines the things which are useful both in the
//! bus monitor itself and in host-side tools which talk to it.  A
//! tool which only decodes event logs received from the monitor
//! would depend on the base crate but would not need to depend on
//! the bus engine.

mod address;
mod error;
mod event;
mod request;

pub mod prelude;

pub use address::Address;
pub use error::{ConversionFailed, RecordError};
pub use event::{decode_log, BusEvent, EventKind, FLAG_BYTE_ENABLE, RECORD_SIZE};
pub use request::{CycleLimit, RunMode, RunRequest, RunResult, Termination, COM_PORT};

/// Builds an [`Address`] from a constant, failing at compile time
/// if it does not fit in 20 bits.
#[macro_export]
macro_rules! addr {
    ($n:expr) => {
        $crate::prelude::Address::new::<{ $n }>()
    };
}

#[test]
fn test_addr_macro() {
    use prelude::Address;
    let a: Address = addr!(0x2F8);
    let b: Address = Address::try_from(0x2F8_u32).expect("test data should be in range");
    assert_eq!(a, b);
}
