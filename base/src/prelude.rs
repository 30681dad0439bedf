//! The prelude exports the types which describe bus cycles, their
//! log records and run requests.  Providing this prelude is the main
//! purpose of the base crate.
pub use super::addr;
pub use super::address::Address;
pub use super::error::{ConversionFailed, RecordError};
pub use super::event::*;
pub use super::request::*;
