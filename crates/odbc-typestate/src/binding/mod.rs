//! Buffer binding and marshaling.
//!
//! Typed host values are marshaled into untyped C buffers with the type,
//! size, precision and indicator metadata the driver needs, and decoded
//! back from driver-written bytes. Which pairings are allowed is decided by
//! [`registry`] before any native call.

mod descriptor;
mod indicator;
mod parameters;
pub mod registry;
mod values;

pub use descriptor::{ColumnDescriptor, Nullability, ParamDescriptor};
pub use indicator::Indicator;
pub(crate) use parameters::{ParameterBuffers, ParameterSlot};
pub use values::{FixedText, InputParameter, OutputValue};
