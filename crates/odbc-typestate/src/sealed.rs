//! Sealed trait pattern.
//!
//! State markers and host value types implement public traits that carry
//! [`private::Sealed`] as a supertrait. External code can use those traits
//! but cannot add implementations, which keeps the set of protocol states
//! and the host-type registry closed.

/// Not reachable from outside the crate.
pub(crate) mod private {
    /// Marker trait that seals the public traits.
    pub trait Sealed {}
}
