use thiserror::Error;

/// Failures surfaced by the fallible operations.
///
/// Absent keys are reported as `None` by the lookup-shaped operations,
/// never as an error; [`Error::KeyNotFound`] only appears where an
/// operation needs an existing entry to act on.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("load factor must lie in (0.0, 1.0)")]
    InvalidLoadFactor,
    #[error("key size must be non-zero")]
    ZeroKeySize,
    #[error("value size must be non-zero")]
    ZeroValueSize,
    #[error("max_elems must be non-zero")]
    ZeroCapacity,
    #[error("requested capacity exceeds the addressable slot range")]
    CapacityOverflow,
    #[error("structure is full")]
    CapacityExhausted,
    #[error("timeout slot id is out of range")]
    InvalidTimeoutSlot,
    #[error("a timed table needs between 1 and 10 timeout slots")]
    InvalidTimeoutSlotCount,
    #[error("no entry for the given key")]
    KeyNotFound,
}
