//! Device time source which must be implemented by calling code.

use crate::lorawan::time::Instant;

/// Free-running device clock
///
/// Ticks at [`TICKS_PER_SECOND`](crate::lorawan::time::TICKS_PER_SECOND)
/// and wraps at `u32::MAX`.
pub trait Clock {
    /// Current device time
    fn now(&mut self) -> Instant;
}
