//! Device time
//!
//! The node keeps time as a free-running 32-bit tick counter. All comparisons
//! go through signed differences so the counter may wrap during long uptimes.

use core::fmt;
use core::ops::{Add, Sub};

/// Tick rate of the device clock
pub const TICKS_PER_SECOND: u32 = 62_500;

/// Length of one tick in microseconds
pub const MICROS_PER_TICK: u32 = 1_000_000 / TICKS_PER_SECOND;

/// Point in device time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Instant(u32);

/// Span of device time in ticks
///
/// Spans never exceed half of the counter range, otherwise two instants could
/// not be ordered unambiguously.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Ticks(u32);

impl Instant {
    /// Create an instant from a raw tick count
    pub const fn from_ticks(ticks: u32) -> Self {
        Self(ticks)
    }

    /// Raw tick count
    pub const fn ticks(self) -> u32 {
        self.0
    }

    fn offset(self, other: Instant) -> i32 {
        self.0.wrapping_sub(other.0) as i32
    }

    /// Is this instant strictly earlier than `other`?
    pub fn is_before(self, other: Instant) -> bool {
        self.offset(other) < 0
    }

    /// Has `deadline` been reached at this instant?
    pub fn has_reached(self, deadline: Instant) -> bool {
        self.offset(deadline) >= 0
    }

    /// The later of two instants
    pub fn latest(self, other: Instant) -> Instant {
        if self.is_before(other) {
            other
        } else {
            self
        }
    }

    /// The earlier of two instants
    pub fn earliest(self, other: Instant) -> Instant {
        if other.is_before(self) {
            other
        } else {
            self
        }
    }

    /// Time elapsed since `earlier`, zero if `earlier` is in the future
    pub fn saturating_since(self, earlier: Instant) -> Ticks {
        let offset = self.offset(earlier);
        if offset <= 0 {
            Ticks::ZERO
        } else {
            Ticks(offset as u32)
        }
    }
}

impl Add<Ticks> for Instant {
    type Output = Instant;

    fn add(self, rhs: Ticks) -> Instant {
        Instant(self.0.wrapping_add(rhs.0))
    }
}

impl Sub<Ticks> for Instant {
    type Output = Instant;

    fn sub(self, rhs: Ticks) -> Instant {
        Instant(self.0.wrapping_sub(rhs.0))
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let millis = (self.0 % TICKS_PER_SECOND) as u64 * 1000 / TICKS_PER_SECOND as u64;
        write!(f, "{}.{:03}", self.0 / TICKS_PER_SECOND, millis)
    }
}

impl Ticks {
    /// Empty span
    pub const ZERO: Ticks = Ticks(0);

    /// Longest representable span
    pub const MAX: Ticks = Ticks(i32::MAX as u32);

    const fn clamp(ticks: u64) -> Ticks {
        if ticks > Self::MAX.0 as u64 {
            Self::MAX
        } else {
            Ticks(ticks as u32)
        }
    }

    /// Span from a raw tick count
    pub const fn from_ticks(ticks: u32) -> Ticks {
        Self::clamp(ticks as u64)
    }

    /// Span from whole seconds
    pub const fn from_secs(secs: u32) -> Ticks {
        Self::clamp(secs as u64 * TICKS_PER_SECOND as u64)
    }

    /// Span from milliseconds
    pub const fn from_millis(millis: u32) -> Ticks {
        Self::clamp(millis as u64 * TICKS_PER_SECOND as u64 / 1000)
    }

    /// Span from microseconds, rounded up to the next tick
    pub const fn from_micros(micros: u64) -> Ticks {
        let per_tick = MICROS_PER_TICK as u64;
        Self::clamp((micros + per_tick - 1) / per_tick)
    }

    /// Raw tick count
    pub const fn ticks(self) -> u32 {
        self.0
    }

    /// Whole milliseconds in this span
    pub const fn as_millis(self) -> u32 {
        (self.0 as u64 * 1000 / TICKS_PER_SECOND as u64) as u32
    }

    /// Multiply, clamping at [`Ticks::MAX`]
    pub const fn saturating_mul(self, factor: u32) -> Ticks {
        Self::clamp(self.0 as u64 * factor as u64)
    }

    /// Add, clamping at [`Ticks::MAX`]
    pub const fn saturating_add(self, other: Ticks) -> Ticks {
        Self::clamp(self.0 as u64 + other.0 as u64)
    }

    /// Divide by an integer, rounding down; division by zero yields zero
    pub const fn divided_by(self, divisor: u32) -> Ticks {
        if divisor == 0 {
            Ticks::ZERO
        } else {
            Ticks(self.0 / divisor)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_survives_wraparound() {
        let before_wrap = Instant::from_ticks(u32::MAX - 10);
        let after_wrap = before_wrap + Ticks::from_ticks(20);

        assert_eq!(after_wrap.ticks(), 9);
        assert!(before_wrap.is_before(after_wrap));
        assert!(after_wrap.has_reached(before_wrap));
        assert_eq!(before_wrap.latest(after_wrap), after_wrap);
        assert_eq!(after_wrap.saturating_since(before_wrap).ticks(), 20);
        assert_eq!(before_wrap.saturating_since(after_wrap), Ticks::ZERO);
    }

    #[test]
    fn spans_are_clamped() {
        assert_eq!(Ticks::from_secs(u32::MAX), Ticks::MAX);
        assert_eq!(Ticks::from_secs(60).ticks(), 60 * TICKS_PER_SECOND);
        assert_eq!(Ticks::MAX.saturating_mul(2), Ticks::MAX);
        assert_eq!(Ticks::from_micros(17).ticks(), 2);
        assert_eq!(Ticks::from_millis(1500).as_millis(), 1500);
    }

    #[test]
    fn instant_display_uses_seconds() {
        let mut text: heapless::String<16> = heapless::String::new();
        core::fmt::write(&mut text, format_args!("{}", Instant::from_ticks(62_500 + 31_250)))
            .unwrap();
        assert_eq!(text.as_str(), "1.500");
    }
}
