//! Regulatory sub-band duty-cycle accounting
//!
//! Every completed transmission blocks its sub-band for `airtime * n` ticks
//! counted from the start of the transmission, where `1 / n` is the permitted
//! fraction of time on air. On top of that per-frame off time, each budget sums
//! the airtime spent inside a rolling averaging window and closes the sub-band
//! until the window ends once the window's share is used up.
//!
//! All accounting is in integer ticks.

use heapless::Vec;

use super::region::{SubBand, MAX_SUB_BANDS};
use super::time::{Instant, Ticks};

/// Regulatory averaging period
pub const AVERAGING_WINDOW: Ticks = Ticks::from_secs(3600);

/// Permitted share of time on air, expressed as "one in `n`"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DutyCycle(u16);

impl DutyCycle {
    /// No regulatory limit beyond the transmission itself
    pub const UNRESTRICTED: DutyCycle = DutyCycle(1);
    /// 10 %
    pub const PERCENT_10: DutyCycle = DutyCycle(10);
    /// 1 %
    pub const PERCENT_1: DutyCycle = DutyCycle(100);
    /// 0.1 %
    pub const PERMILLE_1: DutyCycle = DutyCycle(1000);

    /// Duty cycle of one in `n`; zero is treated as unrestricted
    pub const fn one_in(n: u16) -> DutyCycle {
        if n == 0 {
            Self::UNRESTRICTED
        } else {
            DutyCycle(n)
        }
    }

    /// Denominator of the permitted fraction
    pub const fn denominator(self) -> u16 {
        self.0
    }

    /// Time from transmission start until the sub-band may be used again
    pub fn off_time(self, airtime: Ticks) -> Ticks {
        airtime.saturating_mul(self.0 as u32)
    }

    /// Airtime allowed within one averaging window
    pub fn window_budget(self, window: Ticks) -> Ticks {
        window.divided_by(self.0 as u32)
    }
}

/// Transmit budget of one sub-band
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Budget {
    /// Sub-band this budget belongs to
    pub sub_band_id: u8,
    /// Permitted share of time on air
    pub duty_cycle: DutyCycle,
    /// Earliest start of the next transmission
    pub next_allowed_time: Instant,
    /// Start of the current averaging window
    pub window_start: Instant,
    /// Airtime spent since `window_start`
    pub accumulated_airtime: Ticks,
}

impl Budget {
    fn new(sub_band: &SubBand, now: Instant) -> Self {
        Self {
            sub_band_id: sub_band.id,
            duty_cycle: sub_band.duty_cycle,
            next_allowed_time: now,
            window_start: now,
            accumulated_airtime: Ticks::ZERO,
        }
    }

    fn roll_window(&mut self, now: Instant, window: Ticks) {
        if now.saturating_since(self.window_start) >= window {
            self.window_start = now;
            self.accumulated_airtime = Ticks::ZERO;
        }
    }
}

/// Sub-band not known to the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UnknownSubBand(pub u8);

/// Per sub-band duty-cycle tracker
#[derive(Debug)]
pub struct DutyCycleTracker {
    budgets: Vec<Budget, MAX_SUB_BANDS>,
    window: Ticks,
}

impl DutyCycleTracker {
    /// Create a tracker with every sub-band immediately available
    pub fn new(sub_bands: &[SubBand], now: Instant) -> Self {
        let mut tracker = Self {
            budgets: Vec::new(),
            window: AVERAGING_WINDOW,
        };
        tracker.reset(sub_bands, now);
        tracker
    }

    /// Use a different averaging window
    pub fn with_window(mut self, window: Ticks) -> Self {
        self.window = window;
        self
    }

    /// Discard all accounting and rebuild the budgets for a new channel plan
    pub fn reset(&mut self, sub_bands: &[SubBand], now: Instant) {
        self.budgets.clear();
        for sub_band in sub_bands.iter().take(MAX_SUB_BANDS) {
            // capacity is bounded by take()
            let _ = self.budgets.push(Budget::new(sub_band, now));
        }
    }

    /// Account for a completed transmission of `airtime` that ended at `now`
    pub fn record_transmission(
        &mut self,
        sub_band_id: u8,
        airtime: Ticks,
        now: Instant,
    ) -> Result<(), UnknownSubBand> {
        let window = self.window;
        let budget = self
            .budgets
            .iter_mut()
            .find(|b| b.sub_band_id == sub_band_id)
            .ok_or(UnknownSubBand(sub_band_id))?;

        let started = now - airtime;
        budget.roll_window(started, window);
        budget.accumulated_airtime = budget.accumulated_airtime.saturating_add(airtime);

        let mut next = started + budget.duty_cycle.off_time(airtime);
        if budget.accumulated_airtime >= budget.duty_cycle.window_budget(window)
            && budget.duty_cycle != DutyCycle::UNRESTRICTED
        {
            next = next.latest(budget.window_start + window);
        }
        budget.next_allowed_time = budget.next_allowed_time.latest(next);

        trace!(
            "sub-band {} airtime {} next allowed {}",
            sub_band_id,
            airtime.ticks(),
            budget.next_allowed_time.ticks()
        );
        Ok(())
    }

    /// Earliest time a transmission may start in `sub_band_id`
    pub fn earliest_send_time(&self, sub_band_id: u8) -> Option<Instant> {
        self.budget(sub_band_id).map(|b| b.next_allowed_time)
    }

    /// Among `candidates`, the sub-band that becomes available first
    pub fn earliest_available<I>(&self, candidates: I) -> Option<(u8, Instant)>
    where
        I: IntoIterator<Item = u8>,
    {
        candidates
            .into_iter()
            .filter_map(|id| self.earliest_send_time(id).map(|at| (id, at)))
            .fold(None, |best: Option<(u8, Instant)>, (id, at)| match best {
                Some((_, best_at)) if !at.is_before(best_at) => best,
                _ => Some((id, at)),
            })
    }

    /// Budget of one sub-band
    pub fn budget(&self, sub_band_id: u8) -> Option<&Budget> {
        self.budgets.iter().find(|b| b.sub_band_id == sub_band_id)
    }

    /// All budgets
    pub fn budgets(&self) -> &[Budget] {
        &self.budgets
    }

    /// Pull stale budgets forward to `now`
    ///
    /// A deadline left untouched for more than half the counter range would
    /// appear to lie in the future after the counter wraps. Calling this at
    /// least once per half range keeps every deadline within reach; moving a
    /// past deadline up to `now` never allows an earlier transmission.
    pub fn expire(&mut self, now: Instant) {
        let window = self.window;
        for budget in self.budgets.iter_mut() {
            if budget.next_allowed_time.is_before(now) {
                budget.next_allowed_time = now;
            }
            budget.roll_window(now, window);
        }
    }
}
