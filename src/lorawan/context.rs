use super::duty_cycle::DutyCycleTracker;
use super::guard::{PendingTransaction, TransactionGuard, TransactionHandle};
use super::session::SessionStore;
use super::time::Instant;
use crate::radio::MacRadio;

/// Shared state a radio transaction touches, borrowed from the device for
/// the handling of one event or timer expiry
pub struct TxContext<'a, R, M> {
    /// Device time of the event or timer expiry being handled
    pub now: Instant,
    /// Regional parameters
    pub region: &'a R,
    /// Duty-cycle budgets
    pub tracker: &'a mut DutyCycleTracker,
    /// In-flight transaction guard
    pub guard: &'a mut TransactionGuard,
    /// Session store
    pub session: &'a mut SessionStore,
    /// Radio/MAC layer
    pub mac: &'a mut M,
}

impl<R, M: MacRadio> TxContext<'_, R, M> {
    /// Release the radio and charge the transmission's airtime to its
    /// sub-band
    ///
    /// Airtime is charged as ending now, which is never earlier than the
    /// real end of the transmission.
    pub fn finish(&mut self, handle: TransactionHandle) -> Option<PendingTransaction> {
        let pending = self.guard.complete(handle).ok()?;
        if let Err(unknown) =
            self.tracker
                .record_transmission(pending.sub_band, pending.airtime, self.now)
        {
            warn!("no budget for sub-band {}", unknown.0);
        }
        Some(pending)
    }
}
