//! Single in-flight radio transaction
//!
//! The radio is half-duplex: a join or uplink owns it from the moment it is
//! handed to the MAC until the MAC reports completion. `try_begin` is the only
//! way to claim the radio and fails while another transaction is open.

use super::time::{Instant, Ticks};

/// Kind of radio transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransactionKind {
    /// Join request and its receive windows
    Join,
    /// Data uplink and its receive windows
    Uplink,
}

/// The transaction currently holding the radio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PendingTransaction {
    /// What is in flight
    pub kind: TransactionKind,
    /// When it was handed to the MAC
    pub started_at: Instant,
    /// Sub-band it transmits in
    pub sub_band: u8,
    /// Expected time on air of the transmission
    pub airtime: Ticks,
    id: u32,
}

/// Proof of ownership of the radio, consumed by [`TransactionGuard::complete`]
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransactionHandle {
    id: u32,
    kind: TransactionKind,
}

impl TransactionHandle {
    /// Kind of the transaction this handle belongs to
    pub fn kind(&self) -> TransactionKind {
        self.kind
    }
}

/// A transaction is already in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Busy(pub TransactionKind);

/// The handle does not belong to the open transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StaleHandle;

/// Radio transaction guard
#[derive(Debug, Default)]
pub struct TransactionGuard {
    pending: Option<PendingTransaction>,
    next_id: u32,
}

impl TransactionGuard {
    /// Create a guard with the radio free
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the radio
    pub fn try_begin(
        &mut self,
        kind: TransactionKind,
        now: Instant,
        sub_band: u8,
        airtime: Ticks,
    ) -> Result<TransactionHandle, Busy> {
        if let Some(pending) = &self.pending {
            return Err(Busy(pending.kind));
        }

        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        self.pending = Some(PendingTransaction {
            kind,
            started_at: now,
            sub_band,
            airtime,
            id,
        });
        Ok(TransactionHandle { id, kind })
    }

    /// Release the radio, returning what was in flight
    pub fn complete(&mut self, handle: TransactionHandle) -> Result<PendingTransaction, StaleHandle> {
        match self.pending {
            Some(pending) if pending.id == handle.id => {
                self.pending = None;
                Ok(pending)
            }
            _ => Err(StaleHandle),
        }
    }

    /// Drop the open transaction without a completion, used by a MAC reset
    pub fn abort(&mut self) -> Option<PendingTransaction> {
        self.pending.take()
    }

    /// Is a transaction in flight?
    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    /// The transaction in flight
    pub fn pending(&self) -> Option<&PendingTransaction> {
        self.pending.as_ref()
    }
}
