//! Uplink scheduling
//!
//! The scheduler keeps at most one pending payload: a newer request replaces
//! an older one that has not gone out yet. It sends on a fixed interval and
//! leaves throttling to the duty-cycle tracker.

use core::fmt;

use heapless::Vec;

use super::context::TxContext;
use super::guard::{PendingTransaction, TransactionHandle, TransactionKind};
use super::job::{JobAction, ScheduledJob};
use super::phy;
use super::region::Region;
use super::session::SessionError;
use super::time::{Instant, Ticks};
use crate::radio::{MacRadio, UplinkRequest};

/// Largest application payload of any supported region and data rate
pub const MAX_PAYLOAD_SIZE: usize = 242;

/// Application payload
pub type Payload = Vec<u8, MAX_PAYLOAD_SIZE>;

/// Payload longer than the current data rate allows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PayloadTooLarge {
    /// Payload length
    pub len: usize,
    /// Largest length accepted
    pub max: usize,
}

/// Reasons a timer-driven uplink did not go out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UplinkError {
    /// No payload pending
    NothingToSend,
    /// No session
    NotJoined,
    /// Another transaction holds the radio
    Busy,
    /// No uplink sub-band allows a transmission before `until`
    DutyCycleExceeded {
        /// Earliest allowed start
        until: Instant,
    },
    /// The region has no enabled sub-band
    NoSubBand,
    /// The session's frame counter cannot advance
    CounterExhausted,
    /// The pending payload no longer fits the session's data rate; it was
    /// dropped
    PayloadTooLarge {
        /// Payload length
        len: usize,
        /// Largest length accepted
        max: usize,
    },
    /// The MAC layer refused the uplink
    Mac,
}

impl fmt::Display for UplinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UplinkError::NothingToSend => f.write_str("nothing to send"),
            UplinkError::NotJoined => f.write_str("not joined"),
            UplinkError::Busy => f.write_str("tx/rx pending"),
            UplinkError::DutyCycleExceeded { until } => {
                write!(f, "duty cycle exceeded until {}", until)
            }
            UplinkError::NoSubBand => f.write_str("no uplink sub-band"),
            UplinkError::CounterExhausted => f.write_str("frame counter exhausted"),
            UplinkError::PayloadTooLarge { len, max } => {
                write!(f, "payload of {} bytes exceeds {}", len, max)
            }
            UplinkError::Mac => f.write_str("MAC error"),
        }
    }
}

fn check_len(len: usize, max_len: usize) -> Result<(), PayloadTooLarge> {
    let max = max_len.min(MAX_PAYLOAD_SIZE);
    if len > max {
        return Err(PayloadTooLarge { len, max });
    }
    Ok(())
}

/// Uplink scheduler
#[derive(Debug)]
pub struct UplinkScheduler {
    pending: Option<Payload>,
    in_flight: Option<TransactionHandle>,
    tx_interval: Ticks,
    port: u8,
    confirmed: bool,
}

impl UplinkScheduler {
    /// Create a scheduler sending on `port` every `tx_interval`
    pub fn new(tx_interval: Ticks, port: u8, confirmed: bool) -> Self {
        Self {
            pending: None,
            in_flight: None,
            tx_interval,
            port,
            confirmed,
        }
    }

    /// Queue `payload` for the next uplink, replacing any pending one
    ///
    /// `max_len` is the largest payload the current data rate carries.
    pub fn request_send(&mut self, payload: &[u8], max_len: usize) -> Result<(), PayloadTooLarge> {
        check_len(payload.len(), max_len)?;
        let mut queued = Payload::new();
        // length checked against capacity above
        let _ = queued.extend_from_slice(payload);
        if self.pending.replace(queued).is_some() {
            debug!("pending payload superseded");
        }
        Ok(())
    }

    /// Queue a payload from the application source if none is pending
    ///
    /// A payload longer than `max_len` is dropped.
    pub fn supply(&mut self, payload: Payload, max_len: usize) -> Result<(), PayloadTooLarge> {
        check_len(payload.len(), max_len)?;
        if self.pending.is_none() {
            self.pending = Some(payload);
        }
        Ok(())
    }

    /// Is a payload waiting?
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// The payload waiting to go out
    pub fn pending(&self) -> Option<&[u8]> {
        self.pending.as_deref()
    }

    /// Is an uplink in flight?
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Hand the pending payload to the MAC layer
    ///
    /// The uplink goes out in the enabled sub-band that becomes available
    /// first. Returns the frame counter it carries. On any error the payload
    /// stays pending and the radio is left free, except for a payload the
    /// session's data rate no longer carries, which is dropped.
    pub fn on_timer_fired<R: Region, M: MacRadio>(
        &mut self,
        cx: &mut TxContext<'_, R, M>,
    ) -> Result<u32, UplinkError> {
        if !cx.session.is_joined() {
            return Err(UplinkError::NotJoined);
        }
        let len = match &self.pending {
            Some(payload) => payload.len(),
            None => return Err(UplinkError::NothingToSend),
        };
        let data_rate = cx.session.data_rate();
        if let Err(PayloadTooLarge { len, max }) =
            check_len(len, cx.region.max_payload_size(data_rate))
        {
            // the data rate changed since the payload was queued
            warn!("dropping {} byte payload, {} allowed", len, max);
            self.pending = None;
            return Err(UplinkError::PayloadTooLarge { len, max });
        }
        if cx.guard.is_busy() {
            return Err(UplinkError::Busy);
        }

        let (sub_band, until) = cx
            .tracker
            .earliest_available(cx.region.uplink_sub_bands())
            .ok_or(UplinkError::NoSubBand)?;
        if cx.now.is_before(until) {
            return Err(UplinkError::DutyCycleExceeded { until });
        }

        let airtime = phy::time_on_air(data_rate, phy::uplink_phy_len(len));
        let handle = cx
            .guard
            .try_begin(TransactionKind::Uplink, cx.now, sub_band, airtime)
            .map_err(|_| UplinkError::Busy)?;

        let frame_counter = match cx.session.peek_frame_counter() {
            Ok(fcnt) => fcnt,
            Err(e) => {
                let _ = cx.guard.complete(handle);
                return Err(match e {
                    SessionError::NotJoined => UplinkError::NotJoined,
                    _ => UplinkError::CounterExhausted,
                });
            }
        };

        let payload = self.pending.as_deref().unwrap_or_default();
        let request = UplinkRequest {
            sub_band,
            frame_counter,
            port: self.port,
            confirmed: self.confirmed,
            payload,
            data_rate,
            tx_power: cx.session.tx_power(),
        };
        if let Err(e) = cx.mac.transmit(&request) {
            warn!("uplink refused: {:?}", e);
            let _ = cx.guard.complete(handle);
            return Err(UplinkError::Mac);
        }
        // advances past the counter just peeked
        if let Err(e) = cx.session.next_frame_counter() {
            warn!("frame counter: {:?}", e);
        }

        debug!(
            "uplink fcnt {} in sub-band {}, {} bytes",
            frame_counter, sub_band, len
        );
        self.pending = None;
        self.in_flight = Some(handle);
        Ok(frame_counter)
    }

    /// Finish the uplink in flight
    ///
    /// Charges its airtime, releases the radio and returns the transaction,
    /// `None` when no uplink was in flight.
    pub fn on_complete<R: Region, M: MacRadio>(
        &mut self,
        cx: &mut TxContext<'_, R, M>,
    ) -> Option<PendingTransaction> {
        let handle = self.in_flight.take()?;
        cx.finish(handle)
    }

    /// Next periodic uplink after `now`
    pub fn next_job(&self, now: Instant) -> ScheduledJob {
        ScheduledJob::new(now + self.tx_interval, JobAction::DoUplink)
    }

    /// Interval between uplinks
    pub fn tx_interval(&self) -> Ticks {
        self.tx_interval
    }

    /// Drop the pending payload and forget the uplink in flight
    pub fn reset(&mut self) {
        self.pending = None;
        self.in_flight = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_payload_supersedes_older() {
        let mut uplink = UplinkScheduler::new(Ticks::from_secs(60), 1, false);
        uplink.request_send(b"first", 51).unwrap();
        uplink.request_send(b"second", 51).unwrap();
        assert_eq!(uplink.pending(), Some(&b"second"[..]));

        uplink.supply(Payload::from_slice(b"app").unwrap(), 51).unwrap();
        assert_eq!(uplink.pending(), Some(&b"second"[..]));
    }

    #[test]
    fn oversized_source_payload_is_dropped() {
        let mut uplink = UplinkScheduler::new(Ticks::from_secs(60), 1, false);
        let result = uplink.supply(Payload::from_slice(&[0u8; 240]).unwrap(), 222);
        assert_eq!(result, Err(PayloadTooLarge { len: 240, max: 222 }));
        assert!(!uplink.has_pending());
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let mut uplink = UplinkScheduler::new(Ticks::from_secs(60), 1, false);
        uplink.request_send(b"kept", 51).unwrap();

        let result = uplink.request_send(&[0u8; 52], 51);
        assert_eq!(result, Err(PayloadTooLarge { len: 52, max: 51 }));
        assert_eq!(uplink.pending(), Some(&b"kept"[..]));

        let result = uplink.request_send(&[0u8; 243], 1000);
        assert_eq!(
            result,
            Err(PayloadTooLarge {
                len: 243,
                max: MAX_PAYLOAD_SIZE
            })
        );
    }

    #[test]
    fn next_job_after_interval() {
        let uplink = UplinkScheduler::new(Ticks::from_secs(60), 1, false);
        let now = Instant::from_ticks(1000);
        let job = uplink.next_job(now);
        assert_eq!(job.action, JobAction::DoUplink);
        assert_eq!(job.fire_at, now + Ticks::from_secs(60));
    }
}
