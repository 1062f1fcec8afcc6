//! Over-the-air activation
//!
//! `Idle -> RequestSent -> Joined`, falling back to `Idle` when the MAC
//! layer reports a failed or timed out attempt. Attempts are retried without
//! limit; each retry waits for an exponential backoff and for the join
//! sub-band's duty-cycle allowance, and steps the data rate one step slower.

use core::fmt;

use super::context::TxContext;
use super::duty_cycle::DutyCycleTracker;
use super::events::JoinAccept;
use super::guard::{PendingTransaction, TransactionHandle, TransactionKind};
use super::job::{JobAction, ScheduledJob};
use super::phy::{self, JOIN_REQUEST_LEN};
use super::region::{DataRate, Region};
use super::session::SessionError;
use super::time::Instant;
use crate::config::device::DeviceConfig;
use crate::config::node::JoinBackoff;
use crate::radio::{JoinRequest, MacRadio};

/// Join procedure state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum JoinState {
    /// No join in progress
    Idle,
    /// Join request handed to the MAC layer, waiting for the outcome
    RequestSent,
    /// Join accepted
    Joined,
}

/// Join errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum JoinError {
    /// Another transaction holds the radio
    Busy,
    /// A join request is already in flight
    InProgress,
    /// A session is already established
    AlreadyJoined,
    /// No join sub-band allows a transmission before `until`
    DutyCycleExceeded {
        /// Earliest allowed start
        until: Instant,
    },
    /// The region has no enabled join sub-band
    NoSubBand,
    /// Join outcome without a join request in flight
    NotRequested,
    /// The MAC layer refused the request
    Mac,
    /// The session store refused the new session
    Session(SessionError),
}

impl From<SessionError> for JoinError {
    fn from(error: SessionError) -> Self {
        match error {
            SessionError::AlreadyJoined => JoinError::AlreadyJoined,
            other => JoinError::Session(other),
        }
    }
}

impl fmt::Display for JoinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinError::Busy => f.write_str("radio busy"),
            JoinError::InProgress => f.write_str("join in progress"),
            JoinError::AlreadyJoined => f.write_str("already joined"),
            JoinError::DutyCycleExceeded { until } => {
                write!(f, "duty cycle exceeded until {}", until)
            }
            JoinError::NoSubBand => f.write_str("no join sub-band"),
            JoinError::NotRequested => f.write_str("no join in flight"),
            JoinError::Mac => f.write_str("MAC error"),
            JoinError::Session(e) => write!(f, "session: {}", e),
        }
    }
}

/// Join procedure
#[derive(Debug)]
pub struct JoinProcedure {
    state: JoinState,
    in_flight: Option<TransactionHandle>,
    failures: u32,
    data_rate: DataRate,
    initial_data_rate: DataRate,
    backoff: JoinBackoff,
}

impl JoinProcedure {
    /// Create an idle join procedure starting at `data_rate`
    pub fn new(data_rate: DataRate, backoff: JoinBackoff) -> Self {
        Self {
            state: JoinState::Idle,
            in_flight: None,
            failures: 0,
            data_rate,
            initial_data_rate: data_rate,
            backoff,
        }
    }

    /// Send a join request
    ///
    /// The request goes out in the join sub-band that becomes available
    /// first. On success the procedure is in `RequestSent` and holds the
    /// radio until [`on_accepted`](Self::on_accepted) or
    /// [`on_failed`](Self::on_failed).
    pub fn start<R: Region, M: MacRadio>(
        &mut self,
        identity: &DeviceConfig,
        cx: &mut TxContext<'_, R, M>,
    ) -> Result<(), JoinError> {
        if self.state == JoinState::RequestSent {
            return Err(JoinError::InProgress);
        }
        if cx.guard.is_busy() {
            return Err(JoinError::Busy);
        }
        if cx.session.is_joined() {
            return Err(JoinError::AlreadyJoined);
        }

        let (sub_band, until) = cx
            .tracker
            .earliest_available(cx.region.join_sub_bands())
            .ok_or(JoinError::NoSubBand)?;
        if cx.now.is_before(until) {
            return Err(JoinError::DutyCycleExceeded { until });
        }

        let data_rate = if cx.region.supports_data_rate(self.data_rate) {
            self.data_rate
        } else {
            cx.region.default_data_rate()
        };
        let airtime = phy::time_on_air(data_rate, JOIN_REQUEST_LEN);
        let handle = cx
            .guard
            .try_begin(TransactionKind::Join, cx.now, sub_band, airtime)
            .map_err(|_| JoinError::Busy)?;

        let request = JoinRequest {
            dev_eui: &identity.dev_eui,
            app_eui: &identity.app_eui,
            app_key: &identity.app_key,
            sub_band,
            data_rate,
            tx_power: cx.session.tx_power(),
        };
        if let Err(e) = cx.session.mark_joining() {
            let _ = cx.guard.complete(handle);
            return Err(e.into());
        }
        if let Err(e) = cx.mac.join(&request) {
            warn!("join request refused: {:?}", e);
            cx.session.abandon_join();
            let _ = cx.guard.complete(handle);
            return Err(JoinError::Mac);
        }

        debug!(
            "join request in sub-band {} at {:?}, attempt {}",
            sub_band,
            data_rate,
            self.failures + 1
        );
        self.data_rate = data_rate;
        self.in_flight = Some(handle);
        self.state = JoinState::RequestSent;
        Ok(())
    }

    /// Complete the join with the session material of a join accept
    ///
    /// Releases the radio, charges the request's airtime and stores the
    /// session. Link check validation requested by the network is switched
    /// off; this node does not honour it.
    pub fn on_accepted<R: Region, M: MacRadio>(
        &mut self,
        accept: JoinAccept,
        cx: &mut TxContext<'_, R, M>,
    ) -> Result<PendingTransaction, JoinError> {
        let handle = self.in_flight.take().ok_or(JoinError::NotRequested)?;
        let pending = cx.finish(handle).ok_or(JoinError::NotRequested)?;
        self.state = JoinState::Idle;

        let mut params = accept.params;
        if let Some(data_rate) = params.data_rate {
            if !cx.region.supports_data_rate(data_rate) {
                warn!("ignoring unsupported data rate {:?}", data_rate);
                params.data_rate = None;
            }
        }
        cx.session.mark_joined(accept.dev_addr, accept.keys, params)?;

        if let Err(e) = cx.mac.set_link_check_mode(false) {
            warn!("link check mode: {:?}", e);
        }

        info!("joined as {:?}", accept.dev_addr);
        self.state = JoinState::Joined;
        self.failures = 0;
        self.data_rate = self.initial_data_rate;
        Ok(pending)
    }

    /// Abandon the attempt in flight after a failure or timeout
    ///
    /// Returns the released transaction, `None` when no join was in flight.
    pub fn on_failed<R: Region, M: MacRadio>(
        &mut self,
        cx: &mut TxContext<'_, R, M>,
    ) -> Option<PendingTransaction> {
        let handle = self.in_flight.take()?;
        let pending = cx.finish(handle);

        cx.session.abandon_join();
        self.state = JoinState::Idle;
        self.failures = self.failures.saturating_add(1);
        if let Some(slower) = cx.region.slower_data_rate(self.data_rate) {
            self.data_rate = slower;
        }
        pending
    }

    /// Job retrying the join after the current failure streak
    ///
    /// Fires after the backoff delay, and never before a join sub-band allows
    /// a transmission.
    pub fn retry_job<R: Region>(
        &self,
        now: Instant,
        random: u32,
        tracker: &DutyCycleTracker,
        region: &R,
    ) -> ScheduledJob {
        let mut fire_at = now + self.backoff.delay(self.failures, random);
        if let Some((_, allowed)) = tracker.earliest_available(region.join_sub_bands()) {
            fire_at = fire_at.latest(allowed);
        }
        ScheduledJob::new(fire_at, JobAction::DoJoin)
    }

    /// Forget any attempt and the failure streak
    pub fn reset(&mut self) {
        self.state = JoinState::Idle;
        self.in_flight = None;
        self.failures = 0;
        self.data_rate = self.initial_data_rate;
    }

    /// Current state
    pub fn state(&self) -> JoinState {
        self.state
    }

    /// Consecutive failed attempts
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Data rate of the next join request
    pub fn data_rate(&self) -> DataRate {
        self.data_rate
    }
}
