//! High-level LoRaWAN device interface
//!
//! This module provides the root context object of an end node. It owns
//! every component, runs the cooperative loop and dispatches radio/MAC
//! events:
//! - Join events go to the join procedure
//! - Transaction completion goes to the uplink scheduler, which charges the
//!   duty-cycle budget before the next cycle is armed
//! - Everything else is logged and otherwise ignored

pub mod clock;
pub mod event_log;
pub mod non_volatile_store;
/// Random number source
pub mod rng;

use core::convert::Infallible;
use core::fmt;

use clock::Clock;
use event_log::{LogEntry, LogRecord};
use non_volatile_store::NonVolatileStore;
use rng::Rng;

use crate::{
    config::{device::DeviceConfig, node::NodeConfig},
    lorawan::{
        context::TxContext,
        duty_cycle::DutyCycleTracker,
        events::{Downlink, EventKind, JoinAccept, MacEvent},
        guard::TransactionGuard,
        job::{JobAction, JobSlot, ScheduledJob},
        join::{JoinError, JoinProcedure},
        region::Region,
        session::{ActivationState, SessionError, SessionStore, SNAPSHOT_LEN},
        time::Instant,
        uplink::{Payload, PayloadTooLarge, UplinkError, UplinkScheduler},
    },
    radio::MacRadio,
};

/// LoRaWAN device error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceError {
    /// Invalid configuration
    InvalidConfig,
    /// Payload longer than the current data rate carries
    PayloadTooLarge {
        /// Payload length
        len: usize,
        /// Largest length accepted
        max: usize,
    },
    /// A radio transaction is in flight
    Busy,
    /// A session is already established
    AlreadyJoined,
    /// Operation needs a session
    NotJoined,
    /// The frame counter of the session cannot advance
    CounterExhausted,
    /// Transmission must wait until `until`
    DutyCycleExceeded {
        /// Earliest allowed start
        until: Instant,
    },
    /// The region has no usable sub-band
    NoSubBand,
    /// Radio/MAC layer error
    Mac,
    /// Non-volatile storage error
    Store,
    /// Stored session snapshot is not usable
    InvalidSnapshot,
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::InvalidConfig => f.write_str("invalid configuration"),
            DeviceError::PayloadTooLarge { len, max } => {
                write!(f, "payload of {} bytes exceeds {}", len, max)
            }
            DeviceError::Busy => f.write_str("radio busy"),
            DeviceError::AlreadyJoined => f.write_str("already joined"),
            DeviceError::NotJoined => f.write_str("not joined"),
            DeviceError::CounterExhausted => f.write_str("frame counter exhausted"),
            DeviceError::DutyCycleExceeded { until } => {
                write!(f, "duty cycle exceeded until {}", until)
            }
            DeviceError::NoSubBand => f.write_str("no usable sub-band"),
            DeviceError::Mac => f.write_str("MAC error"),
            DeviceError::Store => f.write_str("non-volatile storage error"),
            DeviceError::InvalidSnapshot => f.write_str("invalid session snapshot"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DeviceError {}

impl From<PayloadTooLarge> for DeviceError {
    fn from(error: PayloadTooLarge) -> Self {
        DeviceError::PayloadTooLarge {
            len: error.len,
            max: error.max,
        }
    }
}

impl From<SessionError> for DeviceError {
    fn from(error: SessionError) -> Self {
        match error {
            SessionError::AlreadyJoined => DeviceError::AlreadyJoined,
            SessionError::NotJoined => DeviceError::NotJoined,
            SessionError::CounterExhausted => DeviceError::CounterExhausted,
            SessionError::InvalidSnapshot => DeviceError::InvalidSnapshot,
        }
    }
}

impl From<JoinError> for DeviceError {
    fn from(error: JoinError) -> Self {
        match error {
            JoinError::Busy | JoinError::InProgress => DeviceError::Busy,
            JoinError::AlreadyJoined => DeviceError::AlreadyJoined,
            JoinError::DutyCycleExceeded { until } => DeviceError::DutyCycleExceeded { until },
            JoinError::NoSubBand => DeviceError::NoSubBand,
            JoinError::NotRequested => DeviceError::NotJoined,
            JoinError::Mac => DeviceError::Mac,
            JoinError::Session(e) => e.into(),
        }
    }
}

impl From<UplinkError> for DeviceError {
    fn from(error: UplinkError) -> Self {
        match error {
            UplinkError::NothingToSend | UplinkError::NotJoined => DeviceError::NotJoined,
            UplinkError::Busy => DeviceError::Busy,
            UplinkError::DutyCycleExceeded { until } => DeviceError::DutyCycleExceeded { until },
            UplinkError::NoSubBand => DeviceError::NoSubBand,
            UplinkError::CounterExhausted => DeviceError::CounterExhausted,
            UplinkError::PayloadTooLarge { len, max } => DeviceError::PayloadTooLarge { len, max },
            UplinkError::Mac => DeviceError::Mac,
        }
    }
}

/// Collaborators provided by the calling code
pub trait Platform {
    /// Radio/MAC layer
    type Mac: MacRadio;
    /// Device clock
    type Clock: Clock;
    /// Random number source
    type Rng: Rng;
    /// Session persistence
    type Store: NonVolatileStore;

    /// Get the caller-supplied radio/MAC layer
    fn mac(&mut self) -> &mut Self::Mac;
    /// Get the caller-supplied clock
    fn clock(&mut self) -> &mut Self::Clock;
    /// Get the caller-supplied random number generator
    fn rng(&mut self) -> &mut Self::Rng;
    /// Get the caller-supplied persistence implementation
    fn non_volatile_store(&mut self) -> &mut Self::Store;

    /// Record an event log line
    fn log_event(&mut self, _record: &LogRecord) {
        // default do nothing
    }
    /// Payload for a periodic cycle the application did not request a send for
    fn next_payload(&mut self) -> Option<Payload> {
        None
    }
    /// Process application data received in a receive window
    fn handle_downlink(&mut self, _port: u8, _data: &[u8]) {
        // default do nothing
    }
}

/// What a call to [`LoRaWANDevice::run_once`] processed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Activity {
    /// A radio/MAC event
    Event(EventKind),
    /// A due job
    Job(JobAction),
}

/// Outcome of [`LoRaWANDevice::request_send`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SendStatus {
    /// An uplink attempt is armed for now
    Scheduled,
    /// The payload waits for a join or for the transaction in flight
    Deferred,
}

macro_rules! tx_context {
    ($device:ident, $now:expr) => {
        TxContext {
            now: $now,
            region: &$device.region,
            tracker: &mut $device.duty_cycle,
            guard: &mut $device.guard,
            session: &mut $device.session,
            mac: $device.platform.mac(),
        }
    };
}

/// LoRaWAN device implementation
pub struct LoRaWANDevice<P: Platform, REG: Region> {
    /// Caller-supplied collaborators
    platform: P,
    /// Regional parameters
    region: REG,
    /// Provisioned identity
    identity: DeviceConfig,
    /// Node configuration
    config: NodeConfig,
    /// Network session
    session: SessionStore,
    /// Sub-band budgets
    duty_cycle: DutyCycleTracker,
    /// In-flight transaction
    guard: TransactionGuard,
    /// Over-the-air activation
    join: JoinProcedure,
    /// Application uplinks
    uplink: UplinkScheduler,
    /// The next thing to do
    job: JobSlot,
}

impl<P: Platform, REG: Region> LoRaWANDevice<P, REG> {
    /// Create new LoRaWAN device
    ///
    /// The node starts unjoined with every sub-band immediately available.
    pub fn new(
        mut platform: P,
        identity: DeviceConfig,
        config: NodeConfig,
        region: REG,
    ) -> Result<Self, DeviceError> {
        // port 0 carries MAC commands only, 224 and up are reserved
        if config.port == 0 || config.port >= 224 || config.tx_interval.ticks() == 0 {
            return Err(DeviceError::InvalidConfig);
        }

        let data_rate = if region.supports_data_rate(config.data_rate) {
            config.data_rate
        } else {
            region.default_data_rate()
        };
        let now = platform.clock().now();

        Ok(Self {
            duty_cycle: DutyCycleTracker::new(region.sub_bands(), now),
            session: SessionStore::new(data_rate, config.tx_power, config.frame_counter_reserve),
            guard: TransactionGuard::new(),
            join: JoinProcedure::new(data_rate, config.join_backoff),
            uplink: UplinkScheduler::new(config.tx_interval, config.port, config.confirmed),
            job: JobSlot::default(),
            platform,
            region,
            identity,
            config,
        })
    }

    /// Restore the session kept in non-volatile storage
    ///
    /// Returns `false` when nothing is stored. A snapshot that does not
    /// verify is erased.
    pub fn resume(&mut self) -> Result<bool, DeviceError> {
        if self.session.is_joined() {
            return Err(DeviceError::AlreadyJoined);
        }
        let now = self.now();

        let mut buf = [0u8; SNAPSHOT_LEN];
        let len = match self.platform.non_volatile_store().load(&mut buf) {
            Ok(Some(len)) => len,
            Ok(None) => return Ok(false),
            Err(e) => {
                warn!("session load: {:?}", e);
                return Err(DeviceError::Store);
            }
        };

        let restored = match buf.get(..len) {
            Some(snapshot) => self.session.restore(snapshot, &self.identity.app_key),
            None => Err(SessionError::InvalidSnapshot),
        };
        if let Err(e) = restored {
            self.log(now, LogEntry::Failed(e.into()));
            if let Err(e) = self.platform.non_volatile_store().clear() {
                warn!("session clear: {:?}", e);
            }
            return Err(e.into());
        }

        let (Some(dev_addr), Some(frame_counter)) =
            (self.session.dev_addr(), self.session.frame_counter())
        else {
            return Err(DeviceError::NotJoined);
        };
        if let Some(keys) = self.session.keys() {
            if let Err(e) = self
                .platform
                .mac()
                .restore_session(dev_addr, keys, frame_counter)
            {
                warn!("session restore: {:?}", e);
                self.session.reset();
                return Err(DeviceError::Mac);
            }
        }

        info!("resumed session {:?} at fcnt {}", dev_addr, frame_counter);
        self.log(now, LogEntry::Resumed { frame_counter });
        Ok(true)
    }

    /// Arm the first cycle
    ///
    /// An unjoined node joins on the first cycle.
    pub fn start(&mut self) {
        let now = self.now();
        self.log(now, LogEntry::Starting);
        self.job.arm(ScheduledJob::new(now, JobAction::DoUplink));
    }

    /// Queue `payload` for the next uplink
    ///
    /// A payload that has not gone out yet is replaced. Without a session
    /// the payload waits for the join to complete, and a join is started if
    /// none is under way.
    pub fn request_send(&mut self, payload: &[u8]) -> Result<SendStatus, DeviceError> {
        let max = self.region.max_payload_size(self.session.data_rate());
        self.uplink.request_send(payload, max)?;
        let now = self.now();

        match self.session.activation_state() {
            ActivationState::Joined if !self.guard.is_busy() => {
                self.job.arm(ScheduledJob::new(now, JobAction::DoUplink));
                Ok(SendStatus::Scheduled)
            }
            ActivationState::Joined | ActivationState::Joining => Ok(SendStatus::Deferred),
            ActivationState::Unjoined => {
                let retry_armed = matches!(
                    self.job.peek(),
                    Some(ScheduledJob {
                        action: JobAction::DoJoin,
                        ..
                    })
                );
                if !retry_armed {
                    self.job.arm(ScheduledJob::new(now, JobAction::DoJoin));
                }
                Ok(SendStatus::Deferred)
            }
        }
    }

    /// Process at most one pending event or one due job
    ///
    /// Events are handled before jobs. Returns `WouldBlock` when there was
    /// nothing to do; see [`next_wakeup`](Self::next_wakeup) for when there
    /// will be.
    pub fn run_once(&mut self) -> nb::Result<Activity, Infallible> {
        let now = self.now();
        self.duty_cycle.expire(now);

        match self.platform.mac().poll_event() {
            Ok(event) => {
                let kind = event.kind();
                self.handle_event(now, event);
                return Ok(Activity::Event(kind));
            }
            Err(nb::Error::WouldBlock) => {}
            Err(nb::Error::Other(e)) => {
                warn!("event poll: {:?}", e);
                self.log(now, LogEntry::Failed(DeviceError::Mac));
            }
        }

        match self.job.take_due(now) {
            Some(job) => {
                self.run_job(now, job.action);
                Ok(Activity::Job(job.action))
            }
            None => Err(nb::Error::WouldBlock),
        }
    }

    /// Explicit MAC reset
    ///
    /// Drops the transaction in flight, the session with its keys and
    /// counters, the stored snapshot, any pending payload and the armed job.
    /// Duty-cycle budgets are kept.
    pub fn reset(&mut self) -> Result<(), DeviceError> {
        let now = self.now();
        let mac_result = self.platform.mac().reset();

        if let Some(aborted) = self.guard.abort() {
            // the radio may have been on air
            if let Err(unknown) =
                self.duty_cycle
                    .record_transmission(aborted.sub_band, aborted.airtime, now)
            {
                warn!("no budget for sub-band {}", unknown.0);
            }
        }
        self.session.reset();
        self.join.reset();
        self.uplink.reset();
        self.job.cancel();
        let store_result = self.platform.non_volatile_store().clear();
        self.log(now, LogEntry::SessionReset);

        if let Err(e) = mac_result {
            warn!("MAC reset: {:?}", e);
            return Err(DeviceError::Mac);
        }
        if let Err(e) = store_result {
            warn!("session clear: {:?}", e);
            return Err(DeviceError::Store);
        }
        Ok(())
    }

    /// Change the channel plan
    ///
    /// Reconfiguration resets every duty-cycle budget.
    pub fn configure_region<F: FnOnce(&mut REG)>(&mut self, configure: F) {
        configure(&mut self.region);
        let now = self.now();
        self.duty_cycle.reset(self.region.sub_bands(), now);
    }

    /// When the armed job becomes due
    pub fn next_wakeup(&self) -> Option<Instant> {
        self.job.peek().map(|job| job.fire_at)
    }

    /// Get current activation state
    pub fn activation_state(&self) -> ActivationState {
        self.session.activation_state()
    }

    /// Session store
    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    /// Duty-cycle budgets
    pub fn duty_cycle(&self) -> &DutyCycleTracker {
        &self.duty_cycle
    }

    /// In-flight transaction guard
    pub fn guard(&self) -> &TransactionGuard {
        &self.guard
    }

    /// Join procedure
    pub fn join(&self) -> &JoinProcedure {
        &self.join
    }

    /// Uplink scheduler
    pub fn uplink(&self) -> &UplinkScheduler {
        &self.uplink
    }

    /// The armed job
    pub fn scheduled_job(&self) -> Option<&ScheduledJob> {
        self.job.peek()
    }

    /// Regional parameters
    pub fn region(&self) -> &REG {
        &self.region
    }

    /// Provisioned identity
    pub fn identity(&self) -> &DeviceConfig {
        &self.identity
    }

    /// Node configuration
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Caller-supplied collaborators
    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Caller-supplied collaborators, mutably
    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    fn now(&mut self) -> Instant {
        self.platform.clock().now()
    }

    fn log(&mut self, now: Instant, entry: LogEntry) {
        let record = LogRecord {
            dev_eui: self.identity.dev_eui,
            time: now,
            entry,
        };
        trace!("{:?}", record);
        self.platform.log_event(&record);
    }

    fn handle_event(&mut self, now: Instant, event: MacEvent) {
        let kind = event.kind();
        self.log(now, LogEntry::Event(kind));

        match event {
            MacEvent::JoinAccepted(accept) => self.on_join_accepted(now, accept),
            MacEvent::JoinFailed | MacEvent::JoinTimeout | MacEvent::RejoinFailed => {
                self.on_join_failed(now)
            }
            MacEvent::TransactionComplete { ack, received } => {
                self.on_transaction_complete(now, ack, received)
            }
            MacEvent::LinkDead if self.config.rejoin_on_link_dead && self.session.is_joined() => {
                self.drop_session(now);
                self.job.arm(ScheduledJob::new(now, JobAction::DoJoin));
            }
            _ => trace!("no action for {:?}", kind),
        }
    }

    fn on_join_accepted(&mut self, now: Instant, accept: JoinAccept) {
        let result = {
            let mut cx = tx_context!(self, now);
            self.join.on_accepted(accept, &mut cx)
        };
        match result {
            Ok(_) => {
                // deliver the payload that waited for the join
                self.job.arm(ScheduledJob::new(now, JobAction::DoUplink));
            }
            Err(e) => {
                warn!("join accept: {:?}", e);
                self.log(now, LogEntry::Failed(e.into()));
            }
        }
    }

    fn on_join_failed(&mut self, now: Instant) {
        let released = {
            let mut cx = tx_context!(self, now);
            self.join.on_failed(&mut cx)
        };
        if released.is_none() {
            trace!("join outcome without a join in flight");
            return;
        }
        self.arm_join_retry(now);
    }

    fn arm_join_retry(&mut self, now: Instant) {
        let random = match self.platform.rng().next_u32() {
            Ok(random) => random,
            Err(e) => {
                warn!("rng: {:?}", e);
                0
            }
        };
        let job = self
            .join
            .retry_job(now, random, &self.duty_cycle, &self.region);
        self.job.arm(job);
        self.log(now, LogEntry::JoinRetry { at: job.fire_at });
    }

    fn on_transaction_complete(&mut self, now: Instant, ack: bool, received: Option<Downlink>) {
        let released = {
            let mut cx = tx_context!(self, now);
            self.uplink.on_complete(&mut cx)
        };
        if released.is_none() {
            trace!("completion without an uplink in flight");
            return;
        }

        if ack {
            self.log(now, LogEntry::ReceivedAck);
        }
        if let Some(downlink) = received {
            self.log(
                now,
                LogEntry::Received {
                    port: downlink.port,
                    len: downlink.data.len(),
                },
            );
            self.platform.handle_downlink(downlink.port, &downlink.data);
        }
        let next = self.uplink.next_job(now);
        self.job.arm(next);
    }

    fn run_job(&mut self, now: Instant, action: JobAction) {
        match action {
            JobAction::DoJoin => self.do_join(now),
            JobAction::DoUplink => self.do_uplink(now),
        }
    }

    fn do_join(&mut self, now: Instant) {
        let result = {
            let mut cx = tx_context!(self, now);
            self.join.start(&self.identity, &mut cx)
        };
        match result {
            Ok(()) => self.log(now, LogEntry::JoinRequested),
            // the outcome of the request in flight arms the next job
            Err(JoinError::InProgress) => {}
            Err(JoinError::AlreadyJoined) => {
                self.job.arm(ScheduledJob::new(now, JobAction::DoUplink));
            }
            Err(JoinError::DutyCycleExceeded { until }) => {
                self.log(now, LogEntry::DutyCycleDeferred { until });
                self.job.arm(ScheduledJob::new(until, JobAction::DoJoin));
            }
            Err(JoinError::Busy) => {
                self.log(now, LogEntry::TxRxPending);
                self.arm_join_retry(now);
            }
            Err(e) => {
                self.log(now, LogEntry::Failed(e.into()));
                self.arm_join_retry(now);
            }
        }
    }

    fn do_uplink(&mut self, now: Instant) {
        if !self.uplink.has_pending() {
            if let Some(payload) = self.platform.next_payload() {
                let max = self.region.max_payload_size(self.session.data_rate());
                if let Err(e) = self.uplink.supply(payload, max) {
                    self.log(now, LogEntry::Failed(e.into()));
                }
            }
        }

        if self.uplink.has_pending()
            && self.session.needs_persist()
            && !self.guard.is_busy()
        {
            if let Err(e) = self.persist_session() {
                // sending now could reuse counters after a power cycle
                self.log(now, LogEntry::Failed(e));
                let next = self.uplink.next_job(now);
                self.job.arm(next);
                return;
            }
        }

        let result = {
            let mut cx = tx_context!(self, now);
            self.uplink.on_timer_fired(&mut cx)
        };
        match result {
            Ok(frame_counter) => self.log(now, LogEntry::PacketQueued { frame_counter }),
            Err(UplinkError::NothingToSend) => {
                self.log(now, LogEntry::NothingToSend);
                let next = self.uplink.next_job(now);
                self.job.arm(next);
            }
            Err(UplinkError::NotJoined) => self.do_join(now),
            Err(UplinkError::Busy) => {
                self.log(now, LogEntry::TxRxPending);
                let next = self.uplink.next_job(now);
                self.job.arm(next);
            }
            Err(UplinkError::DutyCycleExceeded { until }) => {
                self.log(now, LogEntry::DutyCycleDeferred { until });
                self.job.arm(ScheduledJob::new(until, JobAction::DoUplink));
            }
            Err(UplinkError::CounterExhausted) => {
                self.drop_session(now);
                self.do_join(now);
            }
            Err(e) => {
                self.log(now, LogEntry::Failed(e.into()));
                let next = self.uplink.next_job(now);
                self.job.arm(next);
            }
        }
    }

    fn persist_session(&mut self) -> Result<(), DeviceError> {
        let snapshot = self
            .session
            .snapshot(&self.identity.app_key)
            .ok_or(DeviceError::NotJoined)?;
        if let Err(e) = self.platform.non_volatile_store().save(snapshot.as_bytes()) {
            warn!("session save: {:?}", e);
            return Err(DeviceError::Store);
        }
        self.session.commit(&snapshot);
        debug!("session stored, counters reserved until {}", snapshot.reserved_until());
        Ok(())
    }

    fn drop_session(&mut self, now: Instant) {
        self.session.reset();
        if let Err(e) = self.platform.non_volatile_store().clear() {
            warn!("session clear: {:?}", e);
        }
        self.log(now, LogEntry::SessionReset);
    }
}
