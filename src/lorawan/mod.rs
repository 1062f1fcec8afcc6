//! LoRaWAN end-node core
//!
//! This module contains the components the device drives, leaves first:
//! - Device time and duty-cycle budgets per sub-band
//! - Session store with frame-counter reservation
//! - Radio transaction guard and the single-slot job timer
//! - Join procedure and uplink scheduler
//! - Regional parameters and time-on-air

/// Shared transaction context
pub mod context;

/// Sub-band duty-cycle tracking
pub mod duty_cycle;

/// Radio/MAC events
pub mod events;

/// Single in-flight transaction guard
pub mod guard;

/// Single-slot job timer
pub mod job;

/// Over-the-air activation
pub mod join;

/// Time-on-air calculation
pub mod phy;

/// Regional parameters and configurations
pub mod region;

/// Network session state
pub mod session;

/// Device time
pub mod time;

/// Uplink scheduling
pub mod uplink;

pub use context::TxContext;
pub use duty_cycle::{DutyCycle, DutyCycleTracker};
pub use events::{EventKind, MacEvent};
pub use guard::{Busy, TransactionGuard, TransactionKind};
pub use job::{JobAction, ScheduledJob};
pub use join::{JoinError, JoinProcedure, JoinState};
pub use region::{DataRate, Region, EU868, US915};
pub use session::{ActivationState, SessionError, SessionStore};
pub use time::{Instant, Ticks};
pub use uplink::{UplinkError, UplinkScheduler};
