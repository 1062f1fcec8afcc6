//! Events raised by the radio/MAC layer

use core::fmt;

use heapless::Vec;

use crate::config::device::DevAddr;
use crate::lorawan::session::{SessionKeys, SessionParams};
use crate::lorawan::uplink::MAX_PAYLOAD_SIZE;

/// Session material delivered with a join accept
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct JoinAccept {
    /// Device address assigned by the network
    pub dev_addr: DevAddr,
    /// Session keys derived by the MAC layer
    pub keys: SessionKeys,
    /// MAC parameters assigned by the network
    pub params: SessionParams,
}

/// Application data received in a receive window
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Downlink {
    /// Application port
    pub port: u8,
    /// Decrypted payload
    pub data: Vec<u8, MAX_PAYLOAD_SIZE>,
}

/// Radio/MAC event
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum MacEvent {
    /// Join request sent
    Joining,
    /// Join accept received
    JoinAccepted(JoinAccept),
    /// Join request rejected or unanswerable
    JoinFailed,
    /// No join accept in either receive window
    JoinTimeout,
    /// Rejoin request failed
    RejoinFailed,
    /// Uplink and its receive windows are done
    TransactionComplete {
        /// Confirmed uplink was acknowledged
        ack: bool,
        /// Data received in a receive window
        received: Option<Downlink>,
    },
    /// Beacon scan timed out
    ScanTimeout,
    /// Beacon found
    BeaconFound,
    /// Beacon missed
    BeaconMissed,
    /// Beacon tracked
    BeaconTracked,
    /// Reception in a ping slot or continuous window completed
    RxComplete,
    /// Link check failed repeatedly
    LinkDead,
    /// Link is back
    LinkAlive,
    /// Beacon time synchronisation lost
    LostTimeSync,
    /// MAC layer reset itself
    Reset,
    /// Event code the node does not know
    Unknown(u8),
}

/// Kind of a [`MacEvent`], without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(missing_docs)]
pub enum EventKind {
    Joining,
    JoinAccepted,
    JoinFailed,
    JoinTimeout,
    RejoinFailed,
    TransactionComplete,
    ScanTimeout,
    BeaconFound,
    BeaconMissed,
    BeaconTracked,
    RxComplete,
    LinkDead,
    LinkAlive,
    LostTimeSync,
    Reset,
    Unknown(u8),
}

impl MacEvent {
    /// Kind of the event
    pub fn kind(&self) -> EventKind {
        match self {
            MacEvent::Joining => EventKind::Joining,
            MacEvent::JoinAccepted(_) => EventKind::JoinAccepted,
            MacEvent::JoinFailed => EventKind::JoinFailed,
            MacEvent::JoinTimeout => EventKind::JoinTimeout,
            MacEvent::RejoinFailed => EventKind::RejoinFailed,
            MacEvent::TransactionComplete { .. } => EventKind::TransactionComplete,
            MacEvent::ScanTimeout => EventKind::ScanTimeout,
            MacEvent::BeaconFound => EventKind::BeaconFound,
            MacEvent::BeaconMissed => EventKind::BeaconMissed,
            MacEvent::BeaconTracked => EventKind::BeaconTracked,
            MacEvent::RxComplete => EventKind::RxComplete,
            MacEvent::LinkDead => EventKind::LinkDead,
            MacEvent::LinkAlive => EventKind::LinkAlive,
            MacEvent::LostTimeSync => EventKind::LostTimeSync,
            MacEvent::Reset => EventKind::Reset,
            MacEvent::Unknown(code) => EventKind::Unknown(*code),
        }
    }
}

impl EventKind {
    /// Does the event end a join attempt without a session?
    pub fn is_join_failure(self) -> bool {
        matches!(
            self,
            EventKind::JoinFailed | EventKind::JoinTimeout | EventKind::RejoinFailed
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Joining => "EV_JOINING",
            EventKind::JoinAccepted => "EV_JOINED",
            EventKind::JoinFailed => "EV_JOIN_FAILED",
            EventKind::JoinTimeout => "EV_JOIN_TIMEOUT",
            EventKind::RejoinFailed => "EV_REJOIN_FAILED",
            EventKind::TransactionComplete => "EV_TXCOMPLETE",
            EventKind::ScanTimeout => "EV_SCAN_TIMEOUT",
            EventKind::BeaconFound => "EV_BEACON_FOUND",
            EventKind::BeaconMissed => "EV_BEACON_MISSED",
            EventKind::BeaconTracked => "EV_BEACON_TRACKED",
            EventKind::RxComplete => "EV_RXCOMPLETE",
            EventKind::LinkDead => "EV_LINK_DEAD",
            EventKind::LinkAlive => "EV_LINK_ALIVE",
            EventKind::LostTimeSync => "EV_LOST_TSYNC",
            EventKind::Reset => "EV_RESET",
            EventKind::Unknown(code) => return write!(f, "Unknown event: {}", code),
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_failures() {
        assert!(MacEvent::JoinTimeout.kind().is_join_failure());
        assert!(MacEvent::RejoinFailed.kind().is_join_failure());
        assert!(!MacEvent::LinkDead.kind().is_join_failure());
    }

    #[test]
    fn unknown_kind_keeps_code() {
        assert_eq!(MacEvent::Unknown(42).kind(), EventKind::Unknown(42));
        assert_eq!(EventKind::Unknown(42).to_string(), "Unknown event: 42");
        assert_eq!(EventKind::TransactionComplete.to_string(), "EV_TXCOMPLETE");
    }
}
