//! Observability records handed to [`Platform::log_event`](super::Platform::log_event)

use core::fmt;

use super::DeviceError;
use crate::config::device::EUI64;
use crate::lorawan::events::EventKind;
use crate::lorawan::time::Instant;

/// What happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LogEntry {
    /// Radio/MAC event received
    Event(EventKind),
    /// Periodic operation started
    Starting,
    /// Session restored from non-volatile storage
    Resumed {
        /// Frame counter the next uplink uses
        frame_counter: u32,
    },
    /// Join request handed to the MAC layer
    JoinRequested,
    /// Join retry armed
    JoinRetry {
        /// When the retry fires
        at: Instant,
    },
    /// Uplink handed to the MAC layer
    PacketQueued {
        /// Frame counter of the uplink
        frame_counter: u32,
    },
    /// Uplink skipped, a transaction is in flight
    TxRxPending,
    /// Transmission postponed by the duty cycle
    DutyCycleDeferred {
        /// Earliest allowed start
        until: Instant,
    },
    /// Periodic cycle without a payload
    NothingToSend,
    /// Confirmed uplink acknowledged
    ReceivedAck,
    /// Downlink received
    Received {
        /// Application port
        port: u8,
        /// Payload length
        len: usize,
    },
    /// Session discarded
    SessionReset,
    /// Operation failed
    Failed(DeviceError),
}

/// One line of the event log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LogRecord {
    /// Device EUI
    pub dev_eui: EUI64,
    /// Device time
    pub time: Instant,
    /// What happened
    pub entry: LogEntry,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogEntry::Event(kind) => write!(f, "{}", kind),
            LogEntry::Starting => f.write_str("Starting"),
            LogEntry::Resumed { frame_counter } => {
                write!(f, "Session resumed at {}", frame_counter)
            }
            LogEntry::JoinRequested => f.write_str("Join requested"),
            LogEntry::JoinRetry { at } => write!(f, "Join retry at {}", at),
            LogEntry::PacketQueued { frame_counter } => {
                write!(f, "Packet queued {}", frame_counter)
            }
            LogEntry::TxRxPending => f.write_str("OP_TXRXPEND, not sending"),
            LogEntry::DutyCycleDeferred { until } => write!(f, "Duty cycle, deferred to {}", until),
            LogEntry::NothingToSend => f.write_str("Nothing to send"),
            LogEntry::ReceivedAck => f.write_str("Received ack"),
            LogEntry::Received { port, len } => {
                write!(f, "Received {} bytes of payload on port {}", len, port)
            }
            LogEntry::SessionReset => f.write_str("Session reset"),
            LogEntry::Failed(e) => write!(f, "Error: {}", e),
        }
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.dev_eui.iter() {
            write!(f, "{:02X}", byte)?;
        }
        write!(f, " {}: {}", self.time, self.entry)
    }
}
