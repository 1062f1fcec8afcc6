//! Device and node configuration
//!
//! This module contains the provisioned identity of the device and the
//! tunables of the scheduling core:
//! - Device identity (DevEUI, AppEUI, AppKey)
//! - Uplink cadence, port and MAC parameters
//! - Join retry backoff

/// Device identity and key types
pub mod device;

/// Scheduling and MAC parameters
pub mod node;

pub use device::DeviceConfig;
pub use node::{JoinBackoff, NodeConfig};
