//! LoRaWAN end-node core in Rust
//!
//! This crate provides the session and transmission scheduling core of a
//! LoRaWAN end node: over-the-air activation with unbounded, duty-cycle
//! gated retries, session state with replay-safe frame counters, per
//! sub-band duty-cycle budgets, a single in-flight radio transaction and a
//! fixed-interval uplink cycle.
//!
//! The radio driver, frame encryption and key derivation live behind the
//! [`radio::MacRadio`] trait; clock, random numbers, persistence and the
//! event log are supplied through [`device::Platform`].
//!
//! # Features
//! - `no_std`, no allocation
//! - EU868 and US915 sub-band plans
//! - Session snapshots sealed with AES-CMAC
//! - Optional `defmt` logging
//!
//! # Example
//!
//! `cargo run --example periodic_uplink --features std` runs the same loop
//! against a simulated network.
//!
//! ```ignore
//! use lorawan_node::{
//!     config::{device::{AESKey, DeviceConfig}, node::NodeConfig},
//!     device::LoRaWANDevice,
//!     lorawan::region::EU868,
//! };
//!
//! // Create device configuration
//! let identity = DeviceConfig::new_otaa(
//!     [0x00; 8], // DevEUI
//!     [0x00; 8], // AppEUI
//!     AESKey::new([0x00; 16]), // AppKey
//! );
//!
//! // Platform implementation omitted
//! let mut device = LoRaWANDevice::new(platform, identity, NodeConfig::default(), EU868::new())?;
//! device.resume()?;
//! device.start();
//! device.request_send(b"Hello, LoRaWAN!")?;
//!
//! loop {
//!     match device.run_once() {
//!         Ok(_) => {}
//!         Err(nb::Error::WouldBlock) => sleep_until(device.next_wakeup()),
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![cfg_attr(not(any(test, feature = "std")), no_std)]

// This mod MUST go first, so that the others see its macros.
#[macro_use]
mod fmt;

/// Device and network configuration
pub mod config;

/// Cryptographic functions
pub mod crypto;

/// High-level device interface
pub mod device;

/// LoRaWAN end-node components
pub mod lorawan;

/// Radio/MAC abstraction layer
pub mod radio;
