use core::fmt::Debug;

use crate::config::device::{AESKey, DevAddr, EUI64};
use crate::lorawan::events::MacEvent;
use crate::lorawan::region::DataRate;
use crate::lorawan::session::SessionKeys;

/// Over-the-air activation request
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct JoinRequest<'a> {
    /// Device EUI
    pub dev_eui: &'a EUI64,
    /// Application EUI
    pub app_eui: &'a EUI64,
    /// Root key the session keys are derived from
    pub app_key: &'a AESKey,
    /// Sub-band the request goes out in
    pub sub_band: u8,
    /// Data rate of the request
    pub data_rate: DataRate,
    /// Transmit power in dBm
    pub tx_power: i8,
}

/// Data uplink request
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UplinkRequest<'a> {
    /// Sub-band the uplink goes out in
    pub sub_band: u8,
    /// Uplink frame counter
    pub frame_counter: u32,
    /// Application port
    pub port: u8,
    /// Request an acknowledgement
    pub confirmed: bool,
    /// Application payload, not yet encrypted
    pub payload: &'a [u8],
    /// Data rate of the uplink
    pub data_rate: DataRate,
    /// Transmit power in dBm
    pub tx_power: i8,
}

/// Radio/MAC layer the node core drives
///
/// The MAC layer owns channel selection inside a sub-band, frame encoding,
/// encryption, key derivation and the receive windows. Every exchange is
/// started by `join` or `transmit` and finishes with an event returned by
/// `poll_event`; nothing here blocks for the duration of an exchange.
pub trait MacRadio {
    /// Error type for radio/MAC operations
    #[cfg(not(feature = "defmt"))]
    type Error: Debug;
    /// Error type for radio/MAC operations
    #[cfg(feature = "defmt")]
    type Error: Debug + defmt::Format;

    /// Reset the MAC layer, dropping any exchange in progress
    fn reset(&mut self) -> Result<(), Self::Error>;

    /// Start an over-the-air activation exchange
    fn join(&mut self, request: &JoinRequest<'_>) -> Result<(), Self::Error>;

    /// Start a data uplink exchange
    fn transmit(&mut self, request: &UplinkRequest<'_>) -> Result<(), Self::Error>;

    /// Next pending event
    fn poll_event(&mut self) -> nb::Result<MacEvent, Self::Error>;

    /// Enable or disable link check validation
    fn set_link_check_mode(&mut self, enabled: bool) -> Result<(), Self::Error>;

    /// Hand a restored session to the MAC layer
    fn restore_session(
        &mut self,
        dev_addr: DevAddr,
        keys: &SessionKeys,
        frame_counter: u32,
    ) -> Result<(), Self::Error>;
}
