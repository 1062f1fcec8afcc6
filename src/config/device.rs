use core::fmt;

/// EUI-64 (8 bytes)
pub type EUI64 = [u8; 8];

/// AES-128 key (16 bytes)
#[derive(Clone, PartialEq, Eq)]
pub struct AESKey([u8; 16]);

impl AESKey {
    /// Wrap raw key bytes
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

// keys never end up in logs
impl fmt::Debug for AESKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AESKey(..)")
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for AESKey {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "AESKey(..)")
    }
}

/// Device Address (4 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DevAddr([u8; 4]);

impl DevAddr {
    /// Wrap raw address bytes
    pub const fn new(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Raw address bytes
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// Address as a 32-bit value, first byte most significant
    pub fn to_u32(self) -> u32 {
        u32::from_be_bytes(self.0)
    }
}

impl From<u32> for DevAddr {
    fn from(value: u32) -> Self {
        Self(value.to_be_bytes())
    }
}

/// Provisioned identity used for over-the-air activation
///
/// Immutable once the device is built. The EUIs are kept in the byte order
/// the radio/MAC layer expects; the core never interprets them.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceConfig {
    /// Device EUI (unique device identifier)
    pub dev_eui: EUI64,
    /// Application EUI
    pub app_eui: EUI64,
    /// Application key (root key for OTAA)
    pub app_key: AESKey,
}

impl DeviceConfig {
    /// Create a new OTAA device configuration
    pub fn new_otaa(dev_eui: EUI64, app_eui: EUI64, app_key: AESKey) -> Self {
        Self {
            dev_eui,
            app_eui,
            app_key,
        }
    }
}
