use heapless::Vec;

use super::duty_cycle::DutyCycle;

/// Maximum number of sub-bands a region may define
pub const MAX_SUB_BANDS: usize = 8;

/// Data rate identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(missing_docs)]
#[repr(u8)]
pub enum DataRate {
    SF12BW125 = 0,
    SF11BW125 = 1,
    SF10BW125 = 2,
    SF9BW125 = 3,
    SF8BW125 = 4,
    SF7BW125 = 5,
    SF7BW250 = 6,
    SF8BW500 = 7,
}

impl DataRate {
    /// Get spreading factor
    pub fn spreading_factor(&self) -> u8 {
        match self {
            DataRate::SF12BW125 => 12,
            DataRate::SF11BW125 => 11,
            DataRate::SF10BW125 => 10,
            DataRate::SF9BW125 => 9,
            DataRate::SF8BW125 | DataRate::SF8BW500 => 8,
            DataRate::SF7BW125 | DataRate::SF7BW250 => 7,
        }
    }

    /// Get bandwidth in Hz
    pub fn bandwidth(&self) -> u32 {
        match self {
            DataRate::SF7BW250 => 250_000,
            DataRate::SF8BW500 => 500_000,
            _ => 125_000,
        }
    }
}

impl TryFrom<u8> for DataRate {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DataRate::SF12BW125),
            1 => Ok(DataRate::SF11BW125),
            2 => Ok(DataRate::SF10BW125),
            3 => Ok(DataRate::SF9BW125),
            4 => Ok(DataRate::SF8BW125),
            5 => Ok(DataRate::SF7BW125),
            6 => Ok(DataRate::SF7BW250),
            7 => Ok(DataRate::SF8BW500),
            _ => Err(()),
        }
    }
}

/// Regulatory group of channels sharing one duty-cycle budget
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SubBand {
    /// Sub-band identifier, unique within the region
    pub id: u8,
    /// Lowest frequency in Hz
    pub min_frequency: u32,
    /// Highest frequency in Hz
    pub max_frequency: u32,
    /// Permitted share of time on air
    pub duty_cycle: DutyCycle,
    /// Whether join requests may use this sub-band
    pub join: bool,
    /// Whether the sub-band is enabled for uplinks
    pub enabled: bool,
}

impl SubBand {
    /// Enabled sub-band that is not used for joins
    pub const fn new(id: u8, min_frequency: u32, max_frequency: u32, duty_cycle: DutyCycle) -> Self {
        Self {
            id,
            min_frequency,
            max_frequency,
            duty_cycle,
            join: false,
            enabled: true,
        }
    }

    /// Mark the sub-band as usable for join requests
    pub const fn with_join(mut self) -> Self {
        self.join = true;
        self
    }

    /// Does the sub-band contain `frequency`?
    pub fn contains(&self, frequency: u32) -> bool {
        (self.min_frequency..=self.max_frequency).contains(&frequency)
    }
}

/// Generic region trait
///
/// Channel selection inside a sub-band belongs to the radio/MAC layer; a
/// region only describes the duty-cycle groups and the data rates the node
/// may ask for.
pub trait Region {
    /// All sub-bands of the region
    fn sub_bands(&self) -> &[SubBand];

    /// Data rate used when the configured one is not supported
    fn default_data_rate(&self) -> DataRate;

    /// Data rates supported for uplinks, fastest last
    fn data_rates(&self) -> &[DataRate];

    /// Get maximum application payload size for a data rate
    fn max_payload_size(&self, data_rate: DataRate) -> usize;

    /// Is `data_rate` usable for uplinks in this region?
    fn supports_data_rate(&self, data_rate: DataRate) -> bool {
        self.data_rates().contains(&data_rate)
    }

    /// Next slower data rate, `None` at the slowest
    fn slower_data_rate(&self, data_rate: DataRate) -> Option<DataRate> {
        let rates = self.data_rates();
        let position = rates.iter().position(|dr| *dr == data_rate)?;
        position.checked_sub(1).map(|i| rates[i])
    }

    /// Sub-bands eligible for join requests
    fn join_sub_bands(&self) -> impl Iterator<Item = u8> + '_ {
        self.sub_bands()
            .iter()
            .filter(|b| b.enabled && b.join)
            .map(|b| b.id)
    }

    /// Sub-bands eligible for data uplinks
    fn uplink_sub_bands(&self) -> impl Iterator<Item = u8> + '_ {
        self.sub_bands().iter().filter(|b| b.enabled).map(|b| b.id)
    }

    /// Sub-band containing `frequency`
    fn sub_band_of(&self, frequency: u32) -> Option<u8> {
        self.sub_bands()
            .iter()
            .find(|b| b.contains(frequency))
            .map(|b| b.id)
    }
}

/// EU868 region configuration
///
/// Sub-bands follow the ETSI EN 300 220 groups. Sub-bands 0 and 1 carry the
/// default and join channels and are enabled out of the box.
#[derive(Debug, Clone)]
pub struct EU868 {
    sub_bands: Vec<SubBand, MAX_SUB_BANDS>,
}

const EU868_DATA_RATES: [DataRate; 7] = [
    DataRate::SF12BW125,
    DataRate::SF11BW125,
    DataRate::SF10BW125,
    DataRate::SF9BW125,
    DataRate::SF8BW125,
    DataRate::SF7BW125,
    DataRate::SF7BW250,
];

impl Default for EU868 {
    fn default() -> Self {
        let bands = [
            SubBand::new(0, 865_000_000, 867_999_999, DutyCycle::PERCENT_1),
            SubBand::new(1, 868_000_000, 868_600_000, DutyCycle::PERCENT_1).with_join(),
            SubBand::new(2, 868_700_000, 869_200_000, DutyCycle::PERMILLE_1),
            SubBand::new(3, 869_400_000, 869_650_000, DutyCycle::PERCENT_10),
            SubBand::new(4, 869_700_000, 870_000_000, DutyCycle::PERCENT_1),
        ];

        let mut sub_bands = Vec::new();
        for mut band in bands {
            band.enabled = band.id <= 1;
            // five entries always fit
            let _ = sub_bands.push(band);
        }
        Self { sub_bands }
    }
}

impl EU868 {
    /// Create a new EU868 region configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable a sub-band for uplinks
    pub fn set_sub_band_enabled(&mut self, id: u8, enabled: bool) {
        if let Some(band) = self.sub_bands.iter_mut().find(|b| b.id == id) {
            band.enabled = enabled;
        }
    }
}

impl Region for EU868 {
    fn sub_bands(&self) -> &[SubBand] {
        &self.sub_bands
    }

    fn default_data_rate(&self) -> DataRate {
        DataRate::SF12BW125
    }

    fn data_rates(&self) -> &[DataRate] {
        &EU868_DATA_RATES
    }

    fn max_payload_size(&self, data_rate: DataRate) -> usize {
        match data_rate {
            DataRate::SF12BW125 | DataRate::SF11BW125 | DataRate::SF10BW125 => 51,
            DataRate::SF9BW125 => 115,
            DataRate::SF8BW125 | DataRate::SF7BW125 | DataRate::SF7BW250 => 222,
            DataRate::SF8BW500 => 0,
        }
    }
}

/// US915 region configuration
///
/// The 64 + 8 upstream channels are grouped into eight sub-bands of eight
/// 125 kHz channels plus one 500 kHz channel. The band has no duty-cycle limit.
#[derive(Debug, Clone)]
pub struct US915 {
    sub_bands: Vec<SubBand, MAX_SUB_BANDS>,
    /// Current sub-band (0-7)
    sub_band: Option<u8>,
}

const US915_DATA_RATES: [DataRate; 5] = [
    DataRate::SF10BW125,
    DataRate::SF9BW125,
    DataRate::SF8BW125,
    DataRate::SF7BW125,
    DataRate::SF8BW500,
];

impl Default for US915 {
    fn default() -> Self {
        let mut sub_bands = Vec::new();
        for id in 0..MAX_SUB_BANDS as u8 {
            let first = 902_300_000 + id as u32 * 1_600_000;
            let band = SubBand::new(id, first, first + 1_400_000, DutyCycle::UNRESTRICTED)
                .with_join();
            // eight entries always fit
            let _ = sub_bands.push(band);
        }
        Self {
            sub_bands,
            sub_band: None,
        }
    }
}

impl US915 {
    /// Create a new US915 region configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sub-band (0-7), zero origin
    ///
    /// Only the selected sub-band stays enabled, it must match the gateway.
    pub fn select_sub_band(&mut self, sub_band: u8) {
        let sub_band = sub_band.min(MAX_SUB_BANDS as u8 - 1);
        self.sub_band = Some(sub_band);
        for band in self.sub_bands.iter_mut() {
            band.enabled = band.id == sub_band;
        }
    }

    /// Currently selected sub-band, `None` when all are enabled
    pub fn selected_sub_band(&self) -> Option<u8> {
        self.sub_band
    }
}

impl Region for US915 {
    fn sub_bands(&self) -> &[SubBand] {
        &self.sub_bands
    }

    fn default_data_rate(&self) -> DataRate {
        DataRate::SF10BW125
    }

    fn data_rates(&self) -> &[DataRate] {
        &US915_DATA_RATES
    }

    fn max_payload_size(&self, data_rate: DataRate) -> usize {
        match data_rate {
            DataRate::SF10BW125 => 11,
            DataRate::SF9BW125 => 53,
            DataRate::SF8BW125 => 125,
            DataRate::SF7BW125 | DataRate::SF8BW500 => 242,
            _ => 0,
        }
    }
}
