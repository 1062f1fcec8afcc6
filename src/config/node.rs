use crate::lorawan::region::DataRate;
use crate::lorawan::time::Ticks;

/// Join retry backoff
///
/// The n-th consecutive failure waits `base * 2^min(n - 1, max_exponent)`
/// plus a random jitter below `jitter`, and never less than the join
/// sub-band's duty-cycle allowance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct JoinBackoff {
    /// Delay after the first failure
    pub base: Ticks,
    /// Cap on the doubling
    pub max_exponent: u8,
    /// Upper bound of the random jitter
    pub jitter: Ticks,
}

impl Default for JoinBackoff {
    fn default() -> Self {
        Self {
            base: Ticks::from_secs(10),
            max_exponent: 6,
            jitter: Ticks::from_secs(2),
        }
    }
}

impl JoinBackoff {
    /// Delay before the retry following `failures` consecutive failures
    pub fn delay(&self, failures: u32, random: u32) -> Ticks {
        let exponent = failures.saturating_sub(1).min(self.max_exponent as u32);
        let jitter = match self.jitter.ticks() {
            0 => Ticks::ZERO,
            bound => Ticks::from_ticks(random % bound),
        };
        let factor = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).saturating_add(jitter)
    }
}

/// Scheduling and MAC parameters of the node
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NodeConfig {
    /// Interval between uplinks, may become longer due to duty cycle limits
    pub tx_interval: Ticks,
    /// Application port of data uplinks
    pub port: u8,
    /// Request acknowledgement of data uplinks
    pub confirmed: bool,
    /// Data rate used for joins and uplinks until the network sets one
    pub data_rate: DataRate,
    /// Transmit power in dBm, passed through to the radio/MAC layer
    pub tx_power: i8,
    /// Join retry backoff
    pub join_backoff: JoinBackoff,
    /// Reset the session and rejoin when the MAC reports a dead link
    pub rejoin_on_link_dead: bool,
    /// Frame counters reserved per session write to non-volatile storage
    pub frame_counter_reserve: u32,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            tx_interval: Ticks::from_secs(60),
            port: 1,
            confirmed: false,
            data_rate: DataRate::SF7BW125,
            tx_power: 14,
            join_backoff: JoinBackoff::default(),
            rejoin_on_link_dead: false,
            frame_counter_reserve: 16,
        }
    }
}
