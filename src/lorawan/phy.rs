//! Time-on-air of the frames the node sends
//!
//! The duty-cycle accounting needs the airtime of every transmission. It is
//! derived from the PHY payload length and the data rate with the LoRa symbol
//! formula: explicit header, CRC on, coding rate 4/5 and low data rate
//! optimisation for SF11 and SF12 on 125 kHz.

use super::region::DataRate;
use super::time::Ticks;

/// Preamble length in symbols
pub const PREAMBLE_SYMBOLS: u64 = 8;

/// Coding rate 4/5
const CODING_RATE: i64 = 1;

/// MAC header length
pub const MHDR_LEN: usize = 1;
/// Message integrity code length
pub const MIC_LEN: usize = 4;
/// Frame header length without options: DevAddr, FCtrl, FCnt
pub const FHDR_LEN: usize = 4 + 1 + 2;
/// Frame port length
pub const FPORT_LEN: usize = 1;

/// Join request: MHDR, JoinEUI, DevEUI, DevNonce, MIC
pub const JOIN_REQUEST_LEN: usize = MHDR_LEN + 8 + 8 + 2 + MIC_LEN;

/// Overhead added to an application payload in a data uplink
pub const UPLINK_OVERHEAD: usize = MHDR_LEN + FHDR_LEN + FPORT_LEN + MIC_LEN;

/// PHY payload length of a data uplink carrying `payload_len` application bytes
pub fn uplink_phy_len(payload_len: usize) -> usize {
    payload_len + UPLINK_OVERHEAD
}

/// Duration of one symbol in microseconds
pub fn symbol_time_micros(data_rate: DataRate) -> u64 {
    (1u64 << data_rate.spreading_factor()) * 1_000_000 / data_rate.bandwidth() as u64
}

/// Time on air of a frame with `phy_len` PHY payload bytes
pub fn time_on_air(data_rate: DataRate, phy_len: usize) -> Ticks {
    let sf = data_rate.spreading_factor() as i64;
    let low_data_rate = sf >= 11 && data_rate.bandwidth() == 125_000;
    let de = if low_data_rate { 1 } else { 0 };

    let numerator = 8 * phy_len as i64 - 4 * sf + 28 + 16;
    let denominator = 4 * (sf - 2 * de);
    let blocks = if numerator > 0 {
        (numerator + denominator - 1) / denominator
    } else {
        0
    };
    let payload_symbols = 8 + blocks * (CODING_RATE + 4);

    // the preamble is followed by 4.25 sync symbols, count in quarter symbols
    let quarter_symbols = (PREAMBLE_SYMBOLS * 4 + 17) + payload_symbols as u64 * 4;
    Ticks::from_micros(quarter_symbols * symbol_time_micros(data_rate) / 4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_uplink_at_sf7() {
        // 5 bytes of application data: 18 byte PHY payload, 51.456 ms on air
        let airtime = time_on_air(DataRate::SF7BW125, uplink_phy_len(5));
        assert_eq!(airtime, Ticks::from_micros(51_456));
    }

    #[test]
    fn join_request_at_sf12() {
        // 23 byte join request with low data rate optimisation, 1482.752 ms
        let airtime = time_on_air(DataRate::SF12BW125, JOIN_REQUEST_LEN);
        assert_eq!(airtime, Ticks::from_micros(1_482_752));
    }

    #[test]
    fn slower_rates_take_longer() {
        let fast = time_on_air(DataRate::SF7BW125, JOIN_REQUEST_LEN);
        let slow = time_on_air(DataRate::SF10BW125, JOIN_REQUEST_LEN);
        let wide = time_on_air(DataRate::SF7BW250, JOIN_REQUEST_LEN);
        assert!(slow > fast);
        assert!(wide < fast);
    }
}
