use std::collections::HashSet;

use rand::{rngs::StdRng, Rng, SeedableRng};

use lorawan_node::{
    config::{
        device::{AESKey, DevAddr, DeviceConfig},
        node::NodeConfig,
    },
    lorawan::{
        duty_cycle::{DutyCycle, DutyCycleTracker, AVERAGING_WINDOW},
        guard::{Busy, StaleHandle, TransactionGuard, TransactionHandle, TransactionKind},
        job::{JobAction, JobSlot, ScheduledJob},
        phy,
        region::{DataRate, Region, SubBand, EU868, US915},
        session::{SessionKeys, SessionParams, SessionStore},
        time::{Instant, Ticks},
    },
};

#[test]
fn test_device_config() {
    let dev_eui = [0x01; 8];
    let app_eui = [0x02; 8];
    let app_key = AESKey::new([0x03; 16]);

    let config = DeviceConfig::new_otaa(dev_eui, app_eui, app_key);

    assert_eq!(&config.dev_eui, &dev_eui);
    assert_eq!(&config.app_eui, &app_eui);
    assert_eq!(config.app_key.as_bytes(), &[0x03; 16]);
    assert_eq!(format!("{:?}", config.app_key), "AESKey(..)");
}

#[test]
fn test_node_config_defaults() {
    let config = NodeConfig::default();
    assert_eq!(config.tx_interval, Ticks::from_secs(60));
    assert_eq!(config.port, 1);
    assert!(!config.confirmed);
    assert!(!config.rejoin_on_link_dead);
}

#[test]
fn test_eu868_region() {
    let mut region = EU868::new();
    assert_eq!(region.join_sub_bands().collect::<Vec<_>>(), [1]);
    assert_eq!(region.uplink_sub_bands().collect::<Vec<_>>(), [0, 1]);
    assert_eq!(region.sub_band_of(868_100_000), Some(1));
    assert_eq!(region.sub_band_of(869_525_000), Some(3));
    assert_eq!(region.sub_bands()[2].duty_cycle, DutyCycle::PERMILLE_1);

    region.set_sub_band_enabled(3, true);
    assert_eq!(region.uplink_sub_bands().collect::<Vec<_>>(), [0, 1, 3]);

    assert_eq!(region.max_payload_size(DataRate::SF12BW125), 51);
    assert_eq!(region.max_payload_size(DataRate::SF7BW125), 222);
    assert!(!region.supports_data_rate(DataRate::SF8BW500));
    assert_eq!(region.slower_data_rate(DataRate::SF12BW125), None);
}

#[test]
fn test_us915_region() {
    let mut region = US915::new();
    assert_eq!(region.uplink_sub_bands().count(), 8);
    assert!(region
        .sub_bands()
        .iter()
        .all(|band| band.duty_cycle == DutyCycle::UNRESTRICTED));

    region.select_sub_band(1);
    assert_eq!(region.selected_sub_band(), Some(1));
    assert_eq!(region.join_sub_bands().collect::<Vec<_>>(), [1]);
    assert_eq!(region.uplink_sub_bands().collect::<Vec<_>>(), [1]);
    assert_eq!(region.sub_band_of(903_900_000), Some(1));

    assert_eq!(region.max_payload_size(DataRate::SF10BW125), 11);
    assert_eq!(
        region.slower_data_rate(DataRate::SF9BW125),
        Some(DataRate::SF10BW125)
    );
}

#[test]
fn test_time_on_air_ordering() {
    let rates = EU868::new().data_rates().to_vec();
    for pair in rates.windows(2) {
        // fastest last
        assert!(phy::time_on_air(pair[0], 20) > phy::time_on_air(pair[1], 20));
    }
    for len in 1..60 {
        assert!(
            phy::time_on_air(DataRate::SF9BW125, len + 1)
                >= phy::time_on_air(DataRate::SF9BW125, len)
        );
    }
}

#[test]
fn test_duty_cycle_property_random_traffic() {
    let mut rng = StdRng::seed_from_u64(0x4C6F_5261);
    let band = SubBand::new(0, 868_000_000, 868_600_000, DutyCycle::PERCENT_1);

    // start close to the counter wrap
    let mut now = Instant::from_ticks(u32::MAX - 50_000_000);
    let mut elapsed: u64 = 0;
    let mut tracker = DutyCycleTracker::new(&[band], now);
    let mut transmissions: Vec<(u64, u64)> = Vec::new();
    let max_airtime = Ticks::from_secs(2).ticks();

    for _ in 0..3_000 {
        let step = rng.gen_range(1..=Ticks::from_secs(20).ticks());
        now = now + Ticks::from_ticks(step);
        elapsed += step as u64;
        tracker.expire(now);

        let allowed = tracker.earliest_send_time(0).unwrap();
        if now.is_before(allowed) {
            continue;
        }

        let airtime = rng.gen_range(Ticks::from_millis(20).ticks()..=max_airtime);
        let start = elapsed;
        now = now + Ticks::from_ticks(airtime);
        elapsed += airtime as u64;

        let before = tracker.earliest_send_time(0).unwrap();
        tracker
            .record_transmission(0, Ticks::from_ticks(airtime), now)
            .unwrap();
        let after = tracker.earliest_send_time(0).unwrap();
        assert!(!after.is_before(before), "next allowed time moved backwards");
        assert!(now.is_before(after));

        transmissions.push((start, airtime as u64));
    }
    assert!(transmissions.len() > 100);

    // airtime started inside any averaging window stays within 1 %, give or
    // take the transmission cut by the window's end
    let window = AVERAGING_WINDOW.ticks() as u64;
    let limit = window / 100 + max_airtime as u64;
    for (i, (start, _)) in transmissions.iter().enumerate() {
        let on_air: u64 = transmissions[i..]
            .iter()
            .take_while(|(s, _)| *s < start + window)
            .map(|(_, airtime)| airtime)
            .sum();
        assert!(on_air <= limit, "{} ticks on air in one window", on_air);
    }
}

#[test]
fn test_duty_cycle_stricter_band_waits_longer() {
    let now = Instant::from_ticks(0);
    let bands = [
        SubBand::new(0, 865_000_000, 867_999_999, DutyCycle::PERCENT_1),
        SubBand::new(2, 868_700_000, 869_200_000, DutyCycle::PERMILLE_1),
    ];
    let mut tracker = DutyCycleTracker::new(&bands, now);
    let airtime = Ticks::from_millis(100);
    let end = now + airtime;
    tracker.record_transmission(0, airtime, end).unwrap();
    tracker.record_transmission(2, airtime, end).unwrap();

    assert_eq!(
        tracker.earliest_send_time(0),
        Some(now + Ticks::from_secs(10))
    );
    assert_eq!(
        tracker.earliest_send_time(2),
        Some(now + Ticks::from_secs(100))
    );
    assert_eq!(
        tracker.earliest_available([0, 2]),
        Some((0, now + Ticks::from_secs(10)))
    );
}

#[test]
fn test_guard_random_interleavings() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut guard = TransactionGuard::new();
    let mut held: Option<TransactionHandle> = None;
    let now = Instant::from_ticks(0);

    for _ in 0..10_000 {
        if rng.gen_bool(0.6) {
            let kind = if rng.gen() {
                TransactionKind::Join
            } else {
                TransactionKind::Uplink
            };
            match guard.try_begin(kind, now, 0, Ticks::ZERO) {
                Ok(handle) => {
                    assert!(held.is_none(), "second transaction began");
                    held = Some(handle);
                }
                Err(Busy(in_flight)) => {
                    assert_eq!(Some(in_flight), held.as_ref().map(|h| h.kind()));
                }
            }
        } else if let Some(handle) = held.take() {
            assert!(guard.complete(handle).is_ok());
        }
        assert_eq!(guard.is_busy(), held.is_some());
    }
}

#[test]
fn test_guard_rejects_handle_of_aborted_transaction() {
    let mut guard = TransactionGuard::new();
    let now = Instant::from_ticks(0);

    let aborted = guard
        .try_begin(TransactionKind::Join, now, 1, Ticks::ZERO)
        .unwrap();
    assert!(guard.abort().is_some());
    let current = guard
        .try_begin(TransactionKind::Uplink, now, 0, Ticks::ZERO)
        .unwrap();

    assert_eq!(guard.complete(aborted), Err(StaleHandle));
    assert!(guard.is_busy());
    let pending = guard.complete(current).unwrap();
    assert_eq!(pending.kind, TransactionKind::Uplink);
    assert!(!guard.is_busy());
}

#[test]
fn test_frame_counter_random_power_cycles() {
    let mut rng = StdRng::seed_from_u64(42);
    let app_key = AESKey::new([0x5A; 16]);
    let reserve = rng.gen_range(1..32);

    let mut session = SessionStore::new(DataRate::SF7BW125, 14, reserve);
    session
        .mark_joined(
            DevAddr::from(0x2601_0042),
            SessionKeys::new(AESKey::new([1; 16]), AESKey::new([2; 16])),
            SessionParams::default(),
        )
        .unwrap();

    let mut stored: Option<Vec<u8>> = None;
    let mut issued = HashSet::new();
    let mut last: Option<u32> = None;
    for _ in 0..2_000 {
        if stored.is_some() && rng.gen_ratio(1, 40) {
            // power cycle, only the stored snapshot survives
            let mut resumed = SessionStore::new(DataRate::SF12BW125, 0, reserve);
            resumed
                .restore(stored.as_deref().unwrap(), &app_key)
                .unwrap();
            session = resumed;
            last = None;
            continue;
        }

        if session.needs_persist() {
            let snapshot = session.snapshot(&app_key).unwrap();
            stored = Some(snapshot.as_bytes().to_vec());
            session.commit(&snapshot);
        }
        let fcnt = session.next_frame_counter().unwrap();
        assert!(issued.insert(fcnt), "frame counter {} reused", fcnt);
        if let Some(previous) = last {
            assert_eq!(fcnt, previous + 1);
        }
        last = Some(fcnt);
    }
}

#[test]
fn test_job_slot_holds_one_job() {
    let mut slot = JobSlot::default();
    let now = Instant::from_ticks(100);

    assert!(slot
        .arm(ScheduledJob::new(now + Ticks::from_secs(60), JobAction::DoUplink))
        .is_none());
    let replaced = slot.arm(ScheduledJob::new(
        now + Ticks::from_secs(5),
        JobAction::DoJoin,
    ));
    assert_eq!(replaced.map(|job| job.action), Some(JobAction::DoUplink));

    assert!(slot.take_due(now).is_none());
    let due = slot.take_due(now + Ticks::from_secs(5)).unwrap();
    assert_eq!(due.action, JobAction::DoJoin);
    assert!(slot.peek().is_none());
}
