//! Periodic sensor uplinks against a simulated radio/MAC layer
//!
//! The simulated network accepts the join after five seconds and completes
//! every uplink two seconds after it was handed over. Time is virtual: the
//! loop jumps straight to the next wakeup instead of sleeping.

use std::collections::VecDeque;

use rand::{rngs::StdRng, Rng as _, SeedableRng};

use lorawan_node::{
    config::{
        device::{AESKey, DevAddr, DeviceConfig},
        node::NodeConfig,
    },
    device::{
        clock::Clock, event_log::LogRecord, non_volatile_store::NonVolatileStore, rng::Rng,
        LoRaWANDevice, Platform,
    },
    lorawan::{
        events::{JoinAccept, MacEvent},
        region::EU868,
        session::{SessionKeys, SessionParams},
        time::{Instant, Ticks},
        uplink::Payload,
    },
    radio::{JoinRequest, MacRadio, UplinkRequest},
};

#[derive(Debug)]
struct Never;

// Sensor data structure
#[derive(Default)]
struct SensorData {
    temperature: i16,
    humidity: u8,
    pressure: u16,
}

impl SensorData {
    fn to_bytes(&self) -> [u8; 5] {
        let mut bytes = [0u8; 5];
        bytes[0..2].copy_from_slice(&self.temperature.to_be_bytes());
        bytes[2] = self.humidity;
        bytes[3..5].copy_from_slice(&self.pressure.to_be_bytes());
        bytes
    }
}

/// Network stand-in raising events once their time has come
#[derive(Default)]
struct SimulatedMac {
    now: Instant,
    scheduled: VecDeque<(Instant, MacEvent)>,
}

impl MacRadio for SimulatedMac {
    type Error = Never;

    fn reset(&mut self) -> Result<(), Self::Error> {
        self.scheduled.clear();
        Ok(())
    }

    fn join(&mut self, request: &JoinRequest<'_>) -> Result<(), Self::Error> {
        println!(
            "  join request in sub-band {} at {:?}",
            request.sub_band, request.data_rate
        );
        let accept = MacEvent::JoinAccepted(JoinAccept {
            dev_addr: DevAddr::from(0x2601_1F00),
            keys: SessionKeys::new(AESKey::new([0x11; 16]), AESKey::new([0x22; 16])),
            params: SessionParams::default(),
        });
        self.scheduled
            .push_back((self.now + Ticks::from_secs(5), accept));
        Ok(())
    }

    fn transmit(&mut self, request: &UplinkRequest<'_>) -> Result<(), Self::Error> {
        println!(
            "  uplink fcnt {} port {} in sub-band {}: {:02X?}",
            request.frame_counter, request.port, request.sub_band, request.payload
        );
        let complete = MacEvent::TransactionComplete {
            ack: false,
            received: None,
        };
        self.scheduled
            .push_back((self.now + Ticks::from_secs(2), complete));
        Ok(())
    }

    fn poll_event(&mut self) -> nb::Result<MacEvent, Self::Error> {
        match self.scheduled.front() {
            Some((at, _)) if self.now.has_reached(*at) => self
                .scheduled
                .pop_front()
                .map(|(_, event)| event)
                .ok_or(nb::Error::WouldBlock),
            _ => Err(nb::Error::WouldBlock),
        }
    }

    fn set_link_check_mode(&mut self, _enabled: bool) -> Result<(), Self::Error> {
        Ok(())
    }

    fn restore_session(
        &mut self,
        _dev_addr: DevAddr,
        _keys: &SessionKeys,
        _frame_counter: u32,
    ) -> Result<(), Self::Error> {
        Ok(())
    }
}

struct VirtualClock {
    now: Instant,
}

impl Clock for VirtualClock {
    fn now(&mut self) -> Instant {
        self.now
    }
}

struct SeededRng(StdRng);

impl Rng for SeededRng {
    type Error = Never;

    fn next_u32(&mut self) -> Result<u32, Self::Error> {
        Ok(self.0.gen())
    }
}

#[derive(Default)]
struct RamStore {
    data: Option<Vec<u8>>,
}

impl NonVolatileStore for RamStore {
    type Error = Never;

    fn save(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        self.data = Some(data.to_vec());
        Ok(())
    }

    fn load(&mut self, buf: &mut [u8]) -> Result<Option<usize>, Self::Error> {
        Ok(self.data.as_ref().map(|data| {
            let len = data.len().min(buf.len());
            buf[..len].copy_from_slice(&data[..len]);
            data.len()
        }))
    }

    fn clear(&mut self) -> Result<(), Self::Error> {
        self.data = None;
        Ok(())
    }
}

struct SimulatedBoard {
    mac: SimulatedMac,
    clock: VirtualClock,
    rng: SeededRng,
    store: RamStore,
    sensor: SensorData,
}

impl Platform for SimulatedBoard {
    type Mac = SimulatedMac;
    type Clock = VirtualClock;
    type Rng = SeededRng;
    type Store = RamStore;

    fn mac(&mut self) -> &mut Self::Mac {
        self.mac.now = self.clock.now;
        &mut self.mac
    }

    fn clock(&mut self) -> &mut Self::Clock {
        &mut self.clock
    }

    fn rng(&mut self) -> &mut Self::Rng {
        &mut self.rng
    }

    fn non_volatile_store(&mut self) -> &mut Self::Store {
        &mut self.store
    }

    fn log_event(&mut self, record: &LogRecord) {
        println!("{}", record);
    }

    fn next_payload(&mut self) -> Option<Payload> {
        // Simulate sensor readings
        self.sensor.temperature += 1;
        self.sensor.humidity = 60;
        self.sensor.pressure = 1013;
        Payload::from_slice(&self.sensor.to_bytes()).ok()
    }
}

fn main() {
    let board = SimulatedBoard {
        mac: SimulatedMac::default(),
        clock: VirtualClock {
            now: Instant::from_ticks(0),
        },
        rng: SeededRng(StdRng::seed_from_u64(1)),
        store: RamStore::default(),
        sensor: SensorData {
            temperature: 20,
            ..SensorData::default()
        },
    };

    // Create device configuration
    let identity = DeviceConfig::new_otaa(
        [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08], // DevEUI
        [0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01], // AppEUI
        AESKey::new([
            0x2B, 0x7E, 0x15, 0x16, 0x28, 0xAE, 0xD2, 0xA6, 0xAB, 0xF7, 0x15, 0x88, 0x09, 0xCF,
            0x4F, 0x3C,
        ]), // AppKey
    );
    let config = NodeConfig {
        port: 2,
        ..NodeConfig::default()
    };

    let mut device = match LoRaWANDevice::new(board, identity, config, EU868::new()) {
        Ok(device) => device,
        Err(e) => {
            eprintln!("invalid configuration: {}", e);
            return;
        }
    };
    device.start();

    // Main loop - ten minutes of virtual time
    let end = Instant::from_ticks(0) + Ticks::from_secs(600);
    loop {
        while device.run_once().is_ok() {}

        let scheduled = device.platform().mac.scheduled.front().map(|(at, _)| *at);
        let wakeup = match (device.next_wakeup(), scheduled) {
            (Some(job), Some(event)) => job.earliest(event),
            (job, event) => match job.or(event) {
                Some(at) => at,
                None => break,
            },
        };
        if end.is_before(wakeup) {
            break;
        }
        let clock = &mut device.platform_mut().clock;
        clock.now = clock.now.latest(wakeup);
    }
}
