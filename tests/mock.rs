#![allow(dead_code)]

use std::collections::VecDeque;

use lorawan_node::{
    config::{
        device::{AESKey, DevAddr, DeviceConfig},
        node::NodeConfig,
    },
    device::{
        clock::Clock, event_log::LogEntry, event_log::LogRecord,
        non_volatile_store::NonVolatileStore, rng::Rng, Activity, LoRaWANDevice, Platform,
    },
    lorawan::{
        events::{JoinAccept, MacEvent},
        region::{DataRate, EU868},
        session::{SessionKeys, SessionParams},
        time::{Instant, Ticks},
        uplink::Payload,
    },
    radio::{JoinRequest, MacRadio, UplinkRequest},
};

/// Mock error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockError {
    /// Operation refused
    Refused,
}

/// Join request as seen by the MAC layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinCall {
    pub dev_eui: [u8; 8],
    pub sub_band: u8,
    pub data_rate: DataRate,
    pub tx_power: i8,
}

/// Uplink as seen by the MAC layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransmitCall {
    pub sub_band: u8,
    pub frame_counter: u32,
    pub port: u8,
    pub confirmed: bool,
    pub payload: Vec<u8>,
    pub data_rate: DataRate,
}

/// Mock radio/MAC layer recording requests and replaying queued events
#[derive(Default)]
pub struct MockMac {
    pub joins: Vec<JoinCall>,
    pub transmits: Vec<TransmitCall>,
    pub events: VecDeque<MacEvent>,
    pub fail_next: bool,
    pub link_check: Option<bool>,
    pub restored: Option<(DevAddr, u32)>,
    pub resets: usize,
}

impl MockMac {
    fn refuse(&mut self) -> Result<(), MockError> {
        if self.fail_next {
            self.fail_next = false;
            return Err(MockError::Refused);
        }
        Ok(())
    }
}

impl MacRadio for MockMac {
    type Error = MockError;

    fn reset(&mut self) -> Result<(), Self::Error> {
        self.resets += 1;
        self.events.clear();
        Ok(())
    }

    fn join(&mut self, request: &JoinRequest<'_>) -> Result<(), Self::Error> {
        self.refuse()?;
        self.joins.push(JoinCall {
            dev_eui: *request.dev_eui,
            sub_band: request.sub_band,
            data_rate: request.data_rate,
            tx_power: request.tx_power,
        });
        Ok(())
    }

    fn transmit(&mut self, request: &UplinkRequest<'_>) -> Result<(), Self::Error> {
        self.refuse()?;
        self.transmits.push(TransmitCall {
            sub_band: request.sub_band,
            frame_counter: request.frame_counter,
            port: request.port,
            confirmed: request.confirmed,
            payload: request.payload.to_vec(),
            data_rate: request.data_rate,
        });
        Ok(())
    }

    fn poll_event(&mut self) -> nb::Result<MacEvent, Self::Error> {
        self.events.pop_front().ok_or(nb::Error::WouldBlock)
    }

    fn set_link_check_mode(&mut self, enabled: bool) -> Result<(), Self::Error> {
        self.link_check = Some(enabled);
        Ok(())
    }

    fn restore_session(
        &mut self,
        dev_addr: DevAddr,
        _keys: &SessionKeys,
        frame_counter: u32,
    ) -> Result<(), Self::Error> {
        self.restored = Some((dev_addr, frame_counter));
        Ok(())
    }
}

/// Manually advanced clock
pub struct MockClock {
    pub now: Instant,
}

impl MockClock {
    pub fn advance(&mut self, span: Ticks) {
        self.now = self.now + span;
    }
}

impl Clock for MockClock {
    fn now(&mut self) -> Instant {
        self.now
    }
}

/// Deterministic counter standing in for a random source
#[derive(Default)]
pub struct MockRng {
    pub next: u32,
}

impl Rng for MockRng {
    type Error = MockError;

    fn next_u32(&mut self) -> Result<u32, Self::Error> {
        self.next = self.next.wrapping_add(7919);
        Ok(self.next)
    }
}

/// In-memory non-volatile storage
#[derive(Default, Clone)]
pub struct MockStore {
    pub data: Option<Vec<u8>>,
    pub fail_save: bool,
    pub saves: usize,
}

impl NonVolatileStore for MockStore {
    type Error = MockError;

    fn save(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        if self.fail_save {
            return Err(MockError::Refused);
        }
        self.saves += 1;
        self.data = Some(data.to_vec());
        Ok(())
    }

    fn load(&mut self, buf: &mut [u8]) -> Result<Option<usize>, Self::Error> {
        match &self.data {
            Some(data) => {
                let len = data.len().min(buf.len());
                buf[..len].copy_from_slice(&data[..len]);
                Ok(Some(data.len()))
            }
            None => Ok(None),
        }
    }

    fn clear(&mut self) -> Result<(), Self::Error> {
        self.data = None;
        Ok(())
    }
}

/// Mock platform bundling the collaborators
pub struct MockPlatform {
    pub mac: MockMac,
    pub clock: MockClock,
    pub rng: MockRng,
    pub store: MockStore,
    pub log: Vec<LogRecord>,
    pub app_payloads: VecDeque<Payload>,
    pub downlinks: Vec<(u8, Vec<u8>)>,
}

impl MockPlatform {
    pub fn new(now: Instant) -> Self {
        Self {
            mac: MockMac::default(),
            clock: MockClock { now },
            rng: MockRng::default(),
            store: MockStore::default(),
            log: Vec::new(),
            app_payloads: VecDeque::new(),
            downlinks: Vec::new(),
        }
    }

    /// Whether an entry was logged
    pub fn logged(&self, entry: LogEntry) -> bool {
        self.log.iter().any(|record| record.entry == entry)
    }
}

impl Platform for MockPlatform {
    type Mac = MockMac;
    type Clock = MockClock;
    type Rng = MockRng;
    type Store = MockStore;

    fn mac(&mut self) -> &mut Self::Mac {
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
        self.log.push(*record);
    }

    fn next_payload(&mut self) -> Option<Payload> {
        self.app_payloads.pop_front()
    }

    fn handle_downlink(&mut self, port: u8, data: &[u8]) {
        self.downlinks.push((port, data.to_vec()));
    }
}

pub type MockDevice = LoRaWANDevice<MockPlatform, EU868>;

pub const APP_KEY: [u8; 16] = [
    0x2b, 0x7e, 0x15, 0x16, 0x28, 0xae, 0xd2, 0xa6, 0xab, 0xf7, 0x15, 0x88, 0x09, 0xcf, 0x4f, 0x3c,
];

pub fn identity() -> DeviceConfig {
    DeviceConfig::new_otaa(
        [0x00, 0x04, 0xA3, 0x0B, 0x00, 0x1A, 0x2B, 0x3C],
        [0x70, 0xB3, 0xD5, 0x7E, 0xD0, 0x00, 0x00, 0x01],
        AESKey::new(APP_KEY),
    )
}

pub fn create_test_device_with(config: NodeConfig) -> MockDevice {
    let platform = MockPlatform::new(Instant::from_ticks(1_000));
    LoRaWANDevice::new(platform, identity(), config, EU868::new()).unwrap()
}

pub fn create_test_device() -> MockDevice {
    create_test_device_with(NodeConfig::default())
}

pub fn join_accept(dev_addr: u32) -> MacEvent {
    MacEvent::JoinAccepted(JoinAccept {
        dev_addr: DevAddr::from(dev_addr),
        keys: SessionKeys::new(AESKey::new([0x11; 16]), AESKey::new([0x22; 16])),
        params: SessionParams::default(),
    })
}

pub fn advance(device: &mut MockDevice, span: Ticks) {
    device.platform_mut().clock.advance(span);
}

pub fn push_event(device: &mut MockDevice, event: MacEvent) {
    device.platform_mut().mac.events.push_back(event);
}

/// Run the loop until it has nothing left to do right now
pub fn run_until_idle(device: &mut MockDevice) -> Vec<Activity> {
    let mut activities = Vec::new();
    while let Ok(activity) = device.run_once() {
        activities.push(activity);
        assert!(activities.len() < 64, "run loop did not settle");
    }
    activities
}

/// Drive a fresh device through OTAA
pub fn joined_device(config: NodeConfig) -> MockDevice {
    let mut device = create_test_device_with(config);
    device.start();
    run_until_idle(&mut device);
    assert_eq!(device.platform().mac.joins.len(), 1);

    advance(&mut device, Ticks::from_secs(5));
    push_event(&mut device, join_accept(0x2601_1F00));
    device.run_once().unwrap();
    device
}
