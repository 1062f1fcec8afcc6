//! Session store
//!
//! Holds the node's network membership. The device address and session keys
//! only exist inside [`ActivationState::Joined`]; the type makes a joined
//! state without them unrepresentable.
//!
//! Frame counters are handed out by [`SessionStore::next_frame_counter`] and
//! never repeat for a key set. Across power cycles this holds through block
//! reservation: a snapshot written to non-volatile storage records the end
//! of the reserved block and a restored session continues from there.

use core::fmt;

use crate::config::device::{AESKey, DevAddr};
use crate::crypto::{self, TAG_SIZE};
use crate::lorawan::region::DataRate;

/// Session snapshot magic
const SNAPSHOT_MAGIC: [u8; 4] = *b"LWS1";

/// Length of the sealed part of a snapshot
const SNAPSHOT_BODY_LEN: usize = 4 + 4 + 16 + 16 + 4 + 1 + 1;

/// Length of a session snapshot in bytes
pub const SNAPSHOT_LEN: usize = SNAPSHOT_BODY_LEN + TAG_SIZE;

/// Activation status of the node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ActivationState {
    /// No session
    Unjoined,
    /// A join is in progress
    Joining,
    /// A session is established
    Joined,
}

/// Session keys derived by the MAC layer on join
///
/// Owned by the session; deliberately not `Clone`.
pub struct SessionKeys {
    nwk_skey: AESKey,
    app_skey: AESKey,
}

impl SessionKeys {
    /// Wrap keys received with a join accept
    pub fn new(nwk_skey: AESKey, app_skey: AESKey) -> Self {
        Self { nwk_skey, app_skey }
    }

    /// Network session key
    pub fn nwk_skey(&self) -> &AESKey {
        &self.nwk_skey
    }

    /// Application session key
    pub fn app_skey(&self) -> &AESKey {
        &self.app_skey
    }
}

impl fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKeys(..)")
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for SessionKeys {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "SessionKeys(..)")
    }
}

/// MAC parameters assigned with a join accept
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SessionParams {
    /// Data rate for uplinks, `None` keeps the current one
    pub data_rate: Option<DataRate>,
    /// Transmit power in dBm, `None` keeps the current one
    pub tx_power: Option<i8>,
}

/// Session store errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionError {
    /// Join completion while a session is already established
    AlreadyJoined,
    /// Operation needs a session
    NotJoined,
    /// The uplink frame counter cannot advance any further
    CounterExhausted,
    /// Snapshot is malformed or not sealed with this device's key
    InvalidSnapshot,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::AlreadyJoined => f.write_str("already joined"),
            SessionError::NotJoined => f.write_str("not joined"),
            SessionError::CounterExhausted => f.write_str("frame counter exhausted"),
            SessionError::InvalidSnapshot => f.write_str("invalid session snapshot"),
        }
    }
}

struct Session {
    dev_addr: DevAddr,
    keys: SessionKeys,
    /// Next uplink frame counter
    fcnt_up: u32,
    /// End of the block of counters covered by the last stored snapshot
    fcnt_reserved: u32,
}

enum Activation {
    Unjoined,
    Joining,
    Joined(Session),
}

/// Sealed session snapshot ready for non-volatile storage
#[derive(Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    bytes: [u8; SNAPSHOT_LEN],
    reserved: u32,
}

impl SessionSnapshot {
    /// Raw snapshot
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// First frame counter a session restored from this snapshot will use
    pub fn reserved_until(&self) -> u32 {
        self.reserved
    }
}

impl fmt::Debug for SessionSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSnapshot")
            .field("reserved", &self.reserved)
            .finish_non_exhaustive()
    }
}

/// Session store
pub struct SessionStore {
    activation: Activation,
    data_rate: DataRate,
    tx_power: i8,
    reserve: u32,
}

impl SessionStore {
    /// Create an empty store
    ///
    /// `data_rate` and `tx_power` apply until a join accept assigns new
    /// ones. `reserve` is the number of frame counters each stored snapshot
    /// covers.
    pub fn new(data_rate: DataRate, tx_power: i8, reserve: u32) -> Self {
        Self {
            activation: Activation::Unjoined,
            data_rate,
            tx_power,
            reserve: reserve.max(1),
        }
    }

    /// Current activation state
    pub fn activation_state(&self) -> ActivationState {
        match self.activation {
            Activation::Unjoined => ActivationState::Unjoined,
            Activation::Joining => ActivationState::Joining,
            Activation::Joined(_) => ActivationState::Joined,
        }
    }

    /// Is a session established?
    pub fn is_joined(&self) -> bool {
        matches!(self.activation, Activation::Joined(_))
    }

    /// Enter the joining state
    pub fn mark_joining(&mut self) -> Result<(), SessionError> {
        match self.activation {
            Activation::Joined(_) => Err(SessionError::AlreadyJoined),
            _ => {
                self.activation = Activation::Joining;
                Ok(())
            }
        }
    }

    /// Leave the joining state after a failed attempt
    pub fn abandon_join(&mut self) {
        if let Activation::Joining = self.activation {
            self.activation = Activation::Unjoined;
        }
    }

    /// Establish a fresh session; its frame counter starts at zero
    pub fn mark_joined(
        &mut self,
        dev_addr: DevAddr,
        keys: SessionKeys,
        params: SessionParams,
    ) -> Result<(), SessionError> {
        if self.is_joined() {
            return Err(SessionError::AlreadyJoined);
        }

        if let Some(data_rate) = params.data_rate {
            self.data_rate = data_rate;
        }
        if let Some(tx_power) = params.tx_power {
            self.tx_power = tx_power;
        }
        self.activation = Activation::Joined(Session {
            dev_addr,
            keys,
            fcnt_up: 0,
            fcnt_reserved: 0,
        });
        Ok(())
    }

    /// Frame counter the next uplink carries, without advancing it
    ///
    /// Fails with `CounterExhausted` when the counter could not advance past
    /// it.
    pub fn peek_frame_counter(&self) -> Result<u32, SessionError> {
        let Activation::Joined(session) = &self.activation else {
            return Err(SessionError::NotJoined);
        };
        if session.fcnt_up == u32::MAX {
            return Err(SessionError::CounterExhausted);
        }
        Ok(session.fcnt_up)
    }

    /// Return the frame counter for the next uplink and advance it
    pub fn next_frame_counter(&mut self) -> Result<u32, SessionError> {
        let current = self.peek_frame_counter()?;
        if let Activation::Joined(session) = &mut self.activation {
            session.fcnt_up = current + 1;
        }
        Ok(current)
    }

    /// Has the next frame counter left the block covered by the last
    /// stored snapshot?
    pub fn needs_persist(&self) -> bool {
        match &self.activation {
            Activation::Joined(session) => session.fcnt_up >= session.fcnt_reserved,
            _ => false,
        }
    }

    /// Seal the session into a snapshot reserving the next block of counters
    ///
    /// The reservation only takes effect once [`commit`](Self::commit) is
    /// called after the snapshot has been stored.
    pub fn snapshot(&self, app_key: &AESKey) -> Option<SessionSnapshot> {
        let Activation::Joined(session) = &self.activation else {
            return None;
        };
        let reserved = session.fcnt_up.saturating_add(self.reserve);

        let mut bytes = [0u8; SNAPSHOT_LEN];
        bytes[0..4].copy_from_slice(&SNAPSHOT_MAGIC);
        bytes[4..8].copy_from_slice(session.dev_addr.as_bytes());
        bytes[8..24].copy_from_slice(session.keys.nwk_skey.as_bytes());
        bytes[24..40].copy_from_slice(session.keys.app_skey.as_bytes());
        bytes[40..44].copy_from_slice(&reserved.to_le_bytes());
        bytes[44] = self.data_rate as u8;
        bytes[45] = self.tx_power as u8;
        let tag = crypto::seal(app_key, &bytes[..SNAPSHOT_BODY_LEN]);
        bytes[SNAPSHOT_BODY_LEN..].copy_from_slice(&tag);

        Some(SessionSnapshot { bytes, reserved })
    }

    /// Record that `snapshot` is in non-volatile storage
    pub fn commit(&mut self, snapshot: &SessionSnapshot) {
        if let Activation::Joined(session) = &mut self.activation {
            session.fcnt_reserved = session.fcnt_reserved.max(snapshot.reserved);
        }
    }

    /// Restore a session from a stored snapshot
    ///
    /// The frame counter continues at the end of the reserved block, so no
    /// counter handed out before the snapshot was taken is used again.
    pub fn restore(&mut self, bytes: &[u8], app_key: &AESKey) -> Result<(), SessionError> {
        if self.is_joined() {
            return Err(SessionError::AlreadyJoined);
        }
        if bytes.len() != SNAPSHOT_LEN || bytes[0..4] != SNAPSHOT_MAGIC {
            return Err(SessionError::InvalidSnapshot);
        }
        let (body, tag) = bytes.split_at(SNAPSHOT_BODY_LEN);
        if !crypto::verify(app_key, body, tag) {
            return Err(SessionError::InvalidSnapshot);
        }

        let data_rate = DataRate::try_from(body[44]).map_err(|_| SessionError::InvalidSnapshot)?;
        let mut addr = [0u8; 4];
        let mut nwk_skey = [0u8; 16];
        let mut app_skey = [0u8; 16];
        let mut reserved = [0u8; 4];
        addr.copy_from_slice(&body[4..8]);
        nwk_skey.copy_from_slice(&body[8..24]);
        app_skey.copy_from_slice(&body[24..40]);
        reserved.copy_from_slice(&body[40..44]);
        let reserved = u32::from_le_bytes(reserved);

        self.data_rate = data_rate;
        self.tx_power = body[45] as i8;
        self.activation = Activation::Joined(Session {
            dev_addr: DevAddr::new(addr),
            keys: SessionKeys::new(AESKey::new(nwk_skey), AESKey::new(app_skey)),
            fcnt_up: reserved,
            fcnt_reserved: reserved,
        });
        Ok(())
    }

    /// Discard the session, its keys and counters
    pub fn reset(&mut self) {
        self.activation = Activation::Unjoined;
    }

    /// Device address of the session
    pub fn dev_addr(&self) -> Option<DevAddr> {
        match &self.activation {
            Activation::Joined(session) => Some(session.dev_addr),
            _ => None,
        }
    }

    /// Keys of the session
    pub fn keys(&self) -> Option<&SessionKeys> {
        match &self.activation {
            Activation::Joined(session) => Some(&session.keys),
            _ => None,
        }
    }

    /// Frame counter the next uplink will use
    pub fn frame_counter(&self) -> Option<u32> {
        match &self.activation {
            Activation::Joined(session) => Some(session.fcnt_up),
            _ => None,
        }
    }

    /// Current uplink data rate
    pub fn data_rate(&self) -> DataRate {
        self.data_rate
    }

    /// Current transmit power in dBm
    pub fn tx_power(&self) -> i8 {
        self.tx_power
    }
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("state", &self.activation_state())
            .field("dev_addr", &self.dev_addr())
            .field("frame_counter", &self.frame_counter())
            .field("data_rate", &self.data_rate)
            .field("tx_power", &self.tx_power)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const APP_KEY: AESKey = AESKey::new([0x2b; 16]);

    fn keys() -> SessionKeys {
        SessionKeys::new(AESKey::new([0x01; 16]), AESKey::new([0x02; 16]))
    }

    fn joined(reserve: u32) -> SessionStore {
        let mut store = SessionStore::new(DataRate::SF7BW125, 14, reserve);
        store
            .mark_joined(DevAddr::from(0x2601_1234), keys(), SessionParams::default())
            .unwrap();
        store
    }

    #[test]
    fn address_and_keys_only_while_joined() {
        let mut store = SessionStore::new(DataRate::SF7BW125, 14, 16);
        assert_eq!(store.activation_state(), ActivationState::Unjoined);
        assert!(store.dev_addr().is_none());
        assert!(store.keys().is_none());

        store.mark_joining().unwrap();
        assert_eq!(store.activation_state(), ActivationState::Joining);
        assert!(store.dev_addr().is_none());

        store
            .mark_joined(DevAddr::from(1), keys(), SessionParams::default())
            .unwrap();
        assert_eq!(store.dev_addr(), Some(DevAddr::from(1)));
        assert!(store.keys().is_some());

        store.reset();
        assert_eq!(store.activation_state(), ActivationState::Unjoined);
        assert!(store.keys().is_none());
        assert_eq!(store.frame_counter(), None);
    }

    #[test]
    fn second_join_completion_is_rejected() {
        let mut store = joined(16);
        let result = store.mark_joined(DevAddr::from(2), keys(), SessionParams::default());
        assert_eq!(result, Err(SessionError::AlreadyJoined));
        assert_eq!(store.dev_addr(), Some(DevAddr::from(0x2601_1234)));
        assert_eq!(store.mark_joining(), Err(SessionError::AlreadyJoined));
    }

    #[test]
    fn join_params_override_defaults() {
        let mut store = SessionStore::new(DataRate::SF7BW125, 14, 16);
        let params = SessionParams {
            data_rate: Some(DataRate::SF9BW125),
            tx_power: None,
        };
        store.mark_joined(DevAddr::from(3), keys(), params).unwrap();
        assert_eq!(store.data_rate(), DataRate::SF9BW125);
        assert_eq!(store.tx_power(), 14);
    }

    #[test]
    fn frame_counter_advances_by_one() {
        let mut store = joined(16);
        assert_eq!(store.next_frame_counter(), Ok(0));
        assert_eq!(store.next_frame_counter(), Ok(1));
        assert_eq!(store.next_frame_counter(), Ok(2));
        assert_eq!(store.frame_counter(), Some(3));
    }

    #[test]
    fn peek_leaves_frame_counter_alone() {
        let mut store = joined(16);
        assert_eq!(store.peek_frame_counter(), Ok(0));
        assert_eq!(store.peek_frame_counter(), Ok(0));
        assert_eq!(store.next_frame_counter(), Ok(0));
        assert_eq!(store.peek_frame_counter(), Ok(1));
    }

    #[test]
    fn frame_counter_needs_session() {
        let mut store = SessionStore::new(DataRate::SF7BW125, 14, 16);
        assert_eq!(store.next_frame_counter(), Err(SessionError::NotJoined));
    }

    #[test]
    fn exhausted_counter_is_never_reused() {
        let mut store = SessionStore::new(DataRate::SF7BW125, 14, 1);
        let snapshot = {
            let mut bytes = joined(1).snapshot(&APP_KEY).unwrap().bytes;
            bytes[40..44].copy_from_slice(&(u32::MAX - 1).to_le_bytes());
            let tag = crypto::seal(&APP_KEY, &bytes[..SNAPSHOT_BODY_LEN]);
            bytes[SNAPSHOT_BODY_LEN..].copy_from_slice(&tag);
            bytes
        };
        store.restore(&snapshot, &APP_KEY).unwrap();

        assert_eq!(store.next_frame_counter(), Ok(u32::MAX - 1));
        assert_eq!(store.next_frame_counter(), Err(SessionError::CounterExhausted));
        assert_eq!(store.next_frame_counter(), Err(SessionError::CounterExhausted));
    }

    #[test]
    fn snapshot_reserves_a_block() {
        let mut store = joined(16);
        assert!(store.needs_persist());

        let snapshot = store.snapshot(&APP_KEY).unwrap();
        assert_eq!(snapshot.as_bytes().len(), SNAPSHOT_LEN);
        assert_eq!(snapshot.reserved_until(), 16);
        // not committed yet
        assert!(store.needs_persist());

        store.commit(&snapshot);
        for expected in 0..16 {
            assert!(!store.needs_persist());
            assert_eq!(store.next_frame_counter(), Ok(expected));
        }
        assert!(store.needs_persist());
    }

    #[test]
    fn restore_continues_after_reserved_block() {
        let mut store = joined(16);
        let snapshot = store.snapshot(&APP_KEY).unwrap();
        store.commit(&snapshot);
        let used: [u32; 3] = core::array::from_fn(|_| store.next_frame_counter().unwrap());

        let mut resumed = SessionStore::new(DataRate::SF12BW125, 0, 16);
        resumed.restore(snapshot.as_bytes(), &APP_KEY).unwrap();
        assert_eq!(resumed.dev_addr(), Some(DevAddr::from(0x2601_1234)));
        assert_eq!(resumed.data_rate(), DataRate::SF7BW125);
        assert_eq!(resumed.tx_power(), 14);
        assert_eq!(
            resumed.keys().unwrap().nwk_skey(),
            &AESKey::new([0x01; 16])
        );

        let next = resumed.next_frame_counter().unwrap();
        assert!(used.iter().all(|fcnt| *fcnt < next));
        assert!(resumed.needs_persist());
    }

    #[test]
    fn tampered_or_foreign_snapshot_is_rejected() {
        let store = joined(16);
        let snapshot = store.snapshot(&APP_KEY).unwrap();

        let mut tampered = snapshot.bytes;
        tampered[42] ^= 0x80;
        let mut target = SessionStore::new(DataRate::SF7BW125, 14, 16);
        assert_eq!(
            target.restore(&tampered, &APP_KEY),
            Err(SessionError::InvalidSnapshot)
        );
        assert_eq!(
            target.restore(snapshot.as_bytes(), &AESKey::new([0x00; 16])),
            Err(SessionError::InvalidSnapshot)
        );
        assert_eq!(
            target.restore(&snapshot.as_bytes()[..20], &APP_KEY),
            Err(SessionError::InvalidSnapshot)
        );
        assert!(!target.is_joined());
    }
}
