//! Link state for the single telemetry connection.
//!
//! The radio stack drives events in; the telemetry context only reads the
//! state and waits for disconnects. State is a single atomic byte so readers
//! never observe a half-applied transition.

use core::fmt;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use portable_atomic::{AtomicU16, AtomicU8, Ordering};

use crate::telemetry::protocol::{DEFAULT_ATT_MTU, MAX_ATT_MTU};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ConnectionState {
    Advertising = 0,
    Connected = 1,
    Notifying = 2,
    Disconnected = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionEvent {
    PeerConnect,
    /// Peer wrote the CCCD with notifications on
    NotifyEnabled,
    /// Peer cleared the CCCD
    NotifyDisabled,
    PeerDisconnect,
    RestartAdvertising,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransitionError {
    pub from: ConnectionState,
    pub event: ConnectionEvent,
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event {:?} not allowed in state {:?}", self.event, self.from)
    }
}

impl ConnectionState {
    const fn from_bits(bits: u8) -> Self {
        match bits {
            0 => Self::Advertising,
            1 => Self::Connected,
            2 => Self::Notifying,
            _ => Self::Disconnected,
        }
    }

    /// Next state for `event`, or `None` if the event is not valid here.
    pub const fn on(self, event: ConnectionEvent) -> Option<Self> {
        use ConnectionEvent::*;
        match (self, event) {
            (Self::Advertising, PeerConnect) => Some(Self::Connected),
            (Self::Connected, NotifyEnabled) => Some(Self::Notifying),
            (Self::Notifying, NotifyDisabled) => Some(Self::Connected),
            (Self::Connected | Self::Notifying, PeerDisconnect) => Some(Self::Disconnected),
            (Self::Disconnected, RestartAdvertising) => Some(Self::Advertising),
            _ => None,
        }
    }
}

pub struct ConnectionStateMachine {
    state: AtomicU8,
    att_mtu: AtomicU16,
    disconnected: Signal<CriticalSectionRawMutex, ()>,
}

impl ConnectionStateMachine {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(ConnectionState::Advertising as u8),
            att_mtu: AtomicU16::new(DEFAULT_ATT_MTU),
            disconnected: Signal::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_bits(self.state.load(Ordering::Acquire))
    }

    pub fn is_notifying(&self) -> bool {
        self.state() == ConnectionState::Notifying
    }

    /// Apply `event`. On rejection the state is left untouched.
    pub fn handle(&self, event: ConnectionEvent) -> Result<ConnectionState, TransitionError> {
        let mut current = self.state.load(Ordering::Acquire);
        let (from, to) = loop {
            let from = ConnectionState::from_bits(current);
            let Some(to) = from.on(event) else {
                warn!("connection: {:?} rejected in {:?}", event, from);
                return Err(TransitionError { from, event });
            };
            // Anyone who sees Notifying must also see a cleared signal.
            if to == ConnectionState::Notifying {
                self.disconnected.reset();
            }
            match self.state.compare_exchange_weak(
                current,
                to as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break (from, to),
                Err(actual) => {
                    if ConnectionState::from_bits(actual) == ConnectionState::Disconnected {
                        self.disconnected.signal(());
                    }
                    current = actual;
                }
            }
        };

        match to {
            ConnectionState::Disconnected => self.disconnected.signal(()),
            ConnectionState::Connected if from == ConnectionState::Advertising => {
                self.att_mtu.store(DEFAULT_ATT_MTU, Ordering::Release)
            }
            _ => {}
        }

        info!("connection: {:?} -> {:?}", from, to);
        Ok(to)
    }

    pub fn peer_connect(&self) -> Result<ConnectionState, TransitionError> {
        self.handle(ConnectionEvent::PeerConnect)
    }

    pub fn notify_enabled(&self) -> Result<ConnectionState, TransitionError> {
        self.handle(ConnectionEvent::NotifyEnabled)
    }

    pub fn notify_disabled(&self) -> Result<ConnectionState, TransitionError> {
        self.handle(ConnectionEvent::NotifyDisabled)
    }

    pub fn peer_disconnect(&self) -> Result<ConnectionState, TransitionError> {
        self.handle(ConnectionEvent::PeerDisconnect)
    }

    pub fn restart_advertising(&self) -> Result<ConnectionState, TransitionError> {
        self.handle(ConnectionEvent::RestartAdvertising)
    }

    pub fn att_mtu(&self) -> u16 {
        self.att_mtu.load(Ordering::Acquire)
    }

    /// Record the negotiated ATT MTU, clamped to what the packet builder
    /// supports. Returns the stored value.
    pub fn set_mtu(&self, att_mtu: u16) -> u16 {
        let mtu = att_mtu.clamp(DEFAULT_ATT_MTU, MAX_ATT_MTU);
        self.att_mtu.store(mtu, Ordering::Release);
        debug!("connection: ATT MTU {} (requested {})", mtu, att_mtu);
        mtu
    }

    /// Resolves once the link has dropped since notifications were last
    /// enabled. Only one waiter is supported.
    pub async fn wait_disconnected(&self) {
        self.disconnected.wait().await
    }
}

impl Default for ConnectionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::select::{select, Either};

    #[test]
    fn full_lifecycle() {
        let conn = ConnectionStateMachine::new();
        assert_eq!(conn.state(), ConnectionState::Advertising);
        assert_eq!(conn.peer_connect(), Ok(ConnectionState::Connected));
        assert_eq!(conn.notify_enabled(), Ok(ConnectionState::Notifying));
        assert!(conn.is_notifying());
        assert_eq!(conn.notify_disabled(), Ok(ConnectionState::Connected));
        assert_eq!(conn.notify_enabled(), Ok(ConnectionState::Notifying));
        assert_eq!(conn.peer_disconnect(), Ok(ConnectionState::Disconnected));
        assert_eq!(conn.restart_advertising(), Ok(ConnectionState::Advertising));
    }

    #[test]
    fn disconnect_from_connected_without_subscription() {
        let conn = ConnectionStateMachine::new();
        conn.peer_connect().unwrap();
        assert_eq!(conn.peer_disconnect(), Ok(ConnectionState::Disconnected));
    }

    #[test]
    fn invalid_events_leave_state_unchanged() {
        let conn = ConnectionStateMachine::new();
        assert_eq!(
            conn.notify_enabled(),
            Err(TransitionError {
                from: ConnectionState::Advertising,
                event: ConnectionEvent::NotifyEnabled,
            })
        );
        assert_eq!(conn.state(), ConnectionState::Advertising);

        assert!(conn.peer_disconnect().is_err());
        assert!(conn.restart_advertising().is_err());

        conn.peer_connect().unwrap();
        assert!(conn.peer_connect().is_err());
        assert!(conn.restart_advertising().is_err());
        assert_eq!(conn.state(), ConnectionState::Connected);

        conn.peer_disconnect().unwrap();
        assert!(conn.notify_enabled().is_err());
        assert!(conn.peer_connect().is_err());
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn transition_table_is_exhaustive() {
        use ConnectionEvent::*;
        use ConnectionState::*;
        let states = [Advertising, Connected, Notifying, Disconnected];
        let events = [
            PeerConnect,
            NotifyEnabled,
            NotifyDisabled,
            PeerDisconnect,
            RestartAdvertising,
        ];
        let allowed = states
            .iter()
            .flat_map(|s| events.iter().filter(move |e| s.on(**e).is_some()))
            .count();
        assert_eq!(allowed, 6);
    }

    #[test]
    fn mtu_is_clamped_and_reset_on_new_connection() {
        let conn = ConnectionStateMachine::new();
        assert_eq!(conn.att_mtu(), DEFAULT_ATT_MTU);
        conn.peer_connect().unwrap();
        assert_eq!(conn.set_mtu(512), MAX_ATT_MTU);
        assert_eq!(conn.set_mtu(10), DEFAULT_ATT_MTU);
        assert_eq!(conn.set_mtu(185), 185);

        conn.peer_disconnect().unwrap();
        conn.restart_advertising().unwrap();
        assert_eq!(conn.att_mtu(), 185);
        conn.peer_connect().unwrap();
        assert_eq!(conn.att_mtu(), DEFAULT_ATT_MTU);
    }

    #[test]
    fn disconnect_wakes_waiter() {
        let conn = ConnectionStateMachine::new();
        conn.peer_connect().unwrap();
        conn.notify_enabled().unwrap();
        conn.peer_disconnect().unwrap();
        embassy_futures::block_on(conn.wait_disconnected());
    }

    #[test]
    fn stale_disconnect_is_cleared_when_notifying_again() {
        let conn = ConnectionStateMachine::new();
        conn.peer_connect().unwrap();
        conn.peer_disconnect().unwrap();
        conn.restart_advertising().unwrap();
        conn.peer_connect().unwrap();
        conn.notify_enabled().unwrap();

        let outcome = embassy_futures::block_on(select(
            conn.wait_disconnected(),
            core::future::ready(()),
        ));
        assert!(matches!(outcome, Either::Second(())));
    }

    #[test]
    fn rejected_subscribe_keeps_disconnect_pending() {
        let conn = ConnectionStateMachine::new();
        conn.peer_connect().unwrap();
        conn.notify_enabled().unwrap();
        conn.peer_disconnect().unwrap();
        assert!(conn.notify_enabled().is_err());

        let outcome = embassy_futures::block_on(select(
            conn.wait_disconnected(),
            core::future::ready(()),
        ));
        assert!(matches!(outcome, Either::First(())));
    }
}
