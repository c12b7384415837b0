//! BLE telemetry: drains the sample buffer into notifications while a peer
//! is subscribed.

pub mod protocol;

use core::fmt;

use embassy_futures::select::{select, Either};
use heapless::Vec;
use portable_atomic::{AtomicU8, Ordering};

use crate::buffer::SampleBuffer;
use crate::connection::{ConnectionState, ConnectionStateMachine, TransitionError};
use crate::drivers::PhysicalSample;
use protocol::{samples_per_packet, NotificationPacket, MAX_SAMPLES_PER_PACKET};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NotifyError {
    /// CCCD not set on the peer side
    NotSubscribed,
    /// Radio stack TX queue full
    QueueFull,
    Stack,
}

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotSubscribed => write!(f, "peer not subscribed"),
            Self::QueueFull => write!(f, "notification queue full"),
            Self::Stack => write!(f, "radio stack error"),
        }
    }
}

/// Hands a notification payload to the radio stack.
///
/// Completion means the stack accepted the payload for transmission.
#[allow(async_fn_in_trait)]
pub trait NotifySink {
    async fn notify(&mut self, payload: &[u8]) -> Result<(), NotifyError>;
}

impl<S: NotifySink + ?Sized> NotifySink for &mut S {
    async fn notify(&mut self, payload: &[u8]) -> Result<(), NotifyError> {
        (**self).notify(payload).await
    }
}

/// Alert bits waiting for the next delivered packet.
///
/// Raised by the acquisition side, carried in the header of the next
/// notification (see [`protocol::flags`]) and cleared once the sink accepts
/// that packet.
pub struct AlertLatch {
    pending: AtomicU8,
}

impl AlertLatch {
    pub const fn new() -> Self {
        Self {
            pending: AtomicU8::new(0),
        }
    }

    pub fn raise(&self, flags: u8) {
        self.pending.fetch_or(flags & protocol::flags::ALL, Ordering::AcqRel);
    }

    /// Clear and return the pending bits.
    pub fn take(&self) -> u8 {
        self.pending.swap(0, Ordering::AcqRel)
    }

    pub fn pending(&self) -> u8 {
        self.pending.load(Ordering::Acquire)
    }
}

impl Default for AlertLatch {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TelemetryStats {
    pub packets_sent: u32,
    pub samples_sent: u32,
    pub failed: u32,
    pub abandoned: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TickOutcome {
    /// Not notifying
    Idle,
    /// Nothing buffered
    Empty,
    Sent { samples: usize },
    Failed(NotifyError),
    /// Peer dropped while the submission was in flight
    Abandoned,
}

pub struct TelemetryService<'a, S, const N: usize> {
    sink: S,
    buffer: &'a SampleBuffer<N>,
    connection: &'a ConnectionStateMachine,
    alerts: Option<&'a AlertLatch>,
    sequence: u8,
    stats: TelemetryStats,
}

impl<'a, S: NotifySink, const N: usize> TelemetryService<'a, S, N> {
    pub fn new(
        sink: S,
        buffer: &'a SampleBuffer<N>,
        connection: &'a ConnectionStateMachine,
    ) -> Self {
        Self {
            sink,
            buffer,
            connection,
            alerts: None,
            sequence: 0,
            stats: TelemetryStats::default(),
        }
    }

    /// Forward alert bits from `alerts` in packet headers.
    pub fn with_alerts(mut self, alerts: &'a AlertLatch) -> Self {
        self.alerts = Some(alerts);
        self
    }

    pub fn on_connected(&mut self) -> Result<ConnectionState, TransitionError> {
        self.connection.peer_connect()
    }

    /// Buffered samples are kept for the next session.
    pub fn on_disconnected(&mut self) -> Result<ConnectionState, TransitionError> {
        let state = self.connection.peer_disconnect()?;
        info!(
            "telemetry: link lost, {} samples held for next session",
            self.buffer.len()
        );
        Ok(state)
    }

    pub fn on_advertising(&mut self) -> Result<ConnectionState, TransitionError> {
        self.connection.restart_advertising()
    }

    /// CCCD write from the peer.
    pub fn on_subscription_changed(
        &mut self,
        enabled: bool,
    ) -> Result<ConnectionState, TransitionError> {
        if enabled {
            self.connection.notify_enabled()
        } else {
            self.connection.notify_disabled()
        }
    }

    pub fn on_mtu_changed(&mut self, att_mtu: u16) -> u16 {
        self.connection.set_mtu(att_mtu)
    }

    /// Send at most one notification.
    ///
    /// Samples leave the buffer only once the sink accepts the packet. A
    /// failed or abandoned submission is not retried here and its samples
    /// stay queued for the next tick. Alert bits follow the same rule.
    pub async fn tick(&mut self) -> TickOutcome {
        if !self.connection.is_notifying() {
            return TickOutcome::Idle;
        }

        let att_mtu = self.connection.att_mtu();
        let mut batch: Vec<PhysicalSample, MAX_SAMPLES_PER_PACKET> = Vec::new();
        let start = self.buffer.peek_into(&mut batch, samples_per_packet(att_mtu));
        if batch.is_empty() {
            return TickOutcome::Empty;
        }

        let flags = self.alerts.map_or(0, AlertLatch::take);
        let (packet, count) = NotificationPacket::build(self.sequence, flags, &batch, att_mtu);
        let submit = self.sink.notify(packet.as_bytes());
        let result = select(submit, self.connection.wait_disconnected()).await;
        if !matches!(result, Either::First(Ok(()))) {
            if let Some(alerts) = self.alerts {
                alerts.raise(flags);
            }
        }

        match result {
            Either::First(Ok(())) => {
                self.buffer.commit(start + count as u64);
                trace!(
                    "telemetry: seq {} carried {} samples, flags {:#x}",
                    self.sequence,
                    count,
                    flags
                );
                self.sequence = self.sequence.wrapping_add(1);
                self.stats.packets_sent += 1;
                self.stats.samples_sent += count as u32;
                TickOutcome::Sent { samples: count }
            }
            Either::First(Err(e)) => {
                self.stats.failed += 1;
                warn!("telemetry: notify failed: {:?}", e);
                TickOutcome::Failed(e)
            }
            Either::Second(()) => {
                self.stats.abandoned += 1;
                warn!("telemetry: disconnect during notify, {} samples kept", count);
                TickOutcome::Abandoned
            }
        }
    }

    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    pub fn stats(&self) -> TelemetryStats {
        self.stats
    }

    /// Return the counters and zero them.
    pub fn take_stats(&mut self) -> TelemetryStats {
        core::mem::take(&mut self.stats)
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::{NotifyError, NotifySink};

    /// Records accepted payloads, fails on demand, or never completes.
    #[derive(Default)]
    pub struct MockSink {
        pub sent: std::vec::Vec<std::vec::Vec<u8>>,
        pub fail_with: Option<NotifyError>,
        pub hang: bool,
    }

    impl NotifySink for MockSink {
        async fn notify(&mut self, payload: &[u8]) -> Result<(), NotifyError> {
            if self.hang {
                core::future::pending::<()>().await;
            }
            if let Some(e) = self.fail_with {
                return Err(e);
            }
            self.sent.push(payload.to_vec());
            Ok(())
        }
    }
}
