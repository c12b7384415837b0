//! Statics shared between the acquisition, telemetry and radio contexts.

use embassy_sync::{
    blocking_mutex::raw::CriticalSectionRawMutex as RawMutex, channel::Channel, signal::Signal,
};
use portable_atomic::{AtomicBool, Ordering};

use crate::buffer::SampleBuffer;
use crate::config::*;
use crate::connection::ConnectionStateMachine;
use crate::tasks::SystemMessage;
use crate::telemetry::AlertLatch;

/* Sample path: acquisition → telemetry */
pub static SAMPLE_BUFFER: SampleBuffer<SAMPLE_BUFFER_CAPACITY> = SampleBuffer::new();

/* Link state, driven by the radio stack */
pub static CONNECTION: ConnectionStateMachine = ConnectionStateMachine::new();

/* Alert bits for the BLE peer, cleared by a delivered notification */
pub static PEER_ALERTS: AlertLatch = AlertLatch::new();

/* Alerts and calibration results for display */
pub static SYSTEM_CH: Channel<RawMutex, SystemMessage, SYSTEM_CHANNEL_SIZE> = Channel::new();

/// Raised by a button or command; carries the number of samples to average.
pub static CALIBRATION_REQUEST: Signal<RawMutex, u16> = Signal::new();

/// Cleared to pause sampling; calibration requests are still serviced.
pub static SENSING_ENABLED: AtomicBool = AtomicBool::new(true);

/// Ask the acquisition loop to recalibrate before its next sample.
pub fn request_calibration() {
    CALIBRATION_REQUEST.signal(CALIBRATION_SAMPLES);
}

/// Pause or resume sampling. Returns whether sensing is now enabled.
pub fn toggle_sensing() -> bool {
    let was = SENSING_ENABLED.fetch_xor(true, Ordering::AcqRel);
    info!("Sensing {}", if was { "paused" } else { "resumed" });
    !was
}
