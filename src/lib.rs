#![cfg_attr(not(test), no_std)]

// This must go first so the logging macros are visible to every module.
#[macro_use]
mod fmt;

pub mod buffer;
pub mod config;
pub mod connection;
pub mod drivers;
pub mod ipc;
pub mod monitor;
pub mod tasks;
pub mod telemetry;

// Host tests drive embassy timers; the std executor supplies `__pender`.
#[cfg(test)]
use embassy_executor as _;

pub use buffer::SampleBuffer;
pub use connection::{ConnectionState, ConnectionStateMachine};
pub use drivers::{Mpu6050, PhysicalSample, RawSample};
pub use telemetry::{AlertLatch, NotifySink, TelemetryService};
