//! Long-running loops. Each is a plain `async fn`; the application wraps
//! them in its executor's task attribute and hands in the shared statics
//! from [`crate::ipc`].

pub mod acquisition;
pub mod telemetry;

pub use acquisition::{run_acquisition, AcquisitionControl, AcquisitionLoop};
pub use telemetry::run_telemetry;

use crate::drivers::mpu6050::{CalibrationError, CalibrationProfile};

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SystemMessage {
    Alert(SystemAlert),
    /// New profile for display or persistence
    CalibrationComplete(CalibrationProfile),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SystemAlert {
    ImuFault { consecutive_faults: u32 },
    ImpactDetected { timestamp_us: u64 },
    CalibrationFailed(CalibrationError),
}
