// Centralize all configuration constants
pub const IMU_SAMPLE_RATE_HZ: u32 = 100;
pub const IMU_SAMPLE_PERIOD_MS: u64 = 1000 / IMU_SAMPLE_RATE_HZ as u64;
pub const TELEMETRY_PERIOD_MS: u64 = 20;

pub const MPU6050_ADDRESS: u8 = 0x68;
pub const MPU6050_ADDRESS_ALT: u8 = 0x69;

// Bus bounds
pub const TRANSPORT_RETRIES: u8 = 3;
pub const TRANSPORT_TIMEOUT_MS: u64 = 5;
pub const TRANSPORT_RETRY_DELAY_US: u32 = 500;

// Driver bounds
pub const INIT_ATTEMPTS: u8 = 5;
pub const DATA_READY_POLL_LIMIT: u16 = 10;
pub const DATA_READY_POLL_INTERVAL_US: u32 = 200;
pub const HEALTH_FAULT_THRESHOLD: u32 = 50;

// Calibration
pub const CALIBRATION_SAMPLES: u16 = 200;
/// Peak-to-peak raw spread above which the device is considered moving.
pub const CALIBRATION_MAX_SPREAD: u16 = 1200;

// Impact detection (sum of acceleration above 4 g)
pub const IMPACT_THRESHOLD_G: f32 = 4.0;

// Buffer and channel sizes
pub const SAMPLE_BUFFER_CAPACITY: usize = 256;
pub const SYSTEM_CHANNEL_SIZE: usize = 8;

/// Sample-rate divider giving `IMU_SAMPLE_RATE_HZ` from the 1 kHz DLPF-on gyro output rate.
pub const SAMPLE_RATE_DIVIDER: u8 = (1000 / IMU_SAMPLE_RATE_HZ - 1) as u8;

use crate::drivers::mpu6050::{AccelRange, Axis, DlpfBandwidth, GyroRange};

/// Which accelerometer axis carries gravity while the board rests for calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GravityAxis {
    pub axis: Axis,
    /// `true` when the axis reads +1 g at rest.
    pub positive: bool,
}

impl Default for GravityAxis {
    fn default() -> Self {
        Self {
            axis: Axis::Z,
            positive: true,
        }
    }
}

/// Runtime driver settings.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ImuConfig {
    pub sample_rate_divider: u8,
    pub dlpf: DlpfBandwidth,
    pub accel_range: AccelRange,
    pub gyro_range: GyroRange,
    pub data_ready_poll_limit: u16,
    pub data_ready_poll_interval_us: u32,
    pub init_attempts: u8,
    pub calibration_max_spread: u16,
    pub gravity: GravityAxis,
    pub health_fault_threshold: u32,
    pub impact_threshold_g: f32,
}

impl Default for ImuConfig {
    fn default() -> Self {
        Self {
            sample_rate_divider: SAMPLE_RATE_DIVIDER,
            dlpf: DlpfBandwidth::Hz44,
            accel_range: AccelRange::G8,
            gyro_range: GyroRange::Dps500,
            data_ready_poll_limit: DATA_READY_POLL_LIMIT,
            data_ready_poll_interval_us: DATA_READY_POLL_INTERVAL_US,
            init_attempts: INIT_ATTEMPTS,
            calibration_max_spread: CALIBRATION_MAX_SPREAD,
            gravity: GravityAxis::default(),
            health_fault_threshold: HEALTH_FAULT_THRESHOLD,
            impact_threshold_g: IMPACT_THRESHOLD_G,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn divider_matches_sample_rate() {
        assert_eq!(SAMPLE_RATE_DIVIDER, 9);
        assert_eq!(1000 / (1 + SAMPLE_RATE_DIVIDER as u32), IMU_SAMPLE_RATE_HZ);
    }
}
