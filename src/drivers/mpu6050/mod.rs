//! MPU6050 six-axis IMU driver
//! ===========================================================
//!
//! Verifies the device identity, programs sample rate and full-scale ranges,
//! and turns data-ready-gated burst reads into calibrated [`PhysicalSample`]s.

pub mod registers;
mod types;

pub use types::{
    AccelRange, Axis, AxisCalibration, CalibrationProfile, DlpfBandwidth, GyroRange,
    PhysicalSample, RawSample, Vector3,
};

use core::fmt;

use embassy_time::Instant;
use embedded_hal_async::delay::DelayNs;

use self::registers as reg;
use super::transport::{RegisterTransport, TransportFault};
use crate::config::ImuConfig;

/* ------------------------------------------------------------------------- */
/*  Errors                                                                   */
/* ------------------------------------------------------------------------- */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InitError {
    /// WHO_AM_I did not carry the MPU6050 signature
    DeviceMismatch { found: u8 },
    TransportFault(TransportFault),
    /// A configuration register did not read back as written
    ConfigRejected { register: u8 },
}

impl From<TransportFault> for InitError {
    fn from(e: TransportFault) -> Self {
        Self::TransportFault(e)
    }
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeviceMismatch { found } => write!(
                f,
                "unexpected device id 0x{:02X}, expected 0x{:02X}",
                found,
                reg::DEVICE_SIGNATURE
            ),
            Self::TransportFault(e) => write!(f, "transport fault during init: {}", e),
            Self::ConfigRejected { register } => {
                write!(f, "register 0x{:02X} did not accept configuration", register)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AcquisitionError {
    /// Data-ready was not observed within the poll limit
    NotReady,
    Transport(TransportFault),
}

impl From<TransportFault> for AcquisitionError {
    fn from(e: TransportFault) -> Self {
        Self::Transport(e)
    }
}

impl fmt::Display for AcquisitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReady => write!(f, "data not ready"),
            Self::Transport(e) => write!(f, "transport fault: {}", e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CalibrationError {
    NoSamples,
    /// Peak-to-peak spread (raw LSB) exceeded the stationary limit
    DeviceMoving { spread: u16 },
    Acquisition(AcquisitionError),
}

impl From<AcquisitionError> for CalibrationError {
    fn from(e: AcquisitionError) -> Self {
        Self::Acquisition(e)
    }
}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSamples => write!(f, "no calibration samples requested"),
            Self::DeviceMoving { spread } => {
                write!(f, "device moved during calibration (spread {} LSB)", spread)
            }
            Self::Acquisition(e) => write!(f, "calibration read failed: {}", e),
        }
    }
}

/* ------------------------------------------------------------------------- */
/*  Driver                                                                   */
/* ------------------------------------------------------------------------- */
pub struct Mpu6050<T, D> {
    transport: T,
    delay: D,
    config: ImuConfig,
    profile: CalibrationProfile,
}

impl<T: RegisterTransport, D: DelayNs> Mpu6050<T, D> {
    /// Bring the sensor up and return a driver ready to sample.
    ///
    /// Transport faults and rejected configuration are retried up to
    /// `config.init_attempts` times with progressive backoff; an identity
    /// mismatch is returned immediately. An invalid `profile` is replaced by
    /// the datasheet profile for the configured ranges.
    pub async fn initialize(
        transport: T,
        delay: D,
        config: ImuConfig,
        profile: CalibrationProfile,
    ) -> Result<Self, InitError> {
        let profile = if profile.valid {
            profile
        } else {
            CalibrationProfile::datasheet(config.accel_range, config.gyro_range)
        };
        let mut imu = Self {
            transport,
            delay,
            config,
            profile,
        };

        let attempts = config.init_attempts.max(1);
        let mut last_error = InitError::TransportFault(TransportFault::Timeout);

        for attempt in 1..=attempts {
            info!("MPU6050 init attempt {}/{}", attempt, attempts);

            match imu.try_init().await {
                Ok(()) => {
                    info!("MPU6050 initialized on attempt {}", attempt);
                    return Ok(imu);
                }
                Err(e @ InitError::DeviceMismatch { .. }) => {
                    error!("MPU6050 identity check failed: {:?}", e);
                    return Err(e);
                }
                Err(e) => {
                    warn!("MPU6050 init attempt {} failed: {:?}", attempt, e);
                    last_error = e;

                    if attempt < attempts {
                        // Progressive backoff: 20ms, 40ms, 80ms, ...
                        let delay_ms = 20u32 << (attempt - 1).min(5);
                        imu.delay.delay_ms(delay_ms).await;
                    }
                }
            }
        }

        error!("MPU6050 initialization failed after {} attempts", attempts);
        Err(last_error)
    }

    async fn try_init(&mut self) -> Result<(), InitError> {
        let id = self.transport.read_byte(reg::WHO_AM_I).await?;
        if id & reg::WHO_AM_I_MASK != reg::DEVICE_SIGNATURE {
            return Err(InitError::DeviceMismatch { found: id });
        }
        debug!("MPU6050 id verified: 0x{:02X}", id);

        self.transport
            .write_byte(reg::PWR_MGMT_1, reg::PWR_DEVICE_RESET)
            .await?;
        self.delay.delay_ms(reg::RESET_SETTLE_MS).await;

        self.transport
            .write_byte(reg::PWR_MGMT_1, reg::PWR_CLKSEL_PLL_XGYRO)
            .await?;
        self.delay.delay_ms(reg::WAKE_SETTLE_MS).await;

        let cfg = self.config;
        self.transport
            .write_byte(reg::SMPLRT_DIV, cfg.sample_rate_divider)
            .await?;
        self.transport.write_byte(reg::CONFIG, cfg.dlpf as u8).await?;
        self.transport
            .write_byte(reg::GYRO_CONFIG, cfg.gyro_range.register_value())
            .await?;
        self.transport
            .write_byte(reg::ACCEL_CONFIG, cfg.accel_range.register_value())
            .await?;
        self.transport
            .write_byte(reg::INT_ENABLE, reg::INT_DATA_RDY)
            .await?;

        // Verify the ranges stuck; a wrong range silently mis-scales every sample.
        for (register, expected) in [
            (reg::GYRO_CONFIG, cfg.gyro_range.register_value()),
            (reg::ACCEL_CONFIG, cfg.accel_range.register_value()),
        ] {
            let got = self.transport.read_byte(register).await?;
            if got & reg::FULL_SCALE_MASK != expected {
                return Err(InitError::ConfigRejected { register });
            }
        }

        Ok(())
    }

    pub fn profile(&self) -> &CalibrationProfile {
        &self.profile
    }

    pub fn config(&self) -> &ImuConfig {
        &self.config
    }

    pub fn set_profile(&mut self, profile: CalibrationProfile) {
        self.profile = profile;
    }

    #[cfg(test)]
    pub(crate) fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn release(self) -> (T, D) {
        (self.transport, self.delay)
    }

    /// Poll INT_STATUS until DATA_RDY is set, up to the configured limit.
    async fn wait_data_ready(&mut self) -> Result<(), AcquisitionError> {
        let limit = self.config.data_ready_poll_limit.max(1);
        for poll in 0..limit {
            let status = self.transport.read_byte(reg::INT_STATUS).await?;
            if status & reg::INT_DATA_RDY != 0 {
                return Ok(());
            }
            if poll + 1 < limit {
                self.delay
                    .delay_us(self.config.data_ready_poll_interval_us)
                    .await;
            }
        }
        Err(AcquisitionError::NotReady)
    }

    /// One fresh burst of raw register values.
    pub async fn read_raw(&mut self) -> Result<RawSample, AcquisitionError> {
        self.wait_data_ready().await?;

        let mut burst = [0u8; reg::DATA_BURST_LEN];
        self.transport.read(reg::ACCEL_XOUT_H, &mut burst).await?;
        Ok(RawSample::from_burst(&burst))
    }

    /// One calibrated sample stamped with the monotonic clock.
    pub async fn sample(&mut self) -> Result<PhysicalSample, AcquisitionError> {
        let raw = self.read_raw().await?;
        let timestamp_us = Instant::now().as_micros();
        Ok(self.profile.apply(&raw, timestamp_us))
    }

    /// Measure zero-rate and zero-g offsets while the device rests.
    ///
    /// On success the new profile becomes active and is returned; on failure
    /// the active profile is left untouched.
    pub async fn calibrate(
        &mut self,
        samples: u16,
    ) -> Result<CalibrationProfile, CalibrationError> {
        if samples == 0 {
            return Err(CalibrationError::NoSamples);
        }
        info!("Calibrating over {} samples, keep the device still", samples);

        let mut sum = [0i64; 7];
        let mut min = [i16::MAX; 7];
        let mut max = [i16::MIN; 7];

        for _ in 0..samples {
            let raw = self.read_raw().await?;
            let channels = [
                raw.accel[0],
                raw.accel[1],
                raw.accel[2],
                raw.gyro[0],
                raw.gyro[1],
                raw.gyro[2],
                raw.temp,
            ];
            // Temperature drifts slowly and does not take part in the motion check.
            for (ch, &v) in channels.iter().enumerate() {
                sum[ch] += v as i64;
                min[ch] = min[ch].min(v);
                max[ch] = max[ch].max(v);
            }
        }

        let spread = (0..6)
            .map(|ch| (max[ch] as i32 - min[ch] as i32) as u32)
            .max()
            .unwrap_or(0);
        if spread > self.config.calibration_max_spread as u32 {
            let spread = spread.min(u16::MAX as u32) as u16;
            warn!("Calibration rejected, spread {} LSB", spread);
            return Err(CalibrationError::DeviceMoving { spread });
        }

        let n = samples as f32;
        let mean = |ch: usize| sum[ch] as f32 / n;

        let accel_lsb_per_g = self.config.accel_range.lsb_per_g();
        let accel_scale = 1.0 / accel_lsb_per_g;
        let gyro_scale = 1.0 / self.config.gyro_range.lsb_per_dps();
        let gravity = self.config.gravity;

        let mut accel = [AxisCalibration::new(0.0, accel_scale); 3];
        for (i, axis) in accel.iter_mut().enumerate() {
            axis.offset = mean(i);
            if i == gravity.axis.index() {
                // At rest this axis reads ±1 g, not zero.
                if gravity.positive {
                    axis.offset -= accel_lsb_per_g;
                } else {
                    axis.offset += accel_lsb_per_g;
                }
            }
        }

        let mut gyro = [AxisCalibration::new(0.0, gyro_scale); 3];
        for (i, axis) in gyro.iter_mut().enumerate() {
            axis.offset = mean(3 + i);
        }

        let profile = CalibrationProfile {
            accel,
            gyro,
            temperature: CalibrationProfile::temperature_calibration(),
            valid: true,
        };
        self.profile = profile;

        info!(
            "Calibration done: accel offsets {} {} {}, gyro offsets {} {} {}",
            accel[0].offset,
            accel[1].offset,
            accel[2].offset,
            gyro[0].offset,
            gyro[1].offset,
            gyro[2].offset
        );
        Ok(profile)
    }
}
