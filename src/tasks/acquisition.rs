use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Sender;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Ticker};
use embedded_hal_async::delay::DelayNs;
use portable_atomic::{AtomicBool, Ordering};

use super::{SystemAlert, SystemMessage};
use crate::buffer::SampleBuffer;
use crate::config::SYSTEM_CHANNEL_SIZE;
use crate::drivers::mpu6050::{AcquisitionError, CalibrationError, CalibrationProfile};
use crate::drivers::{Mpu6050, PhysicalSample, RegisterTransport};
use crate::ipc;
use crate::monitor::{HealthMonitor, ImpactDetector};
use crate::telemetry::protocol::flags;
use crate::telemetry::AlertLatch;

pub type SystemSender<'a> =
    Sender<'a, CriticalSectionRawMutex, SystemMessage, SYSTEM_CHANNEL_SIZE>;

/// Inputs that steer [`run_acquisition`] from other contexts.
#[derive(Clone, Copy)]
pub struct AcquisitionControl<'a> {
    /// Number of samples to average for a recalibration
    pub calibration: &'a Signal<CriticalSectionRawMutex, u16>,
    pub sensing: &'a AtomicBool,
}

impl AcquisitionControl<'static> {
    /// Controls backed by [`ipc::CALIBRATION_REQUEST`] and [`ipc::SENSING_ENABLED`].
    pub fn shared() -> Self {
        Self {
            calibration: &ipc::CALIBRATION_REQUEST,
            sensing: &ipc::SENSING_ENABLED,
        }
    }
}

/// Producer side: sample, store, watch for faults and impacts.
pub struct AcquisitionLoop<'a, T, D, const N: usize> {
    imu: Mpu6050<T, D>,
    buffer: &'a SampleBuffer<N>,
    health: HealthMonitor,
    impact: ImpactDetector,
    system: SystemSender<'a>,
    alerts: Option<&'a AlertLatch>,
}

impl<'a, T: RegisterTransport, D: DelayNs, const N: usize> AcquisitionLoop<'a, T, D, N> {
    pub fn new(
        imu: Mpu6050<T, D>,
        buffer: &'a SampleBuffer<N>,
        system: SystemSender<'a>,
    ) -> Self {
        let config = imu.config();
        let health = HealthMonitor::new(config.health_fault_threshold);
        let impact = ImpactDetector::new(config.impact_threshold_g);
        Self {
            imu,
            buffer,
            health,
            impact,
            system,
            alerts: None,
        }
    }

    /// Also raise impact and fault bits for the BLE peer.
    pub fn with_alerts(mut self, alerts: &'a AlertLatch) -> Self {
        self.alerts = Some(alerts);
        self
    }

    /// One acquisition cycle. On error nothing is enqueued.
    pub async fn step(&mut self) -> Result<PhysicalSample, AcquisitionError> {
        match self.imu.sample().await {
            Ok(sample) => {
                self.health.record_success();
                self.buffer.push(sample);
                if self.impact.update(&sample) {
                    info!("Impact at {} us", sample.timestamp_us);
                    self.raise(flags::IMPACT);
                    self.publish(SystemMessage::Alert(SystemAlert::ImpactDetected {
                        timestamp_us: sample.timestamp_us,
                    }));
                }
                Ok(sample)
            }
            Err(e) => {
                if let Some(consecutive_faults) = self.health.record_error(&e) {
                    self.raise(flags::IMU_FAULT);
                    self.publish(SystemMessage::Alert(SystemAlert::ImuFault {
                        consecutive_faults,
                    }));
                }
                Err(e)
            }
        }
    }

    /// Run the calibration routine and publish the outcome.
    pub async fn calibrate(
        &mut self,
        samples: u16,
    ) -> Result<CalibrationProfile, CalibrationError> {
        let result = self.imu.calibrate(samples).await;
        match result {
            Ok(profile) => self.publish(SystemMessage::CalibrationComplete(profile)),
            Err(e) => {
                error!("Calibration failed: {:?}", e);
                self.publish(SystemMessage::Alert(SystemAlert::CalibrationFailed(e)));
            }
        }
        result
    }

    pub fn imu(&self) -> &Mpu6050<T, D> {
        &self.imu
    }

    pub fn health(&self) -> &HealthMonitor {
        &self.health
    }

    fn raise(&self, bits: u8) {
        if let Some(alerts) = self.alerts {
            alerts.raise(bits);
        }
    }

    fn publish(&self, message: SystemMessage) {
        if self.system.try_send(message).is_err() {
            warn!("System channel full, dropping message");
        }
    }
}

/// Sample every `period`, servicing calibration requests first. While
/// `control.sensing` is cleared the loop keeps ticking without sampling.
pub async fn run_acquisition<T: RegisterTransport, D: DelayNs, const N: usize>(
    mut acquisition: AcquisitionLoop<'_, T, D, N>,
    period: Duration,
    control: AcquisitionControl<'_>,
) {
    info!(
        "Acquisition started - sampling at {}ms intervals",
        period.as_millis()
    );
    let mut ticker = Ticker::every(period);

    loop {
        ticker.next().await;

        if let Some(samples) = control.calibration.try_take() {
            // Result is published on the system channel.
            let _ = acquisition.calibrate(samples).await;
            ticker.reset();
            continue;
        }

        if !control.sensing.load(Ordering::Acquire) {
            continue;
        }

        // Errors are counted by the health monitor; the cycle is skipped.
        let _ = acquisition.step().await;
    }
}
