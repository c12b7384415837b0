use crate::drivers::mpu6050::AcquisitionError;
use crate::drivers::PhysicalSample;

/// Counts consecutive transport faults during steady-state sampling.
pub struct HealthMonitor {
    threshold: u32,
    consecutive: u32,
    total: u32,
}

impl HealthMonitor {
    pub const fn new(threshold: u32) -> Self {
        Self {
            threshold,
            consecutive: 0,
            total: 0,
        }
    }

    /// Record a successful sample. Returns the length of the fault streak it
    /// ended, if any.
    pub fn record_success(&mut self) -> Option<u32> {
        let streak = core::mem::take(&mut self.consecutive);
        if streak > 0 {
            info!("IMU recovered after {} consecutive faults", streak);
            Some(streak)
        } else {
            None
        }
    }

    /// Record a failed sample. Returns `Some(streak)` exactly once per fault
    /// streak, when it reaches the threshold. `NotReady` is not a fault.
    pub fn record_error(&mut self, error: &AcquisitionError) -> Option<u32> {
        if matches!(error, AcquisitionError::NotReady) {
            return None;
        }
        self.consecutive = self.consecutive.saturating_add(1);
        self.total = self.total.wrapping_add(1);

        if self.consecutive % 100 == 1 {
            warn!("IMU read error #{}: {:?}", self.total, error);
        }

        if self.consecutive == self.threshold {
            error!("IMU unhealthy: {} consecutive faults", self.consecutive);
            Some(self.consecutive)
        } else {
            None
        }
    }

    pub fn consecutive_faults(&self) -> u32 {
        self.consecutive
    }

    pub fn total_faults(&self) -> u32 {
        self.total
    }
}

/// Edge detector on acceleration magnitude.
pub struct ImpactDetector {
    threshold_sq: f32,
    armed: bool,
}

impl ImpactDetector {
    pub fn new(threshold_g: f32) -> Self {
        Self {
            threshold_sq: threshold_g * threshold_g,
            armed: true,
        }
    }

    /// True on the sample where |accel| first exceeds the threshold. Re-arms
    /// once the magnitude drops back below it.
    pub fn update(&mut self, sample: &PhysicalSample) -> bool {
        let above = sample.accel.norm_squared() > self.threshold_sq;
        let fired = above && self.armed;
        self.armed = !above;
        fired
    }
}
