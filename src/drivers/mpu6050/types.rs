use super::registers as reg;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const fn index(self) -> usize {
        match self {
            Self::X => 0,
            Self::Y => 1,
            Self::Z => 2,
        }
    }
}

/// Accelerometer full-scale range (AFS_SEL)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum AccelRange {
    G2 = 0,
    G4 = 1,
    G8 = 2,
    G16 = 3,
}

impl AccelRange {
    pub const fn lsb_per_g(self) -> f32 {
        match self {
            Self::G2 => 16384.0,
            Self::G4 => 8192.0,
            Self::G8 => 4096.0,
            Self::G16 => 2048.0,
        }
    }

    pub const fn register_value(self) -> u8 {
        (self as u8) << reg::FULL_SCALE_SHIFT
    }
}

/// Gyroscope full-scale range (FS_SEL)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum GyroRange {
    Dps250 = 0,
    Dps500 = 1,
    Dps1000 = 2,
    Dps2000 = 3,
}

impl GyroRange {
    pub const fn lsb_per_dps(self) -> f32 {
        match self {
            Self::Dps250 => 131.0,
            Self::Dps500 => 65.5,
            Self::Dps1000 => 32.8,
            Self::Dps2000 => 16.4,
        }
    }

    pub const fn register_value(self) -> u8 {
        (self as u8) << reg::FULL_SCALE_SHIFT
    }
}

/// Digital low-pass filter setting (CONFIG.DLPF_CFG), accel bandwidth
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum DlpfBandwidth {
    Hz260 = 0,
    Hz184 = 1,
    Hz94 = 2,
    Hz44 = 3,
    Hz21 = 4,
    Hz10 = 5,
    Hz5 = 6,
}

/// One burst of raw register values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawSample {
    pub accel: [i16; 3],
    pub gyro: [i16; 3],
    pub temp: i16,
}

impl RawSample {
    /// Decode the 14-byte data block starting at ACCEL_XOUT_H.
    /// Every field is a big-endian (high byte first) two's-complement `i16`.
    pub fn from_burst(burst: &[u8; reg::DATA_BURST_LEN]) -> Self {
        let field = |at: usize| i16::from_be_bytes([burst[at], burst[at + 1]]);
        Self {
            accel: [
                field(reg::idx::ACCEL),
                field(reg::idx::ACCEL + 2),
                field(reg::idx::ACCEL + 4),
            ],
            temp: field(reg::idx::TEMP),
            gyro: [
                field(reg::idx::GYRO),
                field(reg::idx::GYRO + 2),
                field(reg::idx::GYRO + 4),
            ],
        }
    }

    /// Inverse of [`RawSample::from_burst`].
    pub fn to_burst(&self) -> [u8; reg::DATA_BURST_LEN] {
        let mut burst = [0u8; reg::DATA_BURST_LEN];
        for (i, v) in self.accel.iter().enumerate() {
            burst[reg::idx::ACCEL + 2 * i..][..2].copy_from_slice(&v.to_be_bytes());
        }
        burst[reg::idx::TEMP..][..2].copy_from_slice(&self.temp.to_be_bytes());
        for (i, v) in self.gyro.iter().enumerate() {
            burst[reg::idx::GYRO + 2 * i..][..2].copy_from_slice(&v.to_be_bytes());
        }
        burst
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const ZERO: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn norm_squared(&self) -> f32 {
        self.x * self.x + self.y * self.y + self.z * self.z
    }
}

/// Calibrated sample in physical units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PhysicalSample {
    /// Monotonic acquisition time
    pub timestamp_us: u64,
    /// g
    pub accel: Vector3,
    /// degrees per second
    pub gyro: Vector3,
    /// degrees Celsius
    pub temperature: f32,
}

impl PhysicalSample {
    pub const ZERO: Self = Self {
        timestamp_us: 0,
        accel: Vector3::ZERO,
        gyro: Vector3::ZERO,
        temperature: 0.0,
    };
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AxisCalibration {
    /// Raw LSB
    pub offset: f32,
    /// Physical units per LSB
    pub scale: f32,
}

impl AxisCalibration {
    pub const fn new(offset: f32, scale: f32) -> Self {
        Self { offset, scale }
    }

    /// `(raw - offset) * scale`, computed in `f32` so the full `i16` range is
    /// representable without overflow.
    #[inline]
    pub fn apply(&self, raw: i16) -> f32 {
        (raw as f32 - self.offset) * self.scale
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CalibrationProfile {
    pub accel: [AxisCalibration; 3],
    pub gyro: [AxisCalibration; 3],
    pub temperature: AxisCalibration,
    /// Offsets were measured (or supplied) rather than assumed zero
    pub valid: bool,
}

impl CalibrationProfile {
    /// Zero offsets and datasheet sensitivities for the given ranges.
    pub fn datasheet(accel_range: AccelRange, gyro_range: GyroRange) -> Self {
        let a = AxisCalibration::new(0.0, 1.0 / accel_range.lsb_per_g());
        let g = AxisCalibration::new(0.0, 1.0 / gyro_range.lsb_per_dps());
        Self {
            accel: [a; 3],
            gyro: [g; 3],
            temperature: Self::temperature_calibration(),
            valid: false,
        }
    }

    /// Datasheet temperature conversion expressed as offset and scale.
    pub fn temperature_calibration() -> AxisCalibration {
        AxisCalibration::new(
            -reg::TEMP_OFFSET_DEGREES * reg::TEMP_LSB_PER_DEGREE,
            1.0 / reg::TEMP_LSB_PER_DEGREE,
        )
    }

    pub fn apply(&self, raw: &RawSample, timestamp_us: u64) -> PhysicalSample {
        PhysicalSample {
            timestamp_us,
            accel: Vector3 {
                x: self.accel[0].apply(raw.accel[0]),
                y: self.accel[1].apply(raw.accel[1]),
                z: self.accel[2].apply(raw.accel[2]),
            },
            gyro: Vector3 {
                x: self.gyro[0].apply(raw.gyro[0]),
                y: self.gyro[1].apply(raw.gyro[1]),
                z: self.gyro[2].apply(raw.gyro[2]),
            },
            temperature: self.temperature.apply(raw.temp),
        }
    }
}
