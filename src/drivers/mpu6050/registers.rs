// MPU6050 register map and datasheet constants (PS-MPU-6000A, RM-MPU-6000A).

/* ────────────────── Identity ──────────────────── */
pub const WHO_AM_I: u8 = 0x75;
pub const DEVICE_SIGNATURE: u8 = 0x68;
/// WHO_AM_I bits [6:1] hold the identity; bits 0 and 7 are reserved.
pub const WHO_AM_I_MASK: u8 = 0x7E;

/* ────────────────── Configuration ─────────────── */
pub const SMPLRT_DIV: u8 = 0x19;
pub const CONFIG: u8 = 0x1A;
pub const GYRO_CONFIG: u8 = 0x1B;
pub const ACCEL_CONFIG: u8 = 0x1C;
pub const INT_ENABLE: u8 = 0x38;
pub const INT_STATUS: u8 = 0x3A;
pub const PWR_MGMT_1: u8 = 0x6B;

/// FS_SEL / AFS_SEL live in bits [4:3] of GYRO_CONFIG / ACCEL_CONFIG
pub const FULL_SCALE_SHIFT: u8 = 3;
pub const FULL_SCALE_MASK: u8 = 0b11 << FULL_SCALE_SHIFT;

/* ────────────────── Bits ──────────────────────── */
pub const PWR_DEVICE_RESET: u8 = 1 << 7;
/// CLKSEL = 1: PLL with X axis gyroscope reference, sleep cleared
pub const PWR_CLKSEL_PLL_XGYRO: u8 = 0x01;
pub const INT_DATA_RDY: u8 = 1 << 0;

/* ────────────────── Data block ────────────────── */
/// First of 14 contiguous data registers:
/// ACCEL_X/Y/Z (6) · TEMP (2) · GYRO_X/Y/Z (6), high byte first.
pub const ACCEL_XOUT_H: u8 = 0x3B;
pub const DATA_BURST_LEN: usize = 14;

pub mod idx {
    pub const ACCEL: usize = 0;
    pub const TEMP: usize = 6;
    pub const GYRO: usize = 8;
}

/* ────────────────── Timing ────────────────────── */
pub const RESET_SETTLE_MS: u32 = 100;
pub const WAKE_SETTLE_MS: u32 = 10;

/* ────────────────── Conversion ────────────────── */
/// Temperature: °C = raw / 340 + 36.53
pub const TEMP_LSB_PER_DEGREE: f32 = 340.0;
pub const TEMP_OFFSET_DEGREES: f32 = 36.53;
