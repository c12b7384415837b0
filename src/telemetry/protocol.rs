//! GATT identifiers and the notification payload format.
//!
//! Payload, little-endian:
//!
//! ```text
//! [seq: u8][flags | count: u8] count × { t_us: u32, ax, ay, az, gx, gy, gz, temp: i16 }
//! ```
//!
//! The low nibble of the second header byte is the record count; the high
//! bits carry alert flags (see [`flags`]) raised since the previous delivered
//! packet.
//!
//! Accel is milli-g, gyro deci-degrees per second, temperature centi-degrees
//! Celsius. The timestamp is the low 32 bits of the acquisition time.

use core::fmt;

use bytemuck::{Pod, Zeroable};
use heapless::Vec;

use crate::drivers::PhysicalSample;

// Service and characteristic UUIDs (custom 128-bit)
pub const TELEMETRY_SERVICE_UUID: u128 = 0x6e400001_7a3c_4b5e_9f2d_1c8a0b3e5d71;
/// Notify-only; one packet per notification
pub const TELEMETRY_CHAR_UUID: u128 = 0x6e400002_7a3c_4b5e_9f2d_1c8a0b3e5d71;

pub const DEFAULT_ATT_MTU: u16 = 23;
pub const MAX_ATT_MTU: u16 = 247;
/// Opcode + attribute handle
pub const ATT_NOTIFY_OVERHEAD: usize = 3;

pub const HEADER_LEN: usize = 2;
pub const COUNT_MASK: u8 = 0x0F;

/// Alert bits in the second header byte.
pub mod flags {
    /// Acceleration magnitude crossed the impact threshold
    pub const IMPACT: u8 = 1 << 7;
    /// Driver reported a run of transport faults
    pub const IMU_FAULT: u8 = 1 << 6;
    pub const ALL: u8 = IMPACT | IMU_FAULT;
}
pub const WIRE_SAMPLE_LEN: usize = core::mem::size_of::<WireSample>();
pub const MAX_PAYLOAD_LEN: usize = MAX_ATT_MTU as usize - ATT_NOTIFY_OVERHEAD;
pub const MAX_SAMPLES_PER_PACKET: usize = (MAX_PAYLOAD_LEN - HEADER_LEN) / WIRE_SAMPLE_LEN;

const MILLI: f32 = 1000.0;
const DECI: f32 = 10.0;
const CENTI: f32 = 100.0;

/// Notification payload budget for a negotiated ATT MTU.
pub fn payload_budget(att_mtu: u16) -> usize {
    att_mtu.clamp(DEFAULT_ATT_MTU, MAX_ATT_MTU) as usize - ATT_NOTIFY_OVERHEAD
}

/// Number of records that fit in one notification.
pub fn samples_per_packet(att_mtu: u16) -> usize {
    (payload_budget(att_mtu) - HEADER_LEN) / WIRE_SAMPLE_LEN
}

/// Round to nearest (ties away from zero) and saturate to the `i16` range.
/// NaN maps to zero.
fn quantize(value: f32, units_per_one: f32) -> i16 {
    let scaled = value * units_per_one;
    let rounded = if scaled >= 0.0 {
        scaled + 0.5
    } else {
        scaled - 0.5
    };
    // `as` truncates toward zero and saturates
    rounded as i16
}

/// One sample as it appears on the wire.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Zeroable, Pod)]
pub struct WireSample {
    timestamp_us: [u8; 4],
    accel_mg: [[u8; 2]; 3],
    gyro_ddps: [[u8; 2]; 3],
    temp_cdeg: [u8; 2],
}

impl WireSample {
    pub fn from_sample(sample: &PhysicalSample) -> Self {
        let a = &sample.accel;
        let g = &sample.gyro;
        Self {
            timestamp_us: (sample.timestamp_us as u32).to_le_bytes(),
            accel_mg: [a.x, a.y, a.z].map(|v| quantize(v, MILLI).to_le_bytes()),
            gyro_ddps: [g.x, g.y, g.z].map(|v| quantize(v, DECI).to_le_bytes()),
            temp_cdeg: quantize(sample.temperature, CENTI).to_le_bytes(),
        }
    }

    pub fn timestamp_us(&self) -> u32 {
        u32::from_le_bytes(self.timestamp_us)
    }

    pub fn accel_mg(&self) -> [i16; 3] {
        self.accel_mg.map(i16::from_le_bytes)
    }

    pub fn gyro_ddps(&self) -> [i16; 3] {
        self.gyro_ddps.map(i16::from_le_bytes)
    }

    pub fn temp_cdeg(&self) -> i16 {
        i16::from_le_bytes(self.temp_cdeg)
    }
}

/// A serialized notification, at most [`MAX_PAYLOAD_LEN`] bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationPacket {
    bytes: Vec<u8, MAX_PAYLOAD_LEN>,
}

impl NotificationPacket {
    /// Serialize as many of `samples` as fit in `att_mtu`, tagged with the
    /// alert `flags`. Returns the packet and the number of samples it carries.
    pub fn build(
        sequence: u8,
        alert_flags: u8,
        samples: &[PhysicalSample],
        att_mtu: u16,
    ) -> (Self, usize) {
        let count = samples.len().min(samples_per_packet(att_mtu));
        let mut bytes = Vec::new();
        // Capacity is MAX_PAYLOAD_LEN and count is bounded by the budget
        let _ = bytes.extend_from_slice(&[sequence, (alert_flags & flags::ALL) | count as u8]);
        for sample in &samples[..count] {
            let record = WireSample::from_sample(sample);
            let _ = bytes.extend_from_slice(bytemuck::bytes_of(&record));
        }
        (Self { bytes }, count)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeError {
    /// Shorter than the header
    Truncated,
    /// Length disagrees with the header count
    LengthMismatch { expected: usize, actual: usize },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "payload shorter than header"),
            Self::LengthMismatch { expected, actual } => {
                write!(f, "payload is {} bytes, header implies {}", actual, expected)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPacket {
    pub sequence: u8,
    pub flags: u8,
    pub samples: Vec<WireSample, MAX_SAMPLES_PER_PACKET>,
}

impl DecodedPacket {
    pub fn impact(&self) -> bool {
        self.flags & flags::IMPACT != 0
    }

    pub fn imu_fault(&self) -> bool {
        self.flags & flags::IMU_FAULT != 0
    }
}

pub fn decode_packet(payload: &[u8]) -> Result<DecodedPacket, DecodeError> {
    let [sequence, tag, body @ ..] = payload else {
        return Err(DecodeError::Truncated);
    };
    let count = (tag & COUNT_MASK) as usize;
    let expected = HEADER_LEN + count * WIRE_SAMPLE_LEN;
    if payload.len() != expected || count > MAX_SAMPLES_PER_PACKET {
        return Err(DecodeError::LengthMismatch {
            expected,
            actual: payload.len(),
        });
    }

    let mut samples = Vec::new();
    for chunk in body.chunks_exact(WIRE_SAMPLE_LEN) {
        let _ = samples.push(bytemuck::pod_read_unaligned(chunk));
    }
    Ok(DecodedPacket {
        sequence: *sequence,
        flags: tag & !COUNT_MASK,
        samples,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::Vector3;

    fn sample(t: u64) -> PhysicalSample {
        PhysicalSample {
            timestamp_us: t,
            accel: Vector3 { x: 0.0016, y: -1.0, z: 0.98 },
            gyro: Vector3 { x: 12.34, y: -0.06, z: 250.0 },
            temperature: 24.567,
        }
    }

    #[test]
    fn layout_constants() {
        assert_eq!(WIRE_SAMPLE_LEN, 18);
        assert_eq!(MAX_PAYLOAD_LEN, 244);
        assert_eq!(MAX_SAMPLES_PER_PACKET, 13);
        assert_eq!(samples_per_packet(DEFAULT_ATT_MTU), 1);
        assert_eq!(samples_per_packet(MAX_ATT_MTU), 13);
        assert_eq!(samples_per_packet(1000), 13);
        assert_eq!(samples_per_packet(0), 1);
        assert_eq!(samples_per_packet(59), 3);
    }

    #[test]
    fn quantize_rounds_to_nearest_and_saturates() {
        assert_eq!(quantize(0.0016, MILLI), 2);
        assert_eq!(quantize(-0.0016, MILLI), -2);
        assert_eq!(quantize(0.0014, MILLI), 1);
        assert_eq!(quantize(2.5, 1.0), 3);
        assert_eq!(quantize(-2.5, 1.0), -3);
        assert_eq!(quantize(40.0, MILLI), i16::MAX);
        assert_eq!(quantize(-40.0, MILLI), i16::MIN);
        assert_eq!(quantize(f32::NAN, MILLI), 0);
        assert_eq!(quantize(f32::INFINITY, DECI), i16::MAX);
    }

    #[test]
    fn record_fields_are_little_endian_in_order() {
        let (packet, n) = NotificationPacket::build(7, 0, &[sample(0x0102_0304)], DEFAULT_ATT_MTU);
        assert_eq!(n, 1);
        let b = packet.as_bytes();
        assert_eq!(b.len(), HEADER_LEN + WIRE_SAMPLE_LEN);
        assert_eq!(&b[..2], &[7, 1]);
        assert_eq!(&b[2..6], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&b[6..8], &2i16.to_le_bytes()); // ax
        assert_eq!(&b[8..10], &(-1000i16).to_le_bytes()); // ay
        assert_eq!(&b[10..12], &980i16.to_le_bytes()); // az
        assert_eq!(&b[12..14], &123i16.to_le_bytes()); // gx
        assert_eq!(&b[14..16], &(-1i16).to_le_bytes()); // gy
        assert_eq!(&b[16..18], &2500i16.to_le_bytes()); // gz
        assert_eq!(&b[18..20], &2457i16.to_le_bytes()); // temp
    }

    #[test]
    fn timestamp_wraps_at_32_bits() {
        let w = WireSample::from_sample(&sample((1u64 << 32) + 5));
        assert_eq!(w.timestamp_us(), 5);
    }

    #[test]
    fn build_respects_mtu_budget() {
        let samples: std::vec::Vec<_> = (0..20).map(sample).collect();
        for mtu in [23u16, 40, 41, 100, 185, 247] {
            let (packet, n) = NotificationPacket::build(0, 0, &samples, mtu);
            assert!(packet.len() <= mtu as usize - ATT_NOTIFY_OVERHEAD);
            assert_eq!(n, samples_per_packet(mtu));
        }
    }

    #[test]
    fn decode_reads_back_header_and_records() {
        let samples = [sample(10), sample(20), sample(30)];
        let (packet, n) = NotificationPacket::build(200, 0, &samples, MAX_ATT_MTU);
        assert_eq!(n, 3);

        let decoded = decode_packet(packet.as_bytes()).unwrap();
        assert_eq!(decoded.sequence, 200);
        assert_eq!(decoded.flags, 0);
        assert_eq!(decoded.samples.len(), 3);
        assert_eq!(decoded.samples[2].timestamp_us(), 30);
        assert_eq!(decoded.samples[0].accel_mg(), [2, -1000, 980]);
        assert_eq!(decoded.samples[0].gyro_ddps(), [123, -1, 2500]);
        assert_eq!(decoded.samples[1].temp_cdeg(), 2457);
    }

    #[test]
    fn alert_flags_share_the_count_byte() {
        let samples: std::vec::Vec<_> = (0..20).map(sample).collect();
        let (packet, n) = NotificationPacket::build(3, flags::IMPACT, &samples, MAX_ATT_MTU);
        assert_eq!(n, MAX_SAMPLES_PER_PACKET);
        assert_eq!(packet.as_bytes()[1], 0x80 | 13);

        let decoded = decode_packet(packet.as_bytes()).unwrap();
        assert!(decoded.impact());
        assert!(!decoded.imu_fault());
        assert_eq!(decoded.samples.len(), 13);

        // Bits outside the defined flags never leak into the count.
        let (packet, _) = NotificationPacket::build(0, 0xFF, &samples[..1], DEFAULT_ATT_MTU);
        let decoded = decode_packet(packet.as_bytes()).unwrap();
        assert_eq!(decoded.flags, flags::ALL);
        assert_eq!(decoded.samples.len(), 1);
    }

    #[test]
    fn decode_rejects_malformed_payloads() {
        assert_eq!(decode_packet(&[]), Err(DecodeError::Truncated));
        assert_eq!(decode_packet(&[1]), Err(DecodeError::Truncated));
        assert_eq!(
            decode_packet(&[0, 1, 0, 0]),
            Err(DecodeError::LengthMismatch { expected: 20, actual: 4 })
        );
        assert!(decode_packet(&[0, 0]).unwrap().samples.is_empty());
    }
}
