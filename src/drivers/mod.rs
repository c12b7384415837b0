pub mod mpu6050;
pub mod transport;

#[cfg(test)]
pub(crate) mod mock;

pub use mpu6050::{Mpu6050, PhysicalSample, RawSample, Vector3};
pub use transport::{I2cTransport, RegisterTransport, TransportFault};
