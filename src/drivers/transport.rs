//! Register transport
//!
//! Byte-level register access to a sensor over a synchronous bus. The
//! transport knows nothing about the sensor's register layout; it only moves
//! bytes to and from a starting register address.

use core::fmt;

use embassy_time::{with_timeout, Duration};
use embedded_hal::i2c::ErrorKind;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{Error as _, I2c};

use crate::config::{TRANSPORT_RETRIES, TRANSPORT_RETRY_DELAY_US, TRANSPORT_TIMEOUT_MS};

/// Largest register payload a single write may carry.
pub const MAX_WRITE_LEN: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportFault {
    /// Device did not acknowledge its address or a data byte
    Nack,
    Bus,
    ArbitrationLoss,
    Overrun,
    /// Operation did not complete within the bus timeout
    Timeout,
    /// Payload does not fit in a single transfer
    InvalidLength,
    Other,
}

impl From<ErrorKind> for TransportFault {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::NoAcknowledge(_) => Self::Nack,
            ErrorKind::Bus => Self::Bus,
            ErrorKind::ArbitrationLoss => Self::ArbitrationLoss,
            ErrorKind::Overrun => Self::Overrun,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for TransportFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nack => write!(f, "device did not acknowledge"),
            Self::Bus => write!(f, "bus error"),
            Self::ArbitrationLoss => write!(f, "arbitration lost"),
            Self::Overrun => write!(f, "overrun"),
            Self::Timeout => write!(f, "bus timeout"),
            Self::InvalidLength => write!(f, "invalid transfer length"),
            Self::Other => write!(f, "bus fault"),
        }
    }
}

/// Register-level access to a device.
///
/// Reads fill the whole of `buf`, auto-incrementing from `address`.
#[allow(async_fn_in_trait)]
pub trait RegisterTransport {
    async fn read(&mut self, address: u8, buf: &mut [u8]) -> Result<(), TransportFault>;

    async fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), TransportFault>;

    async fn read_byte(&mut self, address: u8) -> Result<u8, TransportFault> {
        let mut buf = [0u8; 1];
        self.read(address, &mut buf).await?;
        Ok(buf[0])
    }

    async fn write_byte(&mut self, address: u8, value: u8) -> Result<(), TransportFault> {
        self.write(address, &[value]).await
    }
}

/// [`RegisterTransport`] over an async I2C bus.
///
/// Every operation is attempted up to `retries` times; each attempt is bounded
/// by `timeout`.
pub struct I2cTransport<I, D> {
    i2c: I,
    delay: D,
    device: u8,
    retries: u8,
    timeout: Duration,
}

impl<I: I2c, D: DelayNs> I2cTransport<I, D> {
    pub fn new(i2c: I, delay: D, device: u8) -> Self {
        Self {
            i2c,
            delay,
            device,
            retries: TRANSPORT_RETRIES,
            timeout: Duration::from_millis(TRANSPORT_TIMEOUT_MS),
        }
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.retries = retries.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn release(self) -> (I, D) {
        (self.i2c, self.delay)
    }

    async fn read_once(&mut self, address: u8, buf: &mut [u8]) -> Result<(), TransportFault> {
        match with_timeout(self.timeout, self.i2c.write_read(self.device, &[address], buf)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.kind().into()),
            Err(_) => Err(TransportFault::Timeout),
        }
    }

    async fn write_once(&mut self, frame: &[u8]) -> Result<(), TransportFault> {
        match with_timeout(self.timeout, self.i2c.write(self.device, frame)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.kind().into()),
            Err(_) => Err(TransportFault::Timeout),
        }
    }
}

impl<I: I2c, D: DelayNs> RegisterTransport for I2cTransport<I, D> {
    async fn read(&mut self, address: u8, buf: &mut [u8]) -> Result<(), TransportFault> {
        let mut last_error = TransportFault::Timeout;

        for attempt in 1..=self.retries {
            match self.read_once(address, buf).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    last_error = e;
                    if attempt < self.retries {
                        self.delay.delay_us(TRANSPORT_RETRY_DELAY_US).await;
                    }
                }
            }
        }

        trace!("read 0x{:02X} failed after {} attempts", address, self.retries);
        Err(last_error)
    }

    async fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), TransportFault> {
        if bytes.len() > MAX_WRITE_LEN {
            return Err(TransportFault::InvalidLength);
        }
        let mut frame = [0u8; MAX_WRITE_LEN + 1];
        frame[0] = address;
        frame[1..=bytes.len()].copy_from_slice(bytes);
        let frame_len = bytes.len() + 1;

        let mut last_error = TransportFault::Timeout;

        for attempt in 1..=self.retries {
            match self.write_once(&frame[..frame_len]).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    last_error = e;
                    if attempt < self.retries {
                        self.delay.delay_us(TRANSPORT_RETRY_DELAY_US).await;
                    }
                }
            }
        }

        trace!("write 0x{:02X} failed after {} attempts", address, self.retries);
        Err(last_error)
    }
}
