//! Test doubles: an MPU6050 register model and a delay that returns at once.

use std::collections::VecDeque;

use embedded_hal_async::delay::DelayNs;

use super::mpu6050::registers as reg;
use super::mpu6050::RawSample;
use super::transport::{RegisterTransport, TransportFault};

pub struct NoopDelay;

impl DelayNs for NoopDelay {
    async fn delay_ns(&mut self, _ns: u32) {}
}

/// Register-file model of an MPU6050.
///
/// Reads auto-increment across the register file. DATA_RDY in INT_STATUS is
/// reported after `polls_before_ready` polls and re-armed by every burst read
/// of the data block, which also loads the next queued [`RawSample`].
pub struct MockMpu6050 {
    registers: [u8; 128],
    queued: VecDeque<RawSample>,
    polls_before_ready: u32,
    polls_pending: u32,
    fail_reads: usize,
    nack_writes: Vec<u8>,
    ignored_writes: Vec<u8>,
    writes: Vec<(u8, u8)>,
    burst_reads: usize,
}

impl MockMpu6050 {
    pub fn new() -> Self {
        let mut registers = [0u8; 128];
        registers[reg::WHO_AM_I as usize] = reg::DEVICE_SIGNATURE;
        Self {
            registers,
            queued: VecDeque::new(),
            polls_before_ready: 0,
            polls_pending: 0,
            fail_reads: 0,
            nack_writes: Vec::new(),
            ignored_writes: Vec::new(),
            writes: Vec::new(),
            burst_reads: 0,
        }
    }

    pub fn set_register(&mut self, address: u8, value: u8) {
        self.registers[address as usize] = value;
    }

    /// Make `raw` the data block returned from now on.
    pub fn set_raw(&mut self, raw: RawSample) {
        self.queued.clear();
        self.load(&raw);
    }

    /// Queue `raw` to be returned by a later burst; the last one repeats.
    pub fn queue_raw(&mut self, raw: RawSample) {
        self.queued.push_back(raw);
    }

    pub fn set_polls_before_ready(&mut self, polls: u32) {
        self.polls_before_ready = polls;
        self.polls_pending = polls;
    }

    pub fn fail_next_reads(&mut self, count: usize) {
        self.fail_reads = count;
    }

    pub fn fail_reads_remaining(&self) -> usize {
        self.fail_reads
    }

    pub fn nack_writes_to(&mut self, address: u8) {
        self.nack_writes.push(address);
    }

    /// Acknowledge writes to `address` without storing them.
    pub fn ignore_writes_to(&mut self, address: u8) {
        self.ignored_writes.push(address);
    }

    /// Acknowledged writes as `(register, first byte)`.
    pub fn writes(&self) -> Vec<(u8, u8)> {
        self.writes.clone()
    }

    pub fn burst_reads(&self) -> usize {
        self.burst_reads
    }

    fn load(&mut self, raw: &RawSample) {
        let start = reg::ACCEL_XOUT_H as usize;
        self.registers[start..start + reg::DATA_BURST_LEN].copy_from_slice(&raw.to_burst());
    }
}

impl RegisterTransport for MockMpu6050 {
    async fn read(&mut self, address: u8, buf: &mut [u8]) -> Result<(), TransportFault> {
        if self.fail_reads > 0 {
            self.fail_reads -= 1;
            return Err(TransportFault::Nack);
        }

        if address == reg::INT_STATUS {
            let ready = if self.polls_pending == 0 {
                reg::INT_DATA_RDY
            } else {
                self.polls_pending -= 1;
                0
            };
            self.registers[reg::INT_STATUS as usize] = ready;
        }

        if address == reg::ACCEL_XOUT_H {
            if let Some(next) = self.queued.pop_front() {
                self.load(&next);
            }
            self.burst_reads += 1;
            self.polls_pending = self.polls_before_ready;
        }

        let start = address as usize;
        let end = start + buf.len();
        if end > self.registers.len() {
            return Err(TransportFault::InvalidLength);
        }
        buf.copy_from_slice(&self.registers[start..end]);
        Ok(())
    }

    async fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), TransportFault> {
        if self.nack_writes.contains(&address) {
            return Err(TransportFault::Nack);
        }
        if let Some(&first) = bytes.first() {
            self.writes.push((address, first));
        }
        if self.ignored_writes.contains(&address) {
            return Ok(());
        }
        let start = address as usize;
        let end = start + bytes.len();
        if end > self.registers.len() {
            return Err(TransportFault::InvalidLength);
        }
        self.registers[start..end].copy_from_slice(bytes);
        Ok(())
    }
}
