//! Engine plus one bus device, advanced in lockstep.
//!
//! Per tick the master samples the bus levels resolved on the previous tick,
//! the device observes the master's new drive, and the bus is resolved from
//! both drives for the next tick.

use thiserror::Error;

use super::{resolve, BusDevice, LineDrive};
use crate::api::{
    HostAccess, RegisterBus, RegisterError, TickInputs, TickOutputs, TraceEvent, WriteResult,
};
use crate::registers::{encode_command, Register, REG_COMMAND};
use crate::status::{Direction, TransactionRequest, TransactionStatus};
use crate::{ConfigError, Engine, EngineConfig};

/// Failures raised by the simulation harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum HarnessError {
    /// The engine stayed busy for the whole tick budget.
    #[error("transaction still busy after {limit} ticks")]
    Watchdog {
        /// Tick budget that expired.
        limit: u64,
    },
    /// A register write was ignored by the engine.
    #[error("register write at offset {offset} was ignored")]
    Rejected {
        /// Word offset of the ignored write.
        offset: usize,
    },
    /// Transport failure on the register bus.
    #[error(transparent)]
    Register(#[from] RegisterError),
    /// Invalid engine configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Simulation harness coupling an [`Engine`] with a [`BusDevice`].
#[derive(Debug, Clone)]
pub struct Testbench<D> {
    engine: Engine,
    device: D,
    device_drive: LineDrive,
    lines: LineDrive,
    interrupt: bool,
    trace: Vec<TraceEvent>,
}

impl<D: BusDevice> Testbench<D> {
    /// Builds an engine from `config` and attaches `device`.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] when `config` is invalid.
    pub fn new(config: EngineConfig, device: D) -> Result<Self, HarnessError> {
        Ok(Self {
            engine: Engine::new(config)?,
            device,
            device_drive: LineDrive::RELEASED,
            lines: LineDrive::RELEASED,
            interrupt: false,
            trace: Vec::new(),
        })
    }

    /// Engine under test.
    #[must_use]
    pub const fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Mutable engine, for resets.
    pub const fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    /// Attached device.
    #[must_use]
    pub const fn device(&self) -> &D {
        &self.device
    }

    /// Mutable attached device.
    pub const fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Bus levels after the last tick.
    #[must_use]
    pub const fn lines(&self) -> LineDrive {
        self.lines
    }

    /// Interrupt line after the last tick.
    #[must_use]
    pub const fn interrupt(&self) -> bool {
        self.interrupt
    }

    /// Transaction status.
    #[must_use]
    pub const fn status(&self) -> TransactionStatus {
        *self.engine.status()
    }

    /// Drains the trace events recorded so far.
    pub fn take_trace(&mut self) -> Vec<TraceEvent> {
        std::mem::take(&mut self.trace)
    }

    /// Advances engine and device by one tick.
    pub fn tick(&mut self, host: Option<HostAccess>) -> TickOutputs {
        let out = self.engine.tick_with_trace(
            TickInputs {
                scl: self.lines.scl,
                sda: self.lines.sda,
                host,
            },
            &mut self.trace,
        );
        let master = LineDrive {
            scl: out.scl,
            sda: out.sda,
        };
        self.device_drive = self.device.step(resolve(master, self.device_drive));
        self.lines = resolve(master, self.device_drive);
        self.interrupt = out.interrupt;
        out
    }

    /// Ticks until the engine is idle.
    ///
    /// Returns the number of ticks spent.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Watchdog`] when the engine is still busy after
    /// `limit` ticks.
    pub fn run_until_idle(&mut self, limit: u64) -> Result<u64, HarnessError> {
        let mut ticks = 0;
        while self.engine.is_busy() {
            if ticks == limit {
                log::warn!("watchdog expired after {limit} ticks");
                return Err(HarnessError::Watchdog { limit });
            }
            self.tick(None);
            ticks += 1;
        }
        Ok(ticks)
    }

    /// Copies `bytes` into the buffer starting at byte `offset`, one lane
    /// per write.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Rejected`] when the engine ignores a write.
    pub fn load_buffer(&mut self, offset: usize, bytes: &[u8]) -> Result<(), HarnessError> {
        let config = self.engine.config();
        let (base, order, mask) = (config.buffer_base(), config.byte_order, config.address_mask());
        for (i, byte) in bytes.iter().enumerate() {
            let addr = (offset + i) & mask;
            let lane = order.lane(addr);
            let word = base + addr / 4;
            let value = u32::from(*byte) << (lane * 8);
            if self.write32(word, value, 1 << lane)? == WriteResult::Ignored {
                return Err(HarnessError::Rejected { offset: word });
            }
        }
        Ok(())
    }

    /// Reads `count` buffer bytes starting at byte `offset`.
    ///
    /// # Errors
    ///
    /// Propagates register bus failures.
    pub fn read_buffer(&mut self, offset: usize, count: usize) -> Result<Vec<u8>, HarnessError> {
        let config = self.engine.config();
        let (base, order, mask) = (config.buffer_base(), config.byte_order, config.address_mask());
        let mut bytes = Vec::with_capacity(count);
        for i in 0..count {
            let addr = (offset + i) & mask;
            let word = self.read32(base + addr / 4)?;
            #[allow(clippy::cast_possible_truncation)]
            bytes.push((word >> (order.lane(addr) * 8)) as u8);
        }
        Ok(bytes)
    }

    /// Writes the command register.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Rejected`] when the engine is busy.
    pub fn submit(&mut self, request: TransactionRequest) -> Result<(), HarnessError> {
        match self.write32(REG_COMMAND, encode_command(&request), 0b1111)? {
            WriteResult::Applied => Ok(()),
            WriteResult::Ignored => Err(HarnessError::Rejected {
                offset: REG_COMMAND,
            }),
        }
    }

    /// Loads `bytes` at `offset`, writes them to `device` and waits for the
    /// transaction to finish.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError`] on rejected register writes or watchdog
    /// expiry. Bus errors are reported through the returned status.
    pub fn write_bytes(
        &mut self,
        device: u8,
        offset: usize,
        bytes: &[u8],
        limit: u64,
    ) -> Result<TransactionStatus, HarnessError> {
        self.load_buffer(offset, bytes)?;
        self.submit(TransactionRequest {
            device,
            direction: Direction::Write,
            offset,
            count: bytes.len(),
        })?;
        self.run_until_idle(limit)?;
        Ok(self.status())
    }

    /// Reads `count` bytes from `device` into the buffer at `offset` and
    /// returns them.
    ///
    /// # Errors
    ///
    /// Same as [`Self::write_bytes`].
    pub fn read_bytes(
        &mut self,
        device: u8,
        offset: usize,
        count: usize,
        limit: u64,
    ) -> Result<(TransactionStatus, Vec<u8>), HarnessError> {
        self.submit(TransactionRequest {
            device,
            direction: Direction::Read,
            offset,
            count,
        })?;
        self.run_until_idle(limit)?;
        let status = self.status();
        let bytes = self.read_buffer(offset, count)?;
        Ok((status, bytes))
    }

    fn access(&mut self, access: HostAccess) -> Result<(u32, bool), RegisterError> {
        let offset = access.offset();
        let config = self.engine.config();
        if Register::decode(offset, config.buffer_base(), config.buffer_words())
            == Register::Unmapped
        {
            return Err(RegisterError::Unmapped(offset));
        }
        self.tick(Some(access));
        let response = self
            .tick(None)
            .host
            .ok_or(RegisterError::NoResponse(offset))?;
        Ok((response.data, response.accepted))
    }
}

impl<D: BusDevice> RegisterBus for Testbench<D> {
    fn read32(&mut self, offset: usize) -> Result<u32, RegisterError> {
        self.access(HostAccess::Read { offset }).map(|(data, _)| data)
    }

    fn write32(
        &mut self,
        offset: usize,
        value: u32,
        lanes: u8,
    ) -> Result<WriteResult, RegisterError> {
        let (_, accepted) = self.access(HostAccess::Write {
            offset,
            value,
            lanes,
        })?;
        Ok(if accepted {
            WriteResult::Applied
        } else {
            WriteResult::Ignored
        })
    }
}
