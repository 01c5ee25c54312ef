//! Cycle-accurate model of a register-mapped I2C master engine.
//!
//! A host issues addressed multi-byte transfers by writing a command word;
//! the transaction controller sequences them through a bit-level phase
//! engine that drives SCL/SDA, while received bytes land in a shared
//! buffer exposed through the register window.

/// Protocol, configuration and buffer error types.
pub mod fault;
pub use fault::{BufferError, BusError, ConfigError};

/// Immutable per-instance configuration.
pub mod config;
pub use config::{
    ByteOrder, EngineConfig, DEFAULT_BUFFER_BYTES, DEFAULT_CLOCK_DIVISOR, DEFAULT_DIVISOR_BITS,
};

/// Clock divisor register and phase timer.
pub mod timing;
pub use timing::{ClockDivisor, PhaseTimer};

/// Bit-level phase engine.
pub mod phase;
pub use phase::{
    BusCondition, ByteOp, ByteOutcome, ByteReport, ByteRequest, Phase, PhaseEngine, PhaseInputs,
    PhaseOutputs, PhaseSession,
};

/// Shared transaction buffer and write arbitration.
pub mod buffer;
pub use buffer::{PendingWrite, SharedBuffer, WriteSource, ALL_LANES};

/// Transaction request, status and interrupt state.
pub mod status;
pub use status::{Direction, InterruptState, TransactionRequest, TransactionStatus};

/// Transaction controller state machine.
pub mod controller;
pub use controller::{CommandOutcome, Controller, ControllerOutputs, ControllerState};

/// Register map and command word layout.
pub mod registers;
pub use registers::{
    decode_command, encode_command, encode_status, Register, REG_COMMAND, REG_INTERRUPT_ENABLE,
    REG_INTERRUPT_STATUS, REG_SPEED, STATUS_BUSY, STATUS_ERROR,
};

/// Host-facing contracts: tick I/O, trace hooks and the register bus.
pub mod api;
pub use api::{
    HostAccess, HostResponse, RegisterBus, RegisterError, TickInputs, TickOutputs, TraceEvent,
    TraceSink, WriteResult,
};

/// Tick-driven engine tying the components together.
pub mod engine;
pub use engine::Engine;

/// Bus simulation: line resolution, memory slave and testbench.
pub mod sim;
pub use sim::{BusDevice, HarnessError, LineDrive, MemorySlave, OpenBus, Testbench};

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;
