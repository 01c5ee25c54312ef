//! Public host-facing contracts for embedding the engine.

use thiserror::Error;

use crate::phase::{BusCondition, ByteOutcome};
use crate::status::TransactionRequest;
use crate::BusError;

/// One host register access presented on a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum HostAccess {
    /// Word read.
    Read {
        /// Word offset.
        offset: usize,
    },
    /// Word write with byte-lane select.
    Write {
        /// Word offset.
        offset: usize,
        /// Value to write.
        value: u32,
        /// Lane select, bit `n` covers bits `8n+7:8n`.
        lanes: u8,
    },
}

impl HostAccess {
    /// Word offset addressed by the access.
    #[must_use]
    pub const fn offset(self) -> usize {
        match self {
            Self::Read { offset } | Self::Write { offset, .. } => offset,
        }
    }
}

/// Answer to a host access, delivered on the tick after the access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct HostResponse {
    /// Read data; zero for writes.
    pub data: u32,
    /// `false` when a write was ignored or the offset is unmapped.
    pub accepted: bool,
}

/// Inputs sampled by the engine on one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickInputs {
    /// Observed SCL level.
    pub scl: bool,
    /// Observed SDA level.
    pub sda: bool,
    /// Host register access, if any.
    pub host: Option<HostAccess>,
}

impl Default for TickInputs {
    fn default() -> Self {
        Self {
            scl: true,
            sda: true,
            host: None,
        }
    }
}

/// Outputs driven by the engine after one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutputs {
    /// SCL drive (`true` = released).
    pub scl: bool,
    /// SDA drive (`true` = released).
    pub sda: bool,
    /// Interrupt line.
    pub interrupt: bool,
    /// Response to the host access of the previous tick.
    pub host: Option<HostResponse>,
}

impl Default for TickOutputs {
    fn default() -> Self {
        Self {
            scl: true,
            sda: true,
            interrupt: false,
            host: None,
        }
    }
}

/// Deterministic trace events emitted when tracing is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraceEvent {
    /// A command was latched and the controller left idle.
    TransactionStarted {
        /// Request being executed.
        request: TransactionRequest,
    },
    /// Start, repeated start or stop generated on the bus.
    Condition {
        /// Generated condition.
        condition: BusCondition,
    },
    /// Phase engine finished one byte.
    ByteFinished {
        /// Byte driven or received.
        data: u8,
        /// Transfer result.
        outcome: ByteOutcome,
    },
    /// The controller returned to idle.
    TransactionFinished {
        /// Sticky error of the transaction, if any.
        error: Option<BusError>,
    },
    /// A zero divisor was replaced by the default.
    DivisorHealed {
        /// Restored divisor.
        divisor: u32,
    },
}

/// Sink trait for deterministic trace hooks.
pub trait TraceSink {
    /// Records an event in tick order.
    fn on_event(&mut self, event: TraceEvent);
}

impl TraceSink for Vec<TraceEvent> {
    fn on_event(&mut self, event: TraceEvent) {
        self.push(event);
    }
}

/// Register transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum RegisterError {
    /// Offset lies beyond the buffer window.
    #[error("register offset {0} is not mapped")]
    Unmapped(usize),
    /// The engine produced no response to the access.
    #[error("no response to register access at offset {0}")]
    NoResponse(usize),
}

/// Result categories for register writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteResult {
    /// Write side effects took place.
    Applied,
    /// Write was dropped: busy, locked, read-only or reserved.
    Ignored,
}

/// Word-addressed register bus.
pub trait RegisterBus {
    /// Reads the 32-bit register at word `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError`] when the access cannot be completed.
    fn read32(&mut self, offset: usize) -> Result<u32, RegisterError>;

    /// Writes the lanes of `value` selected by `lanes` to word `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError`] when the access cannot be completed.
    fn write32(&mut self, offset: usize, value: u32, lanes: u8)
        -> Result<WriteResult, RegisterError>;
}

#[cfg(test)]
mod tests {
    use super::{HostAccess, TickInputs, TickOutputs, TraceEvent, TraceSink};

    #[test]
    fn idle_tick_io_releases_both_lines() {
        let inputs = TickInputs::default();
        let outputs = TickOutputs::default();
        assert!(inputs.scl && inputs.sda);
        assert!(outputs.scl && outputs.sda);
        assert!(!outputs.interrupt);
    }

    #[test]
    fn host_access_exposes_offset() {
        assert_eq!(HostAccess::Read { offset: 5 }.offset(), 5);
        let write = HostAccess::Write {
            offset: 9,
            value: 1,
            lanes: 0b1111,
        };
        assert_eq!(write.offset(), 9);
    }

    #[test]
    fn vec_sink_records_in_order() {
        let mut sink = Vec::new();
        sink.on_event(TraceEvent::DivisorHealed { divisor: 4 });
        sink.on_event(TraceEvent::TransactionFinished { error: None });
        assert_eq!(sink.len(), 2);
        assert_eq!(sink[0], TraceEvent::DivisorHealed { divisor: 4 });
    }
}
