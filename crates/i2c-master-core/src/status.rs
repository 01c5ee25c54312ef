//! Transaction request, status and interrupt state.

use crate::BusError;

/// Transfer direction of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Direction {
    /// Buffer bytes are sent to the slave.
    #[default]
    Write,
    /// Slave bytes are received into the buffer.
    Read,
}

impl Direction {
    /// R/W bit appended to the 7-bit device address.
    #[must_use]
    pub const fn rw_bit(self) -> u8 {
        match self {
            Self::Write => 0,
            Self::Read => 1,
        }
    }
}

/// Addressed multi-byte transfer requested by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct TransactionRequest {
    /// 7-bit slave address.
    pub device: u8,
    /// Transfer direction.
    pub direction: Direction,
    /// First buffer byte address; also sent to the slave as its word pointer.
    pub offset: usize,
    /// Number of data bytes.
    pub count: usize,
}

impl TransactionRequest {
    /// Address byte for the given direction.
    #[must_use]
    pub const fn address_byte(&self, direction: Direction) -> u8 {
        ((self.device & 0x7F) << 1) | direction.rw_bit()
    }
}

/// Host-visible transaction status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct TransactionStatus {
    /// A transaction is in progress.
    pub busy: bool,
    /// Sticky error flag, cleared by the next command written while idle.
    pub error: bool,
    /// Kind of the most recent protocol error.
    pub last_error: Option<BusError>,
    /// Device address of the latest command.
    pub device: u8,
    /// Direction of the latest command.
    pub direction: Direction,
    /// Buffer address following the last completed byte.
    pub address: usize,
    /// Data bytes not yet completed.
    pub remaining: usize,
}

/// Completion interrupt state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct InterruptState {
    /// A transaction finished since the last acknowledgement.
    pub pending: bool,
    /// Host gate for surfacing `pending` on the interrupt line.
    pub enable: bool,
}

impl InterruptState {
    /// Marks a transaction completion. Returns `true` on a false→true
    /// transition.
    pub const fn raise(&mut self) -> bool {
        let rising = !self.pending;
        self.pending = true;
        rising
    }

    /// Clears the pending flag.
    pub const fn acknowledge(&mut self) {
        self.pending = false;
    }

    /// Interrupt output level.
    #[must_use]
    pub const fn line(self) -> bool {
        self.pending && self.enable
    }
}

#[cfg(test)]
mod tests {
    use super::{Direction, InterruptState, TransactionRequest};

    #[test]
    fn address_byte_appends_direction_bit() {
        let request = TransactionRequest {
            device: 0x50,
            direction: Direction::Read,
            offset: 0,
            count: 1,
        };
        assert_eq!(request.address_byte(Direction::Write), 0xA0);
        assert_eq!(request.address_byte(Direction::Read), 0xA1);
    }

    #[test]
    fn interrupt_line_requires_enable() {
        let mut irq = InterruptState::default();
        assert!(irq.raise());
        assert!(!irq.line());
        irq.enable = true;
        assert!(irq.line());
        assert!(!irq.raise());
        irq.acknowledge();
        assert!(!irq.line());
    }
}
