//! Host-facing register map.
//!
//! Word offsets decode into control registers or the buffer window; the
//! command word packs a [`TransactionRequest`] and reads back the live
//! [`TransactionStatus`].

use crate::status::{Direction, TransactionRequest, TransactionStatus};

/// Word offset of the command/status register.
pub const REG_COMMAND: usize = 0;
/// Word offset of the speed register.
pub const REG_SPEED: usize = 1;
/// Word offset of the interrupt status register.
pub const REG_INTERRUPT_STATUS: usize = 2;
/// Word offset of the interrupt enable register.
pub const REG_INTERRUPT_ENABLE: usize = 3;

/// Command/status bit reporting an active transaction.
pub const STATUS_BUSY: u32 = 1 << 31;
/// Command/status bit reporting the sticky error flag.
pub const STATUS_ERROR: u32 = 1 << 30;

const DEVICE_SHIFT: u32 = 17;
const DIRECTION_BIT: u32 = 1 << 16;
const OFFSET_SHIFT: u32 = 8;

/// Decoded target of a register access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    /// Command (write) and status (read).
    Command,
    /// Clock divisor.
    Speed,
    /// Interrupt pending flag; any write clears it.
    InterruptStatus,
    /// Interrupt enable gate.
    InterruptEnable,
    /// Gap between the control registers and the buffer window.
    Reserved,
    /// Buffer word at the given index.
    Buffer(usize),
    /// Beyond the end of the buffer window.
    Unmapped,
}

impl Register {
    /// Decodes a word offset against a map whose buffer window starts at
    /// `base` and spans `words` words.
    #[must_use]
    pub const fn decode(offset: usize, base: usize, words: usize) -> Self {
        match offset {
            REG_COMMAND => Self::Command,
            REG_SPEED => Self::Speed,
            REG_INTERRUPT_STATUS => Self::InterruptStatus,
            REG_INTERRUPT_ENABLE => Self::InterruptEnable,
            _ if offset < base => Self::Reserved,
            _ if offset - base < words => Self::Buffer(offset - base),
            _ => Self::Unmapped,
        }
    }
}

/// Decodes a command word. Offset and count are masked by `address_mask`.
#[must_use]
pub const fn decode_command(value: u32, address_mask: usize) -> TransactionRequest {
    #[allow(clippy::cast_possible_truncation)]
    let device = ((value >> DEVICE_SHIFT) & 0x7F) as u8;
    let direction = if value & DIRECTION_BIT == 0 {
        Direction::Write
    } else {
        Direction::Read
    };
    TransactionRequest {
        device,
        direction,
        offset: ((value >> OFFSET_SHIFT) & 0xFF) as usize & address_mask,
        count: (value & 0xFF) as usize & address_mask,
    }
}

/// Encodes a command word for `request`.
#[must_use]
pub const fn encode_command(request: &TransactionRequest) -> u32 {
    let mut value = ((request.device & 0x7F) as u32) << DEVICE_SHIFT;
    if matches!(request.direction, Direction::Read) {
        value |= DIRECTION_BIT;
    }
    value | (field(request.offset) << OFFSET_SHIFT) | field(request.count)
}

/// Status read-back: busy, error, device, direction, current buffer address
/// and bytes remaining.
#[must_use]
pub const fn encode_status(status: &TransactionStatus, address_mask: usize) -> u32 {
    let mut value = ((status.device & 0x7F) as u32) << DEVICE_SHIFT;
    if status.busy {
        value |= STATUS_BUSY;
    }
    if status.error {
        value |= STATUS_ERROR;
    }
    if matches!(status.direction, Direction::Read) {
        value |= DIRECTION_BIT;
    }
    value
        | (field(status.address & address_mask) << OFFSET_SHIFT)
        | field(status.remaining & address_mask)
}

#[allow(clippy::cast_possible_truncation)]
const fn field(value: usize) -> u32 {
    (value & 0xFF) as u32
}

#[cfg(test)]
mod tests {
    use super::{
        decode_command, encode_command, encode_status, Register, STATUS_BUSY, STATUS_ERROR,
    };
    use crate::status::{Direction, TransactionRequest, TransactionStatus};
    use crate::BusError;

    #[test]
    fn decode_maps_control_reserved_and_window() {
        assert_eq!(Register::decode(0, 32, 32), Register::Command);
        assert_eq!(Register::decode(3, 32, 32), Register::InterruptEnable);
        assert_eq!(Register::decode(4, 32, 32), Register::Reserved);
        assert_eq!(Register::decode(31, 32, 32), Register::Reserved);
        assert_eq!(Register::decode(32, 32, 32), Register::Buffer(0));
        assert_eq!(Register::decode(63, 32, 32), Register::Buffer(31));
        assert_eq!(Register::decode(64, 32, 32), Register::Unmapped);
    }

    #[test]
    fn small_buffer_window_starts_after_control_registers() {
        assert_eq!(Register::decode(4, 4, 4), Register::Buffer(0));
        assert_eq!(Register::decode(8, 4, 4), Register::Unmapped);
    }

    #[test]
    fn command_word_layout() {
        let request = TransactionRequest {
            device: 0x50,
            direction: Direction::Read,
            offset: 4,
            count: 3,
        };
        let word = encode_command(&request);
        assert_eq!(word, 0x00A1_0403);
        assert_eq!(decode_command(word, 0x7F), request);
    }

    #[test]
    fn command_fields_are_masked_to_buffer_width() {
        let decoded = decode_command(0x00A0_F0F3, 0x0F);
        assert_eq!(decoded.offset, 0);
        assert_eq!(decoded.count, 3);
        assert_eq!(decoded.direction, Direction::Write);
    }

    #[test]
    fn status_reports_flags_and_progress() {
        let status = TransactionStatus {
            busy: true,
            error: true,
            last_error: Some(BusError::NotAcknowledged),
            device: 0x50,
            direction: Direction::Write,
            address: 7,
            remaining: 0,
        };
        let word = encode_status(&status, 0x7F);
        assert_eq!(word & STATUS_BUSY, STATUS_BUSY);
        assert_eq!(word & STATUS_ERROR, STATUS_ERROR);
        assert_eq!((word >> 17) & 0x7F, 0x50);
        assert_eq!((word >> 8) & 0xFF, 7);
        assert_eq!(word & 0xFF, 0);
    }
}
