use thiserror::Error;

/// Protocol errors detected by the bit-level phase engine.
///
/// Both kinds collapse into the single sticky error flag of the status
/// register; the kind itself is only kept for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
pub enum BusError {
    /// The slave left SDA high during the acknowledge bit of a written byte.
    #[error("byte was not acknowledged")]
    NotAcknowledged = 0x01,
    /// A driven data bit was not observed on SDA during a write.
    #[error("driven data bit not observed on the bus")]
    BusMismatch = 0x02,
}

impl BusError {
    /// Converts the error to its stable diagnostic code.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Converts a stable diagnostic code back into an error kind.
    #[must_use]
    pub const fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::NotAcknowledged),
            0x02 => Some(Self::BusMismatch),
            _ => None,
        }
    }
}

/// Rejections raised when validating an [`crate::EngineConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ConfigError {
    /// Buffer size is not a power of two in `16..=256`.
    #[error("buffer size {0} must be a power of two between 16 and 256 bytes")]
    BufferSize(usize),
    /// Divisor register width is outside `1..=32`.
    #[error("divisor width {0} must be between 1 and 32 bits")]
    DivisorWidth(u8),
    /// Default divisor is zero or does not fit the divisor register.
    #[error("default divisor {0} must be non-zero and fit the divisor register")]
    DefaultDivisor(u32),
}

/// Rejections raised by the shared buffer write path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum BufferError {
    /// Word index lies outside the buffer.
    #[error("buffer word {0} is out of range")]
    OutOfRange(usize),
    /// Another writer already staged a commit for this tick.
    #[error("a buffer write is already staged for this tick")]
    WriterConflict,
    /// Host write attempted while the controller owns the buffer.
    #[error("buffer is locked by an active transaction")]
    Locked,
}

#[cfg(test)]
mod tests {
    use super::BusError;

    #[test]
    fn stable_code_roundtrip_for_defined_values() {
        for code in 0x01u8..=0x02 {
            let error = BusError::from_u8(code).expect("defined bus error code");
            assert_eq!(error.as_u8(), code);
        }
    }

    #[test]
    fn unknown_code_is_rejected() {
        assert!(BusError::from_u8(0x00).is_none());
        assert!(BusError::from_u8(0xFF).is_none());
    }

    #[test]
    fn display_text_names_the_failure() {
        assert_eq!(
            BusError::NotAcknowledged.to_string(),
            "byte was not acknowledged"
        );
        assert_eq!(
            BusError::BusMismatch.to_string(),
            "driven data bit not observed on the bus"
        );
    }
}
