//! Immutable per-instance engine configuration.

use crate::ConfigError;

/// Default shared buffer size in bytes.
pub const DEFAULT_BUFFER_BYTES: usize = 128;

/// Default clock divisor (ticks per bus phase) restored when the speed
/// register reads zero.
pub const DEFAULT_CLOCK_DIVISOR: u32 = 250;

/// Default width of the speed register in bits.
pub const DEFAULT_DIVISOR_BITS: u8 = 20;

/// Mapping of linear byte addresses onto byte lanes of a 32-bit buffer word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ByteOrder {
    /// Byte address 0 of a word occupies bits `31:24`.
    #[default]
    Big,
    /// Byte address 0 of a word occupies bits `7:0`.
    Little,
}

impl ByteOrder {
    /// Returns the lane (0 = bits `7:0`) holding byte `addr` of its word.
    #[must_use]
    pub const fn lane(self, addr: usize) -> usize {
        match self {
            Self::Big => 3 - (addr & 3),
            Self::Little => addr & 3,
        }
    }
}

/// Top-level configuration for an engine instance.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct EngineConfig {
    /// Size of the shared buffer in bytes.
    pub buffer_bytes: usize,
    /// Divisor loaded at reset and whenever the divisor reads zero.
    pub default_divisor: u32,
    /// Width of the speed register.
    pub divisor_bits: u8,
    /// Ignores host writes to the speed register.
    pub speed_locked: bool,
    /// Rejects write transactions and host writes into the buffer.
    pub read_only: bool,
    /// Lane mapping for buffer words.
    pub byte_order: ByteOrder,
    /// Leaves SDA released on the last byte of a read instead of acking it.
    pub nack_final_read: bool,
    /// Enables trace callback dispatch.
    pub tracing_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            buffer_bytes: DEFAULT_BUFFER_BYTES,
            default_divisor: DEFAULT_CLOCK_DIVISOR,
            divisor_bits: DEFAULT_DIVISOR_BITS,
            speed_locked: false,
            read_only: false,
            byte_order: ByteOrder::Big,
            nack_final_read: true,
            tracing_enabled: false,
        }
    }
}

impl EngineConfig {
    /// Checks that the configuration describes a buildable engine.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if !self.buffer_bytes.is_power_of_two()
            || self.buffer_bytes < 16
            || self.buffer_bytes > 256
        {
            return Err(ConfigError::BufferSize(self.buffer_bytes));
        }
        if self.divisor_bits == 0 || self.divisor_bits > 32 {
            return Err(ConfigError::DivisorWidth(self.divisor_bits));
        }
        if self.default_divisor == 0 || self.default_divisor & !self.divisor_mask() != 0 {
            return Err(ConfigError::DefaultDivisor(self.default_divisor));
        }
        Ok(())
    }

    /// Mask of the bits implemented by the speed register.
    #[must_use]
    pub const fn divisor_mask(&self) -> u32 {
        if self.divisor_bits >= 32 {
            u32::MAX
        } else {
            (1u32 << self.divisor_bits) - 1
        }
    }

    /// Number of 32-bit words in the shared buffer.
    #[must_use]
    pub const fn buffer_words(&self) -> usize {
        self.buffer_bytes / 4
    }

    /// Mask applied to buffer byte addresses and byte counts.
    #[must_use]
    pub const fn address_mask(&self) -> usize {
        self.buffer_bytes - 1
    }

    /// Word offset of the buffer window in the register surface.
    #[must_use]
    pub const fn buffer_base(&self) -> usize {
        let words = self.buffer_words();
        if words < 4 {
            4
        } else {
            words
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ByteOrder, EngineConfig, DEFAULT_BUFFER_BYTES, DEFAULT_CLOCK_DIVISOR};
    use crate::ConfigError;

    #[test]
    fn default_config_is_valid() {
        let config = EngineConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.buffer_bytes, DEFAULT_BUFFER_BYTES);
        assert_eq!(config.default_divisor, DEFAULT_CLOCK_DIVISOR);
        assert!(!config.read_only);
        assert!(config.nack_final_read);
    }

    #[test]
    fn buffer_size_must_be_power_of_two_in_range() {
        for bytes in [0, 8, 48, 512] {
            let config = EngineConfig {
                buffer_bytes: bytes,
                ..EngineConfig::default()
            };
            assert_eq!(config.validate(), Err(ConfigError::BufferSize(bytes)));
        }
    }

    #[test]
    fn default_divisor_must_fit_register() {
        let config = EngineConfig {
            divisor_bits: 4,
            default_divisor: 16,
            ..EngineConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::DefaultDivisor(16)));

        let zero = EngineConfig {
            default_divisor: 0,
            ..EngineConfig::default()
        };
        assert_eq!(zero.validate(), Err(ConfigError::DefaultDivisor(0)));
    }

    #[test]
    fn divisor_width_bounds() {
        let config = EngineConfig {
            divisor_bits: 33,
            ..EngineConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::DivisorWidth(33)));
        let full = EngineConfig {
            divisor_bits: 32,
            ..EngineConfig::default()
        };
        assert_eq!(full.divisor_mask(), u32::MAX);
    }

    #[test]
    fn buffer_window_sits_above_control_registers() {
        let config = EngineConfig::default();
        assert_eq!(config.buffer_words(), 32);
        assert_eq!(config.buffer_base(), 32);

        let small = EngineConfig {
            buffer_bytes: 16,
            ..EngineConfig::default()
        };
        assert_eq!(small.buffer_base(), 4);
    }

    #[test]
    fn lane_mapping_is_mirrored() {
        assert_eq!(ByteOrder::Big.lane(0), 3);
        assert_eq!(ByteOrder::Big.lane(7), 0);
        assert_eq!(ByteOrder::Little.lane(0), 0);
        assert_eq!(ByteOrder::Little.lane(7), 3);
    }
}
