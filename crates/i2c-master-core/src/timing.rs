//! Bus timing: the host-visible clock divisor and the per-phase timer.

/// Clock divisor register (ticks per bus phase).
///
/// A zero value is legal to write but never survives a tick: [`Self::heal`]
/// restores the default at the start of the next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ClockDivisor {
    value: u32,
    default: u32,
    mask: u32,
}

impl ClockDivisor {
    /// Creates a divisor holding `default`, masked to `mask`.
    #[must_use]
    pub const fn new(default: u32, mask: u32) -> Self {
        Self {
            value: default & mask,
            default: default & mask,
            mask,
        }
    }

    /// Current divisor value as seen by the speed register.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.value
    }

    /// Value restored whenever the divisor reads zero.
    #[must_use]
    pub const fn default_value(self) -> u32 {
        self.default
    }

    /// Stores a host-written value, truncated to the register width.
    pub const fn set(&mut self, value: u32) {
        self.value = value & self.mask;
    }

    /// Restores the default when the divisor is zero.
    ///
    /// Returns `true` when a correction was applied.
    pub fn heal(&mut self) -> bool {
        if self.value == 0 {
            log::debug!("clock divisor read zero, restoring {}", self.default);
            self.value = self.default;
            true
        } else {
            false
        }
    }

    /// Restores the reset value.
    pub const fn reset(&mut self) {
        self.value = self.default;
    }
}

/// Countdown timer gating phase boundaries of the bit engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct PhaseTimer {
    remaining: u32,
}

impl PhaseTimer {
    /// Arms the timer so that it expires on the `divisor`-th call to
    /// [`Self::advance`]. A zero divisor behaves as one.
    pub const fn load(&mut self, divisor: u32) {
        self.remaining = divisor.saturating_sub(1);
    }

    /// Advances one tick and reports expiry.
    ///
    /// While `hold` is set the timer neither decrements nor expires; this is
    /// how clock stretching suspends a phase.
    pub const fn advance(&mut self, hold: bool) -> bool {
        if hold {
            return false;
        }
        if self.remaining == 0 {
            true
        } else {
            self.remaining -= 1;
            false
        }
    }

    /// Ticks left before expiry.
    #[must_use]
    pub const fn remaining(self) -> u32 {
        self.remaining
    }
}
