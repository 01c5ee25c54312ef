//! Cycle-level bus simulation: open-drain line resolution, slave devices
//! and a testbench that couples them with an [`crate::Engine`].

mod slave;
mod testbench;

pub use slave::MemorySlave;
pub use testbench::{HarnessError, Testbench};

/// Open-drain drive levels of one party (`true` = released).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LineDrive {
    /// SCL drive.
    pub scl: bool,
    /// SDA drive.
    pub sda: bool,
}

impl LineDrive {
    /// Both lines released.
    pub const RELEASED: Self = Self {
        scl: true,
        sda: true,
    };
}

impl Default for LineDrive {
    fn default() -> Self {
        Self::RELEASED
    }
}

/// Level of an open-drain line: low when any party pulls it low.
#[must_use]
pub const fn wired_and(a: bool, b: bool) -> bool {
    a && b
}

/// Resolves two parties' drives into the bus levels.
#[must_use]
pub const fn resolve(a: LineDrive, b: LineDrive) -> LineDrive {
    LineDrive {
        scl: wired_and(a.scl, b.scl),
        sda: wired_and(a.sda, b.sda),
    }
}

/// A device attached to the bus next to the master.
pub trait BusDevice {
    /// Observes the resolved bus levels for this tick and returns the
    /// device's own drives.
    fn step(&mut self, bus: LineDrive) -> LineDrive;
}

/// A bus with nothing attached; every address goes unacknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenBus;

impl BusDevice for OpenBus {
    fn step(&mut self, _bus: LineDrive) -> LineDrive {
        LineDrive::RELEASED
    }
}
