//! 24Cxx-style memory slave.
//!
//! The device samples SDA on SCL rising edges and changes its own SDA drive
//! only on SCL falling edges. A write transfer carries a one-byte word
//! pointer followed by data; a read transfer streams bytes from the pointer
//! until the master leaves the acknowledge bit high. With a read limit the
//! device stops driving SDA once the burst is exhausted, so a master that
//! acknowledges every byte can still finish with a stop.

use super::{BusDevice, LineDrive};

/// Bytes of addressable memory behind the word pointer.
pub const MEMORY_BYTES: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct ShiftRegister {
    received: u8,
    count: u8,
}

impl ShiftRegister {
    fn push(self, bit: bool) -> Self {
        Self {
            received: (self.received << 1) | u8::from(bit),
            count: self.count + 1,
        }
    }

    const fn is_full(self) -> bool {
        self.count >= 8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Incoming {
    Address,
    Pointer,
    Data,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AfterAck {
    Receive(Incoming),
    Send,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum SlaveState {
    #[default]
    Standby,
    Receiving {
        kind: Incoming,
        bits: ShiftRegister,
    },
    Acking {
        next: AfterAck,
    },
    Sending {
        sent: u8,
    },
    AwaitingAck {
        acked: bool,
    },
}

/// Cooperative memory device with optional clock stretching and
/// acknowledge failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemorySlave {
    address: u8,
    memory: Box<[u8]>,
    pointer: u8,
    state: SlaveState,
    last: LineDrive,
    drive: LineDrive,
    stretch: u32,
    stretch_left: u32,
    nack_address: bool,
    nack_data: Option<usize>,
    read_limit: Option<usize>,
    data_index: usize,
    read_acks: usize,
    starts: usize,
    stops: usize,
}

impl MemorySlave {
    /// Creates a zero-filled device answering to the 7-bit `address`.
    #[must_use]
    pub fn new(address: u8) -> Self {
        Self {
            address: address & 0x7F,
            memory: vec![0; MEMORY_BYTES].into_boxed_slice(),
            pointer: 0,
            state: SlaveState::Standby,
            last: LineDrive::RELEASED,
            drive: LineDrive::RELEASED,
            stretch: 0,
            stretch_left: 0,
            nack_address: false,
            nack_data: None,
            read_limit: None,
            data_index: 0,
            read_acks: 0,
            starts: 0,
            stops: 0,
        }
    }

    /// Preloads memory starting at word 0.
    #[must_use]
    pub fn with_memory(mut self, bytes: &[u8]) -> Self {
        let len = bytes.len().min(MEMORY_BYTES);
        self.memory[..len].copy_from_slice(&bytes[..len]);
        self
    }

    /// Holds SCL low for `ticks` after every acknowledged byte.
    #[must_use]
    pub const fn with_stretch(mut self, ticks: u32) -> Self {
        self.stretch = ticks;
        self
    }

    /// Leaves the address byte unacknowledged.
    #[must_use]
    pub const fn with_nack_on_address(mut self) -> Self {
        self.nack_address = true;
        self
    }

    /// Leaves the written data byte at `index` (0 = first byte after the
    /// word pointer) unacknowledged.
    #[must_use]
    pub const fn with_nack_at(mut self, index: usize) -> Self {
        self.nack_data = Some(index);
        self
    }

    /// Sends at most `bytes` bytes per read transfer. Further bytes read
    /// back as `0xFF` with SDA released and leave the pointer alone.
    #[must_use]
    pub const fn with_read_limit(mut self, bytes: usize) -> Self {
        self.read_limit = Some(bytes);
        self
    }

    /// 7-bit device address.
    #[must_use]
    pub const fn address(&self) -> u8 {
        self.address
    }

    /// Device memory.
    #[must_use]
    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    /// Current word pointer.
    #[must_use]
    pub const fn pointer(&self) -> u8 {
        self.pointer
    }

    /// Start and repeated-start conditions seen.
    #[must_use]
    pub const fn starts(&self) -> usize {
        self.starts
    }

    /// Stop conditions seen.
    #[must_use]
    pub const fn stops(&self) -> usize {
        self.stops
    }

    /// Sent bytes the master acknowledged.
    #[must_use]
    pub const fn read_acks(&self) -> usize {
        self.read_acks
    }

    fn burst_exhausted(&self) -> bool {
        self.read_limit.is_some_and(|limit| self.data_index >= limit)
    }

    fn start(&mut self) {
        log::trace!("slave {:#04x}: start in {:?}", self.address, self.state);
        self.starts += 1;
        self.drive.sda = true;
        self.state = SlaveState::Receiving {
            kind: Incoming::Address,
            bits: ShiftRegister::default(),
        };
    }

    fn stop(&mut self) {
        log::trace!("slave {:#04x}: stop in {:?}", self.address, self.state);
        self.stops += 1;
        self.drive.sda = true;
        self.state = SlaveState::Standby;
    }

    fn rising(&mut self, sda: bool) {
        match self.state {
            SlaveState::Receiving { kind, bits } if !bits.is_full() => {
                self.state = SlaveState::Receiving {
                    kind,
                    bits: bits.push(sda),
                };
            }
            SlaveState::AwaitingAck { .. } => {
                self.state = SlaveState::AwaitingAck { acked: !sda };
            }
            _ => {}
        }
    }

    fn falling(&mut self) {
        match self.state {
            SlaveState::Receiving { kind, bits } if bits.is_full() => {
                self.byte_received(kind, bits.received);
            }
            SlaveState::Acking { next } => {
                self.stretch_left = self.stretch;
                self.begin(next);
            }
            SlaveState::Sending { sent } => {
                let sent = sent + 1;
                if sent == 8 {
                    if !self.burst_exhausted() {
                        self.pointer = self.pointer.wrapping_add(1);
                    }
                    self.data_index += 1;
                    self.drive.sda = true;
                    self.state = SlaveState::AwaitingAck { acked: false };
                } else {
                    self.drive.sda = self.output_bit(sent);
                    self.state = SlaveState::Sending { sent };
                }
            }
            SlaveState::AwaitingAck { acked: true } => {
                self.read_acks += 1;
                self.stretch_left = self.stretch;
                self.begin(AfterAck::Send);
            }
            SlaveState::AwaitingAck { acked: false } => {
                self.state = SlaveState::Standby;
            }
            SlaveState::Standby | SlaveState::Receiving { .. } => {}
        }
    }

    fn begin(&mut self, next: AfterAck) {
        match next {
            AfterAck::Receive(kind) => {
                self.drive.sda = true;
                self.state = SlaveState::Receiving {
                    kind,
                    bits: ShiftRegister::default(),
                };
            }
            AfterAck::Send => {
                self.drive.sda = self.output_bit(0);
                self.state = SlaveState::Sending { sent: 0 };
            }
        }
    }

    fn output_bit(&self, sent: u8) -> bool {
        if self.burst_exhausted() {
            return true;
        }
        let byte = self.memory[usize::from(self.pointer)];
        (byte >> (7 - sent)) & 1 != 0
    }

    fn byte_received(&mut self, kind: Incoming, byte: u8) {
        let next = match kind {
            Incoming::Address => {
                if byte >> 1 != self.address || self.nack_address {
                    log::trace!(
                        "slave {:#04x}: address byte {byte:#04x} not acknowledged",
                        self.address
                    );
                    self.state = SlaveState::Standby;
                    return;
                }
                self.data_index = 0;
                if byte & 1 == 0 {
                    AfterAck::Receive(Incoming::Pointer)
                } else {
                    AfterAck::Send
                }
            }
            Incoming::Pointer => {
                self.pointer = byte;
                AfterAck::Receive(Incoming::Data)
            }
            Incoming::Data => {
                if self.nack_data == Some(self.data_index) {
                    log::trace!(
                        "slave {:#04x}: data byte {} not acknowledged",
                        self.address,
                        self.data_index
                    );
                    self.state = SlaveState::Standby;
                    return;
                }
                log::trace!(
                    "slave {:#04x}: writing {byte:#04x} to {:#04x}",
                    self.address,
                    self.pointer
                );
                self.memory[usize::from(self.pointer)] = byte;
                self.pointer = self.pointer.wrapping_add(1);
                self.data_index += 1;
                AfterAck::Receive(Incoming::Data)
            }
        };
        self.drive.sda = false;
        self.state = SlaveState::Acking { next };
    }
}

impl BusDevice for MemorySlave {
    fn step(&mut self, bus: LineDrive) -> LineDrive {
        let last = self.last;
        self.last = bus;

        if last.scl && bus.scl && last.sda != bus.sda {
            if bus.sda {
                self.stop();
            } else {
                self.start();
            }
        } else if !last.scl && bus.scl {
            self.rising(bus.sda);
        } else if last.scl && !bus.scl {
            self.falling();
        }

        if self.stretch_left > 0 {
            self.stretch_left -= 1;
            self.drive.scl = false;
        } else {
            self.drive.scl = true;
        }
        self.drive
    }
}

#[cfg(test)]
mod tests {
    use super::MemorySlave;
    use crate::sim::{resolve, BusDevice, LineDrive};

    /// Bit-banged master driving a slave one level change per tick.
    struct Wire {
        slave: MemorySlave,
        drive: LineDrive,
    }

    impl Wire {
        fn new(slave: MemorySlave) -> Self {
            Self {
                slave,
                drive: LineDrive::RELEASED,
            }
        }

        fn tick(&mut self, scl: bool, sda: bool) -> LineDrive {
            let master = LineDrive { scl, sda };
            self.drive = self.slave.step(resolve(master, self.drive));
            resolve(master, self.drive)
        }

        fn start(&mut self) {
            self.tick(true, true);
            self.tick(true, false);
        }

        fn restart(&mut self) {
            self.tick(false, true);
            self.tick(true, true);
            self.tick(true, false);
        }

        fn stop(&mut self) {
            self.tick(false, false);
            self.tick(true, false);
            self.tick(true, true);
        }

        fn clock_bit(&mut self, sda: bool) -> bool {
            self.tick(false, sda);
            let sampled = self.tick(true, sda).sda;
            self.tick(false, sda);
            sampled
        }

        fn write_byte(&mut self, byte: u8) -> bool {
            for bit in (0..8).rev() {
                self.clock_bit((byte >> bit) & 1 != 0);
            }
            !self.clock_bit(true)
        }

        fn read_byte(&mut self, ack: bool) -> u8 {
            let mut byte = 0;
            for _ in 0..8 {
                byte = (byte << 1) | u8::from(self.clock_bit(true));
            }
            self.clock_bit(!ack);
            byte
        }
    }

    #[test]
    fn write_stores_bytes_at_pointer() {
        let mut wire = Wire::new(MemorySlave::new(0x50));
        wire.start();
        assert!(wire.write_byte(0xA0));
        assert!(wire.write_byte(0x10));
        assert!(wire.write_byte(0xDE));
        assert!(wire.write_byte(0xAD));
        wire.stop();

        assert_eq!(&wire.slave.memory()[0x10..0x12], &[0xDE, 0xAD]);
        assert_eq!(wire.slave.pointer(), 0x12);
        assert_eq!(wire.slave.starts(), 1);
        assert_eq!(wire.slave.stops(), 1);
    }

    #[test]
    fn other_address_is_not_acknowledged() {
        let mut wire = Wire::new(MemorySlave::new(0x50));
        wire.start();
        assert!(!wire.write_byte(0xA2));
        wire.stop();
        assert_eq!(wire.slave.stops(), 1);
    }

    #[test]
    fn sequential_read_after_repeated_start() {
        let mut wire = Wire::new(MemorySlave::new(0x50).with_memory(&[1, 2, 3, 4, 5]));
        wire.start();
        assert!(wire.write_byte(0xA0));
        assert!(wire.write_byte(0x02));
        wire.restart();
        assert!(wire.write_byte(0xA1));
        assert_eq!(wire.read_byte(true), 3);
        assert_eq!(wire.read_byte(false), 4);
        wire.stop();
        assert_eq!(wire.slave.starts(), 2);
        assert_eq!(wire.slave.pointer(), 4);
    }

    #[test]
    fn read_limit_releases_sda_after_the_burst() {
        let mut wire = Wire::new(
            MemorySlave::new(0x50)
                .with_memory(&[0x00, 0x00, 0x00])
                .with_read_limit(2),
        );
        wire.start();
        assert!(wire.write_byte(0xA0));
        assert!(wire.write_byte(0x00));
        wire.restart();
        assert!(wire.write_byte(0xA1));
        assert_eq!(wire.read_byte(true), 0x00);
        assert_eq!(wire.read_byte(true), 0x00);
        assert_eq!(wire.read_byte(true), 0xFF);
        wire.stop();

        assert_eq!(wire.slave.read_acks(), 3);
        assert_eq!(wire.slave.pointer(), 2);
        assert_eq!(wire.slave.stops(), 1);
    }

    #[test]
    fn injected_data_nack_skips_the_write() {
        let mut wire = Wire::new(MemorySlave::new(0x50).with_nack_at(1));
        wire.start();
        assert!(wire.write_byte(0xA0));
        assert!(wire.write_byte(0x00));
        assert!(wire.write_byte(0x11));
        assert!(!wire.write_byte(0x22));
        wire.stop();
        assert_eq!(&wire.slave.memory()[..2], &[0x11, 0x00]);
    }

    #[test]
    fn address_nack_injection() {
        let mut wire = Wire::new(MemorySlave::new(0x50).with_nack_on_address());
        wire.start();
        assert!(!wire.write_byte(0xA0));
    }

    #[test]
    fn stretch_holds_scl_after_acknowledged_byte() {
        let mut slave = MemorySlave::new(0x50).with_stretch(2);
        slave.state = super::SlaveState::Acking {
            next: super::AfterAck::Receive(super::Incoming::Data),
        };
        slave.last = LineDrive {
            scl: true,
            sda: false,
        };
        let low = LineDrive {
            scl: false,
            sda: true,
        };
        assert!(!slave.step(low).scl);
        assert!(!slave.step(low).scl);
        assert!(slave.step(low).scl);
    }
}
