//! Shared transaction buffer with a one-tick delayed, single-writer
//! commit path.

use crate::{BufferError, ByteOrder};

/// Mask covering all four byte lanes of a buffer word.
pub const ALL_LANES: u8 = 0b1111;

/// Party that staged a buffer write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum WriteSource {
    /// Direct register-window write from the host.
    Host,
    /// Byte received by the transaction controller.
    Controller,
}

/// Write descriptor staged during one tick and committed at the start of
/// the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct PendingWrite {
    /// Target word index.
    pub word: usize,
    /// Lane select, bit `n` covers bits `8n+7:8n`.
    pub lanes: u8,
    /// Word value; only selected lanes are used.
    pub data: u32,
    /// Writer that staged the descriptor.
    pub source: WriteSource,
}

impl PendingWrite {
    fn apply(self, word: u32) -> u32 {
        let mut mask = 0u32;
        for lane in 0..4 {
            if self.lanes & (1 << lane) != 0 {
                mask |= 0xFF << (lane * 8);
            }
        }
        (word & !mask) | (self.data & mask)
    }
}

/// Fixed-size word store shared by the host and the transaction controller.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct SharedBuffer {
    words: Box<[u32]>,
    byte_order: ByteOrder,
    pending: Option<PendingWrite>,
    write_lock: bool,
    read_addr: Option<usize>,
    read_data: u32,
}

impl SharedBuffer {
    /// Allocates a zeroed buffer of `words` 32-bit words.
    #[must_use]
    pub fn new(words: usize, byte_order: ByteOrder) -> Self {
        Self {
            words: vec![0; words].into_boxed_slice(),
            byte_order,
            pending: None,
            write_lock: false,
            read_addr: None,
            read_data: 0,
        }
    }

    /// Size of the buffer in bytes.
    #[must_use]
    pub fn len_bytes(&self) -> usize {
        self.words.len() * 4
    }

    /// Commits the write staged last tick, then completes any registered
    /// read fetch.
    ///
    /// Returns the committed descriptor, if any.
    pub fn begin_tick(&mut self) -> Option<PendingWrite> {
        let committed = self.pending.take();
        if let Some(write) = committed {
            if let Some(slot) = self.words.get_mut(write.word) {
                *slot = write.apply(*slot);
            }
        }
        if let Some(addr) = self.read_addr.take() {
            self.read_data = self.words.get(addr).copied().unwrap_or(0);
        }
        committed
    }

    /// Stages a write for commit at the start of the next tick.
    ///
    /// # Errors
    ///
    /// - [`BufferError::OutOfRange`] when the word lies outside the buffer.
    /// - [`BufferError::WriterConflict`] when a write is already staged.
    /// - [`BufferError::Locked`] when the writer does not own the buffer:
    ///   the host while the write lock is held, the controller while not.
    pub fn stage(&mut self, write: PendingWrite) -> Result<(), BufferError> {
        if write.word >= self.words.len() {
            return Err(BufferError::OutOfRange(write.word));
        }
        if self.pending.is_some() {
            return Err(BufferError::WriterConflict);
        }
        let owner = match write.source {
            WriteSource::Host => !self.write_lock,
            WriteSource::Controller => self.write_lock,
        };
        if !owner {
            return Err(BufferError::Locked);
        }
        self.pending = Some(write);
        Ok(())
    }

    /// Stages a single byte at linear address `addr`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::stage`].
    pub fn stage_byte(
        &mut self,
        addr: usize,
        byte: u8,
        source: WriteSource,
    ) -> Result<(), BufferError> {
        let lane = self.byte_order.lane(addr);
        self.stage(PendingWrite {
            word: addr / 4,
            lanes: 1 << lane,
            data: u32::from(byte) << (lane * 8),
            source,
        })
    }

    /// Write staged this tick, if any.
    #[must_use]
    pub const fn pending(&self) -> Option<PendingWrite> {
        self.pending
    }

    /// Grants or revokes the controller's exclusive write path.
    pub const fn set_write_lock(&mut self, locked: bool) {
        self.write_lock = locked;
    }

    /// Whether the controller currently owns the write path.
    #[must_use]
    pub const fn write_locked(&self) -> bool {
        self.write_lock
    }

    /// Registers a host read; the word is fetched at the next
    /// [`Self::begin_tick`].
    pub const fn fetch(&mut self, word: usize) {
        self.read_addr = Some(word);
    }

    /// Word fetched by the most recent completed read.
    #[must_use]
    pub const fn read_data(&self) -> u32 {
        self.read_data
    }

    /// Committed byte at linear address `addr`; zero outside the buffer.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn byte(&self, addr: usize) -> u8 {
        let lane = self.byte_order.lane(addr);
        self.words
            .get(addr / 4)
            .map_or(0, |word| (word >> (lane * 8)) as u8)
    }

    /// Committed word at `index`; zero outside the buffer.
    #[must_use]
    pub fn word(&self, index: usize) -> u32 {
        self.words.get(index).copied().unwrap_or(0)
    }

    /// Committed contents in linear byte order.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        (0..self.len_bytes()).map(|addr| self.byte(addr)).collect()
    }

    /// Clears contents, the staged write, the lock and the read port.
    pub fn clear(&mut self) {
        self.words.fill(0);
        self.pending = None;
        self.write_lock = false;
        self.read_addr = None;
        self.read_data = 0;
    }
}
