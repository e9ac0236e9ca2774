//! Recovery State Module
//!
//! Persists the log's {head, tail} pointers in a small word-addressed
//! non-volatile region (EEPROM-like), separate from the log's flash.
//!
//! ## Region Format
//! ```text
//! offset +0    +4    +8
//!        ┌─────┬─────┬──────────┐
//!        │head │tail │ checksum │   3 x u32
//!        └─────┴─────┴──────────┘
//! ```
//! The words are written in order head, tail, checksum. A power cut between
//! two word writes leaves a checksum that no longer matches and the log
//! restarts empty. A torn state whose checksum happens to match is not
//! detected.

mod file;
mod memory;

pub use file::FileWords;
pub use memory::MemWords;

use tracing::debug;

use crate::config::StateChecksum;
use crate::error::Result;

/// Magic mixed into every checksum
pub const STATE_MAGIC: u32 = 0xBEEF_F00D;

/// Bytes occupied by one recovery state block
pub const STATE_LEN: u32 = 12;

/// A word-addressed non-volatile store
pub trait WordStore {
    /// Read the 32-bit word at byte `offset`
    fn read_word(&mut self, offset: u32) -> Result<u32>;

    /// Write the 32-bit word at byte `offset`
    fn write_word(&mut self, offset: u32, value: u32) -> Result<()>;

    /// Make previous writes durable
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<S: WordStore + ?Sized> WordStore for &mut S {
    fn read_word(&mut self, offset: u32) -> Result<u32> {
        (**self).read_word(offset)
    }

    fn write_word(&mut self, offset: u32, value: u32) -> Result<()> {
        (**self).write_word(offset, value)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

impl<S: WordStore + ?Sized> WordStore for Box<S> {
    fn read_word(&mut self, offset: u32) -> Result<u32> {
        (**self).read_word(offset)
    }

    fn write_word(&mut self, offset: u32, value: u32) -> Result<()> {
        (**self).write_word(offset, value)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

/// The log's logical pointers as persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pointers {
    /// Slot of the oldest unconsumed record
    pub head: u32,
    /// Slot the next push writes
    pub tail: u32,
}

/// Loads and saves [`Pointers`] at a fixed offset of a [`WordStore`]
#[derive(Debug)]
pub struct RecoveryStore<S> {
    words: S,
    offset: u32,
    checksum: StateChecksum,
    saves: u64,
}

impl<S: WordStore> RecoveryStore<S> {
    pub fn new(words: S, offset: u32, checksum: StateChecksum) -> Self {
        Self {
            words,
            offset,
            checksum,
            saves: 0,
        }
    }

    /// Read the persisted pointers
    ///
    /// Returns `Ok(None)` when the checksum does not match (first boot, or a
    /// save interrupted by power loss).
    pub fn load(&mut self) -> Result<Option<Pointers>> {
        let head = self.words.read_word(self.offset)?;
        let tail = self.words.read_word(self.offset + 4)?;
        let stored = self.words.read_word(self.offset + 8)?;

        if stored == checksum(self.checksum, head, tail) {
            Ok(Some(Pointers { head, tail }))
        } else {
            debug!(head, tail, stored, "recovery state checksum mismatch");
            Ok(None)
        }
    }

    /// Persist the pointers (head, tail, then checksum)
    pub fn save(&mut self, pointers: Pointers) -> Result<()> {
        let Pointers { head, tail } = pointers;
        self.words.write_word(self.offset, head)?;
        self.words.write_word(self.offset + 4, tail)?;
        self.words
            .write_word(self.offset + 8, checksum(self.checksum, head, tail))?;
        self.words.flush()?;
        self.saves += 1;
        debug!(head, tail, "saved recovery state");
        Ok(())
    }

    /// Invalidate the stored state so the next load reports `None`
    pub fn clear(&mut self) -> Result<()> {
        let head = self.words.read_word(self.offset)?;
        let tail = self.words.read_word(self.offset + 4)?;
        self.words
            .write_word(self.offset + 8, !checksum(self.checksum, head, tail))?;
        self.words.flush()
    }

    /// Number of successful saves through this handle
    pub fn saves(&self) -> u64 {
        self.saves
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn words(&self) -> &S {
        &self.words
    }

    pub fn words_mut(&mut self) -> &mut S {
        &mut self.words
    }

    pub fn into_inner(self) -> S {
        self.words
    }
}

/// Checksum stored alongside `head` and `tail`
pub fn checksum(kind: StateChecksum, head: u32, tail: u32) -> u32 {
    match kind {
        StateChecksum::Xor => head ^ tail ^ STATE_MAGIC,
        StateChecksum::Crc32 => {
            let mut hasher = crc32fast::Hasher::new();
            hasher.update(&head.to_le_bytes());
            hasher.update(&tail.to_le_bytes());
            hasher.update(&STATE_MAGIC.to_le_bytes());
            hasher.finalize()
        }
    }
}
