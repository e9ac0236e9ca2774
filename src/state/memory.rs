//! In-memory word store (EEPROM stand-in).

use super::WordStore;
use crate::error::{FlashLogError, Result};

/// A byte-addressed EEPROM simulation holding little-endian words
///
/// A fresh store reads as all ones. [`MemWords::power_cut_after`] makes the
/// store silently drop writes after a number of successful ones, which models
/// power being lost in the middle of a multi-word save.
#[derive(Debug, Clone)]
pub struct MemWords {
    bytes: Vec<u8>,
    writes: u64,
    writes_left: Option<u64>,
}

impl MemWords {
    /// Create a blank store of `len` bytes
    pub fn new(len: usize) -> Self {
        Self {
            bytes: vec![0xFF; len],
            writes: 0,
            writes_left: None,
        }
    }

    /// Accept `count` more word writes, then drop all further writes
    pub fn power_cut_after(&mut self, count: u64) {
        self.writes_left = Some(count);
    }

    /// Accept writes again
    pub fn restore_power(&mut self) {
        self.writes_left = None;
    }

    /// Number of word writes that reached the store
    pub fn writes(&self) -> u64 {
        self.writes
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn span(&self, offset: u32) -> Result<std::ops::Range<usize>> {
        let start = offset as usize;
        let end = start + 4;
        if end > self.bytes.len() {
            return Err(FlashLogError::State(format!(
                "word at {} beyond store of {} bytes",
                offset,
                self.bytes.len()
            )));
        }
        Ok(start..end)
    }
}

impl WordStore for MemWords {
    fn read_word(&mut self, offset: u32) -> Result<u32> {
        let span = self.span(offset)?;
        let mut word = [0u8; 4];
        word.copy_from_slice(&self.bytes[span]);
        Ok(u32::from_le_bytes(word))
    }

    fn write_word(&mut self, offset: u32, value: u32) -> Result<()> {
        let span = self.span(offset)?;
        match self.writes_left {
            Some(0) => return Ok(()),
            Some(ref mut left) => *left -= 1,
            None => {}
        }
        self.bytes[span].copy_from_slice(&value.to_le_bytes());
        self.writes += 1;
        Ok(())
    }
}
