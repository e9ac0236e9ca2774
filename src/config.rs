//! Configuration for flashlog
//!
//! Flash geometry and recovery-state placement, with sensible defaults for a
//! typical SPI NOR chip (256 byte pages, 4 KiB sectors).

use crate::error::{FlashLogError, Result};

/// Main configuration for a flash log instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Flash Geometry
    // -------------------------------------------------------------------------
    /// Write granularity in bytes (power of two). A single device write never
    /// crosses a page boundary.
    pub page_size: u32,

    /// Erase granularity in bytes (power of two, multiple of `page_size`)
    pub sector_size: u32,

    /// Fixed size of every record in bytes (at most `sector_size`)
    pub record_size: u32,

    /// Upper bound on the log region in bytes. The region is the device size
    /// capped by this bound and rounded down to whole sectors.
    pub region_limit: Option<u32>,

    // -------------------------------------------------------------------------
    // Recovery State
    // -------------------------------------------------------------------------
    /// Byte offset of the 12-byte {head, tail, checksum} block in the word store
    pub state_offset: u32,

    /// How the persisted pointers are validated on load
    pub state_checksum: StateChecksum,
}

/// Checksum scheme protecting the persisted {head, tail} pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StateChecksum {
    /// `head ^ tail ^ 0xBEEF_F00D`, compatible with existing state regions
    #[default]
    Xor,

    /// CRC32 over head, tail and the magic word
    Crc32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            page_size: 256,
            sector_size: 4096,
            record_size: 32,
            region_limit: None,
            state_offset: 0,
            state_checksum: StateChecksum::Xor,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check the geometry for internal consistency
    ///
    /// Device-dependent checks (region holds at least two sectors) happen in
    /// [`crate::layout::Layout::new`].
    pub fn validate(&self) -> Result<()> {
        if !self.page_size.is_power_of_two() {
            return Err(FlashLogError::Config(format!(
                "page size {} is not a power of two",
                self.page_size
            )));
        }
        if !self.sector_size.is_power_of_two() {
            return Err(FlashLogError::Config(format!(
                "sector size {} is not a power of two",
                self.sector_size
            )));
        }
        if self.sector_size < self.page_size {
            return Err(FlashLogError::Config(format!(
                "sector size {} is smaller than page size {}",
                self.sector_size, self.page_size
            )));
        }
        if self.record_size == 0 || self.record_size > self.sector_size {
            return Err(FlashLogError::Config(format!(
                "record size {} must be between 1 and the sector size {}",
                self.record_size, self.sector_size
            )));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the page (write) size in bytes
    pub fn page_size(mut self, bytes: u32) -> Self {
        self.config.page_size = bytes;
        self
    }

    /// Set the sector (erase) size in bytes
    pub fn sector_size(mut self, bytes: u32) -> Self {
        self.config.sector_size = bytes;
        self
    }

    /// Set the fixed record size in bytes
    pub fn record_size(mut self, bytes: u32) -> Self {
        self.config.record_size = bytes;
        self
    }

    /// Cap the log region to the first `bytes` of the device
    pub fn region_limit(mut self, bytes: u32) -> Self {
        self.config.region_limit = Some(bytes);
        self
    }

    /// Set the offset of the recovery state block in the word store
    pub fn state_offset(mut self, offset: u32) -> Self {
        self.config.state_offset = offset;
        self
    }

    /// Set the recovery state checksum scheme
    pub fn state_checksum(mut self, checksum: StateChecksum) -> Self {
        self.config.state_checksum = checksum;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
