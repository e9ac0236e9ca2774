//! In-memory flash device for testing.

use tracing::trace;

use super::{BlockDevice, Geometry, ERASED_BYTE};
use crate::error::{FlashLogError, Result};

/// How `MemFlash` treats programming over bytes that are not erased
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProgramMode {
    /// Reject any write touching a byte that is not in the erased state
    #[default]
    Strict,

    /// Behave like real NOR: AND the new bits into the existing byte
    Nor,
}

/// Operation counters kept by `MemFlash`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    pub reads: u64,
    pub writes: u64,
    pub erases: u64,
    pub bytes_written: u64,
}

/// A simulated NOR flash chip held in memory
///
/// Tracks a per-sector "erased" flag that is set by `erase` and cleared by the
/// first write into the sector, which lets tests check the erase-ahead
/// invariant directly. In [`ProgramMode::Strict`] (the default) a write over
/// a byte that is not erased fails, so an engine that writes into stale flash
/// is caught immediately.
///
/// # Example
///
/// ```rust
/// use flashlog::device::{BlockDevice, MemFlash};
///
/// let mut flash = MemFlash::new(2 * 4096, 256, 4096).unwrap();
/// flash.write(0, b"abc").unwrap();
/// let mut buf = [0u8; 3];
/// flash.read(0, &mut buf).unwrap();
/// assert_eq!(&buf, b"abc");
/// assert!(!flash.is_sector_erased(0));
/// ```
#[derive(Debug, Clone)]
pub struct MemFlash {
    geometry: Geometry,
    data: Vec<u8>,
    erased: Vec<bool>,
    mode: ProgramMode,
    stats: DeviceStats,
}

impl MemFlash {
    /// Create an erased chip of `size` bytes
    pub fn new(size: u32, page_size: u32, sector_size: u32) -> Result<Self> {
        let geometry = Geometry::new(size, page_size, sector_size)?;
        Ok(Self {
            geometry,
            data: vec![ERASED_BYTE; size as usize],
            erased: vec![true; geometry.sector_count() as usize],
            mode: ProgramMode::default(),
            stats: DeviceStats::default(),
        })
    }

    /// Create a chip whose every byte holds `value` and no sector counts as
    /// erased (stale contents from a previous owner)
    pub fn filled(size: u32, page_size: u32, sector_size: u32, value: u8) -> Result<Self> {
        let mut flash = Self::new(size, page_size, sector_size)?;
        flash.data.fill(value);
        flash.erased.fill(false);
        Ok(flash)
    }

    /// Switch the programming mode
    pub fn with_mode(mut self, mode: ProgramMode) -> Self {
        self.mode = mode;
        self
    }

    /// Whether the sector has not been written since its last erase
    pub fn is_sector_erased(&self, sector: u32) -> bool {
        self.erased.get(sector as usize).copied().unwrap_or(false)
    }

    /// Raw chip contents
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Operation counters
    pub fn stats(&self) -> DeviceStats {
        self.stats
    }

    pub fn page_size(&self) -> u32 {
        self.geometry.page_size
    }

    pub fn sector_size(&self) -> u32 {
        self.geometry.sector_size
    }
}

impl BlockDevice for MemFlash {
    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        self.geometry.check_range(addr, buf.len())?;
        let start = addr as usize;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        self.stats.reads += 1;
        Ok(())
    }

    fn write(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        self.geometry.check_write(addr, data.len())?;
        let start = addr as usize;
        let target = &mut self.data[start..start + data.len()];

        if self.mode == ProgramMode::Strict {
            if let Some(pos) = target.iter().position(|&b| b != ERASED_BYTE) {
                return Err(FlashLogError::Device(format!(
                    "program over non-erased byte at {}",
                    start + pos
                )));
            }
        }

        for (dst, src) in target.iter_mut().zip(data) {
            *dst &= *src;
        }

        if !data.is_empty() {
            self.erased[(addr / self.geometry.sector_size) as usize] = false;
        }
        self.stats.writes += 1;
        self.stats.bytes_written += data.len() as u64;
        trace!(addr, len = data.len(), "mem flash write");
        Ok(())
    }

    fn erase(&mut self, sector_addr: u32) -> Result<()> {
        self.geometry.check_erase(sector_addr)?;
        let start = sector_addr as usize;
        let end = start + self.geometry.sector_size as usize;
        self.data[start..end].fill(ERASED_BYTE);
        self.erased[(sector_addr / self.geometry.sector_size) as usize] = true;
        self.stats.erases += 1;
        trace!(sector_addr, "mem flash erase");
        Ok(())
    }

    fn size(&self) -> u32 {
        self.geometry.size
    }
}
