//! Block Device Module
//!
//! The boundary between the log engine and the flash chip.
//!
//! ## Flash Rules
//! - `erase` resets a whole sector to the erased value (`0xFF` on NOR)
//! - `write` programs bytes inside a single page; the caller splits writes
//!   that would straddle a page boundary
//! - programming can only move bits from erased to written, so a slot must be
//!   erased before it is written again
//!
//! ## Implementors
//! - [`MemFlash`] - simulated chip for tests and benchmarks
//! - [`FileFlash`] - flash image kept in a regular file

mod file;
mod memory;

pub use file::FileFlash;
pub use memory::{DeviceStats, MemFlash, ProgramMode};

use crate::error::{FlashLogError, Result};

/// Value every byte holds after an erase on NOR flash
pub const ERASED_BYTE: u8 = 0xFF;

/// A NOR-like flash device with page writes and sector erases
///
/// All addresses are byte offsets from the start of the device. Devices
/// report misuse (out of range, page straddle, unaligned erase) as
/// [`FlashLogError::Device`]; the log engine treats any error as fatal.
pub trait BlockDevice {
    /// Read `buf.len()` bytes starting at `addr`
    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<()>;

    /// Program `data` at `addr`; `[addr, addr + data.len())` must lie within
    /// one page
    fn write(&mut self, addr: u32, data: &[u8]) -> Result<()>;

    /// Erase the sector starting at `sector_addr`
    fn erase(&mut self, sector_addr: u32) -> Result<()>;

    /// Device size in bytes
    fn size(&self) -> u32;

    /// Byte value of erased flash
    fn erased_value(&self) -> u8 {
        ERASED_BYTE
    }
}

impl<D: BlockDevice + ?Sized> BlockDevice for &mut D {
    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        (**self).read(addr, buf)
    }

    fn write(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        (**self).write(addr, data)
    }

    fn erase(&mut self, sector_addr: u32) -> Result<()> {
        (**self).erase(sector_addr)
    }

    fn size(&self) -> u32 {
        (**self).size()
    }

    fn erased_value(&self) -> u8 {
        (**self).erased_value()
    }
}

impl<D: BlockDevice + ?Sized> BlockDevice for Box<D> {
    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        (**self).read(addr, buf)
    }

    fn write(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        (**self).write(addr, data)
    }

    fn erase(&mut self, sector_addr: u32) -> Result<()> {
        (**self).erase(sector_addr)
    }

    fn size(&self) -> u32 {
        (**self).size()
    }

    fn erased_value(&self) -> u8 {
        (**self).erased_value()
    }
}

// =============================================================================
// Shared Checks (used by both device implementations)
// =============================================================================

/// Geometry checks shared by the bundled devices
#[derive(Debug, Clone, Copy)]
pub(crate) struct Geometry {
    pub size: u32,
    pub page_size: u32,
    pub sector_size: u32,
}

impl Geometry {
    pub(crate) fn new(size: u32, page_size: u32, sector_size: u32) -> Result<Self> {
        if !page_size.is_power_of_two() || !sector_size.is_power_of_two() {
            return Err(FlashLogError::Device(format!(
                "page size {} and sector size {} must be powers of two",
                page_size, sector_size
            )));
        }
        if sector_size < page_size || size % sector_size != 0 {
            return Err(FlashLogError::Device(format!(
                "device of {} bytes is not a whole number of {}-byte sectors of {}-byte pages",
                size, sector_size, page_size
            )));
        }
        Ok(Self {
            size,
            page_size,
            sector_size,
        })
    }

    pub(crate) fn check_range(&self, addr: u32, len: usize) -> Result<()> {
        let end = u64::from(addr) + len as u64;
        if end > u64::from(self.size) {
            return Err(FlashLogError::Device(format!(
                "access {}..{} beyond device size {}",
                addr, end, self.size
            )));
        }
        Ok(())
    }

    pub(crate) fn check_write(&self, addr: u32, len: usize) -> Result<()> {
        self.check_range(addr, len)?;
        if len > 0 {
            let last = addr + (len as u32 - 1);
            if addr / self.page_size != last / self.page_size {
                return Err(FlashLogError::Device(format!(
                    "write {}..{} straddles a {}-byte page boundary",
                    addr,
                    last + 1,
                    self.page_size
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn check_erase(&self, sector_addr: u32) -> Result<()> {
        if sector_addr % self.sector_size != 0 {
            return Err(FlashLogError::Device(format!(
                "erase address {} is not aligned to {}-byte sectors",
                sector_addr, self.sector_size
            )));
        }
        self.check_range(sector_addr, self.sector_size as usize)
    }

    pub(crate) fn sector_count(&self) -> u32 {
        self.size / self.sector_size
    }
}
