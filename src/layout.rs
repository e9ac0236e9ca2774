//! Layout Module
//!
//! Pure arithmetic mapping logical slots onto the physical flash region.
//!
//! ## Region Format
//! ```text
//! ┌──────────────── sector 0 ────────────────┬──────────── sector 1 ───────────
//! │ page 0        │ page 1        │ ...      │ page 16       │ ...
//! │ [slot 0][slot 1][slot 2]...[slot k][slot k+1]...
//! └──────────────────────────────────────────┴─────────────────────────────────
//! ```
//! Slot `i` occupies `[i * record_size, (i + 1) * record_size)`. Slots are
//! packed back to back, so a slot may straddle a page or a sector boundary.
//! Trailing bytes of the region that cannot hold a whole slot are unused.

use crate::config::Config;
use crate::error::{FlashLogError, Result};

/// Geometry of one log region, derived from a validated [`Config`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    page_bits: u32,
    sector_bits: u32,
    record_size: u32,
    region_len: u32,
    capacity_slots: u32,
}

/// One page-bounded piece of a byte range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageChunk {
    /// Device address of the piece
    pub addr: u32,
    /// Offset of the piece within the original range
    pub offset: u32,
    /// Length of the piece in bytes
    pub len: u32,
}

impl Layout {
    /// Build the layout for a device of `device_size` bytes
    ///
    /// The region is the device size, capped by `config.region_limit`, rounded
    /// down to whole sectors. At least two sectors are required: one being
    /// written and one kept erased ahead of it.
    pub fn new(config: &Config, device_size: u32) -> Result<Self> {
        config.validate()?;

        let limit = config
            .region_limit
            .map_or(device_size, |limit| limit.min(device_size));
        let region_len = limit & !(config.sector_size - 1);

        if region_len / config.sector_size < 2 {
            return Err(FlashLogError::Config(format!(
                "log region of {} bytes holds fewer than two {}-byte sectors",
                limit, config.sector_size
            )));
        }

        let layout = Self {
            page_bits: config.page_size.trailing_zeros(),
            sector_bits: config.sector_size.trailing_zeros(),
            record_size: config.record_size,
            region_len,
            capacity_slots: region_len / config.record_size,
        };

        // Sector changes of the tail drive erase-ahead, so every sector must
        // hold the start of some slot. Eviction frees one sector at a time,
        // so the usable capacity only holds when no sector has fewer than
        // `slots_per_sector - 1` slot starts. Inner sectors always do; only
        // the last one can fall short.
        let required = layout.slots_per_sector().saturating_sub(1).max(1);
        let last_starts = layout.slot_starts_in_last_sector();
        if last_starts < required {
            return Err(FlashLogError::Config(format!(
                "record size {} leaves {} slot starts in the last sector of a {}-byte region, \
                 at least {} are needed",
                config.record_size, last_starts, region_len, required
            )));
        }

        Ok(layout)
    }

    /// Number of slots whose first byte lies in the last sector
    fn slot_starts_in_last_sector(&self) -> u32 {
        let last_sector_addr = u64::from(self.sector_count() - 1) << self.sector_bits;
        let first = last_sector_addr.div_ceil(u64::from(self.record_size));
        u64::from(self.capacity_slots).saturating_sub(first) as u32
    }

    // =========================================================================
    // Geometry
    // =========================================================================

    pub fn record_size(&self) -> u32 {
        self.record_size
    }

    pub fn page_size(&self) -> u32 {
        1 << self.page_bits
    }

    pub fn sector_size(&self) -> u32 {
        1 << self.sector_bits
    }

    /// Region length in bytes (whole sectors)
    pub fn region_len(&self) -> u32 {
        self.region_len
    }

    /// Number of sectors in the region
    pub fn sector_count(&self) -> u32 {
        self.region_len >> self.sector_bits
    }

    /// Total number of record slots in the region
    pub fn capacity_slots(&self) -> u32 {
        self.capacity_slots
    }

    /// Slots needed to cover one sector, rounded up
    pub fn slots_per_sector(&self) -> u32 {
        self.sector_size().div_ceil(self.record_size)
    }

    /// Capacity minus the sector that is always kept erased
    pub fn usable_capacity(&self) -> u32 {
        self.capacity_slots.saturating_sub(self.slots_per_sector())
    }

    // =========================================================================
    // Address Mapping
    // =========================================================================

    /// Byte address of a slot
    pub fn slot_addr(&self, slot: u32) -> u32 {
        slot * self.record_size
    }

    /// Page index containing `addr`
    pub fn page_of(&self, addr: u32) -> u32 {
        addr >> self.page_bits
    }

    /// Start address of a page
    pub fn page_addr(&self, page: u32) -> u32 {
        page << self.page_bits
    }

    /// Sector index containing `addr`
    pub fn sector_of(&self, addr: u32) -> u32 {
        addr >> self.sector_bits
    }

    /// Start address of a sector
    pub fn sector_addr(&self, sector: u32) -> u32 {
        sector << self.sector_bits
    }

    /// Sector in which a slot starts
    pub fn slot_sector(&self, slot: u32) -> u32 {
        self.sector_of(self.slot_addr(slot))
    }

    /// Page in which a slot starts
    pub fn slot_page(&self, slot: u32) -> u32 {
        self.page_of(self.slot_addr(slot))
    }

    /// Where `[addr, addr + len)` must be split to stay within one page
    ///
    /// Returns `None` when the range fits in a single page, otherwise the
    /// length of the first piece (`next_page_start - addr`).
    pub fn page_split(&self, addr: u32, len: u32) -> Option<u32> {
        if len == 0 {
            return None;
        }
        let start = u64::from(addr);
        let last = start + u64::from(len) - 1;
        let first_page = start >> self.page_bits;
        if first_page == last >> self.page_bits {
            None
        } else {
            Some((((first_page + 1) << self.page_bits) - start) as u32)
        }
    }

    /// Split `[addr, addr + len)` into page-bounded pieces
    pub fn page_chunks(&self, addr: u32, len: u32) -> PageChunks {
        PageChunks {
            layout: *self,
            addr,
            offset: 0,
            remaining: len,
        }
    }

    // =========================================================================
    // Ring Arithmetic
    // =========================================================================

    /// Slot following `slot`, wrapping at capacity
    pub fn next_slot(&self, slot: u32) -> u32 {
        let next = slot + 1;
        if next >= self.capacity_slots {
            0
        } else {
            next
        }
    }

    /// Sector following `sector`, wrapping at the region end
    pub fn next_sector(&self, sector: u32) -> u32 {
        let next = sector + 1;
        if next >= self.sector_count() {
            0
        } else {
            next
        }
    }

    /// First slot starting after `sector`, wrapping to 0 past capacity
    ///
    /// Closed form of "advance one slot at a time while the slot starts in
    /// `sector`".
    pub fn first_slot_after(&self, sector: u32) -> u32 {
        let end = (u64::from(sector) + 1) << self.sector_bits;
        let slot = end.div_ceil(u64::from(self.record_size));
        if slot >= u64::from(self.capacity_slots) {
            0
        } else {
            slot as u32
        }
    }

    /// Number of slots from `from` up to (excluding) `to` around the ring
    pub fn distance(&self, from: u32, to: u32) -> u32 {
        if to >= from {
            to - from
        } else {
            to + self.capacity_slots - from
        }
    }
}

/// Iterator over the page-bounded pieces of a byte range
#[derive(Debug, Clone)]
pub struct PageChunks {
    layout: Layout,
    addr: u32,
    offset: u32,
    remaining: u32,
}

impl Iterator for PageChunks {
    type Item = PageChunk;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let len = self
            .layout
            .page_split(self.addr, self.remaining)
            .unwrap_or(self.remaining);
        let chunk = PageChunk {
            addr: self.addr,
            offset: self.offset,
            len,
        };

        self.addr += len;
        self.offset += len;
        self.remaining -= len;
        Some(chunk)
    }
}
