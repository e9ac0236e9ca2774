//! Engine Module
//!
//! The circular record log that coordinates the flash device, the layout and
//! the recovery state.
//!
//! ## Responsibilities
//! - Append fixed-size records at `tail`, splitting writes at page boundaries
//! - Keep the sector after `tail`'s sector erased (erase-ahead) so a push
//!   never waits for an erase of its own destination
//! - Evict the oldest records when erase-ahead reaches `head`
//! - Mirror {head, tail} to the recovery store at checkpoints
//! - Rebuild the pointers after a reset
//!
//! ## Checkpoints
//! - every push that erased a sector persists {head, tail}
//! - every pop that moves `head` onto a new page persists {head, tail}
//!
//! After a power cut at most one page worth of consumed records is delivered
//! again. Records pushed after the last checkpoint are found again by scanning
//! forward from the persisted tail for written slots.

use bytes::{Bytes, BytesMut};
use tracing::{debug, info, trace, warn};

use crate::config::Config;
use crate::device::BlockDevice;
use crate::error::{FlashLogError, Result};
use crate::layout::Layout;
use crate::state::{Pointers, RecoveryStore, WordStore};

/// How the pointers were established when the log was opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Persisted pointers were valid; `resynced` records written after the
    /// last checkpoint were found past the persisted tail
    Restored { resynced: u32 },

    /// No trustworthy state: the log starts empty
    Reset,
}

/// What a single push did besides writing the record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushOutcome {
    /// Sector erased ahead of the new tail, if the push entered a new sector
    pub erased_sector: Option<u32>,

    /// Unconsumed records destroyed by that erase
    pub evicted: u32,
}

/// Running counters for one log session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogStats {
    pub pushed: u64,
    pub popped: u64,
    /// Records lost to eviction under capacity pressure
    pub evicted: u64,
    pub sector_erases: u64,
    pub state_saves: u64,
}

/// A fixed-capacity FIFO of fixed-size records on NOR flash
///
/// ## Ownership
/// The log exclusively owns its block device and its word store for its whole
/// lifetime. Use [`FlashLog::close`] or [`FlashLog::into_parts`] to get them
/// back. All operations take `&mut self`; wrap the log in
/// [`crate::shared::SharedLog`] to share it between threads.
///
/// ## Example
/// ```rust
/// use flashlog::{Config, FlashLog};
/// use flashlog::device::MemFlash;
/// use flashlog::state::MemWords;
///
/// let config = Config::builder().record_size(8).build();
/// let flash = MemFlash::new(4 * 4096, 256, 4096).unwrap();
/// let mut log = FlashLog::open(config, flash, MemWords::new(16)).unwrap();
///
/// log.push(&[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
/// assert_eq!(log.count(), 1);
/// assert_eq!(log.peek().unwrap().unwrap().as_ref(), &[1, 2, 3, 4, 5, 6, 7, 8]);
/// log.pop().unwrap();
/// assert!(log.is_empty());
/// ```
pub struct FlashLog<D, S> {
    config: Config,
    layout: Layout,
    device: D,
    state: RecoveryStore<S>,

    /// Slot of the oldest unconsumed record
    head: u32,

    /// Slot the next push writes
    tail: u32,

    stats: LogStats,
    recovery: Recovery,
}

impl<D: BlockDevice, S: WordStore> FlashLog<D, S> {
    /// Open the log on `device`, recovering pointers from `words`
    ///
    /// On startup:
    /// 1. Derive the layout from config and device size
    /// 2. Load {head, tail} from the recovery store
    /// 3. Valid: adopt them and pick up records pushed after the last
    ///    checkpoint
    /// 4. Invalid or out of range: invalidate the state, erase sectors 0 and 1,
    ///    then persist an empty log
    ///
    /// Only device and store failures are errors; an untrustworthy state
    /// always falls back to an empty log.
    pub fn open(config: Config, device: D, words: S) -> Result<Self> {
        let layout = Layout::new(&config, device.size())?;
        let state = RecoveryStore::new(words, config.state_offset, config.state_checksum);

        let mut log = Self {
            config,
            layout,
            device,
            state,
            head: 0,
            tail: 0,
            stats: LogStats::default(),
            recovery: Recovery::Reset,
        };

        let capacity = layout.capacity_slots();
        match log.state.load()? {
            Some(Pointers { head, tail }) if head < capacity && tail < capacity => {
                log.head = head;
                log.tail = tail;
                let resynced = log.resync_tail()?;
                log.recovery = Recovery::Restored { resynced };
                info!(
                    head = log.head,
                    tail = log.tail,
                    count = log.count(),
                    resynced,
                    "flash log restored"
                );
            }
            Some(Pointers { head, tail }) => {
                warn!(head, tail, capacity, "persisted pointers out of range, resetting log");
                log.reset()?;
            }
            None => {
                warn!("no valid recovery state, resetting log");
                log.reset()?;
            }
        }

        Ok(log)
    }

    /// Empty the log and erase every sector of its region
    ///
    /// Blocks until all erases have completed. The persisted state is
    /// invalidated first and the empty pointers are saved only after the last
    /// erase, so a power cut in between reopens as a reset log.
    pub fn erase_all(&mut self) -> Result<()> {
        self.state.clear()?;
        self.head = 0;
        self.tail = 0;

        for sector in 0..self.layout.sector_count() {
            self.erase_sector(sector)?;
        }
        self.save()?;

        info!(sectors = self.layout.sector_count(), "erased flash log region");
        Ok(())
    }

    // =========================================================================
    // Producer Path
    // =========================================================================

    /// Append a record at the tail
    ///
    /// Steps:
    /// 1. Write the record, one device write per page it touches
    /// 2. Advance tail; when it enters a new sector, erase the sector after it
    /// 3. If that erase destroyed `head`, move head past the erased sector
    /// 4. Persist {head, tail} if an erase happened
    pub fn push(&mut self, record: &[u8]) -> Result<PushOutcome> {
        self.check_record_len(record.len())?;

        self.write_slot(self.tail, record)?;
        let outcome = self.advance_tail()?;
        self.stats.pushed += 1;

        trace!(tail = self.tail, count = self.count(), "pushed record");
        Ok(outcome)
    }

    // =========================================================================
    // Consumer Path
    // =========================================================================

    /// Copy the oldest record into `buf` without removing it
    ///
    /// Returns `false` when the log is empty. `buf` must be exactly one
    /// record long.
    pub fn peek_into(&mut self, buf: &mut [u8]) -> Result<bool> {
        self.check_record_len(buf.len())?;
        if self.is_empty() {
            return Ok(false);
        }

        let addr = self.layout.slot_addr(self.head);
        self.device.read(addr, buf)?;
        Ok(true)
    }

    /// Return the oldest record without removing it
    pub fn peek(&mut self) -> Result<Option<Bytes>> {
        let mut buf = BytesMut::zeroed(self.layout.record_size() as usize);
        if self.peek_into(&mut buf)? {
            Ok(Some(buf.freeze()))
        } else {
            Ok(None)
        }
    }

    /// Drop the oldest record
    ///
    /// Returns `false` (and changes nothing) when the log is empty. Persists
    /// the pointers when `head` moves onto a new page.
    pub fn pop(&mut self) -> Result<bool> {
        if self.is_empty() {
            return Ok(false);
        }

        let next = self.layout.next_slot(self.head);
        let crossed_page = self.layout.slot_page(self.head) != self.layout.slot_page(next);
        self.head = next;
        self.stats.popped += 1;

        if crossed_page {
            self.save()?;
        }

        trace!(head = self.head, count = self.count(), "popped record");
        Ok(true)
    }

    /// Peek and pop in one step
    pub fn pop_record(&mut self) -> Result<Option<Bytes>> {
        let record = self.peek()?;
        if record.is_some() {
            self.pop()?;
        }
        Ok(record)
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Persist {head, tail} now
    pub fn checkpoint(&mut self) -> Result<()> {
        self.save()
    }

    /// Checkpoint and hand back the device and the word store
    pub fn close(mut self) -> Result<(D, S)> {
        self.save()?;
        Ok(self.into_parts())
    }

    /// Hand back the device and the word store without persisting anything
    ///
    /// Equivalent to losing power: only what was already checkpointed is
    /// seen by the next [`FlashLog::open`].
    pub fn into_parts(self) -> (D, S) {
        (self.device, self.state.into_inner())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Number of records currently in the log
    pub fn count(&self) -> u32 {
        self.layout.distance(self.head, self.tail)
    }

    /// Records the log holds without evicting (capacity minus the sector kept
    /// erased)
    pub fn usable_capacity(&self) -> u32 {
        self.layout.usable_capacity()
    }

    /// Pushes left before the usable capacity is reached
    pub fn free_slots(&self) -> u32 {
        self.usable_capacity().saturating_sub(self.count())
    }

    /// Total record slots in the region
    pub fn capacity_slots(&self) -> u32 {
        self.layout.capacity_slots()
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    pub fn head(&self) -> u32 {
        self.head
    }

    pub fn tail(&self) -> u32 {
        self.tail
    }

    pub fn stats(&self) -> LogStats {
        self.stats
    }

    pub fn recovery(&self) -> Recovery {
        self.recovery
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn state_store(&self) -> &RecoveryStore<S> {
        &self.state
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Start from an empty log with sectors 0 and 1 erased
    ///
    /// `(0, 0)` only becomes valid state once both erases are done: the tail
    /// resync trusts every written slot past a valid tail.
    fn reset(&mut self) -> Result<()> {
        self.state.clear()?;
        self.head = 0;
        self.tail = 0;
        self.erase_sector(0)?;
        self.erase_sector(1)?;
        self.save()?;
        self.recovery = Recovery::Reset;
        Ok(())
    }

    /// Move tail over slots written after the last checkpoint
    ///
    /// Slots from the persisted tail onward were erased when the tail entered
    /// its sector, so any written slot there is a record pushed before the
    /// power cut. A record made entirely of erased bytes ends the scan.
    fn resync_tail(&mut self) -> Result<u32> {
        let erased = self.device.erased_value();
        let mut buf = vec![0u8; self.layout.record_size() as usize];
        let mut resynced = 0;

        while resynced < self.layout.capacity_slots() {
            if self.layout.next_slot(self.tail) == self.head {
                break;
            }

            self.device.read(self.layout.slot_addr(self.tail), &mut buf)?;
            if buf.iter().all(|&b| b == erased) {
                break;
            }

            self.advance_tail()?;
            resynced += 1;
        }

        if resynced > 0 {
            debug!(resynced, tail = self.tail, "found records past persisted tail");
            self.save()?;
        }
        Ok(resynced)
    }

    /// Write one record at `slot`, split into page-bounded writes
    fn write_slot(&mut self, slot: u32, record: &[u8]) -> Result<()> {
        let addr = self.layout.slot_addr(slot);
        for chunk in self.layout.page_chunks(addr, self.layout.record_size()) {
            let start = chunk.offset as usize;
            let end = start + chunk.len as usize;
            self.device.write(chunk.addr, &record[start..end])?;
        }
        Ok(())
    }

    /// Move tail one slot forward with erase-ahead and eviction
    fn advance_tail(&mut self) -> Result<PushOutcome> {
        let layout = self.layout;
        let next = layout.next_slot(self.tail);
        let entered_sector =
            layout.slot_sector(next) != layout.slot_sector(self.tail);
        self.tail = next;

        let mut outcome = PushOutcome::default();
        if !entered_sector {
            return Ok(outcome);
        }

        let ahead = layout.next_sector(layout.slot_sector(next));
        self.erase_sector(ahead)?;
        outcome.erased_sector = Some(ahead);

        // The erase destroyed the oldest records: skip head past the sector
        if layout.slot_sector(self.head) == ahead {
            let new_head = layout.first_slot_after(ahead);
            let evicted = layout.distance(self.head, new_head);
            warn!(
                old_head = self.head,
                new_head,
                evicted,
                "flash log full, evicted oldest records"
            );
            self.head = new_head;
            self.stats.evicted += u64::from(evicted);
            outcome.evicted = evicted;
        }

        self.save()?;
        Ok(outcome)
    }

    fn erase_sector(&mut self, sector: u32) -> Result<()> {
        self.device.erase(self.layout.sector_addr(sector))?;
        self.stats.sector_erases += 1;
        debug!(sector, "erased sector");
        Ok(())
    }

    fn save(&mut self) -> Result<()> {
        self.state.save(Pointers {
            head: self.head,
            tail: self.tail,
        })?;
        self.stats.state_saves += 1;
        Ok(())
    }

    fn check_record_len(&self, len: usize) -> Result<()> {
        let expected = self.layout.record_size() as usize;
        if len != expected {
            return Err(FlashLogError::RecordSize {
                expected,
                actual: len,
            });
        }
        Ok(())
    }
}

impl<D, S> std::fmt::Debug for FlashLog<D, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlashLog")
            .field("head", &self.head)
            .field("tail", &self.tail)
            .field("capacity_slots", &self.layout.capacity_slots())
            .field("record_size", &self.layout.record_size())
            .field("stats", &self.stats)
            .finish()
    }
}
