//! Tests for the Flash Log Engine
//!
//! These tests verify:
//! - Open on blank state (reset, first two sectors erased)
//! - FIFO ordering of push/peek/pop, including across ring wrap
//! - Page-straddling records read back byte-for-byte
//! - Erase-ahead: the sector after the tail's sector is always erased
//! - Capacity bound and eviction of the oldest sector under pressure
//! - Checkpoint placement (sector crossings on push, page crossings on pop)
//! - erase_all and argument validation
//! - Shared access from several threads

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use flashlog::config::Config;
use flashlog::device::{BlockDevice, MemFlash};
use flashlog::engine::{FlashLog, PushOutcome, Recovery};
use flashlog::shared::SharedLog;
use flashlog::state::{MemWords, Pointers, RecoveryStore};
use flashlog::{FlashLogError, StateChecksum};

// =============================================================================
// Helper Functions
// =============================================================================

type MemLog = FlashLog<MemFlash, MemWords>;

/// 8-byte records, 256-byte pages, 4 KiB sectors
fn config(record_size: u32) -> Config {
    Config::builder()
        .page_size(256)
        .sector_size(4096)
        .record_size(record_size)
        .build()
}

fn open_log(record_size: u32, sectors: u32) -> MemLog {
    let flash = MemFlash::new(sectors * 4096, 256, 4096).unwrap();
    FlashLog::open(config(record_size), flash, MemWords::new(16)).unwrap()
}

/// Record `{i, i}` as two little-endian u32 words
fn rec(i: u32) -> [u8; 8] {
    let mut bytes = [0u8; 8];
    bytes[..4].copy_from_slice(&i.to_le_bytes());
    bytes[4..].copy_from_slice(&i.to_le_bytes());
    bytes
}

/// A record of `len` bytes whose contents depend on `seed`
fn pattern(seed: u32, len: usize) -> Vec<u8> {
    (0..len).map(|j| (seed as usize * 31 + j * 7) as u8 & 0x7F).collect()
}

fn assert_erase_ahead(log: &MemLog) {
    let layout = log.layout();
    let ahead = layout.next_sector(layout.slot_sector(log.tail()));
    assert!(
        log.device().is_sector_erased(ahead),
        "sector {} after tail {} is not erased",
        ahead,
        log.tail()
    );
}

// =============================================================================
// Open Tests
// =============================================================================

#[test]
fn test_open_blank_state_resets_and_erases_first_sectors() {
    let flash = MemFlash::filled(3 * 4096, 256, 4096, 0x00).unwrap();
    let log = FlashLog::open(config(8), flash, MemWords::new(16)).unwrap();

    assert_eq!(log.recovery(), Recovery::Reset);
    assert_eq!(log.head(), 0);
    assert_eq!(log.tail(), 0);
    assert!(log.is_empty());
    assert!(log.device().is_sector_erased(0));
    assert!(log.device().is_sector_erased(1));
    assert!(!log.device().is_sector_erased(2));

    let (_flash, words) = log.into_parts();
    let mut store = RecoveryStore::new(words, 0, StateChecksum::Xor);
    assert_eq!(store.load().unwrap(), Some(Pointers { head: 0, tail: 0 }));
}

#[test]
fn test_open_reports_capacity() {
    let log = open_log(8, 3);
    assert_eq!(log.capacity_slots(), 1536);
    assert_eq!(log.usable_capacity(), 1024);
    assert_eq!(log.free_slots(), 1024);
    assert_eq!(log.count(), 0);
}

#[test]
fn test_open_rejects_bad_geometry() {
    let flash = MemFlash::new(4096, 256, 4096).unwrap();
    let result = FlashLog::open(config(8), flash, MemWords::new(16));
    assert!(matches!(result, Err(FlashLogError::Config(_))));
}

#[test]
fn test_open_rejects_short_last_sector() {
    // 1000-byte records start 5, 4 and 3 slots in the three sectors: with
    // only 3 in the last one the log could outgrow its usable capacity
    let flash = MemFlash::new(3 * 4096, 256, 4096).unwrap();
    let result = FlashLog::open(config(1000), flash, MemWords::new(16));
    assert!(matches!(result, Err(FlashLogError::Config(_))));
}

#[test]
fn test_state_offset_is_honoured() {
    let flash = MemFlash::new(3 * 4096, 256, 4096).unwrap();
    let config = Config::builder().record_size(8).state_offset(32).build();
    let log = FlashLog::open(config, flash, MemWords::new(44)).unwrap();

    let (_flash, words) = log.into_parts();
    assert!(words.bytes()[..32].iter().all(|&b| b == 0xFF));
    let mut store = RecoveryStore::new(words, 32, StateChecksum::Xor);
    assert_eq!(store.load().unwrap(), Some(Pointers { head: 0, tail: 0 }));
}

// =============================================================================
// FIFO Tests
// =============================================================================

#[test]
fn test_push_then_pop_preserves_order() {
    let mut log = open_log(8, 3);

    for i in 0..1000 {
        log.push(&rec(i)).unwrap();
    }
    assert_eq!(log.count(), 1000);

    for i in 0..1000 {
        assert_eq!(log.peek().unwrap().unwrap().as_ref(), &rec(i));
        assert!(log.pop().unwrap());
    }
    assert!(log.is_empty());
    assert_eq!(log.stats().evicted, 0);
}

#[test]
fn test_peek_does_not_consume() {
    let mut log = open_log(8, 3);
    log.push(&rec(7)).unwrap();

    let mut buf = [0u8; 8];
    assert!(log.peek_into(&mut buf).unwrap());
    assert!(log.peek_into(&mut buf).unwrap());
    assert_eq!(buf, rec(7));
    assert_eq!(log.count(), 1);
}

#[test]
fn test_peek_and_pop_on_empty_log() {
    let mut log = open_log(8, 3);

    assert_eq!(log.peek().unwrap(), None);
    let mut buf = [0u8; 8];
    assert!(!log.peek_into(&mut buf).unwrap());
    assert!(!log.pop().unwrap());
    assert_eq!(log.head(), 0);
    assert_eq!(log.pop_record().unwrap(), None);
}

#[test]
fn test_lockstep_traffic_across_many_laps() {
    let mut log = open_log(8, 3);
    let mut expected = 0u32;

    for i in 0..6000 {
        log.push(&rec(i)).unwrap();
        assert_erase_ahead(&log);
        if log.count() > 300 {
            let record = log.pop_record().unwrap().unwrap();
            assert_eq!(record.as_ref(), &rec(expected));
            expected += 1;
        }
    }

    while let Some(record) = log.pop_record().unwrap() {
        assert_eq!(record.as_ref(), &rec(expected));
        expected += 1;
    }
    assert_eq!(expected, 6000);
    assert_eq!(log.stats().evicted, 0);
}

// =============================================================================
// Page Straddle Tests
// =============================================================================

#[test]
fn test_straddling_record_reads_back_exactly() {
    let mut log = open_log(24, 3);
    for i in 0..11 {
        log.push(&pattern(i, 24)).unwrap();
    }
    for _ in 0..10 {
        log.pop().unwrap();
    }

    // slot 10 lives at 240..264, across the first page boundary
    assert_eq!(log.layout().page_split(log.layout().slot_addr(10), 24), Some(16));
    assert_eq!(log.peek().unwrap().unwrap().as_ref(), pattern(10, 24).as_slice());
}

#[test]
fn test_straddling_record_is_written_in_two_pieces() {
    let mut log = open_log(24, 3);
    for i in 0..10 {
        log.push(&pattern(i, 24)).unwrap();
    }

    let before = log.device().stats().writes;
    log.push(&pattern(10, 24)).unwrap();
    assert_eq!(log.device().stats().writes - before, 2);

    let before = log.device().stats().writes;
    log.push(&pattern(11, 24)).unwrap();
    assert_eq!(log.device().stats().writes - before, 1);
}

#[test]
fn test_every_split_point_round_trips() {
    // 100-byte records hit many different offsets within a page
    let mut log = open_log(100, 4);
    let mut next = 0u32;

    for i in 0..400u32 {
        log.push(&pattern(i, 100)).unwrap();
        if log.count() > 20 {
            let record = log.pop_record().unwrap().unwrap();
            assert_eq!(record.as_ref(), pattern(next, 100).as_slice());
            next += 1;
        }
    }
}

#[test]
fn test_record_longer_than_a_page() {
    let mut log = open_log(600, 3);
    for i in 0..12 {
        log.push(&pattern(i, 600)).unwrap();
    }
    for i in 0..12 {
        let record = log.pop_record().unwrap().unwrap();
        assert_eq!(record.as_ref(), pattern(i, 600).as_slice());
    }
}

// =============================================================================
// Erase-Ahead and Capacity Tests
// =============================================================================

#[test]
fn test_erase_ahead_holds_after_every_push() {
    for record_size in [8, 24, 100] {
        let mut log = open_log(record_size, 4);
        assert_erase_ahead(&log);
        for i in 0..3000 {
            log.push(&pattern(i, record_size as usize)).unwrap();
            assert_erase_ahead(&log);
        }
    }
}

#[test]
fn test_count_never_exceeds_usable_capacity() {
    // (record size, sectors); 1000-byte records leave the sectors with
    // uneven slot counts, 5 and 4 slot starts
    for (record_size, sectors) in [(8, 3), (24, 3), (104, 3), (600, 3), (1000, 11)] {
        let mut log = open_log(record_size, sectors);
        for i in 0..5000 {
            log.push(&pattern(i, record_size as usize)).unwrap();
            assert!(log.count() <= log.usable_capacity());
            assert!(log.count() <= log.capacity_slots());
        }
        assert!(log.stats().evicted > 0);
    }
}

#[test]
fn test_push_entering_new_sector_erases_ahead_and_persists() {
    let mut log = open_log(8, 3);
    let saves = log.stats().state_saves;

    for i in 0..511 {
        assert_eq!(log.push(&rec(i)).unwrap(), PushOutcome::default());
    }
    assert_eq!(log.stats().state_saves, saves);

    let outcome = log.push(&rec(511)).unwrap();
    assert_eq!(
        outcome,
        PushOutcome {
            erased_sector: Some(2),
            evicted: 0
        }
    );
    assert_eq!(log.stats().state_saves, saves + 1);
}

#[test]
fn test_eviction_when_tail_enters_last_free_sector() {
    let mut log = open_log(8, 3);
    for i in 0..1023 {
        log.push(&rec(i)).unwrap();
    }
    assert_eq!(log.count(), 1023);
    assert_eq!(log.stats().evicted, 0);

    // tail enters sector 2, so sector 0 (holding head) is erased ahead
    let outcome = log.push(&rec(1023)).unwrap();
    assert_eq!(outcome.erased_sector, Some(0));
    assert_eq!(outcome.evicted, 512);
    assert_eq!(log.head(), 512);
    assert_eq!(log.count(), 512);
    assert_eq!(log.peek().unwrap().unwrap().as_ref(), &rec(512));
}

#[test]
fn test_concrete_1025_push_scenario() {
    let mut log = open_log(8, 3);
    assert_eq!(log.capacity_slots(), 1536);
    assert_eq!(log.usable_capacity(), 1024);

    for i in 0..1025 {
        log.push(&rec(i)).unwrap();
        assert!(log.count() <= log.usable_capacity());
    }

    assert_eq!(log.count(), 513);
    assert_eq!(log.stats().evicted, 512);
    assert_eq!(log.peek().unwrap().unwrap().as_ref(), &rec(512));

    let mut seen = Vec::new();
    while let Some(record) = log.pop_record().unwrap() {
        seen.push(record);
    }
    assert_eq!(seen.len(), 513);
    assert!(seen.iter().all(|r| r.as_ref() != rec(0)));
    assert_eq!(seen.last().unwrap().as_ref(), &rec(1024));
}

#[test]
fn test_eviction_with_uneven_records_keeps_order() {
    let mut log = open_log(104, 3);
    for i in 0..2000 {
        log.push(&pattern(i, 104)).unwrap();
    }

    // whatever survived is a contiguous run ending at the newest record
    let count = log.count();
    let first = 2000 - count;
    for i in first..2000 {
        let record = log.pop_record().unwrap().unwrap();
        assert_eq!(record.as_ref(), pattern(i, 104).as_slice());
    }
    assert_eq!(u64::from(first), log.stats().evicted);
}

#[test]
fn test_two_sector_region_evicts_everything_on_crossing() {
    let mut log = open_log(8, 2);
    assert_eq!(log.usable_capacity(), 512);

    for i in 0..511 {
        log.push(&rec(i)).unwrap();
    }
    assert_eq!(log.count(), 511);

    let outcome = log.push(&rec(511)).unwrap();
    assert_eq!(outcome.erased_sector, Some(0));
    assert_eq!(outcome.evicted, 512);
    assert!(log.is_empty());
}

#[test]
fn test_region_limit_bounds_erases() {
    let flash = MemFlash::new(8 * 4096, 256, 4096).unwrap();
    let config = Config::builder().record_size(8).region_limit(3 * 4096).build();
    let mut log = FlashLog::open(config, flash, MemWords::new(16)).unwrap();

    assert_eq!(log.capacity_slots(), 1536);
    for i in 0..4000 {
        log.push(&rec(i)).unwrap();
    }
    // nothing beyond the region was ever touched
    assert!(log.device().data()[3 * 4096..].iter().all(|&b| b == 0xFF));
}

// =============================================================================
// Checkpoint Tests
// =============================================================================

#[test]
fn test_pop_persists_only_on_page_crossing() {
    let mut log = open_log(8, 3);
    for i in 0..40 {
        log.push(&rec(i)).unwrap();
    }
    let saves = log.stats().state_saves;

    // 32 records per page: popping slots 0..30 stays in page 0
    for _ in 0..31 {
        log.pop().unwrap();
    }
    assert_eq!(log.stats().state_saves, saves);

    log.pop().unwrap();
    assert_eq!(log.head(), 32);
    assert_eq!(log.stats().state_saves, saves + 1);
}

#[test]
fn test_checkpoint_saves_current_pointers() {
    let mut log = open_log(8, 3);
    for i in 0..10 {
        log.push(&rec(i)).unwrap();
    }
    log.pop().unwrap();
    log.checkpoint().unwrap();

    let (_flash, words) = log.into_parts();
    let mut store = RecoveryStore::new(words, 0, StateChecksum::Xor);
    assert_eq!(store.load().unwrap(), Some(Pointers { head: 1, tail: 10 }));
}

// =============================================================================
// Erase All and Validation Tests
// =============================================================================

#[test]
fn test_erase_all_empties_and_erases_every_sector() {
    let mut log = open_log(8, 4);
    for i in 0..1500 {
        log.push(&rec(i)).unwrap();
    }

    log.erase_all().unwrap();
    assert!(log.is_empty());
    assert_eq!(log.head(), 0);
    assert_eq!(log.tail(), 0);
    assert!((0..4).all(|s| log.device().is_sector_erased(s)));

    log.push(&rec(1)).unwrap();
    assert_eq!(log.pop_record().unwrap().unwrap().as_ref(), &rec(1));
}

#[test]
fn test_wrong_record_size_is_rejected() {
    let mut log = open_log(8, 3);

    assert!(matches!(
        log.push(&[0u8; 7]),
        Err(FlashLogError::RecordSize { expected: 8, actual: 7 })
    ));
    let mut buf = [0u8; 9];
    assert!(matches!(
        log.peek_into(&mut buf),
        Err(FlashLogError::RecordSize { expected: 8, actual: 9 })
    ));
    assert!(log.is_empty());
}

/// MemFlash whose writes start failing once `fail` is set
struct FailingFlash {
    inner: MemFlash,
    fail: Arc<AtomicBool>,
}

impl BlockDevice for FailingFlash {
    fn read(&mut self, addr: u32, buf: &mut [u8]) -> flashlog::Result<()> {
        self.inner.read(addr, buf)
    }

    fn write(&mut self, addr: u32, data: &[u8]) -> flashlog::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(FlashLogError::Device("injected write failure".to_string()));
        }
        self.inner.write(addr, data)
    }

    fn erase(&mut self, sector_addr: u32) -> flashlog::Result<()> {
        self.inner.erase(sector_addr)
    }

    fn size(&self) -> u32 {
        self.inner.size()
    }
}

#[test]
fn test_device_errors_propagate_without_moving_tail() {
    let fail = Arc::new(AtomicBool::new(false));
    let flash = FailingFlash {
        inner: MemFlash::new(3 * 4096, 256, 4096).unwrap(),
        fail: Arc::clone(&fail),
    };
    let mut log = FlashLog::open(config(8), flash, MemWords::new(16)).unwrap();
    log.push(&rec(0)).unwrap();

    fail.store(true, Ordering::SeqCst);
    assert!(matches!(log.push(&rec(1)), Err(FlashLogError::Device(_))));
    assert_eq!(log.tail(), 1);
    assert_eq!(log.stats().pushed, 1);

    fail.store(false, Ordering::SeqCst);
    log.push(&rec(1)).unwrap();
    assert_eq!(log.pop_record().unwrap().unwrap().as_ref(), &rec(0));
    assert_eq!(log.pop_record().unwrap().unwrap().as_ref(), &rec(1));
}

// =============================================================================
// Shared Access Tests
// =============================================================================

#[test]
fn test_shared_log_serializes_producers() {
    let shared = SharedLog::new(open_log(8, 3));

    let handles: Vec<_> = (0..4u32)
        .map(|t| {
            let shared = shared.clone();
            thread::spawn(move || {
                for i in 0..200u32 {
                    let mut record = [0u8; 8];
                    record[..4].copy_from_slice(&t.to_le_bytes());
                    record[4..].copy_from_slice(&i.to_le_bytes());
                    shared.push(&record).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(shared.count(), 800);

    let mut last_seen = [None::<u32>; 4];
    while let Some(record) = shared.pop_record().unwrap() {
        let t = u32::from_le_bytes(record[..4].try_into().unwrap()) as usize;
        let i = u32::from_le_bytes(record[4..].try_into().unwrap());
        if let Some(prev) = last_seen[t] {
            assert!(i > prev, "thread {} records out of order", t);
        }
        last_seen[t] = Some(i);
    }
    assert!(last_seen.iter().all(|s| *s == Some(199)));

    let log = shared.try_unwrap().ok().unwrap();
    assert_eq!(log.stats().pushed, 800);
    assert_eq!(log.stats().popped, 800);
}

#[test]
fn test_shared_log_producer_and_consumer_threads() {
    let shared = SharedLog::new(open_log(8, 3));
    let producer = {
        let shared = shared.clone();
        thread::spawn(move || {
            for i in 0..3000u32 {
                // keep the backlog well under the usable capacity
                while shared.count() > 500 {
                    thread::yield_now();
                }
                shared.push(&rec(i)).unwrap();
            }
        })
    };

    let mut expected = 0u32;
    while expected < 3000 {
        if let Some(record) = shared.pop_record().unwrap() {
            assert_eq!(record.as_ref(), &rec(expected));
            expected += 1;
        } else {
            thread::yield_now();
        }
    }
    producer.join().unwrap();
    assert_eq!(shared.stats().evicted, 0);
}
