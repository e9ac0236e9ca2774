//! Staging Buffer
//!
//! A bounded lock-free queue between record producers that must never block
//! (interrupt handlers, sensor callbacks) and the main loop that owns the log.
//!
//! ```text
//!  producer ──offer──▶ ┌──────────────┐ ──drain_into──▶ FlashLog
//!  producer ──offer──▶ │ ArrayQueue   │   (main loop)
//!                      └──────────────┘
//! ```
//! `offer` never waits: when the queue is full the record is dropped and
//! counted.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use crossbeam::queue::ArrayQueue;
use tracing::{debug, warn};

use crate::device::BlockDevice;
use crate::engine::FlashLog;
use crate::error::{FlashLogError, Result};
use crate::shared::SharedLog;
use crate::state::WordStore;

/// Result of moving staged records into a log
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Records pushed into the log
    pub moved: u32,
    /// Older log records evicted while pushing them
    pub evicted: u32,
}

/// Bounded multi-producer queue of fixed-size records
#[derive(Debug)]
pub struct StagingBuffer {
    queue: ArrayQueue<Bytes>,
    record_size: usize,
    dropped: AtomicU64,
}

impl StagingBuffer {
    /// Create a buffer for up to `capacity` records of `record_size` bytes
    pub fn new(capacity: usize, record_size: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity.max(1)),
            record_size,
            dropped: AtomicU64::new(0),
        }
    }

    /// Stage a record without blocking
    ///
    /// Returns `Ok(false)` when the buffer is full and the record was dropped.
    pub fn offer(&self, record: &[u8]) -> Result<bool> {
        if record.len() != self.record_size {
            return Err(FlashLogError::RecordSize {
                expected: self.record_size,
                actual: record.len(),
            });
        }

        match self.queue.push(Bytes::copy_from_slice(record)) {
            Ok(()) => Ok(true),
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Ok(false)
            }
        }
    }

    /// Push every staged record into `log`, oldest first
    pub fn drain_into<D: BlockDevice, S: WordStore>(
        &self,
        log: &mut FlashLog<D, S>,
    ) -> Result<DrainReport> {
        let mut report = DrainReport::default();
        while let Some(record) = self.queue.pop() {
            let outcome = log.push(&record)?;
            report.moved += 1;
            report.evicted += outcome.evicted;
        }

        if report.evicted > 0 {
            warn!(evicted = report.evicted, "draining staged records evicted log entries");
        }
        if report.moved > 0 {
            debug!(moved = report.moved, "drained staging buffer");
        }
        Ok(report)
    }

    /// Same as [`StagingBuffer::drain_into`] for a shared log
    pub fn drain_into_shared<D: BlockDevice, S: WordStore>(
        &self,
        log: &SharedLog<D, S>,
    ) -> Result<DrainReport> {
        log.with(|log| self.drain_into(log))
    }

    /// Records currently staged
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Records dropped because the buffer was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
