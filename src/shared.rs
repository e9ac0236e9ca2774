//! Shared Log
//!
//! A clonable handle that serializes every log operation behind one mutex.
//!
//! Erase-ahead and eviction move `head` and `tail` together and persist them,
//! so the whole push (or pop) sequence runs under the lock. Readers never
//! observe a half-updated pointer pair.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::device::BlockDevice;
use crate::engine::{FlashLog, LogStats, PushOutcome};
use crate::error::Result;
use crate::state::WordStore;

/// Thread-safe handle to a [`FlashLog`]
pub struct SharedLog<D, S> {
    inner: Arc<Mutex<FlashLog<D, S>>>,
}

impl<D, S> Clone for SharedLog<D, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: BlockDevice, S: WordStore> SharedLog<D, S> {
    pub fn new(log: FlashLog<D, S>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(log)),
        }
    }

    pub fn push(&self, record: &[u8]) -> Result<PushOutcome> {
        self.inner.lock().push(record)
    }

    pub fn peek(&self) -> Result<Option<Bytes>> {
        self.inner.lock().peek()
    }

    pub fn pop(&self) -> Result<bool> {
        self.inner.lock().pop()
    }

    /// Peek and pop under a single lock acquisition
    pub fn pop_record(&self) -> Result<Option<Bytes>> {
        self.inner.lock().pop_record()
    }

    pub fn count(&self) -> u32 {
        self.inner.lock().count()
    }

    pub fn usable_capacity(&self) -> u32 {
        self.inner.lock().usable_capacity()
    }

    pub fn stats(&self) -> LogStats {
        self.inner.lock().stats()
    }

    pub fn checkpoint(&self) -> Result<()> {
        self.inner.lock().checkpoint()
    }

    /// Run `f` with exclusive access to the log
    pub fn with<R>(&self, f: impl FnOnce(&mut FlashLog<D, S>) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut *guard)
    }

    /// Recover the log if this is the last handle
    pub fn try_unwrap(self) -> std::result::Result<FlashLog<D, S>, Self> {
        Arc::try_unwrap(self.inner)
            .map(Mutex::into_inner)
            .map_err(|inner| Self { inner })
    }
}
