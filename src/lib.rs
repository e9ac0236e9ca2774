//! # flashlog
//!
//! A circular record log for NOR flash with:
//! - Fixed-size records in a fixed-capacity FIFO
//! - Page-boundary-aware writes
//! - Erase-ahead: the sector after the write position is always erased
//! - FIFO eviction of the oldest records under capacity pressure
//! - Head/tail pointers persisted with a checksum for recovery after reset
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │        Producers (interrupts, callbacks, threads)           │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ offer
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │               StagingBuffer (lock-free)                      │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ drain (main loop)
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │            FlashLog (push / peek / pop)                      │
//! └──────┬──────────────────────┬───────────────────────┬───────┘
//!        │                      │                       │
//!        ▼                      ▼                       ▼
//!   ┌──────────┐         ┌─────────────┐        ┌──────────────┐
//!   │  Layout  │         │ BlockDevice │        │ RecoveryStore│
//!   │ (pure)   │         │  (flash)    │        │  (EEPROM)    │
//!   └──────────┘         └─────────────┘        └──────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod layout;
pub mod device;
pub mod state;
pub mod engine;
pub mod shared;
pub mod staging;
pub mod record;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{FlashLogError, Result};
pub use config::{Config, StateChecksum};
pub use engine::{FlashLog, LogStats, PushOutcome, Recovery};
pub use shared::SharedLog;
pub use staging::StagingBuffer;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of flashlog
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
