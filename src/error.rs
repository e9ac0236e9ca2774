//! Error types for flashlog
//!
//! Provides a unified error type for all operations.
//!
//! Recovery inconsistencies and capacity pressure are not errors: the engine
//! resets or evicts and keeps going. What remains here are failures the log
//! cannot make progress through.

use thiserror::Error;

/// Result type alias using FlashLogError
pub type Result<T> = std::result::Result<T, FlashLogError>;

/// Unified error type for flashlog operations
#[derive(Debug, Error)]
pub enum FlashLogError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Device Errors
    // -------------------------------------------------------------------------
    /// The block device rejected an operation (range, page straddle, program
    /// over non-erased bytes, ...)
    #[error("Device error: {0}")]
    Device(String),

    /// The recovery word store failed
    #[error("Recovery state error: {0}")]
    State(String),

    // -------------------------------------------------------------------------
    // Record Errors
    // -------------------------------------------------------------------------
    #[error("Record size mismatch: expected {expected} bytes, got {actual}")]
    RecordSize { expected: usize, actual: usize },

    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for FlashLogError {
    fn from(err: bincode::Error) -> Self {
        FlashLogError::Serialization(err.to_string())
    }
}
