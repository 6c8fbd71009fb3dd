//! Crate-wide error type (§7 "Error handling design").

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Every fallible operation in this crate returns one of these kinds.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("channel closed")]
    ChannelClosed,

    #[error("step timed out after {elapsed_ms}ms (budget {budget_ms}ms)")]
    StepTimeout { elapsed_ms: u64, budget_ms: u64 },

    #[error("storage I/O error: {0}")]
    StorageIo(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("CRC mismatch: expected {expected:#x}, found {found:#x}")]
    CrcMismatch { expected: u32, found: u32 },

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("operation cancelled")]
    Cancelled,
}
