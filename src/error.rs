// 🚨 Ledger Errors - One taxonomy for the whole core
// Validation errors are recoverable (re-prompt), EmptyLedger is reported,
// persistence errors leave the in-memory ledger intact.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    // ========================================================================
    // VALIDATION (boundary checks before an Entry exists)
    // ========================================================================
    #[error("Invalid input '{input}'. Please enter a numeric value for the amount.")]
    InvalidAmount { input: String },

    #[error("Expense amount cannot be negative (got {amount}).")]
    NegativeAmount { amount: String },

    #[error("Expense category cannot be empty.")]
    EmptyCategory,

    #[error("Partition count must be at least 1.")]
    InvalidPartitionCount,

    // ========================================================================
    // AGGREGATION
    // ========================================================================
    #[error("No expenses recorded. Please add expenses before calculating the total.")]
    EmptyLedger,

    #[error("Total overflowed the decimal range in partition {partition}.")]
    AmountOverflow { partition: usize },

    // ========================================================================
    // PERSISTENCE
    // ========================================================================
    #[error("Unable to open {}: {source}", path.display())]
    SinkOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Unable to read {}: {source}", path.display())]
    SourceRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Write failed after {written} entries: {source}")]
    SinkWrite {
        written: usize,
        #[source]
        source: io::Error,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Persistence task '{0}' panicked before finishing.")]
    TaskPanicked(String),

    // ========================================================================
    // RESOURCES (unrecoverable, propagated to the top-level caller)
    // ========================================================================
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[source] io::Error),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

impl LedgerError {
    /// Malformed user input; the caller should re-prompt.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            LedgerError::InvalidAmount { .. }
                | LedgerError::NegativeAmount { .. }
                | LedgerError::EmptyCategory
                | LedgerError::InvalidPartitionCount
        )
    }

    /// Sink could not be opened or written. The ledger is untouched.
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            LedgerError::SinkOpen { .. }
                | LedgerError::SourceRead { .. }
                | LedgerError::SinkWrite { .. }
                | LedgerError::Storage(_)
                | LedgerError::TaskPanicked(_)
        )
    }

    /// OS resources ran out. Front ends must hand this to their caller
    /// instead of reporting it and carrying on.
    pub fn is_resource(&self) -> bool {
        matches!(self, LedgerError::Spawn(_))
    }
}
