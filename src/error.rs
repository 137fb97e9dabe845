//! Error types for ledger operations.

use thiserror::Error;

/// Failures a domain operation can report. None of them leave the ledger changed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// A required field is missing or invalid.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The referenced case has never been created.
    #[error("case not found: {0}")]
    CaseNotFound(String),

    /// A seal was requested with nothing pending.
    #[error("no pending transactions to seal")]
    NoPendingTransactions,
}

/// First block that fails chain validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntegrityViolation {
    /// Stored hash differs from the recomputed one.
    #[error("invalid hash in block #{index}")]
    HashMismatch { index: u64 },

    /// `previous_hash` does not match the predecessor's hash.
    #[error("broken link between blocks #{} and #{index}", .index.saturating_sub(1))]
    BrokenLink { index: u64 },

    /// Hash lacks the required leading zeros.
    #[error("invalid proof of work in block #{index} (difficulty {difficulty})")]
    InsufficientWork { index: u64, difficulty: usize },
}

impl IntegrityViolation {
    pub fn index(&self) -> u64 {
        match self {
            IntegrityViolation::HashMismatch { index }
            | IntegrityViolation::BrokenLink { index }
            | IntegrityViolation::InsufficientWork { index, .. } => *index,
        }
    }
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
