//! Tamper-evident ledger of judicial case actions.
//!
//! [`chain::Chain`] holds the proof-of-work sealed blocks; [`court::CaseLedger`]
//! turns case operations into transactions and keeps a per-case cache;
//! [`api`] exposes the ledger over HTTP.

pub mod api;
pub mod chain;
pub mod config;
pub mod court;
pub mod error;
pub mod models;

pub use chain::{Chain, ChainExport, ChainStatistics, HistoryEntry};
pub use court::{CaseLedger, CaseRecord, SharedLedger};
pub use error::{IntegrityViolation, LedgerError, Result};
pub use models::{Action, ActionData, Block, CaseStatus, CaseType, Transaction};
