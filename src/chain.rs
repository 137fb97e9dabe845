//! The append-only block chain: genesis, pending pool, sealing and validation.

use std::collections::{BTreeMap, HashSet};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{IntegrityViolation, LedgerError, Result};
use crate::models::{meets_difficulty, Action, ActionData, Block, Transaction};

pub const GENESIS_CASE_ID: &str = "GENESIS-0";
pub const GENESIS_JUDGE: &str = "Sistema_Judicial";
const UNKNOWN_TYPE: &str = "unknown";

/// One transaction of a case, located in the chain.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub block: u64,
    pub block_hash: String,
    pub block_timestamp: String,
    pub timestamp: String,
    pub action: Action,
    pub data: ActionData,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChainStatistics {
    pub total_blocks: usize,
    pub total_transactions: usize,
    pub unique_cases: usize,
    pub pending_transactions: usize,
    pub case_types: BTreeMap<String, usize>,
    pub difficulty: usize,
}

/// Full snapshot of the chain as handed to external consumers.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChainExport {
    pub chain: Vec<Block>,
    pub pending_transactions: Vec<Transaction>,
    pub difficulty: usize,
}

#[derive(Debug)]
pub struct Chain {
    blocks: Vec<Block>,
    pending: Vec<Transaction>,
    difficulty: usize,
}

impl Chain {
    /// Builds a chain holding only the sealed genesis block.
    pub fn new(difficulty: usize) -> Self {
        let mut chain = Chain {
            blocks: Vec::new(),
            pending: Vec::new(),
            difficulty,
        };
        chain.create_genesis();
        chain
    }

    fn create_genesis(&mut self) {
        let parties = BTreeMap::from([
            ("plaintiff".to_string(), "Sistema".to_string()),
            ("defendant".to_string(), "N/A".to_string()),
        ]);
        let genesis_tx = Transaction::new(
            GENESIS_CASE_ID,
            parties,
            GENESIS_JUDGE,
            ActionData::Genesis {
                description: "Bloque génesis del sistema judicial".to_string(),
            },
        );
        let mut genesis = Block::new(0, vec![genesis_tx], "0");
        genesis.seal(self.difficulty);
        info!("ledger initialised with genesis block {}", genesis.hash());
        self.blocks.push(genesis);
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Never true: the genesis block is always present.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn latest_block(&self) -> &Block {
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn pending(&self) -> &[Transaction] {
        &self.pending
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    /// Changes the difficulty for future seals. Validation always checks
    /// every block against the current value, including older ones.
    pub fn set_difficulty(&mut self, difficulty: usize) {
        self.difficulty = difficulty;
    }

    /// Queues a transaction for the next seal.
    pub fn submit(&mut self, transaction: Transaction) -> Result<()> {
        if transaction.case_id().trim().is_empty() {
            warn!("rejected transaction without case_id");
            return Err(LedgerError::Validation(
                "transaction is missing case_id".to_string(),
            ));
        }
        log::debug!(
            "transaction queued: {} - {}",
            transaction.case_id(),
            transaction.action()
        );
        self.pending.push(transaction);
        Ok(())
    }

    /// Seals every pending transaction into one new block.
    ///
    /// `sealer` is only logged; it is not part of the hashed block.
    pub fn seal_pending(&mut self, sealer: &str) -> Result<&Block> {
        if self.pending.is_empty() {
            return Err(LedgerError::NoPendingTransactions);
        }

        let transactions = std::mem::take(&mut self.pending);
        let mut block = Block::new(
            self.blocks.len() as u64,
            transactions,
            self.latest_block().hash(),
        );
        block.seal(self.difficulty);
        info!(
            "block #{} sealed by {}: {}... (nonce: {}, {} transactions)",
            block.index(),
            sealer,
            &block.hash()[..16],
            block.nonce(),
            block.transactions().len()
        );
        self.blocks.push(block);
        Ok(self.latest_block())
    }

    /// Walks blocks 1.. and reports the first one that fails a check.
    pub fn validate(&self) -> std::result::Result<(), IntegrityViolation> {
        for pair in self.blocks.windows(2) {
            let (previous, current) = (&pair[0], &pair[1]);
            let index = current.index();

            let violation = if current.hash() != current.compute_hash() {
                Some(IntegrityViolation::HashMismatch { index })
            } else if current.previous_hash() != previous.hash() {
                Some(IntegrityViolation::BrokenLink { index })
            } else if !meets_difficulty(current.hash(), self.difficulty) {
                Some(IntegrityViolation::InsufficientWork {
                    index,
                    difficulty: self.difficulty,
                })
            } else {
                None
            };

            if let Some(violation) = violation {
                warn!("chain validation failed: {}", violation);
                return Err(violation);
            }
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Every transaction of `case_id` in chain order. Empty for unknown cases.
    pub fn history(&self, case_id: &str) -> Vec<HistoryEntry> {
        self.blocks
            .iter()
            .flat_map(|block| {
                block
                    .transactions()
                    .iter()
                    .filter(move |tx| tx.case_id() == case_id)
                    .map(move |tx| HistoryEntry {
                        block: block.index(),
                        block_hash: block.hash().to_string(),
                        block_timestamp: block.timestamp().to_string(),
                        timestamp: tx.timestamp().to_string(),
                        action: tx.action(),
                        data: tx.data().clone(),
                    })
            })
            .collect()
    }

    pub fn statistics(&self) -> ChainStatistics {
        let mut cases = HashSet::new();
        let mut case_types = BTreeMap::new();
        let mut total_transactions = 0;

        for tx in self.blocks.iter().flat_map(|b| b.transactions()) {
            total_transactions += 1;
            cases.insert(tx.case_id());
            let key = tx
                .data()
                .case_type()
                .map(|t| t.as_str())
                .unwrap_or(UNKNOWN_TYPE);
            *case_types.entry(key.to_string()).or_insert(0) += 1;
        }

        ChainStatistics {
            total_blocks: self.blocks.len(),
            total_transactions,
            unique_cases: cases.len(),
            pending_transactions: self.pending.len(),
            case_types,
            difficulty: self.difficulty,
        }
    }

    pub fn export(&self) -> ChainExport {
        ChainExport {
            chain: self.blocks.clone(),
            pending_transactions: self.pending.clone(),
            difficulty: self.difficulty,
        }
    }
}
