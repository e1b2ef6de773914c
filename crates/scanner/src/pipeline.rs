use std::collections::BTreeSet;

use block_delta_domain::{Block, BlockHeight, Ledger, LedgerError};
use metrics::counter;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("block {0} was delivered twice")]
    DuplicateHeight(BlockHeight),
    #[error("block {height} could not be applied: {source}")]
    Ledger {
        height: BlockHeight,
        #[source]
        source: LedgerError,
    },
}

/// Folds fetched blocks into a [`Ledger`]. Owned by the driver task alone,
/// so it needs no synchronisation.
#[derive(Debug)]
pub struct Aggregator {
    ledger: Ledger,
    applied: BTreeSet<BlockHeight>,
    expected: usize,
}

impl Aggregator {
    pub fn new(expected: usize) -> Self {
        Self {
            ledger: Ledger::new(),
            applied: BTreeSet::new(),
            expected,
        }
    }

    pub fn ingest(&mut self, block: &Block) -> Result<(), AggregationError> {
        if !self.applied.insert(block.height) {
            return Err(AggregationError::DuplicateHeight(block.height));
        }

        self.ledger
            .apply_block(block)
            .map_err(|source| AggregationError::Ledger {
                height: block.height,
                source,
            })?;

        counter!("scanner_blocks_aggregated_total").increment(1);
        debug!(
            height = block.height,
            transactions = block.transactions.len(),
            remaining = self.remaining(),
            "block aggregated"
        );
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.applied.len() >= self.expected
    }

    pub fn remaining(&self) -> usize {
        self.expected.saturating_sub(self.applied.len())
    }

    pub fn received(&self) -> usize {
        self.applied.len()
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn into_parts(self) -> (Ledger, BTreeSet<BlockHeight>) {
        (self.ledger, self.applied)
    }
}
