//! Per-address balance deltas and the max-change selector.

use std::collections::{btree_map, BTreeMap};
use std::fmt;

use num_bigint::BigInt;
use thiserror::Error;

use crate::model::{Address, Block, Transaction};
use crate::quantity::QuantityError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("transaction from {from} carries an invalid value: {source}")]
    InvalidValue {
        from: Address,
        #[source]
        source: QuantityError,
    },
}

/// Net balance change of every address seen in the window.
///
/// Entries are kept in address order so iteration, and therefore tie-breaking
/// in [`Ledger::max_abs_change`], is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    balances: BTreeMap<Address, BigInt>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one transfer. Contract creations are skipped on both sides.
    /// The value is decoded before any entry is touched, so a rejected
    /// transaction leaves the ledger unchanged.
    pub fn apply(&mut self, tx: &Transaction) -> Result<(), LedgerError> {
        let Some(to) = &tx.to else {
            return Ok(());
        };

        let amount = BigInt::from(tx.amount().map_err(|source| LedgerError::InvalidValue {
            from: tx.from.clone(),
            source,
        })?);

        *self.balances.entry(tx.from.clone()).or_default() -= &amount;
        *self.balances.entry(to.clone()).or_default() += &amount;
        Ok(())
    }

    pub fn apply_all<'a, I>(&mut self, transactions: I) -> Result<(), LedgerError>
    where
        I: IntoIterator<Item = &'a Transaction>,
    {
        for tx in transactions {
            self.apply(tx)?;
        }
        Ok(())
    }

    pub fn apply_block(&mut self, block: &Block) -> Result<(), LedgerError> {
        self.apply_all(&block.transactions)
    }

    pub fn balance(&self, address: &Address) -> Option<&BigInt> {
        self.balances.get(address)
    }

    pub fn len(&self) -> usize {
        self.balances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, Address, BigInt> {
        self.balances.iter()
    }

    /// Sum of every delta; zero whenever no contract creation was skipped.
    pub fn net_total(&self) -> BigInt {
        self.balances.values().sum()
    }

    /// Returns the entry with the largest absolute delta, keeping its sign.
    /// Only strictly larger magnitudes replace the current pick, so ties go
    /// to the lexicographically smallest address and all-zero ledgers yield
    /// `None`.
    pub fn max_abs_change(&self) -> Option<BalanceChange> {
        let mut best: Option<(&Address, &BigInt)> = None;
        for (address, delta) in &self.balances {
            let current = best.map(|(_, value)| value.magnitude());
            let beats = match current {
                Some(max) => delta.magnitude() > max,
                None => delta.magnitude().bits() > 0,
            };
            if beats {
                best = Some((address, delta));
            }
        }

        best.map(|(address, delta)| BalanceChange {
            address: Some(address.clone()),
            delta: delta.clone(),
        })
    }

    /// Like [`Ledger::max_abs_change`], but a ledger without any movement
    /// answers with no address and a zero delta.
    pub fn max_change(&self) -> BalanceChange {
        self.max_abs_change().unwrap_or_default()
    }
}

/// The selector's answer: an address and its signed net delta. `address` is
/// `None` when nothing in the window moved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BalanceChange {
    pub address: Option<Address>,
    pub delta: BigInt,
}

impl BalanceChange {
    pub fn address_str(&self) -> &str {
        self.address.as_ref().map(Address::as_str).unwrap_or_default()
    }

    pub fn value(&self) -> String {
        self.delta.to_string()
    }
}

impl fmt::Display for BalanceChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "address: {}\nvalue: {}", self.address_str(), self.delta)
    }
}
