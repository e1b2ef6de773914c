//! Block and transaction data shared by the source adapter and the ledger.

use std::fmt;

use num_bigint::BigUint;

use crate::quantity::{parse_quantity, QuantityError};

/// Height of a block on the chain.
pub type BlockHeight = u64;

/// Account identifier, canonicalised to lowercase so that mixed-case
/// checksummed forms land on the same ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(String);

impl Address {
    pub fn new(value: impl Into<String>) -> Self {
        let mut owned = value.into();
        owned.make_ascii_lowercase();
        Self(owned)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Self::new(value.to_owned())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single value transfer as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub from: Address,
    /// `None` for contract creation.
    pub to: Option<Address>,
    /// Hex quantity exactly as reported; decoded when the ledger applies it.
    pub value: String,
}

impl Transaction {
    pub fn new(from: impl Into<Address>, to: Option<Address>, value: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to,
            value: value.into(),
        }
    }

    pub fn is_contract_creation(&self) -> bool {
        self.to.is_none()
    }

    pub fn amount(&self) -> Result<BigUint, QuantityError> {
        parse_quantity(&self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub height: BlockHeight,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn new(height: BlockHeight, transactions: Vec<Transaction>) -> Self {
        Self {
            height,
            transactions,
        }
    }
}
