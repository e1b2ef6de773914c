//! Domain-level building blocks shared by the scanner library and binary.
//!
//! Everything in here is free of I/O: block and transaction models, the
//! canonical hex quantity decoder, the balance ledger with its selector, plus
//! the environment-driven configuration and telemetry wiring the binary boots
//! with.

pub mod config;
pub mod ledger;
pub mod model;
pub mod quantity;
pub mod services;

pub use config::{ConfigError, RetryPolicy, ScanConfig};
pub use ledger::{BalanceChange, Ledger, LedgerError};
pub use model::{Address, Block, BlockHeight, Transaction};
pub use quantity::{parse_height, parse_quantity, QuantityError};
