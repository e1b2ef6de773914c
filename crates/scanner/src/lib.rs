//! Library entrypoint for the block scanner: the block source abstraction
//! and its Etherscan adapter, the shared rate limiter, the work queue, the
//! fetch worker pool, and the aggregator that feeds the balance ledger.
//! `main.rs` wires these together behind a small CLI.

pub mod limiter;
pub mod pipeline;
pub mod queue;
pub mod rpc;
pub mod worker;


pub use limiter::{RateLimit, RateLimiter};
pub use pipeline::{AggregationError, Aggregator};
pub use queue::{window_heights, QueueError, WorkItem, WorkQueue};
pub use rpc::{BlockSource, EtherscanSource, FetchError, FetchErrorKind};
pub use worker::{run_scan, scan_window, ScanError, ScanReport, ScanSettings};
