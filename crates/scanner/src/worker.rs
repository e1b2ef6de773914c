use std::{collections::BTreeSet, sync::Arc};

use metrics::{counter, gauge};
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinSet, time::sleep};
use tracing::{debug, info, warn};

use block_delta_domain::{
    config::ConfigError, services::telemetry::TelemetryError, BalanceChange, Block, BlockHeight,
    Ledger, RetryPolicy, ScanConfig,
};

use crate::{
    limiter::RateLimiter,
    pipeline::{AggregationError, Aggregator},
    queue::{window_heights, QueueError, WorkQueue},
    rpc::{BlockSource, FetchError},
};

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("failed to build block source: {0}")]
    Source(#[source] FetchError),
    #[error("failed to query chain tip: {0}")]
    ChainTip(#[source] FetchError),
    #[error("aggregation failed: {0}")]
    Aggregation(#[from] AggregationError),
    #[error("block {height} failed {failures} times, giving up: {source}")]
    RetriesExhausted {
        height: BlockHeight,
        failures: u32,
        #[source]
        source: FetchError,
    },
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
    #[error("fetch workers stopped after {received} of {expected} blocks")]
    PipelineClosed { received: usize, expected: usize },
}

/// Shape of one scan run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSettings {
    pub window: usize,
    pub workers: usize,
    pub retry: RetryPolicy,
    pub channel_capacity: usize,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self::from(&ScanConfig::default())
    }
}

impl From<&ScanConfig> for ScanSettings {
    fn from(config: &ScanConfig) -> Self {
        Self {
            window: config.window(),
            workers: config.workers(),
            retry: config.retry(),
            channel_capacity: config.channel_capacity(),
        }
    }
}

/// Everything learned from one window.
#[derive(Debug)]
pub struct ScanReport {
    pub tip: BlockHeight,
    pub heights: BTreeSet<BlockHeight>,
    pub ledger: Ledger,
}

impl ScanReport {
    pub fn max_change(&self) -> BalanceChange {
        self.ledger.max_change()
    }
}

type WorkerMessage = Result<Block, ScanError>;

/// Scans the window ending at the current tip and selects the address with
/// the largest absolute balance change.
pub async fn run_scan<S>(
    source: Arc<S>,
    limiter: Arc<RateLimiter>,
    settings: ScanSettings,
) -> Result<BalanceChange, ScanError>
where
    S: BlockSource + ?Sized + 'static,
{
    let report = scan_window(source, limiter, settings).await?;
    let change = report.max_change();
    match &change.address {
        Some(address) => info!(
            %address,
            delta = %change.delta,
            ledger_entries = report.ledger.len(),
            "largest balance change selected"
        ),
        None => warn!(
            lowest = report.heights.first().copied().unwrap_or(report.tip),
            highest = report.tip,
            "no address changed balance in the window"
        ),
    }
    Ok(change)
}

/// Fetches the `settings.window` most recent blocks with a pool of workers
/// and folds them into a ledger. Fails fast if the tip cannot be read.
pub async fn scan_window<S>(
    source: Arc<S>,
    limiter: Arc<RateLimiter>,
    settings: ScanSettings,
) -> Result<ScanReport, ScanError>
where
    S: BlockSource + ?Sized + 'static,
{
    limiter.acquire().await;
    let tip = source.latest_height().await.map_err(ScanError::ChainTip)?;
    gauge!("scanner_tip_height").set(tip as f64);

    let heights = window_heights(tip, settings.window);
    info!(
        tip,
        blocks = heights.len(),
        workers = settings.workers,
        "scanning most recent blocks"
    );

    let queue = Arc::new(WorkQueue::seeded(&heights));
    gauge!("scanner_queue_depth").set(queue.len() as f64);
    let (sender, mut receiver) = mpsc::channel::<WorkerMessage>(settings.channel_capacity.max(1));

    let mut workers = JoinSet::new();
    for worker in 0..settings.workers {
        workers.spawn(fetch_worker(
            worker,
            Arc::clone(&source),
            Arc::clone(&limiter),
            Arc::clone(&queue),
            settings.retry,
            sender.clone(),
        ));
    }
    drop(sender);

    let mut aggregator = Aggregator::new(heights.len());
    let outcome = aggregate(&mut aggregator, &mut receiver).await;
    if outcome.is_err() {
        workers.abort_all();
    }
    drop(receiver);

    while let Some(joined) = workers.join_next().await {
        if let Err(err) = joined {
            if err.is_panic() {
                warn!(?err, "fetch worker panicked");
            }
        }
    }
    outcome?;

    let (ledger, heights) = aggregator.into_parts();
    Ok(ScanReport {
        tip,
        heights,
        ledger,
    })
}

async fn aggregate(
    aggregator: &mut Aggregator,
    receiver: &mut mpsc::Receiver<WorkerMessage>,
) -> Result<(), ScanError> {
    while !aggregator.is_complete() {
        match receiver.recv().await {
            Some(Ok(block)) => aggregator.ingest(&block)?,
            Some(Err(err)) => return Err(err),
            None => {
                return Err(ScanError::PipelineClosed {
                    received: aggregator.received(),
                    expected: aggregator.expected(),
                })
            }
        }
    }
    Ok(())
}

async fn fetch_worker<S>(
    worker: usize,
    source: Arc<S>,
    limiter: Arc<RateLimiter>,
    queue: Arc<WorkQueue>,
    retry: RetryPolicy,
    output: mpsc::Sender<WorkerMessage>,
) where
    S: BlockSource + ?Sized,
{
    debug!(worker, "fetch worker started");

    while let Some(item) = queue.try_pop() {
        gauge!("scanner_queue_depth").set(queue.len() as f64);
        limiter.acquire().await;

        match source.block(item.height).await {
            Ok(block) => {
                counter!("scanner_fetch_total", "result" => "ok").increment(1);
                info!(
                    worker,
                    height = item.height,
                    transactions = block.transactions.len(),
                    "fetched block"
                );
                if output.send(Ok(block)).await.is_err() {
                    return;
                }
            }
            Err(err) => {
                let kind: &'static str = err.kind().into();
                counter!("scanner_fetch_total", "result" => "error", "kind" => kind).increment(1);
                let failed = item.failed();
                warn!(
                    worker,
                    height = item.height,
                    failures = failed.failures,
                    kind,
                    error = %err,
                    "block fetch failed"
                );

                if !retry.allows_retry(failed.failures) {
                    let _ = output
                        .send(Err(ScanError::RetriesExhausted {
                            height: failed.height,
                            failures: failed.failures,
                            source: err,
                        }))
                        .await;
                    return;
                }

                counter!("scanner_retries_total").increment(1);
                if !retry.backoff.is_zero() {
                    sleep(retry.backoff).await;
                }
                if let Err(err) = queue.push(failed) {
                    let _ = output.send(Err(err.into())).await;
                    return;
                }
            }
        }
    }

    debug!(worker, "work queue drained, fetch worker exiting");
}
