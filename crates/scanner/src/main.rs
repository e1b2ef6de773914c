//! Scanner binary: prints the address whose balance moved the most over the
//! most recent blocks.

use std::{io, sync::Arc};

use block_delta_domain::services::telemetry::{init_telemetry, TelemetryConfig};
use block_delta_domain::{BalanceChange, ScanConfig};
use block_delta_scanner::{
    run_scan, EtherscanSource, RateLimit, RateLimiter, ScanError, ScanSettings,
};
use clap::Parser;
use tracing::info;

#[derive(Debug, Parser)]
#[command(
    name = "block-delta",
    version,
    about = "Find the address with the largest net balance change in the latest blocks"
)]
struct Cli {
    /// Etherscan API token. Without it requests are throttled to one every
    /// five seconds.
    #[arg(long, env = "ETHERSCAN_API_KEY", hide_env_values = true)]
    token: Option<String>,
}

#[tokio::main]
async fn main() -> io::Result<()> {
    let cli = Cli::parse();

    match bootstrap(cli).await {
        Ok(change) => {
            println!("{change}");
            Ok(())
        }
        Err(err) => {
            eprintln!("[scanner] scan failed: {err}");
            Err(io::Error::other(err.to_string()))
        }
    }
}

async fn bootstrap(cli: Cli) -> Result<BalanceChange, ScanError> {
    let config = ScanConfig::load_from_env()?;
    init_telemetry(&TelemetryConfig::from_env("SCANNER"))?;

    let token = cli.token.filter(|token| !token.trim().is_empty());
    let limit = RateLimit::for_credential(token.is_some());
    info!(
        authenticated = token.is_some(),
        interval_ms = limit.interval().as_millis() as u64,
        "rate limit configured"
    );

    let source = EtherscanSource::new(config.api_url(), token, config.http_timeout())
        .map_err(ScanError::Source)?;
    let limiter = Arc::new(RateLimiter::new(limit));

    run_scan(Arc::new(source), limiter, ScanSettings::from(&config)).await
}
