use crate::core::config::EngineConfig;
use crate::core::external::StaticPriceFeed;
use crate::strategy::{BatchConfig, EngineSettings};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;

/// Replay ledger and escrow commands and print the resulting balances
#[derive(Parser, Debug)]
#[command(name = "escrow-ledger")]
#[command(about = "Replay ledger and escrow commands from a CSV file", long_about = None)]
pub struct CliArgs {
    /// Input CSV file path containing commands
    #[arg(value_name = "INPUT", help = "Path to the input CSV file")]
    pub input_file: PathBuf,

    #[arg(
        long = "strategy",
        value_name = "STRATEGY",
        default_value = "async",
        help = "Replay strategy: 'sync' for sequential or 'async' for partitioned batches"
    )]
    pub strategy: StrategyType,

    /// Number of commands per batch (async mode only)
    #[arg(
        long = "batch-size",
        value_name = "SIZE",
        help = "Number of commands per batch (default: 1000)"
    )]
    pub batch_size: Option<usize>,

    /// Worker threads (async mode only)
    #[arg(
        long = "max-concurrent",
        value_name = "COUNT",
        help = "Worker threads for batch processing (default: CPU cores)"
    )]
    pub max_concurrent_batches: Option<usize>,

    #[arg(
        long = "trade-window-mins",
        value_name = "MINUTES",
        help = "Minutes a P2P trade stays open before it can expire (default: 120)"
    )]
    pub trade_window_mins: Option<i64>,

    #[arg(
        long = "offer-ttl-mins",
        value_name = "MINUTES",
        help = "Default lifetime of a P2P offer in minutes (default: 1440)"
    )]
    pub offer_ttl_mins: Option<i64>,

    /// Static quotes for orders, e.g. `--price BTC/BRL=200000`
    #[arg(long = "price", value_name = "BASE/QUOTE=PRICE")]
    pub prices: Vec<String>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "warn")]
    pub log_level: String,
}

/// Available replay strategies
#[derive(Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum StrategyType {
    Sync,
    Async,
}

impl CliArgs {
    /// Create a BatchConfig from CLI arguments
    ///
    /// Missing values take the defaults; zero values are replaced with a
    /// warning by [`BatchConfig::new`].
    pub fn to_batch_config(&self) -> BatchConfig {
        if self.batch_size.is_some() || self.max_concurrent_batches.is_some() {
            let default = BatchConfig::default();
            BatchConfig::new(
                self.batch_size.unwrap_or(default.batch_size),
                self.max_concurrent_batches
                    .unwrap_or(default.max_concurrent_batches),
            )
        } else {
            BatchConfig::default()
        }
    }

    /// Engine configuration with any overridden windows applied
    ///
    /// # Errors
    ///
    /// A message if a window is not a positive number of minutes.
    pub fn to_engine_config(&self) -> Result<EngineConfig, String> {
        let mut config = EngineConfig::default();
        if let Some(minutes) = self.trade_window_mins {
            config = config.with_trade_window_mins(positive("--trade-window-mins", minutes)?);
        }
        if let Some(minutes) = self.offer_ttl_mins {
            config = config.with_offer_ttl_mins(positive("--offer-ttl-mins", minutes)?);
        }
        Ok(config)
    }

    /// Engine settings: configuration plus a price feed seeded from `--price`
    ///
    /// # Errors
    ///
    /// A message for an invalid window or a malformed quote.
    pub fn to_engine_settings(&self) -> Result<EngineSettings, String> {
        let feed = StaticPriceFeed::new();
        for quote in &self.prices {
            let (base, counter, price) = StaticPriceFeed::parse_quote(quote)
                .map_err(|e| format!("Invalid --price '{}': {}", quote, e))?;
            feed.set(base, counter, price);
        }
        Ok(EngineSettings::new(self.to_engine_config()?, Arc::new(feed)))
    }
}

fn positive(flag: &str, minutes: i64) -> Result<i64, String> {
    if minutes > 0 {
        Ok(minutes)
    } else {
        Err(format!("{} must be positive, got {}", flag, minutes))
    }
}
