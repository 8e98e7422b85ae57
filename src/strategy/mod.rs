//! Processing strategy module for command replay
//!
//! This module defines the Strategy pattern for complete replay pipelines,
//! covering both CSV parsing and engine processing. Different implementations
//! (synchronous, asynchronous batch) can be selected at runtime.

use crate::cli::StrategyType;
use crate::core::config::EngineConfig;
use crate::core::engine::EscrowEngine;
use crate::core::external::StaticPriceFeed;
use crate::core::traits::PriceFeed;
use crate::types::LedgerError;
use std::fmt;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

pub mod r#async;
pub mod sync;

pub use self::r#async::{AsyncProcessingStrategy, BatchConfig};
pub use sync::SyncProcessingStrategy;

/// Processing strategy trait for complete replay pipelines
///
/// Each strategy reads commands from a CSV file, applies them to a fresh
/// engine and writes the final balances to output.
pub trait ProcessingStrategy: Send + Sync {
    /// Replay commands from `input_path` and write balances to `output`
    ///
    /// # Arguments
    ///
    /// * `input_path` - Path to the input CSV file of commands
    /// * `output` - Writer receiving the balance CSV
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The input file cannot be opened
    /// - A fatal I/O error occurs during reading or writing
    ///
    /// Rejected or malformed commands are logged and skipped; they never
    /// cause this method to fail.
    fn process(&self, input_path: &Path, output: &mut dyn Write) -> Result<(), String>;
}

/// What every replay engine is built from
#[derive(Clone)]
pub struct EngineSettings {
    pub config: EngineConfig,
    pub prices: Arc<dyn PriceFeed>,
}

impl EngineSettings {
    pub fn new(config: EngineConfig, prices: Arc<dyn PriceFeed>) -> Self {
        Self { config, prices }
    }

    /// Fresh in-memory engine for one replay
    pub fn build(&self) -> EscrowEngine {
        EscrowEngine::in_memory(self.config, Arc::clone(&self.prices))
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::new(EngineConfig::default(), Arc::new(StaticPriceFeed::new()))
    }
}

impl fmt::Debug for EngineSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineSettings")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Log a rejected command at a level matching its severity
pub(crate) fn log_rejection(command: &str, error: &LedgerError) {
    if error.is_fatal() {
        tracing::error!(alert = true, command, error = %error, "invariant violated during replay");
    } else {
        tracing::warn!(command, error = %error, "command rejected");
    }
}

/// Create a processing strategy based on the specified strategy type
///
/// # Arguments
///
/// * `strategy_type` - The type of processing strategy to create (Sync or Async)
/// * `config` - Optional batch configuration (ignored for sync)
/// * `settings` - Engine configuration and price feed for the replay
///
/// # Returns
///
/// A boxed trait object implementing the ProcessingStrategy trait
pub fn create_strategy(
    strategy_type: StrategyType,
    config: Option<BatchConfig>,
    settings: EngineSettings,
) -> Box<dyn ProcessingStrategy> {
    match strategy_type {
        StrategyType::Sync => Box::new(SyncProcessingStrategy::new(settings)),
        StrategyType::Async => {
            let config = config.unwrap_or_default();
            Box::new(AsyncProcessingStrategy::new(config, settings))
        }
    }
}
