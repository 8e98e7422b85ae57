//! Asynchronous batch processing strategy
//!
//! # Architecture
//!
//! ```text
//! AsyncProcessingStrategy
//!     ├── BatchConfig (batch_size, max_concurrent_batches)
//!     ├── AsyncReader (batch CSV reading)
//!     ├── BatchProcessor (conflict partitioning + tokio tasks)
//!     └── EscrowEngine (shared, DashMap + row-locked store)
//! ```
//!
//! Batches are processed one after another so a command never overtakes an
//! earlier command from a previous batch. Inside a batch, groups of commands
//! with no shared user, offer or trade run concurrently on the multi-thread
//! runtime.

use crate::core::batch_processor::BatchProcessor;
use crate::io::async_reader::AsyncReader;
use crate::io::csv_format::write_balances_csv;
use crate::strategy::{log_rejection, EngineSettings, ProcessingStrategy};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

/// Configuration for batch processing
#[derive(Clone, Debug)]
pub struct BatchConfig {
    /// Number of commands per batch
    pub batch_size: usize,
    /// Worker threads for the runtime
    pub max_concurrent_batches: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            max_concurrent_batches: num_cpus::get(),
        }
    }
}

impl BatchConfig {
    /// Create a new BatchConfig; zero values fall back to the defaults
    pub fn new(batch_size: usize, max_concurrent_batches: usize) -> Self {
        let default = Self::default();

        let batch_size = if batch_size == 0 {
            tracing::warn!(
                "Invalid batch_size ({}), using default ({})",
                batch_size,
                default.batch_size
            );
            default.batch_size
        } else {
            batch_size
        };

        let max_concurrent_batches = if max_concurrent_batches == 0 {
            tracing::warn!(
                "Invalid max_concurrent_batches ({}), using default ({})",
                max_concurrent_batches,
                default.max_concurrent_batches
            );
            default.max_concurrent_batches
        } else {
            max_concurrent_batches
        };

        Self {
            batch_size,
            max_concurrent_batches,
        }
    }
}

/// Asynchronous batch processing strategy
///
/// Produces the same balances as [`super::SyncProcessingStrategy`] for any
/// input: only commands with nothing in common are reordered.
#[derive(Debug, Clone)]
pub struct AsyncProcessingStrategy {
    config: BatchConfig,
    settings: EngineSettings,
}

impl AsyncProcessingStrategy {
    /// # Arguments
    ///
    /// * `config` - BatchConfig with batch_size and max_concurrent_batches
    /// * `settings` - Engine configuration and price feed
    pub fn new(config: BatchConfig, settings: EngineSettings) -> Self {
        Self { config, settings }
    }
}

impl ProcessingStrategy for AsyncProcessingStrategy {
    /// Replay the file batch by batch on a tokio multi-thread runtime
    ///
    /// # Errors
    ///
    /// Runtime construction failure, an unreadable input file, or a failed
    /// write of the balance table.
    fn process(&self, input_path: &Path, output: &mut dyn Write) -> Result<(), String> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.config.max_concurrent_batches)
            .build()
            .map_err(|e| format!("Failed to create tokio runtime: {}", e))?;

        runtime.block_on(async {
            let engine = Arc::new(self.settings.build());
            let processor = BatchProcessor::new(Arc::clone(&engine));

            let file = tokio::fs::File::open(input_path)
                .await
                .map_err(|e| format!("Failed to open file '{}': {}", input_path.display(), e))?;
            let compat_file = tokio_util::compat::TokioAsyncReadCompatExt::compat(file);
            let mut reader = AsyncReader::new(compat_file);

            let (mut batches, mut rejected) = (0usize, 0usize);
            loop {
                let batch = reader.read_batch(self.config.batch_size).await;
                if batch.is_empty() {
                    break;
                }
                batches += 1;

                for outcome in processor.process_batch(batch).await {
                    if let Err(e) = &outcome.result {
                        rejected += 1;
                        log_rejection(outcome.command.name(), e);
                    }
                }
            }
            tracing::info!(batches, rejected, "async replay finished");

            write_balances_csv(&engine.balances(), output)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::SyncProcessingStrategy;
    use rstest::rstest;
    use tempfile::NamedTempFile;

    const HEADER: &str =
        "type,user,ref,target,currency,counter,amount,counter_amount,min,max,detail\n";

    fn create_temp_csv(body: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        write!(file, "{}{}", HEADER, body).expect("Failed to write to temp file");
        file.flush().expect("Failed to flush temp file");
        file
    }

    fn replay(strategy: &dyn ProcessingStrategy, file: &NamedTempFile) -> String {
        let mut output = Vec::new();
        strategy.process(file.path(), &mut output).unwrap();
        String::from_utf8(output).unwrap()
    }

    #[rstest]
    #[case::zero_batch(0, 4, 1000, 4)]
    #[case::zero_workers(10, 0, 10, num_cpus::get())]
    #[case::custom(10, 4, 10, 4)]
    fn test_batch_config_new(
        #[case] batch_size: usize,
        #[case] workers: usize,
        #[case] expected_batch: usize,
        #[case] expected_workers: usize,
    ) {
        let config = BatchConfig::new(batch_size, workers);
        assert_eq!(config.batch_size, expected_batch);
        assert_eq!(config.max_concurrent_batches, expected_workers);
    }

    #[test]
    fn test_async_strategy_handles_missing_file() {
        let strategy =
            AsyncProcessingStrategy::new(BatchConfig::default(), EngineSettings::default());
        let mut output = Vec::new();

        let result = strategy.process(Path::new("nonexistent.csv"), &mut output);
        assert!(result.unwrap_err().contains("Failed to open file"));
    }

    #[rstest]
    #[case::one_per_batch(1)]
    #[case::split_trade(3)]
    #[case::single_batch(100)]
    fn test_async_strategy_matches_sync(#[case] batch_size: usize) {
        // The trade spans batches for small sizes; its later steps must still
        // see the earlier ones
        let file = create_temp_csv(
            "deposit,seller,d1,,BTC,,1,,,,\n\
             deposit,buyer,d2,,BRL,,1000,,,,\n\
             deposit,carol,d3,,BRL,,170,,,,\n\
             offer,seller,o1,,BTC,BRL,0.1,1000,100,1000,sell\n\
             withdraw,carol,,,BRL,,20,,,,\n\
             trade,buyer,t1,o1,,,500,,,,\n\
             trade,carol,t2,o1,,,100,,,,\n\
             confirm,buyer,,t1,,,,,,,\n\
             withdraw,carol,,,BRL,,100,,,,\n\
             release,seller,,t1,,,,,,,\n\
             cancel,,,t2,,,,,,,admin\n",
        );

        let expected = replay(&SyncProcessingStrategy::default(), &file);
        let strategy =
            AsyncProcessingStrategy::new(
                BatchConfig::new(batch_size, 4),
                EngineSettings::default(),
            );
        assert_eq!(replay(&strategy, &file), expected);
        assert!(expected.contains("carol,BRL,150,0,150\n"), "{}", expected);
        assert!(expected.contains("buyer,BTC,0.05,0,0.05\n"), "{}", expected);
    }
}
