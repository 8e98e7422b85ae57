//! Synchronous processing strategy
//!
//! Single-threaded replay: commands are streamed from a `SyncReader` and
//! applied to one `EscrowEngine` in file order, then the balance table is
//! written with `csv_format::write_balances_csv`.
//!
//! Memory use is bounded by the engine state (balances, journal, offers and
//! trades), never by the size of the input file.

use crate::io::csv_format::write_balances_csv;
use crate::io::sync_reader::SyncReader;
use crate::strategy::{log_rejection, EngineSettings, ProcessingStrategy};
use std::io::Write;
use std::path::Path;

/// Synchronous processing strategy
///
/// # Examples
///
/// ```no_run
/// use rust_escrow_ledger::strategy::{EngineSettings, ProcessingStrategy, SyncProcessingStrategy};
/// use std::path::Path;
/// use std::io;
///
/// let strategy = SyncProcessingStrategy::new(EngineSettings::default());
/// let mut output = io::stdout();
///
/// strategy.process(Path::new("commands.csv"), &mut output)
///     .expect("Processing failed");
/// ```
#[derive(Debug, Clone, Default)]
pub struct SyncProcessingStrategy {
    settings: EngineSettings,
}

impl SyncProcessingStrategy {
    pub fn new(settings: EngineSettings) -> Self {
        Self { settings }
    }
}

impl ProcessingStrategy for SyncProcessingStrategy {
    fn process(&self, input_path: &Path, output: &mut dyn Write) -> Result<(), String> {
        let engine = self.settings.build();
        let reader = SyncReader::new(input_path)?;

        let (mut applied, mut rejected) = (0usize, 0usize);
        for result in reader {
            match result {
                Ok(command) => {
                    let name = command.name();
                    match engine.process(command) {
                        Ok(()) => applied += 1,
                        Err(e) => {
                            rejected += 1;
                            log_rejection(name, &e);
                        }
                    }
                }
                Err(e) => {
                    rejected += 1;
                    tracing::warn!(error = %e, "CSV parsing error");
                }
            }
        }
        tracing::info!(applied, rejected, "sync replay finished");

        write_balances_csv(&engine.balances(), output)
    }
}
