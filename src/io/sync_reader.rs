//! Synchronous CSV reader with iterator interface
//!
//! Provides a streaming iterator over replay commands from a CSV file.
//! Delegates CSV format concerns to the csv_format module.
//!
//! ```no_run
//! use rust_escrow_ledger::io::sync_reader::SyncReader;
//! use std::path::Path;
//!
//! let reader = SyncReader::new(Path::new("commands.csv")).unwrap();
//! for result in reader {
//!     match result {
//!         Ok(command) => println!("Replaying {}", command.name()),
//!         Err(e) => eprintln!("Error: {}", e),
//!     }
//! }
//! ```
//!
//! # Error Handling
//!
//! - Fatal errors (file not found) are returned from `new()`
//! - Individual record errors are yielded as `Err` items, with line numbers
//!
//! Records are read one at a time; the file is never loaded whole.

use crate::io::csv_format::{convert_csv_record, CsvRecord};
use crate::types::Command;
use csv::{ReaderBuilder, Trim};
use std::fs::File;
use std::path::Path;

#[derive(Debug)]
pub struct SyncReader {
    reader: csv::Reader<File>,
    line_num: usize,
}

impl SyncReader {
    /// Open a replay file
    ///
    /// Whitespace is trimmed from every field and rows may omit trailing
    /// columns.
    ///
    /// # Errors
    ///
    /// A message naming the path if the file cannot be opened.
    pub fn new(path: &Path) -> Result<Self, String> {
        let file = File::open(path)
            .map_err(|e| format!("Failed to open file '{}': {}", path.display(), e))?;

        let reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .buffer_capacity(8 * 1024)
            .from_reader(file);

        Ok(Self {
            reader,
            line_num: 0,
        })
    }
}

impl Iterator for SyncReader {
    type Item = Result<Command, String>;

    /// Next command, or a parse/conversion error tagged with its line
    fn next(&mut self) -> Option<Self::Item> {
        let mut deserializer = self.reader.deserialize::<CsvRecord>();
        let next = deserializer.next()?;
        self.line_num += 1;
        // +1 for the header row
        let line = self.line_num + 1;

        Some(match next {
            Ok(record) => convert_csv_record(record).map_err(|e| format!("Line {}: {}", line, e)),
            Err(e) => Err(format!("Line {}: CSV parse error: {}", line, e)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HEADER: &str =
        "type,user,ref,target,currency,counter,amount,counter_amount,min,max,detail\n";

    fn create_temp_csv(body: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(HEADER.as_bytes())
            .and_then(|_| file.write_all(body.as_bytes()))
            .expect("Failed to write to temp file");
        file.flush().expect("Failed to flush temp file");
        file
    }

    #[test]
    fn test_sync_reader_fails_on_missing_file() {
        let err = SyncReader::new(Path::new("nonexistent.csv")).unwrap_err();
        assert!(err.contains("Failed to open file"));
    }

    #[test]
    fn test_sync_reader_reads_commands_in_order() {
        let file = create_temp_csv(
            "deposit,alice,pix-1,,BRL,,100,,,,\n\
             trade,bob,t1,o1,,,250,,,,\n\
             release,alice,,t1,,,,,,,\n",
        );

        let commands: Vec<Command> = SyncReader::new(file.path())
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(commands.len(), 3);
        assert!(matches!(&commands[0], Command::Deposit { amount, .. } if *amount == dec!(100)));
        assert_eq!(commands[1].name(), "trade");
        assert_eq!(commands[2].name(), "release");
    }

    #[test]
    fn test_sync_reader_accepts_short_rows() {
        let file = create_temp_csv("expire,,,t1\n");
        let commands: Vec<_> = SyncReader::new(file.path()).unwrap().collect();
        assert_eq!(commands.len(), 1);
        assert!(matches!(&commands[0], Ok(Command::Expire { trade }) if trade == "t1"));
    }

    #[test]
    fn test_sync_reader_reports_line_and_continues() {
        let file = create_temp_csv(
            "deposit,alice,pix-1,,BRL,,100,,,,\n\
             deposit,alice,pix-2,,BRL,,lots,,,,\n\
             deposit,alice,pix-3,,BRL,,5,,,,\n",
        );

        let results: Vec<_> = SyncReader::new(file.path()).unwrap().collect();
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        let err = results[1].as_ref().unwrap_err();
        assert!(err.starts_with("Line 3:"), "{}", err);
        assert!(results[2].is_ok());
    }
}
