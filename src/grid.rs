//! # Spreadsheet Sources
//!
//! The ingestion path consumes a [`SpreadsheetGrid`] and does not care how it
//! was produced. [`GridSource`] is the seam: anything that can turn an
//! uploaded file into a header row plus data rows.
//!
//! [`CsvGridSource`] is the bundled implementation, built on the `csv` crate.
//! Header cells stay text verbatim; data cells go through
//! [`Value::from_cell`], so numbers become integers or reals and empty cells
//! become nulls.

use std::fs::File;
use std::io;
use std::path::Path;

use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{SpreadsheetGrid, Value};

/// Produces a grid from an uploaded spreadsheet file.
///
/// # Rust Pattern: Trait at the Collaborator Seam
///
/// The engine only holds a `&dyn GridSource`, so tests and other file formats
/// plug in without touching ingestion.
pub trait GridSource: Send + Sync {
    fn read_grid(&self, path: &Path) -> Result<SpreadsheetGrid>;
}

/// Reads delimited text files.
#[derive(Debug, Clone, Copy)]
pub struct CsvGridSource {
    delimiter: u8,
}

impl Default for CsvGridSource {
    fn default() -> Self {
        Self { delimiter: b',' }
    }
}

impl CsvGridSource {
    pub fn with_delimiter(delimiter: u8) -> Self {
        Self { delimiter }
    }

    /// Parses CSV from any reader. Row 0 is the header.
    pub fn parse<R: io::Read>(&self, reader: R) -> Result<SpreadsheetGrid> {
        let mut csv = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(self.delimiter)
            .from_reader(reader);

        let mut rows = Vec::new();
        for (i, record) in csv.records().enumerate() {
            let record = record.map_err(|e| Error::Grid(format!("row {i}: {e}")))?;
            let row = if i == 0 {
                record.iter().map(|cell| Value::from(cell.trim())).collect()
            } else {
                record.iter().map(Value::from_cell).collect()
            };
            rows.push(row);
        }

        if rows.is_empty() {
            return Err(Error::Grid("spreadsheet is empty".to_string()));
        }
        Ok(SpreadsheetGrid::new(rows))
    }
}

impl GridSource for CsvGridSource {
    fn read_grid(&self, path: &Path) -> Result<SpreadsheetGrid> {
        let file = File::open(path)
            .map_err(|e| Error::Grid(format!("cannot open {}: {e}", path.display())))?;
        let grid = self.parse(io::BufReader::new(file))?;
        debug!(path = %path.display(), rows = grid.data_len(), "spreadsheet loaded");
        Ok(grid)
    }
}

// =============================================================================
// Tests
// =============================================================================
