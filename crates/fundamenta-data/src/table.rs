//! CSV I/O for the wide tables handed between pipeline stages.

use crate::error::Result;
use polars::prelude::*;
use std::fs::File;
use std::path::Path;

/// Read a CSV table with a header row; column types are inferred.
///
/// # Errors
/// Returns IO or parse errors.
pub fn read_table(path: impl AsRef<Path>) -> Result<DataFrame> {
    let path = path.as_ref();
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;
    tracing::debug!(path = %path.display(), rows = df.height(), columns = df.width(), "read table");
    Ok(df)
}

/// Write `df` as CSV with a header row, creating parent directories.
///
/// # Errors
/// Returns IO or serialization errors.
pub fn write_table(df: &mut DataFrame, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file).include_header(true).finish(df)?;
    tracing::debug!(path = %path.display(), rows = df.height(), columns = df.width(), "wrote table");
    Ok(())
}
