use std::fs;
use std::io::{self, Write};
use std::path::Path;

use csv::WriterBuilder;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::domain::{GLOBALS_COLUMNS, GlobalDenominatorRow, OutputRow, WORKS_COLUMNS};
use crate::error::HarvestError;
use crate::harvest::AuthorFailure;

#[derive(Debug, Clone, Serialize)]
pub struct HarvestSummary {
    pub authors_attempted: usize,
    pub authors_failed: usize,
    pub failures: Vec<AuthorFailure>,
    pub works_rows: usize,
    pub global_rows: usize,
    pub works_path: String,
    pub globals_path: String,
}

pub fn write_works(path: &Path, rows: &[OutputRow]) -> Result<(), HarvestError> {
    write_csv(path, &WORKS_COLUMNS, rows)
}

pub fn write_globals(path: &Path, rows: &[GlobalDenominatorRow]) -> Result<(), HarvestError> {
    write_csv(path, &GLOBALS_COLUMNS, rows)
}

/// Header row always written, so an empty table keeps its column shape.
/// The file is staged next to `path` and renamed into place.
fn write_csv<T: Serialize>(path: &Path, columns: &[&str], rows: &[T]) -> Result<(), HarvestError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)
        .map_err(|err| HarvestError::Output(format!("create {}: {err}", dir.display())))?;

    let staged = NamedTempFile::new_in(dir)
        .map_err(|err| HarvestError::Output(format!("stage {}: {err}", path.display())))?;
    {
        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .from_writer(staged.as_file());
        writer
            .write_record(columns)
            .map_err(|err| HarvestError::Output(err.to_string()))?;
        for row in rows {
            writer
                .serialize(row)
                .map_err(|err| HarvestError::Output(err.to_string()))?;
        }
        writer
            .flush()
            .map_err(|err| HarvestError::Output(err.to_string()))?;
    }
    staged
        .persist(path)
        .map_err(|err| HarvestError::Output(format!("persist {}: {}", path.display(), err.error)))?;
    Ok(())
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_summary(summary: &HarvestSummary) -> io::Result<()> {
        let json = serde_json::to_string_pretty(summary).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
