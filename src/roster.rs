use std::fs::File;
use std::path::Path;

use csv::ReaderBuilder;

use crate::domain::AuthorId;
use crate::error::HarvestError;

pub const ROSTER_ID_COLUMN: &str = "OpenAlexID";

/// Author ids from the roster CSV, in file order. Blank and `nan` cells are dropped.
pub fn read_roster_ids(path: &Path) -> Result<Vec<AuthorId>, HarvestError> {
    let read_err = |message: String| HarvestError::RosterRead {
        path: path.to_path_buf(),
        message,
    };
    let file = File::open(path).map_err(|err| read_err(err.to_string()))?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(file);

    let headers = reader.headers().map_err(|err| read_err(err.to_string()))?;
    let Some(column) = headers
        .iter()
        .position(|name| name.trim() == ROSTER_ID_COLUMN)
    else {
        return Err(HarvestError::MissingRosterColumn {
            path: path.to_path_buf(),
            column: ROSTER_ID_COLUMN.to_string(),
        });
    };

    let mut ids: Vec<AuthorId> = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record =
            record.map_err(|err| read_err(format!("line {}: {err}", line + 2)))?;
        if let Some(id) = record.get(column).and_then(|cell| cell.parse().ok()) {
            ids.push(id);
        }
    }

    if ids.is_empty() {
        return Err(HarvestError::EmptyRoster(path.to_path_buf()));
    }
    Ok(ids)
}
