use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use csv::{ReaderBuilder, StringRecord};
use regex::Regex;
use tracing::{debug, warn};

use crate::domain::short_id;
use crate::error::HarvestError;

/// Regex rule mapping affiliation text to a unit. Higher priority is tried first.
#[derive(Debug, Clone)]
pub struct AliasRule {
    pub pattern: String,
    pub unit_id: String,
    pub unit_name: String,
    pub priority: i64,
    regex: Option<Regex>,
}

impl AliasRule {
    pub fn new(pattern: &str, unit_id: &str, unit_name: &str, priority: i64) -> Self {
        let pattern = pattern.trim().to_string();
        let regex = if pattern.is_empty() {
            None
        } else {
            match Regex::new(&pattern) {
                Ok(regex) => Some(regex),
                Err(err) => {
                    debug!(%pattern, error = %err, "alias pattern does not compile; rule is inert");
                    None
                }
            }
        };
        Self {
            pattern,
            unit_id: unit_id.trim().to_string(),
            unit_name: unit_name.trim().to_string(),
            priority,
            regex,
        }
    }

    pub fn is_inert(&self) -> bool {
        self.regex.is_none()
    }

    pub fn is_match(&self, subject: &str) -> bool {
        self.regex
            .as_ref()
            .is_some_and(|regex| regex.is_match(subject))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideRule {
    pub unit_id: String,
    pub unit_name: String,
}

/// Author overrides keyed by the short form of the author id.
#[derive(Debug, Clone, Default)]
pub struct OverrideTable {
    entries: HashMap<String, OverrideRule>,
}

impl OverrideTable {
    pub fn insert(&mut self, author_id: &str, rule: OverrideRule) {
        self.entries
            .insert(short_id(author_id.trim()).to_string(), rule);
    }

    pub fn get(&self, author_id: &str) -> Option<&OverrideRule> {
        self.entries.get(short_id(author_id.trim()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub fn load_aliases(path: &Path) -> Result<Vec<AliasRule>, HarvestError> {
    let Some(content) = read_optional(path)? else {
        return Ok(Vec::new());
    };
    parse_aliases(content.as_bytes()).map_err(|err| rules_error(path, err))
}

pub fn load_overrides(path: &Path) -> Result<OverrideTable, HarvestError> {
    let Some(content) = read_optional(path)? else {
        return Ok(OverrideTable::default());
    };
    parse_overrides(content.as_bytes()).map_err(|err| rules_error(path, err))
}

/// Alias rules from CSV, sorted by priority descending. Ties keep file order.
pub fn parse_aliases<R: Read>(reader: R) -> Result<Vec<AliasRule>, csv::Error> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);
    let columns = Columns::new(reader.headers()?);

    let mut rules = Vec::new();
    for record in reader.records() {
        let record = record?;
        let raw_priority = columns.get(&record, "priority");
        rules.push(AliasRule::new(
            columns.get(&record, "pattern"),
            columns.get(&record, "unit_id"),
            columns.get(&record, "unit_name"),
            parse_priority(raw_priority),
        ));
    }
    rules.sort_by(|a, b| b.priority.cmp(&a.priority));
    Ok(rules)
}

pub fn parse_overrides<R: Read>(reader: R) -> Result<OverrideTable, csv::Error> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);
    let columns = Columns::new(reader.headers()?);

    let mut table = OverrideTable::default();
    for record in reader.records() {
        let record = record?;
        let author = columns.get(&record, "author_openalex_id").trim();
        if author.is_empty() {
            continue;
        }
        table.insert(
            author,
            OverrideRule {
                unit_id: columns.get(&record, "unit_id").trim().to_string(),
                unit_name: columns.get(&record, "unit_name").trim().to_string(),
            },
        );
    }
    Ok(table)
}

/// Case-insensitive header lookup built once per file.
struct Columns {
    index: HashMap<String, usize>,
}

impl Columns {
    fn new(headers: &StringRecord) -> Self {
        let mut index = HashMap::new();
        for (position, name) in headers.iter().enumerate() {
            index
                .entry(name.trim().to_lowercase())
                .or_insert(position);
        }
        Self { index }
    }

    fn get<'r>(&self, record: &'r StringRecord, column: &str) -> &'r str {
        self.index
            .get(column)
            .and_then(|position| record.get(*position))
            .unwrap_or("")
    }
}

fn parse_priority(raw: &str) -> i64 {
    let raw = raw.trim();
    if raw.is_empty() {
        return 0;
    }
    if let Ok(value) = raw.parse::<i64>() {
        return value;
    }
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => value.trunc() as i64,
        _ => {
            warn!(priority = raw, "alias priority is not an integer; using 0");
            0
        }
    }
}

fn read_optional(path: &Path) -> Result<Option<String>, HarvestError> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "rules file not present");
            return Ok(None);
        }
        Err(err) => return Err(rules_error(path, err)),
    };
    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|err| rules_error(path, err))?;
    Ok(Some(content))
}

fn rules_error(path: &Path, err: impl std::fmt::Display) -> HarvestError {
    HarvestError::RulesRead {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}
