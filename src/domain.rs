use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::HarvestError;

/// External author identifier, kept in the spelling the roster used.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuthorId(String);

impl AuthorId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Trailing path segment, so `A123` and `https://openalex.org/A123` compare equal.
    pub fn short(&self) -> &str {
        short_id(&self.0)
    }

    pub fn matches(&self, other: &str) -> bool {
        !other.trim().is_empty() && short_id(other.trim()) == self.short()
    }
}

impl fmt::Display for AuthorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AuthorId {
    type Err = HarvestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
            return Err(HarvestError::InvalidConfig(format!(
                "invalid author id: {value:?}"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }
}

pub(crate) fn short_id(value: &str) -> &str {
    value
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(value)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Work {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub publication_date: Option<String>,
    #[serde(default)]
    pub from_publication_date: Option<String>,
    #[serde(default)]
    pub publication_year: Option<i32>,
    #[serde(default)]
    pub host_venue: Option<HostVenue>,
    #[serde(default)]
    pub authorships: Option<Vec<Authorship>>,
    #[serde(default)]
    pub concepts: Option<Vec<Concept>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostVenue {
    #[serde(default)]
    pub published_date: Option<String>,
}

impl Work {
    /// Most specific publication date the record carries.
    pub fn published_date(&self) -> Option<&str> {
        [
            self.publication_date.as_deref(),
            self.from_publication_date.as_deref(),
            self.host_venue
                .as_ref()
                .and_then(|venue| venue.published_date.as_deref()),
        ]
        .into_iter()
        .flatten()
        .find(|value| !value.trim().is_empty())
    }

    pub fn year(&self) -> Option<i32> {
        normalize_year(self.published_date(), self.publication_year)
    }

    /// First authorship whose embedded author id is `author`.
    pub fn authorship_for(&self, author: &AuthorId) -> Option<&Authorship> {
        self.authorships.as_deref().unwrap_or_default().iter().find(|authorship| {
            authorship
                .author
                .as_ref()
                .and_then(|a| a.id.as_deref())
                .is_some_and(|id| author.matches(id))
        })
    }

    pub fn concepts(&self) -> &[Concept] {
        self.concepts.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Authorship {
    #[serde(default)]
    pub author: Option<AuthorRef>,
    #[serde(default)]
    pub raw_affiliation_string: Option<String>,
    #[serde(default)]
    pub raw_affiliation_strings: Option<Vec<String>>,
    #[serde(default)]
    pub institutions: Option<Vec<InstitutionRef>>,
}

impl Authorship {
    pub fn raw_affiliation(&self) -> Option<String> {
        if let Some(value) = self
            .raw_affiliation_string
            .as_deref()
            .filter(|value| !value.trim().is_empty())
        {
            return Some(value.to_string());
        }
        let joined = self
            .raw_affiliation_strings
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .collect::<Vec<_>>()
            .join("; ");
        (!joined.is_empty()).then_some(joined)
    }

    pub fn institutions(&self) -> &[InstitutionRef] {
        self.institutions.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorRef {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstitutionRef {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub ror: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Concept {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub level: Option<i64>,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl Concept {
    pub fn label(&self) -> Option<String> {
        self.display_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .map(str::to_string)
            .or_else(|| self.id.as_deref().and_then(humanize_concept_id))
    }
}

/// Fact-table record, one per (work, concept).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputRow {
    pub work_id: Option<String>,
    pub published_date: Option<String>,
    pub year: Option<i32>,
    pub author_openalex_id: String,
    pub raw_affiliation: Option<String>,
    pub unit_id_auto: String,
    pub unit_name_auto: String,
    pub institution_ror: Option<String>,
    pub concept_id: String,
    pub concept_level: i64,
    pub concept_label_openalex: Option<String>,
}

pub const WORKS_COLUMNS: [&str; 11] = [
    "work_id",
    "published_date",
    "year",
    "author_openalex_id",
    "raw_affiliation",
    "unit_id_auto",
    "unit_name_auto",
    "institution_ror",
    "concept_id",
    "concept_level",
    "concept_label_openalex",
];

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GlobalDenominatorRow {
    pub concept_id: String,
    pub period: Option<i32>,
    pub global_works: u64,
}

pub const GLOBALS_COLUMNS: [&str; 3] = ["concept_id", "period", "global_works"];

/// Label from a concept URL such as `https://openalex.org/C71924100`.
pub fn humanize_concept_id(id: &str) -> Option<String> {
    let tail = short_id(id.trim());
    if tail.is_empty() {
        return None;
    }
    let label = tail
        .replace('_', " ")
        .split(' ')
        .map(title_case)
        .collect::<Vec<_>>()
        .join(" ");
    Some(label)
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// Year from an ISO-ish date string, else `fallback_year`.
pub fn normalize_year(pub_date: Option<&str>, fallback_year: Option<i32>) -> Option<i32> {
    pub_date
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .and_then(parse_year)
        .or(fallback_year)
}

fn parse_year(value: &str) -> Option<i32> {
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date.year());
    }
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Some(timestamp.year());
    }
    if let Ok(timestamp) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(timestamp.year());
    }
    if let Ok(date) = NaiveDate::parse_from_str(&format!("{value}-01"), "%Y-%m-%d") {
        return Some(date.year());
    }
    if value.len() == 4 && value.chars().all(|ch| ch.is_ascii_digit()) {
        return value.parse().ok();
    }
    None
}
