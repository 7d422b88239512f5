use std::time::Duration;

use chrono::NaiveDate;

use crate::error::HarvestError;

pub const DEFAULT_BASE_URL: &str = "https://api.openalex.org";
pub const DEFAULT_START_DATE: &str = "2015-01-01";
pub const DEFAULT_RATE_SECONDS: f64 = 0.25;

/// Runtime settings read from `OPENALEX_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct HarvestConfig {
    pub base_url: String,
    pub mailto: Option<String>,
    pub api_key: Option<String>,
    pub rate: Duration,
    pub start_date: NaiveDate,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            mailto: None,
            api_key: None,
            rate: Duration::from_secs_f64(DEFAULT_RATE_SECONDS),
            start_date: NaiveDate::from_ymd_opt(2015, 1, 1).unwrap_or(NaiveDate::MIN),
        }
    }
}

impl HarvestConfig {
    /// The `from_publication_date` filter value.
    pub fn start_date_filter(&self) -> String {
        publication_date_filter(self.start_date)
    }
}

pub fn publication_date_filter(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn from_env() -> Result<HarvestConfig, HarvestError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<HarvestConfig, HarvestError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let base_url = non_empty("OPENALEX_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let rate = match non_empty("OPENALEX_RATE_SECONDS") {
            Some(raw) => parse_rate(&raw)?,
            None => Duration::from_secs_f64(DEFAULT_RATE_SECONDS),
        };

        let raw_start = non_empty("OPENALEX_START_DATE")
            .unwrap_or_else(|| DEFAULT_START_DATE.to_string());
        let start_date = NaiveDate::parse_from_str(&raw_start, "%Y-%m-%d").map_err(|_| {
            HarvestError::InvalidConfig(format!(
                "OPENALEX_START_DATE must be an ISO date (YYYY-MM-DD), got {raw_start}"
            ))
        })?;

        Ok(HarvestConfig {
            base_url,
            mailto: non_empty("OPENALEX_MAILTO"),
            api_key: non_empty("OPENALEX_API_KEY"),
            rate,
            start_date,
        })
    }
}

fn parse_rate(raw: &str) -> Result<Duration, HarvestError> {
    let seconds: f64 = raw.parse().map_err(|_| {
        HarvestError::InvalidConfig(format!("OPENALEX_RATE_SECONDS is not a number: {raw}"))
    })?;
    Duration::try_from_secs_f64(seconds).map_err(|_| {
        HarvestError::InvalidConfig(format!(
            "OPENALEX_RATE_SECONDS must be a non-negative number of seconds, got {raw}"
        ))
    })
}
