use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum HarvestError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to read roster at {path}: {message}")]
    RosterRead { path: PathBuf, message: String },

    #[error("missing '{column}' column in {path}")]
    #[diagnostic(help("the roster must carry one OpenAlex author id per row"))]
    MissingRosterColumn { path: PathBuf, column: String },

    #[error("no OpenAlex IDs found in roster {0}")]
    EmptyRoster(PathBuf),

    #[error("failed to read rules at {path}: {message}")]
    RulesRead { path: PathBuf, message: String },

    #[error("OpenAlex request failed: {message}")]
    Transport { message: String, transient: bool },

    #[error(
        "403 from OpenAlex for {path}. Ensure a mailto is provided (header + query) and filter syntax is valid. Response: {body}"
    )]
    #[diagnostic(help("set OPENALEX_MAILTO to an institutional contact address"))]
    AccessDenied { path: String, body: String },

    #[error("OpenAlex returned status {status}: {message}")]
    ApiStatus { status: u16, message: String },

    #[error("OpenAlex returned status {status} after {attempts} attempts: {message}")]
    RetriesExhausted {
        status: u16,
        attempts: usize,
        message: String,
    },

    #[error("invalid OpenAlex response: {0}")]
    InvalidResponse(String),

    #[error("failed to write output: {0}")]
    Output(String),
}

impl HarvestError {
    /// Failure classes worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            HarvestError::Transport { transient, .. } => *transient,
            HarvestError::ApiStatus { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            HarvestError::InvalidConfig(_)
                | HarvestError::RosterRead { .. }
                | HarvestError::MissingRosterColumn { .. }
                | HarvestError::EmptyRoster(_)
                | HarvestError::RulesRead { .. }
        )
    }
}

pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}
