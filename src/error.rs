//! Error types for each layer of the collection engine.
//!
//! Technical failures (rendering session, storage, configuration) are
//! fatal and travel up with `?`. Per-candidate failures never become a
//! [`HuntError`]; the verifier absorbs them into its verdicts.

use crate::models::{Market, RunReport};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("WebDriver transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("WebDriver returned {status}: {error}: {message}")]
    Protocol {
        status: u16,
        error: String,
        message: String,
    },

    #[error("Unexpected WebDriver response: {0}")]
    Malformed(String),

    #[error("Script error: {0}")]
    Script(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt record {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {0}")]
    Status(u16),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read settings file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid settings file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("No configuration for market {0}")]
    MissingMarket(Market),

    #[error("Invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Fatal outcome of a run.
///
/// Every variant carries a stable [`HuntError::reason_code`] so operators
/// can tell "the site changed shape" from "a quiet news day".
#[derive(Error, Debug)]
pub enum HuntError {
    #[error("Could not start a rendering session: {0}")]
    SessionSetup(#[source] RenderError),

    #[error("Scrolling failed on all {attempts} attempts")]
    ScrollExhausted { attempts: u32 },

    #[error("Only {} new articles (threshold {threshold})", .report.inserted)]
    InsufficientYield { report: RunReport, threshold: usize },

    #[error("Storage failure: {0}")]
    Storage(#[from] StoreError),

    #[error("Stage {stage} failed: {reason}")]
    StageFailed { stage: String, reason: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl HuntError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            HuntError::SessionSetup(_) => "session_setup",
            HuntError::ScrollExhausted { .. } => "scroll_exhausted",
            HuntError::InsufficientYield { .. } => "insufficient_yield",
            HuntError::Storage(_) => "storage",
            HuntError::StageFailed { .. } => "stage_failed",
            HuntError::Config(_) => "config",
        }
    }

    /// Process exit status for the binary; business-rule failures get their own code.
    pub fn exit_code(&self) -> i32 {
        match self {
            HuntError::SessionSetup(_) => 2,
            HuntError::ScrollExhausted { .. } => 3,
            HuntError::InsufficientYield { .. } => 4,
            HuntError::Storage(_) => 5,
            HuntError::StageFailed { .. } => 6,
            HuntError::Config(_) => 7,
        }
    }
}
