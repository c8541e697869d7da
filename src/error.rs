use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Filename has no numeric identifier prefix: {0}")]
    InvalidFilename(String),

    #[error("Lookup failed: {0}")]
    Lookup(String),

    #[error("Copy to {} could not be verified", .0.display())]
    Copy(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Workbook error: {0}")]
    Workbook(String),

    #[error("WebDriver error: {0}")]
    WebDriver(String),
}

impl From<csv::Error> for PipelineError {
    fn from(err: csv::Error) -> Self {
        PipelineError::Workbook(err.to_string())
    }
}

/// Where a browser lookup gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiStage {
    SearchResult,
    CopyLink,
}

impl fmt::Display for UiStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UiStage::SearchResult => write!(f, "search result"),
            UiStage::CopyLink => write!(f, "copy link action"),
        }
    }
}

/// Why a completed UI pass produced no link.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkFailure {
    #[error("no search result matched the file")]
    NoMatch,

    #[error("timed out waiting for the {stage}")]
    Timeout { stage: UiStage },

    #[error("UI interaction failed: {0}")]
    Interaction(String),

    #[error("clipboard read failed: {0}")]
    Clipboard(String),

    #[error("clipboard was empty")]
    EmptyClipboard,

    #[error("clipboard did not hold a link: {0}")]
    NotALink(String),
}
