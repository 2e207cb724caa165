//! Error types for the dashboard core.
//!
//! Store failures are split into record-level rejections, which a batch absorbs into its
//! `failed` partition, and everything else, which aborts the batch.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::models::BatchResult;

#[derive(Error, Debug)]
pub enum StoreError {
    /// The tracker refused this one record.
    #[error("{reason}")]
    Rejected { reason: String },

    #[error("Issue #{id} not found")]
    NotFound { id: i64 },

    /// Credentials were refused; every following call would fail the same way.
    #[error("Tracker rejected credentials (HTTP {status})")]
    Unauthorized { status: u16 },

    #[error("Tracker unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Unexpected response from tracker: {0}")]
    Decode(String),
}

impl StoreError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        StoreError::Rejected {
            reason: reason.into(),
        }
    }

    pub fn is_record_level(&self) -> bool {
        matches!(self, StoreError::Rejected { .. } | StoreError::NotFound { .. })
    }
}

/// Bulk input could not be turned into records.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("No records found in input")]
    Empty,

    #[error("Structured input must be a JSON list of records")]
    NotAList,

    /// `position` is the 1-based index of the offending record.
    #[error("Record {position}: {reason}")]
    Invalid { position: usize, reason: String },
}

impl ParseError {
    pub fn invalid(position: usize, reason: impl Into<String>) -> Self {
        ParseError::Invalid {
            position,
            reason: reason.into(),
        }
    }

    pub fn position(&self) -> Option<usize> {
        match self {
            ParseError::Empty | ParseError::NotAList => None,
            ParseError::Invalid { position, .. } => Some(*position),
        }
    }
}

#[derive(Error, Debug)]
pub enum BulkError<R: fmt::Debug> {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Nothing to update. Toggle at least one field")]
    EmptyPayload,

    #[error("No issues selected")]
    NoIssuesSelected,

    #[error("Cannot {action} while the batch is {state}")]
    InvalidState {
        state: &'static str,
        action: &'static str,
    },

    /// A store failure that is not about any single record. `partial` holds what completed and
    /// `remaining` the records never applied, starting with the one whose call failed.
    #[error("Batch aborted after {processed} of {total} records: {source}")]
    Aborted {
        partial: BatchResult<R>,
        remaining: Vec<R>,
        processed: usize,
        total: usize,
        #[source]
        source: StoreError,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML in {}: {source}", .path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
