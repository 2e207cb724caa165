//! Project dashboard core for Redmine-style issue trackers.
//!
//! Read side: [`trend`] rebuilds open/closed counts per day from a single snapshot, [`timeline`]
//! lays dated issues out as bars and [`stats`] summarizes a snapshot. Write side: [`bulk`] pushes
//! batches of creates or edits through an [`store::IssueStore`] one call at a time.

pub mod bulk;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod models;
pub mod remote;
pub mod stats;
pub mod store;
pub mod timeline;
pub mod trend;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{BulkError, ConfigError, ParseError, StoreError};
pub use store::IssueStore;
