use tracing::info;

use super::parse::parse_bulk_input;
use super::run_sequential;
use crate::error::BulkError;
use crate::models::{BatchResult, BulkRecord, Failure, IssueRef};
use crate::store::IssueStore;

type CreateResult<T> = Result<T, BulkError<BulkRecord>>;

/// Where a bulk-create run stands.
#[derive(Debug, Clone, PartialEq)]
pub enum BulkState {
    Input(String),
    Parsed {
        raw: String,
        records: Vec<BulkRecord>,
    },
    Submitting {
        done: usize,
        total: usize,
    },
    Completed(BatchResult<BulkRecord>),
}

impl BulkState {
    fn name(&self) -> &'static str {
        match self {
            BulkState::Input(_) => "collecting input",
            BulkState::Parsed { .. } => "parsed",
            BulkState::Submitting { .. } => "submitting",
            BulkState::Completed(_) => "completed",
        }
    }
}

/// A bulk-create session for one target project.
#[derive(Debug, Clone)]
pub struct BulkCreate {
    project_id: i64,
    state: BulkState,
}

impl BulkCreate {
    pub fn new(project_id: i64) -> Self {
        Self::with_input(project_id, String::new())
    }

    pub fn with_input(project_id: i64, raw: impl Into<String>) -> Self {
        BulkCreate {
            project_id,
            state: BulkState::Input(raw.into()),
        }
    }

    pub fn project_id(&self) -> i64 {
        self.project_id
    }

    pub fn state(&self) -> &BulkState {
        &self.state
    }

    pub fn result(&self) -> Option<&BatchResult<BulkRecord>> {
        match &self.state {
            BulkState::Completed(result) => Some(result),
            _ => None,
        }
    }

    /// The raw text while the session is collecting input.
    pub fn input(&self) -> Option<&str> {
        match &self.state {
            BulkState::Input(raw) => Some(raw),
            _ => None,
        }
    }

    /// The parsed records, ready for submission.
    pub fn records(&self) -> Option<&[BulkRecord]> {
        match &self.state {
            BulkState::Parsed { records, .. } => Some(records),
            _ => None,
        }
    }

    /// Replace the raw input. Allowed before submission; a parsed session goes back to input.
    pub fn set_input(&mut self, raw: impl Into<String>) -> CreateResult<()> {
        match self.state {
            BulkState::Input(_) | BulkState::Parsed { .. } => {
                self.state = BulkState::Input(raw.into());
                Ok(())
            }
            _ => Err(self.invalid("change the input")),
        }
    }

    /// Return a parsed session to editing, keeping the text it was parsed from.
    pub fn edit(&mut self) -> CreateResult<()> {
        match std::mem::replace(&mut self.state, BulkState::Input(String::new())) {
            BulkState::Parsed { raw, .. } => {
                self.state = BulkState::Input(raw);
                Ok(())
            }
            other => {
                self.state = other;
                Err(self.invalid("edit"))
            }
        }
    }

    /// Parse the current input and return how many records it holds. On error the session stays
    /// in input with the text untouched.
    pub fn parse(&mut self) -> CreateResult<usize> {
        let raw = match &self.state {
            BulkState::Input(raw) => raw.clone(),
            _ => return Err(self.invalid("parse")),
        };
        let records = parse_bulk_input(&raw, self.project_id)?;
        let count = records.len();
        self.state = BulkState::Parsed { raw, records };
        Ok(count)
    }

    pub fn submit<S: IssueStore + ?Sized>(
        &mut self,
        store: &S,
    ) -> CreateResult<BatchResult<BulkRecord>> {
        self.submit_with_progress(store, |_, _| {})
    }

    /// Create every parsed record, one call at a time.
    ///
    /// A pipeline-level failure still completes the session. The records that were never created,
    /// starting with the one whose call failed, are added to `failed` with the abort reason, so
    /// the export and retry cover every record that did not make it.
    pub fn submit_with_progress<S, P>(
        &mut self,
        store: &S,
        mut progress: P,
    ) -> CreateResult<BatchResult<BulkRecord>>
    where
        S: IssueStore + ?Sized,
        P: FnMut(usize, usize),
    {
        let records = match std::mem::replace(
            &mut self.state,
            BulkState::Submitting { done: 0, total: 0 },
        ) {
            BulkState::Parsed { records, .. } => records,
            other => {
                self.state = other;
                return Err(self.invalid("submit"));
            }
        };

        let total = records.len();
        self.state = BulkState::Submitting { done: 0, total };
        let state = &mut self.state;
        let outcome = submit_records(store, records, |done, total| {
            *state = BulkState::Submitting { done, total };
            progress(done, total);
        });

        match outcome {
            Ok(result) => {
                self.state = BulkState::Completed(result.clone());
                Ok(result)
            }
            Err(BulkError::Aborted {
                partial,
                remaining,
                processed,
                total,
                source,
            }) => {
                let mut completed = partial.clone();
                let reason = format!("Not submitted: {}", source);
                completed
                    .failed
                    .extend(remaining.iter().cloned().map(|record| Failure {
                        record,
                        reason: reason.clone(),
                    }));
                self.state = BulkState::Completed(completed);
                Err(BulkError::Aborted {
                    partial,
                    remaining,
                    processed,
                    total,
                    source,
                })
            }
            Err(other) => Err(other),
        }
    }

    /// Failed records as input-compatible JSON, or `None` when nothing failed.
    pub fn export_failed(&self) -> Option<String> {
        self.result()
            .filter(|result| !result.is_clean())
            .and_then(|result| export_failed(result).ok())
    }

    /// Start over with exactly the failed records as input. Returns how many were re-seeded.
    pub fn retry_failed(&mut self) -> CreateResult<usize> {
        let exported = match self.result() {
            Some(result) if !result.is_clean() => (result.failed.len(), export_failed(result)),
            _ => return Err(self.invalid("retry")),
        };
        match exported {
            (count, Ok(json)) => {
                self.state = BulkState::Input(json);
                info!(count, "re-seeded bulk input with failed records");
                Ok(count)
            }
            (_, Err(_)) => Err(self.invalid("retry")),
        }
    }

    fn invalid(&self, action: &'static str) -> BulkError<BulkRecord> {
        BulkError::InvalidState {
            state: self.state.name(),
            action,
        }
    }
}

/// Parse `raw` for `project_id` and create every record.
pub fn run_bulk_create<S: IssueStore + ?Sized>(
    store: &S,
    raw: &str,
    project_id: i64,
) -> CreateResult<BatchResult<BulkRecord>> {
    let records = parse_bulk_input(raw, project_id)?;
    submit_records(store, records, |_, _| {})
}

pub fn submit_records<S, P>(
    store: &S,
    records: Vec<BulkRecord>,
    progress: P,
) -> CreateResult<BatchResult<BulkRecord>>
where
    S: IssueStore + ?Sized,
    P: FnMut(usize, usize),
{
    info!(count = records.len(), "starting bulk create");
    run_sequential(
        records,
        |record| store.create(record).map(|issue| IssueRef::from(&issue)),
        progress,
    )
}

/// Serialize the failed records, reasons stripped, in the JSON list format bulk input accepts.
pub fn export_failed(result: &BatchResult<BulkRecord>) -> serde_json::Result<String> {
    let records: Vec<&BulkRecord> = result.failed_records().collect();
    serde_json::to_string_pretty(&records)
}
