use crate::error::StoreError;
use crate::models::{BulkRecord, Issue, IssueFilter, UpdatePayload};

/// The tracker that owns issue data. Every call is atomic; nothing is cached between calls.
pub trait IssueStore {
    fn fetch(&self, filter: &IssueFilter) -> Result<Vec<Issue>, StoreError>;

    fn create(&self, record: &BulkRecord) -> Result<Issue, StoreError>;

    fn update(&self, id: i64, payload: &UpdatePayload) -> Result<(), StoreError>;

    fn delete(&self, id: i64) -> Result<(), StoreError>;
}

impl<S: IssueStore + ?Sized> IssueStore for Box<S> {
    fn fetch(&self, filter: &IssueFilter) -> Result<Vec<Issue>, StoreError> {
        (**self).fetch(filter)
    }

    fn create(&self, record: &BulkRecord) -> Result<Issue, StoreError> {
        (**self).create(record)
    }

    fn update(&self, id: i64, payload: &UpdatePayload) -> Result<(), StoreError> {
        (**self).update(id, payload)
    }

    fn delete(&self, id: i64) -> Result<(), StoreError> {
        (**self).delete(id)
    }
}
