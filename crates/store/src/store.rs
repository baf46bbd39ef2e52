//! The [`JobStore`] collaborator interface.

use async_trait::async_trait;
use genflow_core::job::{Job, JobFilter};
use genflow_core::types::JobId;

/// Errors surfaced by a job store implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The storage backend failed (I/O, serialization, connection).
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// A boxed mutation applied under the store's write exclusion.
///
/// The closure receives the current record and mutates it in place;
/// [`JobStore::update`] persists the result and returns the updated
/// record. Because read, mutate, and write happen as one operation,
/// callers can make decisions inside the closure (e.g. "only transition
/// if still running") without a lost-update window.
pub type Mutator = Box<dyn FnOnce(&mut Job) + Send>;

/// Durable store of job records, keyed by job id.
///
/// Object-safe so it can be shared as `Arc<dyn JobStore>` between the
/// dispatcher, the cancel path, and request handlers.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Fetch a job by id.
    async fn get(&self, id: JobId) -> Result<Option<Job>, StoreError>;

    /// Insert or overwrite a job record.
    async fn save(&self, job: &Job) -> Result<(), StoreError>;

    /// Atomically mutate a job record in place.
    ///
    /// Returns the record after mutation, or `None` if no job with the
    /// given id exists (the mutator is not invoked in that case).
    async fn update(&self, id: JobId, mutate: Mutator) -> Result<Option<Job>, StoreError>;

    /// List jobs matching the filter, newest first.
    async fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, StoreError>;
}
