//! In-memory [`JobStore`] backed by a `tokio::sync::RwLock` map.

use std::collections::HashMap;

use async_trait::async_trait;
use genflow_core::job::{Job, JobFilter, DEFAULT_LIMIT, MAX_LIMIT};
use genflow_core::types::JobId;
use tokio::sync::RwLock;

use crate::store::{JobStore, Mutator, StoreError};

/// Process-local job store. Records do not survive a restart.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn get(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn save(&self, job: &Job) -> Result<(), StoreError> {
        self.jobs.write().await.insert(job.id, job.clone());
        Ok(())
    }

    async fn update(&self, id: JobId, mutate: Mutator) -> Result<Option<Job>, StoreError> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&id) {
            Some(job) => {
                mutate(job);
                Ok(Some(job.clone()))
            }
            None => Ok(None),
        }
    }

    async fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, StoreError> {
        let jobs = self.jobs.read().await;

        let mut matched: Vec<Job> = jobs
            .values()
            .filter(|job| filter.status.is_none_or(|s| job.status == s))
            .filter(|job| filter.job_type.is_none_or(|t| job.job_type == t))
            .cloned()
            .collect();

        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let limit = filter.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        let offset = filter.offset.unwrap_or(0);

        Ok(matched.into_iter().skip(offset).take(limit).collect())
    }
}
