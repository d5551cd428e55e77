//! Persistence seam between the execution engine and the relational store.
//!
//! The engine talks to jobs through [`JobStore`] so the executor and the
//! job types stay independent of the concrete database. [`PgJobStore`] is
//! the production implementation over the sqlx repositories;
//! [`MemoryJobStore`] backs unit tests and dry runs.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use oncoflow_core::document::Document;
use oncoflow_core::types::DbId;
use oncoflow_db::models::job::{Job, NewJob};
use oncoflow_db::models::patient::Patient;
use oncoflow_db::models::status::JobStatus;
use oncoflow_db::repositories::{JobRepo, PatientRepo};
use sqlx::PgPool;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("job {0} not found")]
    JobNotFound(DbId),
}

/// Store operations the engine needs. Status changes are compare-and-set:
/// `transition` returns `false` when the record was not in `from`, which
/// is how concurrent claimants lose without error.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self, user_id: DbId, input: &NewJob) -> Result<Job, StoreError>;
    async fn find(&self, id: DbId) -> Result<Option<Job>, StoreError>;
    async fn find_next_queued(&self) -> Result<Option<Job>, StoreError>;
    async fn transition(&self, id: DbId, from: JobStatus, to: JobStatus)
        -> Result<bool, StoreError>;
    async fn append_log(&self, id: DbId, chunk: &str) -> Result<(), StoreError>;
    async fn update_output(&self, id: DbId, output: &Document) -> Result<bool, StoreError>;
    async fn update_parameters(&self, id: DbId, parameters: &Document)
        -> Result<bool, StoreError>;
    async fn delete(&self, id: DbId) -> Result<bool, StoreError>;
    async fn find_patient(&self, id: DbId) -> Result<Option<Patient>, StoreError>;
}

/// Production store over the Postgres repositories.
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, user_id: DbId, input: &NewJob) -> Result<Job, StoreError> {
        Ok(JobRepo::create(&self.pool, user_id, input).await?)
    }

    async fn find(&self, id: DbId) -> Result<Option<Job>, StoreError> {
        Ok(JobRepo::find_by_id(&self.pool, id).await?)
    }

    async fn find_next_queued(&self) -> Result<Option<Job>, StoreError> {
        Ok(JobRepo::find_next_queued(&self.pool).await?)
    }

    async fn transition(
        &self,
        id: DbId,
        from: JobStatus,
        to: JobStatus,
    ) -> Result<bool, StoreError> {
        Ok(JobRepo::transition(&self.pool, id, from, to).await?)
    }

    async fn append_log(&self, id: DbId, chunk: &str) -> Result<(), StoreError> {
        Ok(JobRepo::append_log(&self.pool, id, chunk).await?)
    }

    async fn update_output(&self, id: DbId, output: &Document) -> Result<bool, StoreError> {
        Ok(JobRepo::update_output(&self.pool, id, output).await?)
    }

    async fn update_parameters(
        &self,
        id: DbId,
        parameters: &Document,
    ) -> Result<bool, StoreError> {
        Ok(JobRepo::update_parameters(&self.pool, id, parameters).await?)
    }

    async fn delete(&self, id: DbId) -> Result<bool, StoreError> {
        Ok(JobRepo::delete(&self.pool, id).await?)
    }

    async fn find_patient(&self, id: DbId) -> Result<Option<Patient>, StoreError> {
        Ok(PatientRepo::find_by_id(&self.pool, id).await?)
    }
}

/// In-memory store for unit tests and dry runs. Mirrors the repository
/// semantics, including the compare-and-set transitions and the
/// frozen-after-ready parameter guard.
#[derive(Default)]
pub struct MemoryJobStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    jobs: HashMap<DbId, Job>,
    patients: HashMap<DbId, Patient>,
    next_job_id: DbId,
    log_writes: usize,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a patient record.
    pub fn insert_patient(&self, patient: Patient) {
        let mut inner = self.inner.lock().expect("store lock");
        inner.patients.insert(patient.id, patient);
    }

    /// Snapshot a job for assertions.
    pub fn job(&self, id: DbId) -> Option<Job> {
        self.inner.lock().expect("store lock").jobs.get(&id).cloned()
    }

    /// Number of persistence writes the log has received, for asserting
    /// that batched appends bound write amplification.
    pub fn log_write_count(&self) -> usize {
        self.inner.lock().expect("store lock").log_writes
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, user_id: DbId, input: &NewJob) -> Result<Job, StoreError> {
        let mut inner = self.inner.lock().expect("store lock");
        inner.next_job_id += 1;
        let now = chrono::Utc::now();
        let job = Job {
            id: inner.next_job_id,
            sample_code: input.sample_code.clone(),
            name: input.name.clone(),
            job_type: input.job_type.clone(),
            status: JobStatus::Ready,
            job_parameters: sqlx::types::Json(input.parameters.clone()),
            job_output: sqlx::types::Json(Document::new()),
            log: String::new(),
            patient_id: input.patient_id,
            user_id,
            created_at: now,
            updated_at: now,
        };
        inner.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn find(&self, id: DbId) -> Result<Option<Job>, StoreError> {
        Ok(self.job(id))
    }

    async fn find_next_queued(&self) -> Result<Option<Job>, StoreError> {
        let inner = self.inner.lock().expect("store lock");
        Ok(inner
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Queued)
            .min_by_key(|j| (j.created_at, j.id))
            .cloned())
    }

    async fn transition(
        &self,
        id: DbId,
        from: JobStatus,
        to: JobStatus,
    ) -> Result<bool, StoreError> {
        if !from.can_transition_to(to) {
            return Ok(false);
        }
        let mut inner = self.inner.lock().expect("store lock");
        let job = inner.jobs.get_mut(&id).ok_or(StoreError::JobNotFound(id))?;
        if job.status != from {
            return Ok(false);
        }
        job.status = to;
        job.updated_at = chrono::Utc::now();
        Ok(true)
    }

    async fn append_log(&self, id: DbId, chunk: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store lock");
        inner.log_writes += 1;
        let job = inner.jobs.get_mut(&id).ok_or(StoreError::JobNotFound(id))?;
        job.log.push_str(chunk);
        Ok(())
    }

    async fn update_output(&self, id: DbId, output: &Document) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().expect("store lock");
        let job = inner.jobs.get_mut(&id).ok_or(StoreError::JobNotFound(id))?;
        if job.status != JobStatus::Processing {
            return Ok(false);
        }
        job.job_output = sqlx::types::Json(output.clone());
        Ok(true)
    }

    async fn update_parameters(
        &self,
        id: DbId,
        parameters: &Document,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().expect("store lock");
        let job = inner.jobs.get_mut(&id).ok_or(StoreError::JobNotFound(id))?;
        if !job.status.can_be_modified() {
            return Ok(false);
        }
        job.job_parameters = sqlx::types::Json(parameters.clone());
        Ok(true)
    }

    async fn delete(&self, id: DbId) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().expect("store lock");
        let deletable = inner
            .jobs
            .get(&id)
            .is_some_and(|j| j.status.can_be_deleted());
        if deletable {
            inner.jobs.remove(&id);
        }
        Ok(deletable)
    }

    async fn find_patient(&self, id: DbId) -> Result<Option<Patient>, StoreError> {
        let inner = self.inner.lock().expect("store lock");
        Ok(inner.patients.get(&id).cloned())
    }
}
