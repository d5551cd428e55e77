//! Repository for the `jobs` table.
//!
//! Every status change goes through [`JobRepo::transition`], a
//! compare-and-set against the persisted status column. The
//! queued→processing edge is the engine's sole mutual-exclusion point: at
//! most one worker wins it for a given record, and `rows_affected`
//! discriminates the winner.

use oncoflow_core::document::Document;
use oncoflow_core::types::DbId;
use sqlx::PgPool;

use crate::models::job::{Job, JobListQuery, NewJob};
use crate::models::status::JobStatus;

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, sample_code, name, job_type, status, \
    job_parameters, job_output, log, \
    patient_id, user_id, created_at, updated_at";

/// Maximum page size for job listing.
const MAX_LIMIT: i64 = 100;

/// Default page size for job listing.
const DEFAULT_LIMIT: i64 = 50;

/// Provides CRUD and lifecycle operations for analysis jobs.
pub struct JobRepo;

impl JobRepo {
    /// Create a new job in `ready` status.
    pub async fn create(
        pool: &PgPool,
        user_id: DbId,
        input: &NewJob,
    ) -> Result<Job, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs \
                 (sample_code, name, job_type, status, job_parameters, patient_id, user_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(&input.sample_code)
            .bind(&input.name)
            .bind(&input.job_type)
            .bind(JobStatus::Ready)
            .bind(sqlx::types::Json(&input.parameters))
            .bind(input.patient_id)
            .bind(user_id)
            .fetch_one(pool)
            .await
    }

    /// Find a job by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// The oldest queued job, if any. Claiming it is a separate
    /// compare-and-set so concurrent dispatchers race safely.
    pub async fn find_next_queued(pool: &PgPool) -> Result<Option<Job>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE status = $1 \
             ORDER BY created_at ASC \
             LIMIT 1"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(JobStatus::Queued)
            .fetch_optional(pool)
            .await
    }

    /// Atomically move a job from `from` to `to`.
    ///
    /// Returns `false`, leaving the record unchanged, when the edge is
    /// not part of the lifecycle state machine or when another actor got
    /// there first (the status no longer equals `from`).
    pub async fn transition(
        pool: &PgPool,
        id: DbId,
        from: JobStatus,
        to: JobStatus,
    ) -> Result<bool, sqlx::Error> {
        if !from.can_transition_to(to) {
            return Ok(false);
        }
        let result = sqlx::query(
            "UPDATE jobs SET status = $3, updated_at = NOW() \
             WHERE id = $1 AND status = $2",
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Append a chunk to the job log. The log column is append-only;
    /// nothing ever rewrites it.
    pub async fn append_log(pool: &PgPool, id: DbId, chunk: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE jobs SET log = log || $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(chunk)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Persist the output document. Only the executing job type writes
    /// output, and only while the record is `processing`.
    pub async fn update_output(
        pool: &PgPool,
        id: DbId,
        output: &Document,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs SET job_output = $2, updated_at = NOW() \
             WHERE id = $1 AND status = $3",
        )
        .bind(id)
        .bind(sqlx::types::Json(output))
        .bind(JobStatus::Processing)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Replace the parameter document. Parameters are frozen once the
    /// record leaves `ready`; a late update is rejected.
    pub async fn update_parameters(
        pool: &PgPool,
        id: DbId,
        parameters: &Document,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs SET job_parameters = $2, updated_at = NOW() \
             WHERE id = $1 AND status = $3",
        )
        .bind(id)
        .bind(sqlx::types::Json(parameters))
        .bind(JobStatus::Ready)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a job record. Guarded by the lifecycle: records that a
    /// worker may still touch (`queued`, `processing`) are refused.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM jobs WHERE id = $1 AND status IN ($2, $3, $4)",
        )
        .bind(id)
        .bind(JobStatus::Ready)
        .bind(JobStatus::Completed)
        .bind(JobStatus::Failed)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// List jobs owned by a user, newest first.
    pub async fn list_by_user(
        pool: &PgPool,
        user_id: DbId,
        params: &JobListQuery,
    ) -> Result<Vec<Job>, sqlx::Error> {
        Self::list_jobs(pool, "user_id", user_id, params).await
    }

    /// List jobs tied to a patient, newest first.
    pub async fn list_by_patient(
        pool: &PgPool,
        patient_id: DbId,
        params: &JobListQuery,
    ) -> Result<Vec<Job>, sqlx::Error> {
        Self::list_jobs(pool, "patient_id", patient_id, params).await
    }

    /// Shared listing query builder over an owner column.
    async fn list_jobs(
        pool: &PgPool,
        owner_column: &'static str,
        owner_id: DbId,
        params: &JobListQuery,
    ) -> Result<Vec<Job>, sqlx::Error> {
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        let offset = params.offset.unwrap_or(0);

        let status_clause = if params.status.is_some() {
            "AND status = $4"
        } else {
            ""
        };
        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE {owner_column} = $1 {status_clause} \
             ORDER BY created_at DESC \
             LIMIT $2 OFFSET $3"
        );

        let mut q = sqlx::query_as::<_, Job>(&query)
            .bind(owner_id)
            .bind(limit)
            .bind(offset);
        if let Some(status) = params.status {
            q = q.bind(status);
        }
        q.fetch_all(pool).await
    }
}
