//! Submission boundary for creating, confirming and deleting jobs.
//!
//! Creation validates the parameter document against the job type's
//! schema and checks the patient linkage, then stores a `ready` record.
//! Confirmation (`enqueue`) re-checks the business rules once input files
//! are in place and moves the record to `queued`, where a dispatcher can
//! claim it.

use std::sync::Arc;

use oncoflow_core::types::DbId;
use oncoflow_db::models::job::{Job, NewJob};
use oncoflow_db::models::status::JobStatus;

use crate::context::{JobContext, PipelineEnv};
use crate::contract::PatientInputState;
use crate::registry::JobTypeRegistry;
use crate::store::{JobStore, StoreError};
use crate::validation::{self, ValidationOutcome};

#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("unknown job type: {0}")]
    UnknownJobType(String),

    #[error("parameter validation failed: {}", .0.summary())]
    InvalidParameters(ValidationOutcome),

    #[error("patient {0} not found")]
    PatientNotFound(DbId),

    #[error("job type {0} must not be tied to a patient")]
    PatientNotAllowed(String),

    #[error("job {0} not found")]
    JobNotFound(DbId),

    #[error("job {job_id} is not in {expected} status")]
    WrongStatus { job_id: DbId, expected: JobStatus },

    #[error("job {0} input is not valid")]
    InvalidInput(DbId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Validate a submission and create a `ready` record.
///
/// A record missing a required patient is still accepted here; the
/// requirement is enforced before execution begins, once the record runs.
/// A supplied patient must exist, and is rejected outright for job types
/// that must not be tied to one.
pub async fn submit(
    store: &Arc<dyn JobStore>,
    registry: &JobTypeRegistry,
    user_id: DbId,
    input: NewJob,
) -> Result<Job, SubmissionError> {
    let job_type = registry
        .resolve(&input.job_type)
        .ok_or_else(|| SubmissionError::UnknownJobType(input.job_type.clone()))?;

    let outcome = validation::evaluate(&job_type.validation_spec(), &input.parameters);
    if !outcome.is_valid {
        return Err(SubmissionError::InvalidParameters(outcome));
    }

    if let Some(patient_id) = input.patient_id {
        if job_type.patient_input_state() == PatientInputState::None {
            return Err(SubmissionError::PatientNotAllowed(input.job_type.clone()));
        }
        if store.find_patient(patient_id).await?.is_none() {
            return Err(SubmissionError::PatientNotFound(patient_id));
        }
    }

    let job = store.create(user_id, &input).await?;
    tracing::info!(
        job_id = job.id,
        job_type = %job.job_type,
        user_id,
        "Job submitted",
    );
    Ok(job)
}

/// Confirm a `ready` record: re-run the business-rule validation now that
/// its input files are in place, then move it to `queued`.
pub async fn enqueue(
    store: &Arc<dyn JobStore>,
    registry: &JobTypeRegistry,
    env: &PipelineEnv,
    job_id: DbId,
) -> Result<Job, SubmissionError> {
    let job = store
        .find(job_id)
        .await?
        .ok_or(SubmissionError::JobNotFound(job_id))?;
    if job.status != JobStatus::Ready {
        return Err(SubmissionError::WrongStatus {
            job_id,
            expected: JobStatus::Ready,
        });
    }
    let job_type = registry
        .resolve(&job.job_type)
        .ok_or_else(|| SubmissionError::UnknownJobType(job.job_type.clone()))?;

    let ctx = JobContext::load(job, Arc::clone(store), env.clone()).await?;
    if !job_type.is_input_valid(&ctx) {
        return Err(SubmissionError::InvalidInput(job_id));
    }

    if !store
        .transition(job_id, JobStatus::Ready, JobStatus::Queued)
        .await?
    {
        return Err(SubmissionError::WrongStatus {
            job_id,
            expected: JobStatus::Ready,
        });
    }
    let job = store
        .find(job_id)
        .await?
        .ok_or(SubmissionError::JobNotFound(job_id))?;
    tracing::info!(job_id, job_type = %job.job_type, "Job queued");
    Ok(job)
}

/// Read-boundary view of a record for polling callers: status, the
/// type's mutated output, and the accumulated log.
#[derive(Debug, Clone, serde::Serialize)]
pub struct JobView {
    pub id: DbId,
    pub sample_code: String,
    pub name: String,
    pub job_type: String,
    pub display_name: String,
    pub status: JobStatus,
    pub output: oncoflow_core::document::Document,
    pub log: String,
}

/// Build the polling view of a record, running the job type's
/// `mutate_output` over the persisted output document.
pub async fn view(
    store: &Arc<dyn JobStore>,
    registry: &JobTypeRegistry,
    env: &PipelineEnv,
    job_id: DbId,
) -> Result<JobView, SubmissionError> {
    let job = store
        .find(job_id)
        .await?
        .ok_or(SubmissionError::JobNotFound(job_id))?;
    let display_name = registry.display_name_for(&job);
    let output = match registry.resolve(&job.job_type) {
        Some(job_type) => job_type.mutate_output(&job, env),
        None => job.output().clone(),
    };
    Ok(JobView {
        id: job.id,
        sample_code: job.effective_sample_code(),
        name: job.effective_name(&display_name, chrono::Utc::now()),
        job_type: job.job_type.clone(),
        display_name,
        status: job.status,
        output,
        log: job.log,
    })
}

/// Delete a record and its workspace. Refused while a worker may still
/// touch the record (`queued`, `processing`).
pub async fn delete(
    store: &Arc<dyn JobStore>,
    env: &PipelineEnv,
    job_id: DbId,
) -> Result<bool, SubmissionError> {
    if !store.delete(job_id).await? {
        return Ok(false);
    }
    if let Err(err) = env.workspace_for(job_id).delete() {
        tracing::warn!(job_id, error = %err, "Failed to remove job workspace");
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryJobStore;
    use crate::types::{self, tumor_only::TUMOR_ONLY};
    use oncoflow_core::document::Document;
    use oncoflow_core::workspace::WorkspacePolicy;
    use oncoflow_db::models::patient::Patient;
    use serde_json::json;
    use std::path::Path;

    fn test_env(root: &Path) -> PipelineEnv {
        PipelineEnv {
            storage_root: root.to_path_buf(),
            script_root: root.join("scripts"),
            public_base_url: "/storage".to_string(),
            workspace_policy: WorkspacePolicy { dir_mode: None },
        }
    }

    fn patient(id: i64) -> Patient {
        let now = chrono::Utc::now();
        Patient {
            id,
            code: format!("PAT-{id}"),
            first_name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            age: 61,
            gender: "female".to_string(),
            disease: "melanoma".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    fn new_job(parameters: serde_json::Value, patient_id: Option<i64>) -> NewJob {
        NewJob {
            job_type: TUMOR_ONLY.to_string(),
            sample_code: None,
            name: Some("submission test".to_string()),
            parameters: Document::from_value(parameters),
            patient_id,
        }
    }

    fn setup() -> (Arc<dyn JobStore>, Arc<MemoryJobStore>) {
        let memory = Arc::new(MemoryJobStore::new());
        memory.insert_patient(patient(5));
        (memory.clone() as Arc<dyn JobStore>, memory)
    }

    #[tokio::test]
    async fn schema_valid_submission_without_patient_is_accepted() {
        let (store, _memory) = setup();
        let registry = types::builtin_registry();

        let job = submit(&store, &registry, 1, new_job(json!({"vcf": "sample.vcf"}), None))
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Ready);
        assert_eq!(job.job_type, TUMOR_ONLY);
    }

    #[tokio::test]
    async fn unknown_job_type_is_rejected() {
        let (store, _memory) = setup();
        let registry = types::builtin_registry();

        let mut input = new_job(json!({"vcf": "sample.vcf"}), None);
        input.job_type = "no_such_analysis".to_string();
        let err = submit(&store, &registry, 1, input).await.unwrap_err();
        assert!(matches!(err, SubmissionError::UnknownJobType(_)));
    }

    #[tokio::test]
    async fn schema_violations_are_rejected() {
        let (store, _memory) = setup();
        let registry = types::builtin_registry();

        // No modality at all.
        let err = submit(&store, &registry, 1, new_job(json!({}), None))
            .await
            .unwrap_err();
        match err {
            SubmissionError::InvalidParameters(outcome) => {
                assert!(!outcome.is_valid);
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[tokio::test]
    async fn dangling_patient_reference_is_rejected() {
        let (store, _memory) = setup();
        let registry = types::builtin_registry();

        let err = submit(
            &store,
            &registry,
            1,
            new_job(json!({"vcf": "sample.vcf"}), Some(999)),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SubmissionError::PatientNotFound(999)));
    }

    #[tokio::test]
    async fn enqueue_requires_usable_input_files() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, _memory) = setup();
        let registry = types::builtin_registry();
        let env = test_env(tmp.path());

        let job = submit(
            &store,
            &registry,
            1,
            new_job(json!({"vcf": "sample.vcf"}), Some(5)),
        )
        .await
        .unwrap();

        // The referenced file does not exist yet.
        let err = enqueue(&store, &registry, &env, job.id).await.unwrap_err();
        assert!(matches!(err, SubmissionError::InvalidInput(_)));

        // Upload the file, then confirmation succeeds.
        let dir = env.workspace_for(job.id).dir().unwrap();
        std::fs::write(dir.join("sample.vcf"), "##fileformat=VCFv4.2\n").unwrap();
        let queued = enqueue(&store, &registry, &env, job.id).await.unwrap();
        assert_eq!(queued.status, JobStatus::Queued);

        // A second confirmation no-ops with a status error.
        let err = enqueue(&store, &registry, &env, job.id).await.unwrap_err();
        assert!(matches!(err, SubmissionError::WrongStatus { .. }));
    }

    #[tokio::test]
    async fn view_exposes_status_output_and_log() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, _memory) = setup();
        let registry = types::builtin_registry();
        let env = test_env(tmp.path());

        let job = submit(
            &store,
            &registry,
            1,
            new_job(json!({"vcf": "sample.vcf"}), Some(5)),
        )
        .await
        .unwrap();

        let view = view(&store, &registry, &env, job.id).await.unwrap();
        assert_eq!(view.status, JobStatus::Ready);
        assert_eq!(view.display_name, "Tumor Only");
        assert_eq!(view.name, "submission test");
        assert_eq!(view.sample_code, job.id.to_string());
        assert!(view.log.is_empty());
    }

    #[tokio::test]
    async fn delete_removes_record_and_workspace() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, memory) = setup();
        let registry = types::builtin_registry();
        let env = test_env(tmp.path());

        let job = submit(&store, &registry, 1, new_job(json!({"vcf": "s.vcf"}), None))
            .await
            .unwrap();
        let dir = env.workspace_for(job.id).dir().unwrap();
        std::fs::write(dir.join("s.vcf"), "x").unwrap();

        assert!(delete(&store, &env, job.id).await.unwrap());
        assert!(memory.job(job.id).is_none());
        assert!(!dir.exists());

        // Deleting an absent record reports false.
        assert!(!delete(&store, &env, job.id).await.unwrap());
    }
}
