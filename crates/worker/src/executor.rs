//! Per-job execution with the terminal-state guarantee.
//!
//! The executor owns the job lifecycle around a variant's `handle`: the
//! atomic claim, the pre-flight guards, and the promise that every
//! claimed record ends in `completed` or `failed`, panicking variants
//! included. No automatic retry happens here; recovery is manual
//! resubmission as a new record.

use std::sync::Arc;

use oncoflow_core::error::ProcessingError;
use oncoflow_core::types::DbId;
use oncoflow_db::models::job::Job;
use oncoflow_db::models::status::JobStatus;
use oncoflow_pipeline::context::{JobContext, PipelineEnv};
use oncoflow_pipeline::contract::{JobType, PatientInputState};
use oncoflow_pipeline::registry::JobTypeRegistry;
use oncoflow_pipeline::store::{JobStore, StoreError};

/// What happened to a record handed to the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Completed,
    Failed,
    /// The record was not runnable or another worker claimed it first.
    Skipped,
}

/// Executes one claimed job at a time, synchronously.
pub struct Executor {
    store: Arc<dyn JobStore>,
    registry: Arc<JobTypeRegistry>,
    env: PipelineEnv,
}

impl Executor {
    pub fn new(
        store: Arc<dyn JobStore>,
        registry: Arc<JobTypeRegistry>,
        env: PipelineEnv,
    ) -> Self {
        Self {
            store,
            registry,
            env,
        }
    }

    /// Run a record through its job type, leaving it in a terminal state.
    ///
    /// Only `queued` records run. The queued→processing claim is a
    /// compare-and-set: of two workers handed the same record, exactly
    /// one proceeds and the other observes a lost claim and no-ops.
    pub async fn execute(&self, job: Job) -> Result<ExecutionOutcome, StoreError> {
        if job.status.should_not_run() {
            tracing::warn!(
                job_id = job.id,
                status = %job.status,
                "Refusing to run job in non-runnable status",
            );
            return Ok(ExecutionOutcome::Skipped);
        }

        if !self
            .store
            .transition(job.id, JobStatus::Queued, JobStatus::Processing)
            .await?
        {
            tracing::debug!(job_id = job.id, "Claim lost; another worker owns the job");
            return Ok(ExecutionOutcome::Skipped);
        }

        let job_id = job.id;
        let Some(job_type) = self.registry.resolve(&job.job_type).cloned() else {
            tracing::error!(job_id, job_type = %job.job_type, "Unknown job type");
            let message = format!("Unknown job type: {}.", job.job_type);
            self.append_failure_log(job_id, &message).await;
            self.finish(job_id, JobStatus::Failed).await?;
            return Ok(ExecutionOutcome::Failed);
        };

        // Reload so the context sees the processing-status row.
        let job = self
            .store
            .find(job_id)
            .await?
            .ok_or(StoreError::JobNotFound(job_id))?;
        let mut ctx = JobContext::load(job, Arc::clone(&self.store), self.env.clone()).await?;

        if let Err(err) = self.preflight(&job_type, &ctx) {
            return self.fail(ctx, &job_type, err).await;
        }

        tracing::info!(job_id, job_type = %job_type.discriminator(), "Job execution started");

        // The handler runs in its own task so a panicking variant still
        // leaves a terminal record instead of a stuck `processing` one.
        let handler = Arc::clone(&job_type);
        let outcome = tokio::spawn(async move {
            let result = handler.handle(&mut ctx).await;
            (ctx, result)
        })
        .await;

        match outcome {
            Ok((_ctx, Ok(()))) => {
                self.finish(job_id, JobStatus::Completed).await?;
                tracing::info!(job_id, "Job completed");
                Ok(ExecutionOutcome::Completed)
            }
            Ok((ctx, Err(err))) => self.fail(ctx, &job_type, err).await,
            Err(join_err) => {
                tracing::error!(job_id, error = %join_err, "Job handler panicked");
                let wrapped =
                    ProcessingError::new("An unexpected error occurred during job processing.");
                // The context died with the task; rebuild one so the
                // failure is logged and partial artifacts can be cleaned.
                let job = self
                    .store
                    .find(job_id)
                    .await?
                    .ok_or(StoreError::JobNotFound(job_id))?;
                let ctx =
                    JobContext::load(job, Arc::clone(&self.store), self.env.clone()).await?;
                self.fail(ctx, &job_type, wrapped).await
            }
        }
    }

    /// Guards evaluated after the claim, before the handler runs.
    fn preflight(
        &self,
        job_type: &Arc<dyn JobType>,
        ctx: &JobContext,
    ) -> Result<(), ProcessingError> {
        match job_type.patient_input_state() {
            PatientInputState::Required if ctx.patient().is_none() => {
                return Err(ProcessingError::new(
                    "This job is not tied to any patient. Unable to run the analysis.",
                ));
            }
            PatientInputState::None if ctx.patient().is_some() => {
                return Err(ProcessingError::new(
                    "This job must not be tied to a patient.",
                ));
            }
            _ => {}
        }
        if !job_type.is_input_valid(ctx) {
            return Err(ProcessingError::new(
                "Invalid input data. Unable to run the analysis.",
            ));
        }
        Ok(())
    }

    /// Record a failure: message into the log, variant cleanup, terminal
    /// status.
    async fn fail(
        &self,
        mut ctx: JobContext,
        job_type: &Arc<dyn JobType>,
        err: ProcessingError,
    ) -> Result<ExecutionOutcome, StoreError> {
        let job_id = ctx.job().id;
        tracing::warn!(job_id, error = %err, "Job failed");
        if let Err(log_err) = ctx.log(err.message()).await {
            tracing::error!(job_id, error = %log_err, "Failed to record failure in job log");
        }
        job_type.cleanup_on_fail(&mut ctx).await;
        self.finish(job_id, JobStatus::Failed).await?;
        Ok(ExecutionOutcome::Failed)
    }

    async fn append_failure_log(&self, job_id: DbId, message: &str) {
        if let Err(err) = self.store.append_log(job_id, &format!("{message}\n")).await {
            tracing::error!(job_id, error = %err, "Failed to record failure in job log");
        }
    }

    async fn finish(&self, job_id: DbId, status: JobStatus) -> Result<(), StoreError> {
        if !self
            .store
            .transition(job_id, JobStatus::Processing, status)
            .await?
        {
            tracing::error!(job_id, %status, "Terminal transition lost; record left as-is");
        }
        Ok(())
    }
}
