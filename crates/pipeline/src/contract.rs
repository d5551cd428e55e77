//! The capability set every analysis variant implements.

use async_trait::async_trait;
use oncoflow_core::document::Document;
use oncoflow_core::error::ProcessingError;
use oncoflow_db::models::job::Job;

use crate::context::{JobContext, PipelineEnv};
use crate::validation::FieldRule;

/// Whether a job variant must, may, or must not be tied to a patient.
/// Enforced before execution begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatientInputState {
    Required,
    Optional,
    None,
}

/// Help entry for one parameter or output value. Grouped parameters
/// (e.g. a filter with `comparison` and `value` sub-fields) nest one
/// level.
#[derive(Debug, Clone, Copy)]
pub enum SpecEntry {
    Help(&'static str),
    Group(&'static [(&'static str, &'static str)]),
}

/// An analysis variant: validation and execution logic for one job type.
///
/// Implementations are stateless; all per-job state lives in the
/// [`JobContext`] handed to `handle`. Accessor and mutator access to the
/// underlying record goes through the context's explicit methods.
#[async_trait]
pub trait JobType: Send + Sync {
    /// The `job_type` discriminator this implementation is registered
    /// under.
    fn discriminator(&self) -> &'static str;

    /// Readable name shown for this job type.
    fn display_name(&self) -> &'static str;

    /// One-line description of what the analysis does.
    fn description(&self) -> &'static str;

    /// For each input parameter, a human-readable constraint description.
    fn parameters_spec(&self) -> Vec<(&'static str, SpecEntry)>;

    /// For each output value, a human-readable description.
    fn output_spec(&self) -> Vec<(&'static str, &'static str)>;

    /// Schema-level validation rules, evaluated against the parameter
    /// document before a record leaves `ready`.
    fn validation_spec(&self) -> Vec<FieldRule>;

    /// Patient association requirement for this variant.
    fn patient_input_state(&self) -> PatientInputState;

    /// Business-rule validation beyond the schema (e.g. "exactly one
    /// input modality supplied"). The default accepts everything.
    fn is_input_valid(&self, ctx: &JobContext) -> bool {
        let _ = ctx;
        true
    }

    /// Execute the analysis to completion.
    ///
    /// Returning an error puts the record in `failed` with the message in
    /// its log. Implementations map every failure into a
    /// [`ProcessingError`]; the executor additionally wraps panics so the
    /// record always reaches a terminal state.
    async fn handle(&self, ctx: &mut JobContext) -> Result<(), ProcessingError>;

    /// Shape the persisted output for external consumption. The default
    /// is a passthrough; variants may attach computed values (e.g. URLs)
    /// without mutating the record.
    fn mutate_output(&self, job: &Job, env: &PipelineEnv) -> Document {
        let _ = env;
        job.output().clone()
    }

    /// Remove partial artifacts after a failed run. The default does
    /// nothing; failed-run artifacts then stay in the workspace.
    async fn cleanup_on_fail(&self, ctx: &mut JobContext) {
        let _ = ctx;
    }
}
