//! Per-job execution context.
//!
//! A [`JobContext`] is the variant's explicit handle on the record during
//! execution: parameter access, output writes, log appends with commit
//! batching, workspace paths, and external command runs whose streamed
//! output feeds the log without blocking the process's own I/O.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use oncoflow_core::command::{self, ErrorCodeMap, MappedFailure};
use oncoflow_core::document::Document;
use oncoflow_core::error::ProcessingError;
use oncoflow_core::logtext;
use oncoflow_core::types::DbId;
use oncoflow_core::workspace::{JobWorkspace, WorkspacePolicy};
use oncoflow_db::models::job::Job;
use oncoflow_db::models::patient::Patient;
use serde_json::Value;

use crate::store::{JobStore, StoreError};

/// Shared environment for job execution: storage and script locations.
#[derive(Debug, Clone)]
pub struct PipelineEnv {
    /// Root of the storage area holding per-job workspaces.
    pub storage_root: PathBuf,
    /// Directory holding the pipeline shell scripts.
    pub script_root: PathBuf,
    /// Base URL under which the storage area is publicly served.
    pub public_base_url: String,
    /// Permission policy applied when a workspace is provisioned.
    pub workspace_policy: WorkspacePolicy,
}

impl PipelineEnv {
    /// Absolute path of a pipeline script.
    pub fn script_path(&self, script: &str) -> PathBuf {
        self.script_root.join(script)
    }

    /// Public URL for a storage-root-relative path.
    pub fn public_url(&self, relative: &str) -> String {
        format!(
            "{}/{}",
            self.public_base_url.trim_end_matches('/'),
            relative.trim_start_matches('/')
        )
    }

    /// The workspace of a given job.
    pub fn workspace_for(&self, job_id: DbId) -> JobWorkspace {
        JobWorkspace::new(&self.storage_root, job_id, self.workspace_policy)
    }
}

/// The executing job's handle on its record and surroundings.
pub struct JobContext {
    job: Job,
    patient: Option<Patient>,
    store: Arc<dyn JobStore>,
    env: PipelineEnv,
    workspace: JobWorkspace,
    output: Document,
    pending_log: String,
}

impl JobContext {
    /// Build a context for a record, resolving its patient reference.
    pub async fn load(
        job: Job,
        store: Arc<dyn JobStore>,
        env: PipelineEnv,
    ) -> Result<Self, StoreError> {
        let patient = match job.patient_id {
            Some(patient_id) => store.find_patient(patient_id).await?,
            None => None,
        };
        let workspace = env.workspace_for(job.id);
        let output = job.output().clone();
        Ok(Self {
            job,
            patient,
            store,
            env,
            workspace,
            output,
            pending_log: String::new(),
        })
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn patient(&self) -> Option<&Patient> {
        self.patient.as_ref()
    }

    pub fn workspace(&self) -> &JobWorkspace {
        &self.workspace
    }

    pub fn env(&self) -> &PipelineEnv {
        &self.env
    }

    /// Effective job name given the readable type name.
    pub fn job_name(&self, display_name: &str) -> String {
        self.job.effective_name(display_name, chrono::Utc::now())
    }

    /// Absolute path of a pipeline script.
    pub fn script_path(&self, script: &str) -> PathBuf {
        self.env.script_path(script)
    }

    // -----------------------------------------------------------------------
    // Parameters
    // -----------------------------------------------------------------------

    pub fn parameter(&self, path: &str) -> Option<&Value> {
        self.job.parameters().get(path)
    }

    pub fn parameter_str(&self, path: &str) -> Option<&str> {
        self.job.parameters().get_str(path)
    }

    pub fn parameter_bool_or(&self, path: &str, default: bool) -> bool {
        self.job.parameters().get_bool_or(path, default)
    }

    pub fn parameter_i64_or(&self, path: &str, default: i64) -> i64 {
        self.job.parameters().get_i64_or(path, default)
    }

    pub fn parameter_f64_or(&self, path: &str, default: f64) -> f64 {
        self.job.parameters().get_f64_or(path, default)
    }

    // -----------------------------------------------------------------------
    // Output
    // -----------------------------------------------------------------------

    pub fn get_output(&self, path: &str) -> Option<&Value> {
        self.output.get(path)
    }

    /// Object keyed by the requested dotted paths, absent paths filled
    /// with `default`.
    pub fn output_slice(&self, paths: &[&str], default: Value) -> Value {
        self.output.slice(paths, default)
    }

    /// Set one output value at a dotted path and persist the document.
    pub async fn set_output(
        &mut self,
        path: &str,
        value: impl Into<Value> + Send,
    ) -> Result<(), StoreError> {
        self.output.set(path, value);
        self.persist_output().await
    }

    /// Set multiple output values at once, then persist the document in a
    /// single write.
    pub async fn set_output_many<I>(&mut self, entries: I) -> Result<(), StoreError>
    where
        I: IntoIterator<Item = (&'static str, Value)> + Send,
    {
        self.output.set_many(entries);
        self.persist_output().await
    }

    async fn persist_output(&mut self) -> Result<(), StoreError> {
        let written = self.store.update_output(self.job.id, &self.output).await?;
        if !written {
            // Only a processing record accepts output; a rejected write
            // still leaves the in-memory document usable.
            tracing::debug!(job_id = self.job.id, "Output write rejected by store");
        }
        self.job.job_output = sqlx::types::Json(self.output.clone());
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Log sink
    // -----------------------------------------------------------------------

    /// Append sanitized text to the job log.
    ///
    /// With `commit = false` the text is buffered; the next committing
    /// append flushes the whole buffer in one persistence write.
    pub async fn append_log(
        &mut self,
        text: &str,
        with_newline: bool,
        commit: bool,
    ) -> Result<(), StoreError> {
        let mut clean = logtext::sanitize(text);
        if with_newline {
            clean.push('\n');
        }
        self.pending_log.push_str(&clean);
        if commit {
            self.flush_log().await?;
        }
        Ok(())
    }

    /// Append a line to the job log and persist it immediately.
    pub async fn log(&mut self, text: &str) -> Result<(), StoreError> {
        self.append_log(text, true, true).await
    }

    /// Flush any buffered log text to the store.
    pub async fn flush_log(&mut self) -> Result<(), StoreError> {
        if self.pending_log.is_empty() {
            return Ok(());
        }
        let chunk = std::mem::take(&mut self.pending_log);
        self.store.append_log(self.job.id, &chunk).await?;
        self.job.log.push_str(&chunk);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // External commands
    // -----------------------------------------------------------------------

    /// Run an external command inside the job workspace.
    ///
    /// Output chunks stream to the job log as they arrive; the streaming
    /// side never blocks the process's own I/O. Non-zero exits are
    /// translated through `error_map`: ignored codes are soft successes
    /// (noted in the log), everything else becomes a [`ProcessingError`].
    pub async fn run_command(
        &mut self,
        argv: &[String],
        timeout: Option<Duration>,
        error_map: &ErrorCodeMap,
    ) -> Result<String, ProcessingError> {
        self.flush_log().await?;
        let cwd = self
            .workspace
            .dir()
            .map_err(ProcessingError::wrap)?;

        // Chunks go through a channel to a drain task that batches and
        // persists them, so the callback itself is fire-and-forget.
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();
        let store = Arc::clone(&self.store);
        let job_id = self.job.id;
        let drain = tokio::spawn(async move {
            let mut appended = String::new();
            while let Some(first) = rx.recv().await {
                let mut batch = first;
                while let Ok(more) = rx.try_recv() {
                    batch.push_str(&more);
                }
                let clean = logtext::sanitize(&batch);
                if clean.is_empty() {
                    continue;
                }
                if let Err(err) = store.append_log(job_id, &clean).await {
                    tracing::warn!(job_id, error = %err, "Failed to stream log chunk");
                }
                appended.push_str(&clean);
            }
            appended
        });

        let result = command::run(argv, Some(&cwd), timeout, move |chunk| {
            let _ = tx.send(chunk.to_string());
        })
        .await;

        // The callback (and with it the channel sender) is gone once the
        // run returns, so the drain task finishes with the appended text.
        let appended = drain.await.unwrap_or_default();
        self.job.log.push_str(&appended);

        match result {
            Ok(stdout) => Ok(stdout),
            Err(err) => match command::translate(err, error_map) {
                MappedFailure::Ignored { code, stdout } => {
                    self.log(&format!("Command exited with code {code}; ignored."))
                        .await?;
                    Ok(stdout)
                }
                MappedFailure::Fatal(err) => Err(err),
            },
        }
    }

    // -----------------------------------------------------------------------
    // Files
    // -----------------------------------------------------------------------

    /// Move a file out of the workspace to any destination. Missing
    /// sources are skipped silently; returns whether a move happened.
    pub fn move_file(
        &self,
        source: Option<&str>,
        destination: &Path,
    ) -> std::io::Result<bool> {
        let Some(source) = self.workspace.resolve_input(source) else {
            return Ok(false);
        };
        std::fs::rename(source, destination)?;
        Ok(true)
    }
}

impl From<StoreError> for ProcessingError {
    fn from(err: StoreError) -> Self {
        ProcessingError::wrap(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryJobStore;
    use oncoflow_db::models::job::NewJob;
    use oncoflow_db::models::status::JobStatus;
    use serde_json::json;
    use std::collections::HashMap;

    fn env(root: &Path) -> PipelineEnv {
        PipelineEnv {
            storage_root: root.to_path_buf(),
            script_root: root.join("scripts"),
            public_base_url: "/storage".to_string(),
            workspace_policy: WorkspacePolicy { dir_mode: None },
        }
    }

    async fn processing_context(
        root: &Path,
        parameters: serde_json::Value,
    ) -> (Arc<MemoryJobStore>, JobContext) {
        let store = Arc::new(MemoryJobStore::new());
        let job = store
            .create(
                1,
                &NewJob {
                    job_type: "tumor_only".to_string(),
                    sample_code: None,
                    name: Some("ctx test".to_string()),
                    parameters: Document::from_value(parameters),
                    patient_id: None,
                },
            )
            .await
            .unwrap();
        store
            .transition(job.id, JobStatus::Ready, JobStatus::Queued)
            .await
            .unwrap();
        store
            .transition(job.id, JobStatus::Queued, JobStatus::Processing)
            .await
            .unwrap();
        let job = store.job(job.id).unwrap();
        let ctx = JobContext::load(job, store.clone() as Arc<dyn JobStore>, env(root))
            .await
            .unwrap();
        (store, ctx)
    }

    #[tokio::test]
    async fn set_output_round_trips_dotted_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, mut ctx) = processing_context(tmp.path(), json!({})).await;

        ctx.set_output("a.b", 1).await.unwrap();
        assert_eq!(ctx.get_output("a.b"), Some(&json!(1)));

        ctx.set_output("x.y", 2).await.unwrap();
        let slice = ctx.output_slice(&["x.y", "missing"], json!(0));
        assert_eq!(slice, json!({"x.y": 2, "missing": 0}));

        let persisted = store.job(ctx.job().id).unwrap();
        assert_eq!(persisted.output().get("a.b"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn parameter_accessors_apply_defaults_and_coercions() {
        let tmp = tempfile::tempdir().unwrap();
        let (_store, ctx) = processing_context(
            tmp.path(),
            json!({"vcf": "s.vcf", "paired": "1", "threads": "4", "depthFilter": {"value": 2.5}}),
        )
        .await;

        assert_eq!(ctx.parameter_str("vcf"), Some("s.vcf"));
        assert!(ctx.parameter_bool_or("paired", false));
        assert_eq!(ctx.parameter_i64_or("threads", 1), 4);
        assert_eq!(ctx.parameter_f64_or("depthFilter.value", 0.0), 2.5);
        assert_eq!(ctx.parameter_i64_or("missing", 7), 7);
        assert_eq!(ctx.parameter("depthFilter.value"), Some(&json!(2.5)));
    }

    #[tokio::test]
    async fn log_batching_bounds_persistence_writes() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, mut ctx) = processing_context(tmp.path(), json!({})).await;

        let before = store.log_write_count();
        ctx.append_log("step 1", true, false).await.unwrap();
        ctx.append_log("step 2", true, false).await.unwrap();
        assert_eq!(store.log_write_count(), before);

        ctx.append_log("step 3", true, true).await.unwrap();
        assert_eq!(store.log_write_count(), before + 1);
        assert_eq!(
            store.job(ctx.job().id).unwrap().log,
            "step 1\nstep 2\nstep 3\n"
        );
    }

    #[tokio::test]
    async fn log_appends_are_sanitized() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, mut ctx) = processing_context(tmp.path(), json!({})).await;

        ctx.append_log("progress...\rdone\x1b[31m", false, true)
            .await
            .unwrap();
        assert_eq!(store.job(ctx.job().id).unwrap().log, "done");
    }

    #[tokio::test]
    async fn run_command_streams_output_into_the_log() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, mut ctx) = processing_context(tmp.path(), json!({})).await;

        let argv: Vec<String> = ["sh", "-c", "printf 'aligning reads\\n'"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let stdout = ctx.run_command(&argv, None, &HashMap::new()).await.unwrap();
        assert_eq!(stdout, "aligning reads\n");
        assert!(store.job(ctx.job().id).unwrap().log.contains("aligning reads"));
        assert!(ctx.job().log.contains("aligning reads"));
    }

    #[tokio::test]
    async fn run_command_translates_mapped_exit_codes() {
        let tmp = tempfile::tempdir().unwrap();
        let (_store, mut ctx) = processing_context(tmp.path(), json!({})).await;

        let argv: Vec<String> = ["sh", "-c", "exit 106"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let map = HashMap::from([(106, command::ExitAction::Fail("Unable to call variants"))]);
        let err = ctx.run_command(&argv, None, &map).await.unwrap_err();
        assert_eq!(err.message(), "Unable to call variants");
        assert_eq!(err.code(), Some(106));
    }

    #[tokio::test]
    async fn run_command_treats_ignored_codes_as_success() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, mut ctx) = processing_context(tmp.path(), json!({})).await;

        let argv: Vec<String> = ["sh", "-c", "exit 21"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let map = HashMap::from([(21, command::ExitAction::Ignore)]);
        ctx.run_command(&argv, None, &map).await.unwrap();
        assert!(store
            .job(ctx.job().id)
            .unwrap()
            .log
            .contains("exited with code 21; ignored"));
    }

    #[tokio::test]
    async fn move_file_skips_missing_sources() {
        let tmp = tempfile::tempdir().unwrap();
        let (_store, ctx) = processing_context(tmp.path(), json!({})).await;

        let dest = tmp.path().join("exported.bam");
        assert!(!ctx.move_file(Some("missing.bam"), &dest).unwrap());

        let dir = ctx.workspace().dir().unwrap();
        std::fs::write(dir.join("result.bam"), "BAM").unwrap();
        assert!(ctx.move_file(Some("result.bam"), &dest).unwrap());
        assert!(dest.is_file());
        assert!(!dir.join("result.bam").exists());
    }

    #[test]
    fn public_url_joins_cleanly() {
        let tmp = tempfile::tempdir().unwrap();
        let env = env(tmp.path());
        assert_eq!(env.public_url("jobs/1/report.html"), "/storage/jobs/1/report.html");
        assert_eq!(env.public_url("/jobs/1/report.html"), "/storage/jobs/1/report.html");
    }
}
