//! Job entity models and DTOs for the analysis job queue.

use oncoflow_core::document::Document;
use oncoflow_core::timefmt;
use oncoflow_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

use super::status::JobStatus;

/// A row from the `jobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Job {
    pub id: DbId,
    pub sample_code: Option<String>,
    pub name: Option<String>,
    /// Type discriminator selecting the analysis variant. Set at creation,
    /// never changes.
    pub job_type: String,
    pub status: JobStatus,
    pub job_parameters: Json<Document>,
    pub job_output: Json<Document>,
    /// Append-only execution log.
    pub log: String,
    pub patient_id: Option<DbId>,
    pub user_id: DbId,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Job {
    pub fn parameters(&self) -> &Document {
        &self.job_parameters.0
    }

    pub fn output(&self) -> &Document {
        &self.job_output.0
    }

    /// The sample code, falling back to the stringified id when unset.
    pub fn effective_sample_code(&self) -> String {
        match &self.sample_code {
            Some(code) if !code.is_empty() => code.clone(),
            _ => self.id.to_string(),
        }
    }

    /// The job name, falling back to
    /// "`<display name>` Job of `<relative creation time>`" when unset.
    /// `display_name` is the readable name of the job's type.
    pub fn effective_name(&self, display_name: &str, now: Timestamp) -> String {
        match &self.name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!(
                "{display_name} Job of {}",
                timefmt::ago(self.created_at, now)
            ),
        }
    }
}

/// Input for creating a new job record.
#[derive(Debug, Clone, Deserialize)]
pub struct NewJob {
    pub job_type: String,
    #[serde(default)]
    pub sample_code: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub parameters: Document,
    #[serde(default)]
    pub patient_id: Option<DbId>,
}

/// Query parameters for job listings.
#[derive(Debug, Default, Deserialize)]
pub struct JobListQuery {
    /// Filter by lifecycle status.
    pub status: Option<JobStatus>,
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use serde_json::json;

    fn job(sample_code: Option<&str>, name: Option<&str>) -> Job {
        let created = Utc::now() - Duration::hours(3);
        Job {
            id: 17,
            sample_code: sample_code.map(str::to_string),
            name: name.map(str::to_string),
            job_type: "tumor_only".to_string(),
            status: JobStatus::Ready,
            job_parameters: Json(Document::from_value(json!({"vcf": "sample.vcf"}))),
            job_output: Json(Document::new()),
            log: String::new(),
            patient_id: None,
            user_id: 1,
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn sample_code_falls_back_to_id() {
        assert_eq!(job(None, None).effective_sample_code(), "17");
        assert_eq!(job(Some(""), None).effective_sample_code(), "17");
        assert_eq!(job(Some("S-01"), None).effective_sample_code(), "S-01");
    }

    #[test]
    fn name_falls_back_to_type_and_relative_time() {
        let j = job(None, None);
        let name = j.effective_name("Tumor Only", Utc::now());
        assert_eq!(name, "Tumor Only Job of 3 hours ago");
    }

    #[test]
    fn explicit_name_wins() {
        let j = job(None, Some("My run"));
        assert_eq!(j.effective_name("Tumor Only", Utc::now()), "My run");
    }
}
