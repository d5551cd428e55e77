//! Typed job status mapping to the Postgres `job_status` enum.
//!
//! Lifecycle semantics live in `oncoflow_core::job_state`; this enum is
//! the database-facing view and delegates every predicate through its
//! string representation.

use oncoflow_core::job_state;
use serde::{Deserialize, Serialize};

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "job_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Ready,
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Ready,
        JobStatus::Queued,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Ready => job_state::READY,
            JobStatus::Queued => job_state::QUEUED,
            JobStatus::Processing => job_state::PROCESSING,
            JobStatus::Completed => job_state::COMPLETED,
            JobStatus::Failed => job_state::FAILED,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }

    pub fn can_transition_to(self, to: JobStatus) -> bool {
        job_state::can_transition(self.as_str(), to.as_str())
    }

    pub fn can_be_modified(self) -> bool {
        job_state::can_be_modified(self.as_str())
    }

    pub fn can_be_deleted(self) -> bool {
        job_state::can_be_deleted(self.as_str())
    }

    pub fn should_not_run(self) -> bool {
        job_state::should_not_run(self.as_str())
    }

    pub fn has_completed(self) -> bool {
        job_state::has_completed(self.as_str())
    }

    pub fn is_terminal(self) -> bool {
        job_state::is_terminal(self.as_str())
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_mapping_matches_database_enum() {
        assert_eq!(JobStatus::Ready.as_str(), "ready");
        assert_eq!(JobStatus::Queued.as_str(), "queued");
        assert_eq!(JobStatus::Processing.as_str(), "processing");
        assert_eq!(JobStatus::Completed.as_str(), "completed");
        assert_eq!(JobStatus::Failed.as_str(), "failed");
    }

    #[test]
    fn parse_round_trips() {
        for status in JobStatus::ALL {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::parse("paused"), None);
    }

    #[test]
    fn lifecycle_edges() {
        assert!(JobStatus::Ready.can_transition_to(JobStatus::Queued));
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Processing));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Queued));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Processing));
    }

    #[test]
    fn predicates_for_every_status() {
        for status in JobStatus::ALL {
            assert_eq!(status.can_be_modified(), status == JobStatus::Ready);
            assert_eq!(
                status.can_be_deleted(),
                matches!(
                    status,
                    JobStatus::Ready | JobStatus::Completed | JobStatus::Failed
                )
            );
            assert_eq!(
                status.should_not_run(),
                matches!(
                    status,
                    JobStatus::Processing | JobStatus::Completed | JobStatus::Failed
                )
            );
            assert_eq!(status.has_completed(), status.is_terminal());
        }
    }
}
