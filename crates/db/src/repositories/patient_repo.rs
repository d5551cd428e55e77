//! Repository for the `patients` table.

use oncoflow_core::types::DbId;
use sqlx::PgPool;

use crate::models::patient::Patient;

const COLUMNS: &str = "\
    id, code, first_name, last_name, age, gender, disease, \
    created_at, updated_at";

/// Read access to patients referenced by jobs.
pub struct PatientRepo;

impl PatientRepo {
    /// Find a patient by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Patient>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM patients WHERE id = $1");
        sqlx::query_as::<_, Patient>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}
