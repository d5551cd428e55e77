//! Patient entity, at the boundary the engine consumes.
//!
//! Jobs reference patients; they never own them. Only the fields the
//! pipeline command lines need are modeled here.

use oncoflow_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `patients` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Patient {
    pub id: DbId,
    /// Stable patient identifier used on pipeline command lines.
    pub code: String,
    pub first_name: String,
    pub last_name: String,
    pub age: i32,
    pub gender: String,
    /// Diagnosed disease name.
    pub disease: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
