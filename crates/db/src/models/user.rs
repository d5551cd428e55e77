//! User entity owning submitted jobs.

use oncoflow_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `users` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: DbId,
    pub name: String,
    pub email: String,
    pub admin: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
