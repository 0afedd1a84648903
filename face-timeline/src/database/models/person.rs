//! Person database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A known person in the catalog. `photo_path` is relative to the faces directory.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct PersonDbModel {
    pub id: i64,
    pub name: String,
    pub photo_path: String,
    /// Unix epoch milliseconds.
    pub created_at: i64,
}
