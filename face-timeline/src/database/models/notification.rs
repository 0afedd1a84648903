//! Notification feed database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A persisted user-facing notification.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct NotificationDbModel {
    pub id: i64,
    /// One of `info`, `success`, `warning`, `error`.
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    pub icon: Option<String>,
    pub read: bool,
    /// Unix epoch milliseconds.
    pub created_at: i64,
}
