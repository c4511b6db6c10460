//! Per-recipient message table definitions.

use serde::Serialize;
use sqlx::FromRow;

/// `sender_user_id` of notices generated by the workflow itself.
pub const SYSTEM_SENDER: i64 = -1;

/// A row from the `notice` table. Only `read_status` changes after insertion.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Notice {
    pub id: i64,
    /// The recipient.
    pub by_user_id: i64,
    pub sender_user_id: i64,
    pub title: String,
    pub content: String,
    #[serde(rename = "desc")]
    pub detail: String,
    /// Client-side action directives, stored as a JSON array.
    pub actions: String,
    pub time: i64,
    pub read_status: bool,
}
