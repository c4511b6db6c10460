//! Notice creation and read-state.

use serde::Serialize;
use sqlx::SqliteConnection;

use crate::{
    Result,
    auth::ActorContext,
    db::{Db, now_millis, tables::notice::Notice},
};

/// Actions value for notices that carry no client directive.
pub const NO_ACTIONS: &str = "[]";
/// How many unread notices a client is shown at once.
const UNREAD_LIMIT: i64 = 10;

/// A notice about to be written for a single recipient.
#[derive(Debug, Clone)]
pub struct NewNotice {
    pub recipient: i64,
    pub sender: i64,
    pub title: String,
    pub content: String,
    pub detail: String,
    pub actions: String,
}

/// Write one notice on `conn`, returning its id.
pub async fn insert_notice(conn: &mut SqliteConnection, notice: &NewNotice) -> Result<i64> {
    let id = sqlx::query_scalar(
        r#"
        INSERT INTO notice (by_user_id, sender_user_id, title, content, detail, actions, time)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id
        "#,
    )
    .bind(notice.recipient)
    .bind(notice.sender)
    .bind(&notice.title)
    .bind(&notice.content)
    .bind(&notice.detail)
    .bind(&notice.actions)
    .bind(now_millis())
    .fetch_one(conn)
    .await?;
    Ok(id)
}

#[derive(Debug, Serialize)]
pub struct Unread {
    pub list: Vec<Notice>,
    pub count: i64,
}

/// The actor's most recent unread notices and their total count.
pub async fn unread(db: &Db, actor: &ActorContext) -> Result<Unread> {
    let list = sqlx::query_as(
        r#"
        SELECT * FROM notice
            WHERE by_user_id = ? AND read_status = 0
            ORDER BY time DESC, id DESC
            LIMIT ?
        "#,
    )
    .bind(actor.user_id)
    .bind(UNREAD_LIMIT)
    .fetch_all(db)
    .await?;

    let count = sqlx::query_scalar(
        "SELECT COUNT(*) FROM notice WHERE by_user_id = ? AND read_status = 0",
    )
    .bind(actor.user_id)
    .fetch_one(db)
    .await?;

    Ok(Unread { list, count })
}

/// Mark every notice addressed to the actor as read. Returns how many changed.
pub async fn mark_all_read(db: &Db, actor: &ActorContext) -> Result<u64> {
    let result =
        sqlx::query("UPDATE notice SET read_status = 1 WHERE by_user_id = ? AND read_status = 0")
            .bind(actor.user_id)
            .execute(db)
            .await?;
    Ok(result.rows_affected())
}
