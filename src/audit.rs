//! Review state machine for apps and their download mirrors.
//!
//! An app moves `Pending -> Approved | Rejected` on review and back to `Pending`
//! whenever its reviewable metadata is edited (see [`crate::apps::update_app`]).
//! Each mirror carries its own status, reviewed independently of the app.
//!
//! Every transition is a conditional `UPDATE ... WHERE audit_status != target`,
//! so a decision that would not change anything is reported as a conflict
//! instead of being applied (and announced) a second time.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};
use tracing::info;

use crate::{
    Error, Result,
    auth::ActorContext,
    config::PolicyConfig,
    db::{
        self, Db,
        pagination::{PageRequest, Paged},
        tables::market::{AppDownload, AuditStatus, MirrorKind},
    },
    metrics::{APP_AUDITS, MIRROR_AUDITS},
    notices::{NO_ACTIONS, NewNotice, insert_notice},
};

/// A validated review outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditDecision {
    status: AuditStatus,
    reason: String,
}

impl AuditDecision {
    /// Approve when `success`, otherwise reject. A rejection must say why.
    pub fn new(success: bool, reason: impl Into<String>) -> Result<Self> {
        let reason = reason.into().trim().to_owned();
        if !success && reason.is_empty() {
            return Err(Error::validation("rejecting an app requires a reason"));
        }
        Ok(Self {
            status: if success {
                AuditStatus::Approved
            } else {
                AuditStatus::Rejected
            },
            reason,
        })
    }

    pub const fn status(&self) -> AuditStatus {
        self.status
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

const fn mirror_status(success: bool) -> AuditStatus {
    if success {
        AuditStatus::Approved
    } else {
        AuditStatus::Rejected
    }
}

/// Explain why a conditional transition matched no row.
async fn missing_or_unchanged(
    conn: &mut SqliteConnection,
    table: &'static str,
    id: i64,
    target: AuditStatus,
) -> Error {
    let query = format!("SELECT audit_status FROM {table} WHERE id = ?");
    match sqlx::query_scalar::<_, AuditStatus>(&query)
        .bind(id)
        .fetch_optional(conn)
        .await
    {
        Ok(None) => Error::not_found(format!("{table} {id} does not exist")),
        Ok(Some(_)) => Error::conflict(format!("{table} {id} is already {target:?}")),
        Err(e) => e.into(),
    }
}

fn decision_notice(
    actor: &ActorContext,
    owner: i64,
    app_name: &str,
    decision: &AuditDecision,
) -> NewNotice {
    let (title, content) = match decision.status {
        AuditStatus::Approved => (
            "App approved",
            format!(
                "Your app \"{app_name}\" was approved by reviewer {}.",
                actor.display_name
            ),
        ),
        _ => (
            "App rejected",
            format!(
                "Your app \"{app_name}\" was rejected by reviewer {}. Reason: {}",
                actor.display_name, decision.reason
            ),
        ),
    };
    NewNotice {
        recipient: owner,
        sender: actor.user_id,
        title: title.to_owned(),
        content,
        detail: String::new(),
        actions: NO_ACTIONS.to_owned(),
    }
}

/// Record a review decision on an app and tell its uploader.
///
/// The status change and the uploader's notice commit together.
pub async fn audit_app(
    db: &Db,
    policy: &PolicyConfig,
    actor: &ActorContext,
    app_id: i64,
    decision: &AuditDecision,
) -> Result<AuditStatus> {
    actor.require(policy.review)?;

    let mut tx = db::begin(db).await?;
    let updated: Option<(i64, String)> = sqlx::query_as(
        r#"
        UPDATE app SET audit_status = ?, audit_reason = ?, audit_user = ?
            WHERE id = ? AND audit_status != ?
            RETURNING by_user_id, app_name
        "#,
    )
    .bind(decision.status)
    .bind(&decision.reason)
    .bind(actor.user_id)
    .bind(app_id)
    .bind(decision.status)
    .fetch_optional(&mut *tx)
    .await?;

    let Some((owner, app_name)) = updated else {
        return Err(missing_or_unchanged(&mut tx, "app", app_id, decision.status).await);
    };

    let _ = insert_notice(&mut tx, &decision_notice(actor, owner, &app_name, decision)).await?;
    tx.commit().await?;

    metrics::counter!(APP_AUDITS).increment(1);
    info!(app_id, status = ?decision.status, reviewer = actor.user_id, "audited app");
    Ok(decision.status)
}

/// Record a review decision on a single mirror. No notice is sent.
pub async fn audit_download(
    db: &Db,
    policy: &PolicyConfig,
    actor: &ActorContext,
    download_id: i64,
    success: bool,
) -> Result<AuditStatus> {
    actor.require(policy.review)?;
    let target = mirror_status(success);

    let mut conn = db.acquire().await?;
    let updated = sqlx::query(
        "UPDATE app_download SET audit_status = ? WHERE id = ? AND audit_status != ?",
    )
    .bind(target)
    .bind(download_id)
    .bind(target)
    .execute(&mut *conn)
    .await?
    .rows_affected();
    if updated == 0 {
        return Err(missing_or_unchanged(&mut conn, "app_download", download_id, target).await);
    }

    metrics::counter!(MIRROR_AUDITS).increment(1);
    info!(download_id, status = ?target, reviewer = actor.user_id, "audited mirror");
    Ok(target)
}

/// Status given to an alternate mirror when `actor` adds it.
pub fn initial_mirror_status(policy: &PolicyConfig, actor: &ActorContext) -> AuditStatus {
    if actor.trust >= policy.mirror_auto_approve {
        AuditStatus::Approved
    } else {
        AuditStatus::Pending
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewMirror {
    pub name: String,
    pub url: String,
}

async fn app_owner(db: &Db, app_id: i64) -> Result<i64> {
    sqlx::query_scalar("SELECT by_user_id FROM app WHERE id = ?")
        .bind(app_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| Error::not_found(format!("app {app_id} does not exist")))
}

/// Add a user-supplied alternate mirror to an app.
pub async fn add_mirror(
    db: &Db,
    policy: &PolicyConfig,
    actor: &ActorContext,
    app_id: i64,
    mirror: &NewMirror,
) -> Result<AppDownload> {
    let name = mirror.name.trim();
    let url = mirror.url.trim();
    if name.is_empty() || url.is_empty() {
        return Err(Error::validation("a mirror needs both a name and a url"));
    }

    let owner = app_owner(db, app_id).await?;
    actor.require_owner_or(owner, policy.review)?;

    let status = initial_mirror_status(policy, actor);
    let download: AppDownload = sqlx::query_as(
        r#"
        INSERT INTO app_download (app_id, name, url, is_extra, audit_status)
            VALUES (?, ?, ?, ?, ?)
            RETURNING *
        "#,
    )
    .bind(app_id)
    .bind(name)
    .bind(url)
    .bind(MirrorKind::Alternate)
    .bind(status)
    .fetch_one(db)
    .await?;

    info!(app_id, download_id = download.id, status = ?status, "added mirror");
    Ok(download)
}

/// Remove an alternate mirror. The primary mirror lives as long as its app.
pub async fn delete_mirror(
    db: &Db,
    policy: &PolicyConfig,
    actor: &ActorContext,
    download_id: i64,
) -> Result<()> {
    let found: Option<(MirrorKind, i64)> = sqlx::query_as(
        r#"
        SELECT d.is_extra, a.by_user_id
            FROM app_download d
            JOIN app a ON a.id = d.app_id
            WHERE d.id = ?
        "#,
    )
    .bind(download_id)
    .fetch_optional(db)
    .await?;
    let Some((kind, owner)) = found else {
        return Err(Error::not_found(format!("mirror {download_id} does not exist")));
    };

    actor.require_owner_or(owner, policy.edit_others)?;
    if kind == MirrorKind::Primary {
        return Err(Error::validation("the primary mirror cannot be deleted"));
    }

    let _ = sqlx::query("DELETE FROM app_download WHERE id = ? AND is_extra = ?")
        .bind(download_id)
        .bind(MirrorKind::Alternate)
        .execute(db)
        .await?;
    Ok(())
}

/// Every mirror of an app, primary first.
pub async fn list_mirrors(db: &Db, app_id: i64) -> Result<Vec<AppDownload>> {
    let list = sqlx::query_as(
        "SELECT * FROM app_download WHERE app_id = ? ORDER BY is_extra DESC, id",
    )
    .bind(app_id)
    .fetch_all(db)
    .await?;
    Ok(list)
}

/// Mirrors a client may be sent to.
pub async fn approved_mirrors(db: &Db, app_id: i64) -> Result<Vec<AppDownload>> {
    let list = sqlx::query_as(
        "SELECT * FROM app_download WHERE app_id = ? AND audit_status = ? ORDER BY is_extra DESC, id",
    )
    .bind(app_id)
    .bind(AuditStatus::Approved)
    .fetch_all(db)
    .await?;
    Ok(list)
}

/// A mirror awaiting review, with the name of the app it belongs to.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PendingMirror {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub download: AppDownload,
    pub app_name: String,
}

/// The mirror review queue, newest first.
pub async fn pending_mirrors(
    db: &Db,
    policy: &PolicyConfig,
    actor: &ActorContext,
    page: &PageRequest,
) -> Result<Paged<PendingMirror>> {
    actor.require(policy.review)?;

    let total = sqlx::query_scalar("SELECT COUNT(*) FROM app_download WHERE audit_status = ?")
        .bind(AuditStatus::Pending)
        .fetch_one(db)
        .await?;
    let list = sqlx::query_as(
        r#"
        SELECT d.*, a.app_name
            FROM app_download d
            JOIN app a ON a.id = d.app_id
            WHERE d.audit_status = ?
            ORDER BY d.id DESC
            LIMIT ? OFFSET ?
        "#,
    )
    .bind(AuditStatus::Pending)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(db)
    .await?;

    Ok(Paged { list, total })
}
