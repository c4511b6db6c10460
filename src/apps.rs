//! App listings: submission, edits and removal.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, types::Json};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    Error, Result,
    auth::ActorContext,
    broker::UploadBroker,
    config::PolicyConfig,
    db::{
        self, Db, now_millis,
        pagination::{PageRequest, Paged},
        tables::market::{App, AuditStatus, MirrorKind},
        util::is_err_unique_violation,
    },
    filestore::{LocalStore, UploadCategory},
    membership::{self, Membership},
    metrics::APP_SUBMISSIONS,
};

/// Reason recorded on a freshly submitted app.
pub const SUBMITTED_REASON: &str = "pending review";
/// Reason recorded whenever reviewable metadata changes.
pub const EDIT_REASON: &str = "metadata updated, pending re-review";
/// Display name of the mirror created alongside every app.
const PRIMARY_MIRROR_NAME: &str = "Primary download";

/// Metadata for a new listing. The artifact itself is pushed separately.
#[derive(Debug, Clone, Deserialize)]
pub struct NewApp {
    pub package_name: String,
    pub app_name: String,
    /// Relative path returned by an earlier icon upload.
    pub icon_path: String,
    #[serde(default)]
    pub keyword: String,
    #[serde(default)]
    pub version_code: i64,
    #[serde(default)]
    pub version_name: String,
    #[serde(default)]
    pub app_type_id: i64,
    #[serde(default)]
    pub app_version_type_id: i64,
    #[serde(default)]
    pub app_abi: i64,
    #[serde(default)]
    pub app_tags: String,
    #[serde(default)]
    pub previews: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub update_log: String,
    #[serde(default)]
    pub developer: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub upload_message: String,
    #[serde(default)]
    pub sdk_min: i64,
    #[serde(default)]
    pub sdk_target: i64,
    #[serde(default)]
    pub download_size: i64,
}

/// Uploaded images must be referenced by the path their upload returned.
fn validate_images(icon_path: Option<&str>, previews: Option<&[String]>) -> Result<()> {
    if let Some(icon) = icon_path {
        if !UploadCategory::Icon.holds(icon) {
            return Err(Error::validation(format!("{icon:?} is not an uploaded icon")));
        }
    }
    if let Some(bad) = previews
        .into_iter()
        .flatten()
        .find(|p| !UploadCategory::Preview.holds(p))
    {
        return Err(Error::validation(format!("{bad:?} is not an uploaded preview")));
    }
    Ok(())
}

fn valid_package_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.ends_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

impl NewApp {
    fn validate(&self) -> Result<()> {
        if !valid_package_name(&self.package_name) {
            return Err(Error::validation(format!(
                "invalid package name {:?}",
                self.package_name
            )));
        }
        if self.app_name.trim().is_empty() {
            return Err(Error::validation("app name is required"));
        }
        if self.icon_path.trim().is_empty() {
            return Err(Error::validation("an icon is required"));
        }
        validate_images(Some(self.icon_path.as_str()), Some(self.previews.as_slice()))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    pub app_id: i64,
    /// Lets the client push the artifact straight to the file server.
    pub upload_token: String,
}

/// Create an app together with its primary mirror.
///
/// The upload token is obtained before anything is written, so a broker
/// failure leaves no trace and no transaction ever waits on the broker.
pub async fn submit_app(
    db: &Db,
    broker: &dyn UploadBroker,
    actor: &ActorContext,
    app: &NewApp,
) -> Result<Submission> {
    app.validate()?;

    let taken: Option<i64> = sqlx::query_scalar("SELECT id FROM app WHERE package_name = ?")
        .bind(&app.package_name)
        .fetch_optional(db)
        .await?;
    if taken.is_some() {
        return Err(Error::conflict(format!(
            "package {} is already listed",
            app.package_name
        )));
    }

    let artifact = format!("apks/{}.apk", Uuid::new_v4());
    let upload_token = broker.upload_token(&artifact).await?;

    let now = now_millis();
    let mut tx = db::begin(db).await?;
    let app_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO app (
            package_name, app_name, keyword, version_code, version_name, icon_path,
            by_user_id, app_type_id, app_version_type_id, app_abi, app_tags, previews,
            description, update_log, developer, source, upload_message, sdk_min,
            sdk_target, download_size, apk_path, audit_status, audit_reason,
            upload_time, update_time
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(&app.package_name)
    .bind(app.app_name.trim())
    .bind(&app.keyword)
    .bind(app.version_code)
    .bind(&app.version_name)
    .bind(&app.icon_path)
    .bind(actor.user_id)
    .bind(app.app_type_id)
    .bind(app.app_version_type_id)
    .bind(app.app_abi)
    .bind(&app.app_tags)
    .bind(Json(&app.previews))
    .bind(&app.description)
    .bind(&app.update_log)
    .bind(&app.developer)
    .bind(&app.source)
    .bind(&app.upload_message)
    .bind(app.sdk_min)
    .bind(app.sdk_target)
    .bind(app.download_size)
    .bind(&artifact)
    .bind(AuditStatus::Pending)
    .bind(SUBMITTED_REASON)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        if is_err_unique_violation(&e) {
            Error::conflict(format!("package {} is already listed", app.package_name))
        } else {
            e.into()
        }
    })?;

    let _ = sqlx::query(
        "INSERT INTO app_download (app_id, name, url, is_extra, audit_status) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(app_id)
    .bind(PRIMARY_MIRROR_NAME)
    .bind(&artifact)
    .bind(MirrorKind::Primary)
    .bind(AuditStatus::Approved)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    metrics::counter!(APP_SUBMISSIONS).increment(1);
    info!(app_id, package = %app.package_name, "app submitted");
    Ok(Submission {
        app_id,
        upload_token,
    })
}

/// The reviewable fields of an app. Anything absent is left as it is.
///
/// The package name is deliberately not here: it never changes after creation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppPatch {
    pub app_name: Option<String>,
    pub keyword: Option<String>,
    pub version_code: Option<i64>,
    pub version_name: Option<String>,
    pub icon_path: Option<String>,
    pub app_type_id: Option<i64>,
    pub app_version_type_id: Option<i64>,
    pub app_abi: Option<i64>,
    pub app_tags: Option<String>,
    pub previews: Option<Vec<String>>,
    pub description: Option<String>,
    pub update_log: Option<String>,
    pub developer: Option<String>,
    pub source: Option<String>,
    pub upload_message: Option<String>,
    pub sdk_min: Option<i64>,
    pub sdk_target: Option<i64>,
    pub download_size: Option<i64>,
}

/// Append `, column = ?` for every field of the patch that is present.
macro_rules! push_present {
    ($qb:expr, $patch:expr, $($field:ident),+ $(,)?) => {
        $(
            if let Some(value) = $patch.$field {
                let _ = $qb
                    .push(concat!(", ", stringify!($field), " = "))
                    .push_bind(value);
            }
        )+
    };
}

impl AppPatch {
    fn is_empty(&self) -> bool {
        self.app_name.is_none()
            && self.keyword.is_none()
            && self.version_code.is_none()
            && self.version_name.is_none()
            && self.icon_path.is_none()
            && self.app_type_id.is_none()
            && self.app_version_type_id.is_none()
            && self.app_abi.is_none()
            && self.app_tags.is_none()
            && self.previews.is_none()
            && self.description.is_none()
            && self.update_log.is_none()
            && self.developer.is_none()
            && self.source.is_none()
            && self.upload_message.is_none()
            && self.sdk_min.is_none()
            && self.sdk_target.is_none()
            && self.download_size.is_none()
    }

    fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(Error::validation("nothing to update"));
        }
        if self.app_name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(Error::validation("app name cannot be blank"));
        }
        if self.icon_path.as_deref().is_some_and(|p| p.trim().is_empty()) {
            return Err(Error::validation("icon cannot be removed"));
        }
        validate_images(self.icon_path.as_deref(), self.previews.as_deref())
    }
}

/// Stored files an edit replaced.
fn replaced_files(current: &App, patch: &AppPatch) -> Vec<String> {
    let mut stale = Vec::new();
    if let Some(icon) = &patch.icon_path {
        if *icon != current.icon_path && !current.icon_path.is_empty() {
            stale.push(current.icon_path.clone());
        }
    }
    if let Some(previews) = &patch.previews {
        stale.extend(
            current
                .previews
                .iter()
                .filter(|p| !previews.contains(p))
                .cloned(),
        );
    }
    stale
}

/// Whether any app or content page still points at `path`.
async fn still_referenced(db: &Db, path: &str) -> std::result::Result<bool, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT EXISTS (SELECT 1 FROM app WHERE icon_path = ?1)
            OR EXISTS (SELECT 1 FROM app, json_each(app.previews) WHERE json_each.value = ?1)
            OR EXISTS (SELECT 1 FROM content_page, json_each(content_page.img_list) WHERE json_each.value = ?1)
        "#,
    )
    .bind(path)
    .fetch_one(db)
    .await
}

/// Remove files this app no longer uses, keeping any another row still references.
async fn remove_files(db: &Db, store: &LocalStore, app_id: i64, paths: &[String]) {
    for path in paths {
        match still_referenced(db, path).await {
            Ok(false) => {}
            Ok(true) => {
                debug!(app_id, "keeping {path}, still referenced elsewhere");
                continue;
            }
            Err(e) => {
                warn!(app_id, "cannot check references to {path}, keeping it: {e:#}");
                continue;
            }
        }
        if let Err(e) = store.delete(path).await {
            warn!(app_id, "failed to remove stored file {path}: {e:#}");
        }
    }
}

pub async fn get_app(db: &Db, app_id: i64) -> Result<App> {
    sqlx::query_as("SELECT * FROM app WHERE id = ?")
        .bind(app_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| Error::not_found(format!("app {app_id} does not exist")))
}

/// Apply an edit and send the app back to review.
pub async fn update_app(
    db: &Db,
    store: &LocalStore,
    policy: &PolicyConfig,
    actor: &ActorContext,
    app_id: i64,
    patch: AppPatch,
) -> Result<()> {
    patch.validate()?;
    let current = get_app(db, app_id).await?;
    actor.require_owner_or(current.by_user_id, policy.edit_others)?;
    let stale = replaced_files(&current, &patch);

    let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new("UPDATE app SET audit_status = ");
    let _ = qb
        .push_bind(AuditStatus::Pending)
        .push(", audit_reason = ")
        .push_bind(EDIT_REASON)
        .push(", update_time = ")
        .push_bind(now_millis());
    if let Some(previews) = patch.previews {
        let _ = qb.push(", previews = ").push_bind(Json(previews));
    }
    push_present!(
        qb,
        patch,
        app_name,
        keyword,
        version_code,
        version_name,
        icon_path,
        app_type_id,
        app_version_type_id,
        app_abi,
        app_tags,
        description,
        update_log,
        developer,
        source,
        upload_message,
        sdk_min,
        sdk_target,
        download_size,
    );
    let _ = qb.push(" WHERE id = ").push_bind(app_id);

    let updated = qb.build().execute(db).await?.rows_affected();
    if updated == 0 {
        return Err(Error::not_found(format!("app {app_id} does not exist")));
    }

    info!(app_id, editor = actor.user_id, "app updated, back in review");
    remove_files(db, store, app_id, &stale).await;
    Ok(())
}

/// Delete an app with its mirrors, comments and page memberships.
///
/// The rows go in one transaction. Stored images are removed after commit;
/// failing to remove one is logged and does not undo the delete.
pub async fn delete_app(
    db: &Db,
    store: &LocalStore,
    policy: &PolicyConfig,
    actor: &ActorContext,
    app_id: i64,
) -> Result<()> {
    let app = get_app(db, app_id).await?;
    actor.require_owner_or(app.by_user_id, policy.edit_others)?;

    let mut tx = db::begin(db).await?;
    let mirrors = sqlx::query("DELETE FROM app_download WHERE app_id = ?")
        .bind(app_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    let pages = membership::detach_app(&mut tx, app_id).await?;
    let _ = sqlx::query("DELETE FROM app_comment WHERE app_id = ?")
        .bind(app_id)
        .execute(&mut *tx)
        .await?;
    let deleted = sqlx::query("DELETE FROM app WHERE id = ?")
        .bind(app_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    if deleted == 0 {
        return Err(Error::not_found(format!("app {app_id} does not exist")));
    }
    tx.commit().await?;

    info!(app_id, mirrors, pages, "deleted app");
    let mut files = app.previews.0;
    files.push(app.icon_path);
    remove_files(db, store, app_id, &files).await;
    Ok(())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppFilter {
    /// Every uploader's apps rather than only the caller's. Requires review trust.
    #[serde(default)]
    pub all: bool,
    pub audit_status: Option<i32>,
    pub keyword: Option<String>,
}

impl AppFilter {
    fn push_filters(
        &self,
        qb: &mut QueryBuilder<'_, Sqlite>,
        policy: &PolicyConfig,
        actor: &ActorContext,
    ) -> Result<()> {
        let _ = qb.push(" WHERE 1 = 1");
        if self.all {
            actor.require(policy.review)?;
            if let Some(status) = self.audit_status {
                let status = AuditStatus::try_from(status)
                    .map_err(|s| Error::validation(format!("unknown audit status {s}")))?;
                let _ = qb.push(" AND audit_status = ").push_bind(status);
            }
        } else {
            let _ = qb.push(" AND by_user_id = ").push_bind(actor.user_id);
        }
        if let Some(keyword) = self.keyword.as_deref().filter(|k| !k.is_empty()) {
            let pattern = format!("%{keyword}%");
            let _ = qb
                .push(" AND (app_name LIKE ")
                .push_bind(pattern.clone())
                .push(" OR package_name LIKE ")
                .push_bind(pattern)
                .push(")");
        }
        Ok(())
    }
}

/// Apps visible to `actor`, most recently updated first.
pub async fn list_apps(
    db: &Db,
    policy: &PolicyConfig,
    actor: &ActorContext,
    filter: &AppFilter,
    page: &PageRequest,
) -> Result<Paged<App>> {
    let mut count: QueryBuilder<'_, Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM app");
    filter.push_filters(&mut count, policy, actor)?;
    let total = count.build_query_scalar::<i64>().fetch_one(db).await?;

    let mut select: QueryBuilder<'_, Sqlite> = QueryBuilder::new("SELECT * FROM app");
    filter.push_filters(&mut select, policy, actor)?;
    let _ = select
        .push(" ORDER BY update_time DESC, id DESC LIMIT ")
        .push_bind(page.limit())
        .push(" OFFSET ")
        .push_bind(page.offset());
    let list = select.build_query_as::<App>().fetch_all(db).await?;

    Ok(Paged { list, total })
}

/// One entry of the page-curation picker.
#[derive(Debug, Clone, Serialize)]
pub struct SimpleApp {
    pub id: i64,
    pub app_name: String,
    pub icon_path: String,
    pub pages: Membership,
}

#[derive(FromRow)]
struct SimpleAppRow {
    id: i64,
    app_name: String,
    icon_path: String,
    pages: Option<String>,
}

/// Every app with the pages it belongs to, newest first.
pub async fn simple_list(db: &Db) -> Result<Vec<SimpleApp>> {
    let rows: Vec<SimpleAppRow> = sqlx::query_as(
        r#"
        SELECT a.id, a.app_name, a.icon_path, group_concat(m.page_id) AS pages
            FROM app a
            LEFT JOIN app_page_member m ON m.app_id = a.id
            GROUP BY a.id
            ORDER BY a.id DESC
        "#,
    )
    .fetch_all(db)
    .await?;

    rows.into_iter()
        .map(|row| -> Result<SimpleApp> {
            let pages = row
                .pages
                .as_deref()
                .unwrap_or_default()
                .parse::<Membership>()
                .map_err(anyhow::Error::from)?;
            Ok(SimpleApp {
                id: row.id,
                app_name: row.app_name,
                icon_path: row.icon_path,
                pages,
            })
        })
        .collect()
}
