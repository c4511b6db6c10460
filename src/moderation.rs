//! Report resolution and the takedowns it can trigger.

use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite};
use tracing::info;

use crate::{
    Error, Result,
    auth::ActorContext,
    config::PolicyConfig,
    db::{
        self, Db, now_millis,
        pagination::{PageRequest, Paged},
        tables::{
            market::{App, AuditStatus, Comment},
            moderation::{Report, ReportStatus, ReportTarget},
            notice::SYSTEM_SENDER,
        },
    },
    metrics::{REPORTS_RESOLVED, TAKEDOWNS},
    notices::{NO_ACTIONS, NewNotice, insert_notice},
};

/// Reason recorded on an app rejected because of a report.
pub const TAKEDOWN_REASON: &str = "taken down after a verified user report";

/// An operator's answer to a report.
#[derive(Debug, Clone, Deserialize)]
pub struct Resolution {
    pub reply: String,
    /// Also act against the reported app or comment.
    #[serde(default)]
    pub take_action: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolutionOutcome {
    pub report_id: i64,
    /// The entity acted against, if any.
    pub takedown: Option<ReportTarget>,
    pub notices: u32,
}

async fn load_report(db: &Db, report_id: i64) -> Result<Report> {
    sqlx::query_as("SELECT * FROM report WHERE id = ?")
        .bind(report_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| Error::not_found(format!("report {report_id} does not exist")))
}

/// Resolve an open report, optionally taking down what it points at.
///
/// The status change, the reporter's notice and any takedown with its owner
/// notice commit together or not at all.
pub async fn resolve_report(
    db: &Db,
    policy: &PolicyConfig,
    actor: &ActorContext,
    report_id: i64,
    resolution: &Resolution,
) -> Result<ResolutionOutcome> {
    actor.require(policy.operate)?;
    let reply = resolution.reply.trim();
    if reply.is_empty() {
        return Err(Error::validation("resolving a report requires a reply"));
    }

    let report = load_report(db, report_id).await?;
    if report.report_status == ReportStatus::Resolved {
        return Err(Error::conflict(format!(
            "report {report_id} is already resolved"
        )));
    }
    let target = report.target();
    if let (true, ReportTarget::Unknown { report_type, .. }) = (resolution.take_action, target) {
        return Err(Error::validation(format!(
            "cannot act on reports of type {report_type}"
        )));
    }

    let mut tx = db::begin(db).await?;
    let resolved = sqlx::query(
        r#"
        UPDATE report SET report_status = ?, report_reply = ?, reply_time = ?
            WHERE id = ? AND report_status = ?
        "#,
    )
    .bind(ReportStatus::Resolved)
    .bind(reply)
    .bind(now_millis())
    .bind(report_id)
    .bind(ReportStatus::Open)
    .execute(&mut *tx)
    .await?
    .rows_affected();
    if resolved == 0 {
        return Err(Error::conflict(format!(
            "report {report_id} is already resolved"
        )));
    }

    let _ = insert_notice(
        &mut tx,
        &NewNotice {
            recipient: report.by_user_id,
            sender: SYSTEM_SENDER,
            title: "Report resolved".to_owned(),
            content: format!(
                "Your report about \"{}\" was handled by operator {}.",
                report.report_title, actor.display_name
            ),
            detail: format!("Reply: {reply}"),
            actions: NO_ACTIONS.to_owned(),
        },
    )
    .await?;
    let mut notices = 1;

    let takedown = if resolution.take_action {
        match target {
            ReportTarget::App(app_id) => {
                let taken: Option<(i64, String)> = sqlx::query_as(
                    r#"
                    UPDATE app SET audit_status = ?, audit_reason = ?, audit_user = ?
                        WHERE id = ?
                        RETURNING by_user_id, app_name
                    "#,
                )
                .bind(AuditStatus::Rejected)
                .bind(TAKEDOWN_REASON)
                .bind(actor.user_id)
                .bind(app_id)
                .fetch_optional(&mut *tx)
                .await?;
                let Some((owner, app_name)) = taken else {
                    return Err(Error::not_found(format!("reported app {app_id} no longer exists")));
                };

                let _ = insert_notice(
                    &mut tx,
                    &NewNotice {
                        recipient: owner,
                        sender: SYSTEM_SENDER,
                        title: "App taken down".to_owned(),
                        content: format!(
                            "Your app \"{app_name}\" was taken down by {} after a verified user report.",
                            actor.display_name
                        ),
                        detail: "Contact the operator if you disagree.".to_owned(),
                        actions: NO_ACTIONS.to_owned(),
                    },
                )
                .await?;
                notices += 1;
                Some(target)
            }
            ReportTarget::Comment(comment_id) => {
                let hidden = sqlx::query("UPDATE app_comment SET visibility = 0 WHERE id = ?")
                    .bind(comment_id)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();
                if hidden == 0 {
                    return Err(Error::not_found(format!(
                        "reported comment {comment_id} no longer exists"
                    )));
                }
                Some(target)
            }
            ReportTarget::Unknown { .. } => None,
        }
    } else {
        None
    };

    tx.commit().await?;

    metrics::counter!(REPORTS_RESOLVED).increment(1);
    if takedown.is_some() {
        metrics::counter!(TAKEDOWNS).increment(1);
    }
    info!(report_id, operator = actor.user_id, takedown = ?takedown, "resolved report");
    Ok(ResolutionOutcome {
        report_id,
        takedown,
        notices,
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportFilter {
    pub report_status: Option<i32>,
}

/// Reports, newest first.
pub async fn list_reports(
    db: &Db,
    policy: &PolicyConfig,
    actor: &ActorContext,
    filter: &ReportFilter,
    page: &PageRequest,
) -> Result<Paged<Report>> {
    actor.require(policy.operate)?;
    let status = filter
        .report_status
        .map(|s| {
            ReportStatus::try_from(s)
                .map_err(|s| Error::validation(format!("unknown report status {s}")))
        })
        .transpose()?;

    let push_status = |qb: &mut QueryBuilder<'static, Sqlite>| {
        if let Some(status) = status {
            let _ = qb.push(" WHERE report_status = ").push_bind(status);
        }
    };

    let mut count = QueryBuilder::new("SELECT COUNT(*) FROM report");
    push_status(&mut count);
    let total = count.build_query_scalar::<i64>().fetch_one(db).await?;

    let mut select = QueryBuilder::new("SELECT * FROM report");
    push_status(&mut select);
    let _ = select
        .push(" ORDER BY report_time DESC, id DESC LIMIT ")
        .push_bind(page.limit())
        .push(" OFFSET ")
        .push_bind(page.offset());
    let list = select.build_query_as::<Report>().fetch_all(db).await?;

    Ok(Paged { list, total })
}

/// What a report points at, when it still exists.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "item", rename_all = "snake_case")]
pub enum ReportedItem {
    App(App),
    Comment(Comment),
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportDetail {
    pub report: Report,
    pub reported: Option<ReportedItem>,
    /// The comment a reported reply answers.
    pub parent_comment: Option<Comment>,
}

async fn find_comment(db: &Db, comment_id: i64) -> Result<Option<Comment>> {
    let comment = sqlx::query_as("SELECT * FROM app_comment WHERE id = ?")
        .bind(comment_id)
        .fetch_optional(db)
        .await?;
    Ok(comment)
}

/// A report together with the app or comment it is about.
pub async fn report_detail(
    db: &Db,
    policy: &PolicyConfig,
    actor: &ActorContext,
    report_id: i64,
) -> Result<ReportDetail> {
    actor.require(policy.operate)?;
    let report = load_report(db, report_id).await?;

    let (reported, parent_comment) = match report.target() {
        ReportTarget::App(app_id) => {
            let app: Option<App> = sqlx::query_as("SELECT * FROM app WHERE id = ?")
                .bind(app_id)
                .fetch_optional(db)
                .await?;
            (app.map(ReportedItem::App), None)
        }
        ReportTarget::Comment(comment_id) => match find_comment(db, comment_id).await? {
            Some(comment) => {
                let parent = match comment.father_reply_id {
                    0 => None,
                    parent_id => find_comment(db, parent_id).await?,
                };
                (Some(ReportedItem::Comment(comment)), parent)
            }
            None => (None, None),
        },
        ReportTarget::Unknown { .. } => (None, None),
    };

    Ok(ReportDetail {
        report,
        reported,
        parent_comment,
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommentFilter {
    pub app_id: Option<i64>,
    /// Case-insensitive substring of the comment text.
    pub keyword: Option<String>,
}

/// Escape `LIKE` wildcards so `keyword` matches literally.
fn like_pattern(keyword: &str) -> String {
    let mut pattern = String::with_capacity(keyword.len() + 2);
    pattern.push('%');
    for c in keyword.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Comments across the market, newest first.
pub async fn list_comments(
    db: &Db,
    policy: &PolicyConfig,
    actor: &ActorContext,
    filter: &CommentFilter,
    page: &PageRequest,
) -> Result<Paged<Comment>> {
    actor.require(policy.operate)?;
    let app_id = filter.app_id.filter(|&id| id > 0);
    let pattern = filter
        .keyword
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(like_pattern);

    let push_filter = |qb: &mut QueryBuilder<'static, Sqlite>| {
        let _ = qb.push(" WHERE 1 = 1");
        if let Some(app_id) = app_id {
            let _ = qb.push(" AND app_id = ").push_bind(app_id);
        }
        if let Some(pattern) = &pattern {
            let _ = qb
                .push(" AND content LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\'");
        }
    };

    let mut count = QueryBuilder::new("SELECT COUNT(*) FROM app_comment");
    push_filter(&mut count);
    let total = count.build_query_scalar::<i64>().fetch_one(db).await?;

    let mut select = QueryBuilder::new("SELECT * FROM app_comment");
    push_filter(&mut select);
    let _ = select
        .push(" ORDER BY send_time DESC, id DESC LIMIT ")
        .push_bind(page.limit())
        .push(" OFFSET ")
        .push_bind(page.offset());
    let list = select.build_query_as::<Comment>().fetch_all(db).await?;

    Ok(Paged { list, total })
}

/// Permanently remove a comment. Replies to it are kept.
pub async fn delete_comment(
    db: &Db,
    policy: &PolicyConfig,
    actor: &ActorContext,
    comment_id: i64,
) -> Result<()> {
    actor.require(policy.operate)?;
    let deleted = sqlx::query("DELETE FROM app_comment WHERE id = ?")
        .bind(comment_id)
        .execute(db)
        .await?
        .rows_affected();
    if deleted == 0 {
        return Err(Error::not_found(format!("comment {comment_id} does not exist")));
    }
    info!(comment_id, operator = actor.user_id, "deleted comment");
    Ok(())
}

/// Show or hide a comment.
pub async fn set_comment_visibility(
    db: &Db,
    policy: &PolicyConfig,
    actor: &ActorContext,
    comment_id: i64,
    visible: bool,
) -> Result<()> {
    actor.require(policy.operate)?;
    let updated = sqlx::query("UPDATE app_comment SET visibility = ? WHERE id = ?")
        .bind(visible)
        .bind(comment_id)
        .execute(db)
        .await?
        .rows_affected();
    if updated == 0 {
        return Err(Error::not_found(format!("comment {comment_id} does not exist")));
    }
    info!(comment_id, visible, "changed comment visibility");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::TrustLevel,
        db::tables::moderation::{REPORT_TYPE_APP, REPORT_TYPE_COMMENT},
        error::ErrorKind,
        tests::TestDb,
    };

    fn resolution(take_action: bool) -> Resolution {
        Resolution {
            reply: "confirmed, thanks".to_owned(),
            take_action,
        }
    }

    async fn report_status(t: &TestDb, id: i64) -> ReportStatus {
        sqlx::query_scalar("SELECT report_status FROM report WHERE id = ?")
            .bind(id)
            .fetch_one(&t.db)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn app_takedown_notifies_reporter_and_owner() {
        let t = TestDb::new().await;
        let owner = t.user("dev", TrustLevel::user()).await;
        let reporter = t.user("reporter", TrustLevel::user()).await;
        let op = t.user("op", TrustLevel::operator()).await;
        let app = t.app(&owner, "com.example.app").await;
        let report = t.report(&reporter, REPORT_TYPE_APP, app).await;

        let outcome = resolve_report(&t.db, &PolicyConfig::default(), &op, report, &resolution(true))
            .await
            .unwrap();
        assert_eq!(outcome.takedown, Some(ReportTarget::App(app)));
        assert_eq!(outcome.notices, 2);

        assert_eq!(report_status(&t, report).await, ReportStatus::Resolved);
        let (status, reason): (AuditStatus, String) =
            sqlx::query_as("SELECT audit_status, audit_reason FROM app WHERE id = ?")
                .bind(app)
                .fetch_one(&t.db)
                .await
                .unwrap();
        assert_eq!(status, AuditStatus::Rejected);
        assert_eq!(reason, TAKEDOWN_REASON);

        let recipients: Vec<i64> =
            sqlx::query_scalar("SELECT by_user_id FROM notice ORDER BY id")
                .fetch_all(&t.db)
                .await
                .unwrap();
        assert_eq!(recipients, vec![reporter.user_id, owner.user_id]);
    }

    #[tokio::test]
    async fn resolving_twice_is_a_conflict() {
        let t = TestDb::new().await;
        let owner = t.user("dev", TrustLevel::user()).await;
        let reporter = t.user("reporter", TrustLevel::user()).await;
        let op = t.user("op", TrustLevel::operator()).await;
        let policy = PolicyConfig::default();
        let app = t.app(&owner, "com.example.app").await;
        let report = t.report(&reporter, REPORT_TYPE_APP, app).await;

        let outcome = resolve_report(&t.db, &policy, &op, report, &resolution(false))
            .await
            .unwrap();
        assert_eq!(outcome.notices, 1);
        assert_eq!(outcome.takedown, None);

        let err = resolve_report(&t.db, &policy, &op, report, &resolution(true))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(t.count("notice").await, 1);

        let status: AuditStatus = sqlx::query_scalar("SELECT audit_status FROM app WHERE id = ?")
            .bind(app)
            .fetch_one(&t.db)
            .await
            .unwrap();
        assert_eq!(status, AuditStatus::Pending);
    }

    #[tokio::test]
    async fn comment_takedown_hides_without_notifying_author() {
        let t = TestDb::new().await;
        let owner = t.user("dev", TrustLevel::user()).await;
        let author = t.user("author", TrustLevel::user()).await;
        let op = t.user("op", TrustLevel::operator()).await;
        let app = t.app(&owner, "com.example.app").await;
        let comment = t.comment(app, &author, "spam").await;
        let report = t.report(&owner, REPORT_TYPE_COMMENT, comment).await;

        let outcome = resolve_report(&t.db, &PolicyConfig::default(), &op, report, &resolution(true))
            .await
            .unwrap();
        assert_eq!(outcome.takedown, Some(ReportTarget::Comment(comment)));
        assert_eq!(outcome.notices, 1);

        let visible: bool = sqlx::query_scalar("SELECT visibility FROM app_comment WHERE id = ?")
            .bind(comment)
            .fetch_one(&t.db)
            .await
            .unwrap();
        assert!(!visible);
        assert_eq!(t.count("notice").await, 1);
    }

    #[tokio::test]
    async fn missing_target_aborts_the_whole_resolution() {
        let t = TestDb::new().await;
        let reporter = t.user("reporter", TrustLevel::user()).await;
        let op = t.user("op", TrustLevel::operator()).await;
        let report = t.report(&reporter, REPORT_TYPE_APP, 4242).await;

        let err = resolve_report(&t.db, &PolicyConfig::default(), &op, report, &resolution(true))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(report_status(&t, report).await, ReportStatus::Open);
        assert_eq!(t.count("notice").await, 0);
    }

    #[tokio::test]
    async fn failed_owner_notice_keeps_report_open() {
        let t = TestDb::new().await;
        let owner = t.user("dev", TrustLevel::user()).await;
        let reporter = t.user("reporter", TrustLevel::user()).await;
        let op = t.user("op", TrustLevel::operator()).await;
        let app = t.app(&owner, "com.example.app").await;
        let report = t.report(&reporter, REPORT_TYPE_APP, app).await;
        t.fail_on(&format!(
            "CREATE TRIGGER refuse_owner_notice BEFORE INSERT ON notice \
             WHEN NEW.by_user_id = {} \
             BEGIN SELECT RAISE(ABORT, 'owner notice refused'); END",
            owner.user_id
        ))
        .await;

        let err = resolve_report(&t.db, &PolicyConfig::default(), &op, report, &resolution(true))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(report_status(&t, report).await, ReportStatus::Open);
        assert_eq!(t.count("notice").await, 0);
        let status: AuditStatus = sqlx::query_scalar("SELECT audit_status FROM app WHERE id = ?")
            .bind(app)
            .fetch_one(&t.db)
            .await
            .unwrap();
        assert_eq!(status, AuditStatus::Pending);
    }

    #[tokio::test]
    async fn resolution_requires_reply_and_known_type() {
        let t = TestDb::new().await;
        let reporter = t.user("reporter", TrustLevel::user()).await;
        let op = t.user("op", TrustLevel::operator()).await;
        let policy = PolicyConfig::default();
        let report = t.report(&reporter, 9, 1).await;

        let blank = Resolution {
            reply: " ".to_owned(),
            take_action: false,
        };
        let err = resolve_report(&t.db, &policy, &op, report, &blank)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = resolve_report(&t.db, &policy, &op, report, &resolution(true))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        resolve_report(&t.db, &policy, &op, report, &resolution(false))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn lists_filter_by_status() {
        let t = TestDb::new().await;
        let owner = t.user("dev", TrustLevel::user()).await;
        let op = t.user("op", TrustLevel::operator()).await;
        let policy = PolicyConfig::default();
        let app = t.app(&owner, "com.example.app").await;
        let first = t.report(&owner, REPORT_TYPE_APP, app).await;
        let _ = t.report(&owner, REPORT_TYPE_APP, app).await;
        resolve_report(&t.db, &policy, &op, first, &resolution(false))
            .await
            .unwrap();

        let page = PageRequest::default();
        let open = ReportFilter {
            report_status: Some(0),
        };
        assert_eq!(
            list_reports(&t.db, &policy, &op, &open, &page)
                .await
                .unwrap()
                .total,
            1
        );
        let all = list_reports(&t.db, &policy, &op, &ReportFilter::default(), &page)
            .await
            .unwrap();
        assert_eq!(all.total, 2);
        assert_eq!(
            list_reports(&t.db, &policy, &owner, &open, &page)
                .await
                .unwrap_err()
                .kind(),
            ErrorKind::Forbidden
        );
    }

    #[tokio::test]
    async fn operators_toggle_comment_visibility() {
        let t = TestDb::new().await;
        let owner = t.user("dev", TrustLevel::user()).await;
        let op = t.user("op", TrustLevel::operator()).await;
        let policy = PolicyConfig::default();
        let app = t.app(&owner, "com.example.app").await;
        let comment = t.comment(app, &owner, "hello").await;

        set_comment_visibility(&t.db, &policy, &op, comment, false)
            .await
            .unwrap();
        let err = set_comment_visibility(&t.db, &policy, &op, 999, true)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = set_comment_visibility(&t.db, &policy, &owner, comment, true)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn report_detail_includes_the_reported_reply_and_its_parent() {
        let t = TestDb::new().await;
        let owner = t.user("dev", TrustLevel::user()).await;
        let author = t.user("author", TrustLevel::user()).await;
        let op = t.user("op", TrustLevel::operator()).await;
        let policy = PolicyConfig::default();
        let app = t.app(&owner, "com.example.app").await;
        let parent = t.comment(app, &owner, "great app").await;
        let reply = t.comment(app, &author, "buy followers").await;
        sqlx::query("UPDATE app_comment SET father_reply_id = ? WHERE id = ?")
            .bind(parent)
            .bind(reply)
            .execute(&t.db)
            .await
            .unwrap();
        let report = t.report(&owner, REPORT_TYPE_COMMENT, reply).await;

        let detail = report_detail(&t.db, &policy, &op, report).await.unwrap();
        assert_eq!(detail.report.id, report);
        match detail.reported {
            Some(ReportedItem::Comment(comment)) => assert_eq!(comment.id, reply),
            other => panic!("unexpected reported item {other:?}"),
        }
        assert_eq!(detail.parent_comment.map(|c| c.id), Some(parent));

        let report = t.report(&owner, REPORT_TYPE_APP, app).await;
        let detail = report_detail(&t.db, &policy, &op, report).await.unwrap();
        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["reported"]["type"], "app");
        assert_eq!(json["reported"]["item"]["id"], app);
        assert!(json["parent_comment"].is_null());
    }

    #[tokio::test]
    async fn report_detail_tolerates_vanished_targets() {
        let t = TestDb::new().await;
        let reporter = t.user("reporter", TrustLevel::user()).await;
        let op = t.user("op", TrustLevel::operator()).await;
        let policy = PolicyConfig::default();
        let report = t.report(&reporter, REPORT_TYPE_APP, 4242).await;

        let detail = report_detail(&t.db, &policy, &op, report).await.unwrap();
        assert!(detail.reported.is_none());

        let err = report_detail(&t.db, &policy, &op, 777).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = report_detail(&t.db, &policy, &reporter, report)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn comment_listing_filters_by_app_and_keyword() {
        let t = TestDb::new().await;
        let owner = t.user("dev", TrustLevel::user()).await;
        let op = t.user("op", TrustLevel::operator()).await;
        let policy = PolicyConfig::default();
        let a = t.app(&owner, "com.example.a").await;
        let b = t.app(&owner, "com.example.b").await;
        let _ = t.comment(a, &owner, "Works great").await;
        let _ = t.comment(a, &owner, "100% broken").await;
        let _ = t.comment(b, &owner, "great on b").await;
        let page = PageRequest::default();

        let by_app = CommentFilter {
            app_id: Some(a),
            keyword: None,
        };
        let listed = list_comments(&t.db, &policy, &op, &by_app, &page).await.unwrap();
        assert_eq!(listed.total, 2);
        assert!(listed.list.iter().all(|c| c.app_id == a));

        let keyword = CommentFilter {
            app_id: None,
            keyword: Some("GREAT".to_owned()),
        };
        assert_eq!(
            list_comments(&t.db, &policy, &op, &keyword, &page)
                .await
                .unwrap()
                .total,
            2
        );

        let wildcard = CommentFilter {
            app_id: None,
            keyword: Some("%".to_owned()),
        };
        let listed = list_comments(&t.db, &policy, &op, &wildcard, &page)
            .await
            .unwrap();
        assert_eq!(listed.total, 1);
        assert_eq!(listed.list[0].content, "100% broken");

        let err = list_comments(&t.db, &policy, &owner, &CommentFilter::default(), &page)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn operators_delete_comments() {
        let t = TestDb::new().await;
        let owner = t.user("dev", TrustLevel::user()).await;
        let op = t.user("op", TrustLevel::operator()).await;
        let policy = PolicyConfig::default();
        let app = t.app(&owner, "com.example.app").await;
        let comment = t.comment(app, &owner, "hello").await;

        let err = delete_comment(&t.db, &policy, &owner, comment)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        delete_comment(&t.db, &policy, &op, comment).await.unwrap();
        assert_eq!(t.count("app_comment").await, 0);
        let err = delete_comment(&t.db, &policy, &op, comment)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
