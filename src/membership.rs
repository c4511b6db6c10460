//! App ↔ content page membership.
//!
//! Membership is stored as rows of `app_page_member (app_id, page_id)` under a
//! composite primary key. On the wire an app's pages are still rendered the way
//! the console expects: a delimiter-wrapped id list such as `,3,7,`, handled by
//! [`Membership`] with exact-token semantics so that page `3` never matches `30`.

use std::{collections::BTreeSet, fmt, str::FromStr};

use serde::{Serialize, Serializer};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use thiserror::Error;
use tracing::info;

use crate::{
    Error, Result,
    auth::ActorContext,
    config::PolicyConfig,
    db::{self, Db, util::IDS_PER_STATEMENT},
    metrics::PAGE_SYNCS,
};

const DELIMITER: char = ',';

/// The set of content pages an app belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Membership(BTreeSet<i64>);

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid membership token {0:?}")]
pub struct MembershipParseError(String);

impl FromStr for Membership {
    type Err = MembershipParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.split(DELIMITER)
            .filter(|token| !token.is_empty())
            .map(|token| {
                token
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| MembershipParseError(token.to_owned()))
            })
            .collect::<std::result::Result<_, _>>()
            .map(Self)
    }
}

impl fmt::Display for Membership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{DELIMITER}")?;
        for page_id in &self.0 {
            write!(f, "{page_id}{DELIMITER}")?;
        }
        Ok(())
    }
}

impl Serialize for Membership {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Counts from one membership sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub removed: u64,
    pub added: u64,
}

/// Detach `page_id` from every app that references it.
pub async fn remove_from_page(conn: &mut SqliteConnection, page_id: i64) -> Result<u64> {
    let result = sqlx::query("DELETE FROM app_page_member WHERE page_id = ?")
        .bind(page_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

/// Attach `page_id` to each app in `app_ids`. Existing pairs are left alone.
pub async fn add_to_page(
    conn: &mut SqliteConnection,
    page_id: i64,
    app_ids: &[i64],
) -> Result<u64> {
    let mut added = 0;
    for chunk in app_ids.chunks(IDS_PER_STATEMENT) {
        let mut qb: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new("INSERT OR IGNORE INTO app_page_member (app_id, page_id) ");
        qb.push_values(chunk, |mut row, app_id| {
            row.push_bind(*app_id).push_bind(page_id);
        });
        added += qb.build().execute(&mut *conn).await?.rows_affected();
    }
    Ok(added)
}

/// Replace the membership of `page_id` with exactly `app_ids`.
///
/// Must run on a connection inside the caller's transaction.
pub async fn sync_page_membership(
    conn: &mut SqliteConnection,
    page_id: i64,
    app_ids: &[i64],
) -> Result<SyncSummary> {
    let removed = remove_from_page(&mut *conn, page_id).await?;
    let added = if app_ids.is_empty() {
        0
    } else {
        add_to_page(&mut *conn, page_id, app_ids).await?
    };
    Ok(SyncSummary { removed, added })
}

/// Detach `app_id` from every page it belongs to.
pub async fn detach_app(conn: &mut SqliteConnection, app_id: i64) -> Result<u64> {
    let result = sqlx::query("DELETE FROM app_page_member WHERE app_id = ?")
        .bind(app_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

/// The apps on `page_id`, in ascending id order.
pub async fn members_of(db: &Db, page_id: i64) -> Result<Vec<i64>> {
    let apps = sqlx::query_scalar(
        "SELECT app_id FROM app_page_member WHERE page_id = ? ORDER BY app_id",
    )
    .bind(page_id)
    .fetch_all(db)
    .await?;
    Ok(apps)
}

async fn page_exists(db: &Db, page_id: i64) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM content_page WHERE id = ?")
        .bind(page_id)
        .fetch_optional(db)
        .await?;
    Ok(found.is_some())
}

/// Ids in `app_ids` with no matching app row.
async fn missing_apps(db: &Db, app_ids: &[i64]) -> Result<Vec<i64>> {
    let mut found = BTreeSet::new();
    for chunk in app_ids.chunks(IDS_PER_STATEMENT) {
        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new("SELECT id FROM app WHERE id IN (");
        let mut ids = qb.separated(", ");
        for app_id in chunk {
            ids.push_bind(*app_id);
        }
        ids.push_unseparated(")");
        let rows = qb.build_query_scalar::<i64>().fetch_all(db).await?;
        found.extend(rows);
    }
    Ok(app_ids
        .iter()
        .copied()
        .filter(|id| !found.contains(id))
        .collect())
}

/// Make `app_ids` the complete membership of `page_id`.
///
/// Idempotent: a repeated call with the same ids leaves the same state.
pub async fn sync_page(
    db: &Db,
    policy: &PolicyConfig,
    actor: &ActorContext,
    page_id: i64,
    app_ids: &[i64],
) -> Result<SyncSummary> {
    actor.require(policy.operate)?;

    let app_ids: Vec<i64> = app_ids
        .iter()
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    if !page_exists(db, page_id).await? {
        return Err(Error::not_found(format!("content page {page_id} does not exist")));
    }
    let missing = missing_apps(db, &app_ids).await?;
    if !missing.is_empty() {
        return Err(Error::not_found(format!("apps {missing:?} do not exist")));
    }

    let mut tx = db::begin(db).await?;
    let summary = sync_page_membership(&mut tx, page_id, &app_ids).await?;
    tx.commit().await?;

    metrics::counter!(PAGE_SYNCS).increment(1);
    info!(
        page_id,
        removed = summary.removed,
        added = summary.added,
        "synced page membership"
    );
    Ok(summary)
}

/// Delete a content page together with every membership that references it.
///
/// Membership cleanup and the page delete commit together or not at all.
pub async fn delete_page_cascade(
    db: &Db,
    policy: &PolicyConfig,
    actor: &ActorContext,
    page_id: i64,
) -> Result<SyncSummary> {
    actor.require(policy.operate)?;

    let mut tx = db::begin(db).await?;
    let summary = sync_page_membership(&mut tx, page_id, &[]).await?;
    let deleted = sqlx::query("DELETE FROM content_page WHERE id = ?")
        .bind(page_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    if deleted == 0 {
        return Err(Error::not_found(format!("content page {page_id} does not exist")));
    }
    tx.commit().await?;

    info!(page_id, detached = summary.removed, "deleted content page");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth::TrustLevel, error::ErrorKind, tests::TestDb};

    #[test]
    fn renders_delimiter_wrapped_tokens() {
        let m: Membership = ",7,3,".parse().unwrap();
        assert_eq!(m.to_string(), ",3,7,");
        assert_eq!(Membership::default().to_string(), ",");
        assert_eq!("30".parse::<Membership>().unwrap().to_string(), ",30,");
        assert_eq!(serde_json::to_value(&m).unwrap(), ",3,7,");
    }

    #[test]
    fn parse_accepts_console_encodings() {
        for (input, expected) in [(",3,7,", ",3,7,"), (" 3 ,7", ",3,7,"), (",", ","), ("", ",")] {
            let m: Membership = input.parse().unwrap();
            assert_eq!(m.to_string(), expected, "{input:?}");
        }
        assert!(",3,x,".parse::<Membership>().is_err());
    }

    #[tokio::test]
    async fn page_removal_never_touches_numeric_neighbours() {
        let t = TestDb::new().await;
        let op = t.user("op", TrustLevel::operator()).await;
        let owner = t.user("dev", TrustLevel::user()).await;
        let app = t.app(&owner, "com.example.a").await;
        let policy = PolicyConfig::default();
        for page_id in [3, 30, 300] {
            let _ = sqlx::query("INSERT INTO content_page (id, title, time) VALUES (?, 'p', 0)")
                .bind(page_id)
                .execute(&t.db)
                .await
                .unwrap();
            sync_page(&t.db, &policy, &op, page_id, &[app]).await.unwrap();
        }

        let mut conn = t.db.acquire().await.unwrap();
        assert_eq!(remove_from_page(&mut *conn, 3).await.unwrap(), 1);
        drop(conn);

        let listed = crate::apps::simple_list(&t.db).await.unwrap();
        assert_eq!(listed[0].pages.to_string(), ",30,300,");
    }

    #[tokio::test]
    async fn sync_replaces_membership_and_is_idempotent() {
        let t = TestDb::new().await;
        let op = t.user("op", TrustLevel::operator()).await;
        let owner = t.user("dev", TrustLevel::user()).await;
        let a = t.app(&owner, "com.example.a").await;
        let b = t.app(&owner, "com.example.b").await;
        let c = t.app(&owner, "com.example.c").await;
        let page = t.page("Featured").await;
        let policy = PolicyConfig::default();

        sync_page(&t.db, &policy, &op, page, &[a, b]).await.unwrap();
        let first = sync_page(&t.db, &policy, &op, page, &[b, c, c])
            .await
            .unwrap();
        assert_eq!(first, SyncSummary { removed: 2, added: 2 });
        let before = members_of(&t.db, page).await.unwrap();

        sync_page(&t.db, &policy, &op, page, &[b, c]).await.unwrap();
        assert_eq!(members_of(&t.db, page).await.unwrap(), before);
        assert_eq!(before, vec![b, c]);
    }

    #[tokio::test]
    async fn sync_leaves_other_pages_alone() {
        let t = TestDb::new().await;
        let op = t.user("op", TrustLevel::operator()).await;
        let owner = t.user("dev", TrustLevel::user()).await;
        let app = t.app(&owner, "com.example.a").await;
        let policy = PolicyConfig::default();

        let mut pages = Vec::new();
        for title in ["p1", "p2", "p3"] {
            pages.push(t.page(title).await);
        }
        for &page in &pages {
            sync_page(&t.db, &policy, &op, page, &[app]).await.unwrap();
        }
        sync_page(&t.db, &policy, &op, pages[0], &[]).await.unwrap();

        assert!(members_of(&t.db, pages[0]).await.unwrap().is_empty());
        for &page in &pages[1..] {
            assert_eq!(members_of(&t.db, page).await.unwrap(), vec![app]);
        }
    }

    #[tokio::test]
    async fn sync_rejects_unknown_apps_without_mutating() {
        let t = TestDb::new().await;
        let op = t.user("op", TrustLevel::operator()).await;
        let owner = t.user("dev", TrustLevel::user()).await;
        let app = t.app(&owner, "com.example.a").await;
        let page = t.page("Featured").await;
        let policy = PolicyConfig::default();
        sync_page(&t.db, &policy, &op, page, &[app]).await.unwrap();

        let err = sync_page(&t.db, &policy, &op, page, &[app, 9999])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(members_of(&t.db, page).await.unwrap(), vec![app]);
    }

    #[tokio::test]
    async fn sync_requires_operator_trust() {
        let t = TestDb::new().await;
        let reviewer = t.user("rev", TrustLevel::reviewer()).await;
        let page = t.page("Featured").await;

        let err = sync_page(&t.db, &PolicyConfig::default(), &reviewer, page, &[])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn delete_page_detaches_every_app() {
        let t = TestDb::new().await;
        let op = t.user("op", TrustLevel::operator()).await;
        let owner = t.user("dev", TrustLevel::user()).await;
        let policy = PolicyConfig::default();
        let page = t.page("Featured").await;
        let other = t.page("Other").await;
        let mut apps = Vec::new();
        for i in 0..5 {
            apps.push(t.app(&owner, &format!("com.example.{i}")).await);
        }
        sync_page(&t.db, &policy, &op, page, &apps).await.unwrap();
        sync_page(&t.db, &policy, &op, other, &apps[..1]).await.unwrap();

        let summary = delete_page_cascade(&t.db, &policy, &op, page).await.unwrap();
        assert_eq!(summary.removed, 5);

        assert!(members_of(&t.db, page).await.unwrap().is_empty());
        assert!(!page_exists(&t.db, page).await.unwrap());
        assert_eq!(members_of(&t.db, other).await.unwrap(), vec![apps[0]]);
    }

    #[tokio::test]
    async fn failed_page_delete_keeps_membership() {
        let t = TestDb::new().await;
        let op = t.user("op", TrustLevel::operator()).await;
        let owner = t.user("dev", TrustLevel::user()).await;
        let policy = PolicyConfig::default();
        let page = t.page("Featured").await;
        let a = t.app(&owner, "com.example.a").await;
        let b = t.app(&owner, "com.example.b").await;
        sync_page(&t.db, &policy, &op, page, &[a, b]).await.unwrap();

        t.fail_on(
            "CREATE TRIGGER refuse_page_delete BEFORE DELETE ON content_page \
             BEGIN SELECT RAISE(ABORT, 'page delete refused'); END",
        )
        .await;

        let err = delete_page_cascade(&t.db, &policy, &op, page)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(members_of(&t.db, page).await.unwrap(), vec![a, b]);
        assert!(page_exists(&t.db, page).await.unwrap());
    }

    #[tokio::test]
    async fn deleting_a_missing_page_is_not_found() {
        let t = TestDb::new().await;
        let op = t.user("op", TrustLevel::operator()).await;

        let err = delete_page_cascade(&t.db, &PolicyConfig::default(), &op, 404)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
