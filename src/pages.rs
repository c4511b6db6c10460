//! Curated content pages.
//!
//! Membership of a page is owned by [`crate::membership`]; this module only
//! manages the page record itself.

use serde::{Deserialize, Serialize};
use sqlx::types::Json;

use crate::{
    Error, Result,
    auth::ActorContext,
    config::PolicyConfig,
    db::{
        Db, now_millis,
        pagination::{PageRequest, Paged},
        tables::market::ContentPage,
    },
    membership,
};

#[derive(Debug, Clone, Deserialize)]
pub struct PageInput {
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub img_list: Vec<String>,
    #[serde(default)]
    pub has_app_list: bool,
    #[serde(default)]
    pub show_in_list: bool,
}

impl PageInput {
    fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::validation("a page needs a title"));
        }
        Ok(())
    }
}

pub async fn create_page(
    db: &Db,
    policy: &PolicyConfig,
    actor: &ActorContext,
    input: &PageInput,
) -> Result<ContentPage> {
    actor.require(policy.operate)?;
    input.validate()?;

    let page = sqlx::query_as(
        r#"
        INSERT INTO content_page (title, content, img_list, has_app_list, show_in_list, time)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING *
        "#,
    )
    .bind(input.title.trim())
    .bind(&input.content)
    .bind(Json(&input.img_list))
    .bind(input.has_app_list)
    .bind(input.show_in_list)
    .bind(now_millis())
    .fetch_one(db)
    .await?;
    Ok(page)
}

/// Replace a page's metadata. Its membership is untouched.
pub async fn update_page(
    db: &Db,
    policy: &PolicyConfig,
    actor: &ActorContext,
    page_id: i64,
    input: &PageInput,
) -> Result<ContentPage> {
    actor.require(policy.operate)?;
    input.validate()?;

    sqlx::query_as(
        r#"
        UPDATE content_page SET title = ?, content = ?, img_list = ?, has_app_list = ?, show_in_list = ?
            WHERE id = ?
            RETURNING *
        "#,
    )
    .bind(input.title.trim())
    .bind(&input.content)
    .bind(Json(&input.img_list))
    .bind(input.has_app_list)
    .bind(input.show_in_list)
    .bind(page_id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| Error::not_found(format!("content page {page_id} does not exist")))
}

#[derive(Debug, Clone, Serialize)]
pub struct PageDetail {
    #[serde(flatten)]
    pub page: ContentPage,
    pub app_ids: Vec<i64>,
}

pub async fn get_page(db: &Db, page_id: i64) -> Result<PageDetail> {
    let page = sqlx::query_as("SELECT * FROM content_page WHERE id = ?")
        .bind(page_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| Error::not_found(format!("content page {page_id} does not exist")))?;
    let app_ids = membership::members_of(db, page_id).await?;
    Ok(PageDetail { page, app_ids })
}

pub async fn list_pages(db: &Db, page: &PageRequest) -> Result<Paged<ContentPage>> {
    let total = sqlx::query_scalar("SELECT COUNT(*) FROM content_page")
        .fetch_one(db)
        .await?;
    let list = sqlx::query_as("SELECT * FROM content_page ORDER BY id DESC LIMIT ? OFFSET ?")
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(db)
        .await?;
    Ok(Paged { list, total })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth::TrustLevel, error::ErrorKind, tests::TestDb};

    fn input(title: &str) -> PageInput {
        PageInput {
            title: title.to_owned(),
            content: "Hand-picked".to_owned(),
            img_list: vec!["previews/banner.png".to_owned()],
            has_app_list: true,
            show_in_list: true,
        }
    }

    #[tokio::test]
    async fn edits_keep_membership() {
        let t = TestDb::new().await;
        let op = t.user("op", TrustLevel::operator()).await;
        let dev = t.user("dev", TrustLevel::user()).await;
        let policy = PolicyConfig::default();
        let app = t.app(&dev, "com.example.app").await;

        let page = create_page(&t.db, &policy, &op, &input("Featured"))
            .await
            .unwrap();
        membership::sync_page(&t.db, &policy, &op, page.id, &[app])
            .await
            .unwrap();
        let updated = update_page(&t.db, &policy, &op, page.id, &input("Editors' picks"))
            .await
            .unwrap();
        assert_eq!(updated.title, "Editors' picks");
        assert_eq!(updated.img_list.0, vec!["previews/banner.png".to_owned()]);

        let detail = get_page(&t.db, page.id).await.unwrap();
        assert_eq!(detail.app_ids, vec![app]);
        assert_eq!(list_pages(&t.db, &PageRequest::default()).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn pages_need_operators_and_titles() {
        let t = TestDb::new().await;
        let op = t.user("op", TrustLevel::operator()).await;
        let rev = t.user("rev", TrustLevel::reviewer()).await;
        let policy = PolicyConfig::default();

        let err = create_page(&t.db, &policy, &rev, &input("Featured"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        let err = create_page(&t.db, &policy, &op, &input("  "))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = update_page(&t.db, &policy, &op, 77, &input("Gone"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
