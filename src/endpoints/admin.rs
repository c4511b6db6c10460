use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
};
use serde::Deserialize;

use super::{Json, Path, Query};
use crate::{
    AppState, Db, Result,
    auth::ActorContext,
    config::PolicyConfig,
    db::{
        pagination::{PageRequest, Paged},
        tables::{
            market::{Comment, ContentPage},
            moderation::Report,
        },
    },
    membership::{self, SyncSummary},
    moderation::{self, CommentFilter, ReportDetail, ReportFilter, Resolution, ResolutionOutcome},
    pages::{self, PageDetail, PageInput},
};

async fn list_reports(
    actor: ActorContext,
    State(db): State<Db>,
    State(policy): State<PolicyConfig>,
    Query(filter): Query<ReportFilter>,
    Query(page): Query<PageRequest>,
) -> Result<Json<Paged<Report>>> {
    moderation::list_reports(&db, &policy, &actor, &filter, &page)
        .await
        .map(Json)
}

async fn report_detail(
    actor: ActorContext,
    State(db): State<Db>,
    State(policy): State<PolicyConfig>,
    Path(report_id): Path<i64>,
) -> Result<Json<ReportDetail>> {
    moderation::report_detail(&db, &policy, &actor, report_id)
        .await
        .map(Json)
}

async fn resolve_report(
    actor: ActorContext,
    State(db): State<Db>,
    State(policy): State<PolicyConfig>,
    Path(report_id): Path<i64>,
    Json(resolution): Json<Resolution>,
) -> Result<Json<ResolutionOutcome>> {
    moderation::resolve_report(&db, &policy, &actor, report_id, &resolution)
        .await
        .map(Json)
}

#[derive(Deserialize)]
struct VisibilityInput {
    visibility: bool,
}

async fn comment_visibility(
    actor: ActorContext,
    State(db): State<Db>,
    State(policy): State<PolicyConfig>,
    Path(comment_id): Path<i64>,
    Json(input): Json<VisibilityInput>,
) -> Result<StatusCode> {
    moderation::set_comment_visibility(&db, &policy, &actor, comment_id, input.visibility).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_comments(
    actor: ActorContext,
    State(db): State<Db>,
    State(policy): State<PolicyConfig>,
    Query(filter): Query<CommentFilter>,
    Query(page): Query<PageRequest>,
) -> Result<Json<Paged<Comment>>> {
    moderation::list_comments(&db, &policy, &actor, &filter, &page)
        .await
        .map(Json)
}

async fn delete_comment(
    actor: ActorContext,
    State(db): State<Db>,
    State(policy): State<PolicyConfig>,
    Path(comment_id): Path<i64>,
) -> Result<StatusCode> {
    moderation::delete_comment(&db, &policy, &actor, comment_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_pages(
    _actor: ActorContext,
    State(db): State<Db>,
    Query(page): Query<PageRequest>,
) -> Result<Json<Paged<ContentPage>>> {
    pages::list_pages(&db, &page).await.map(Json)
}

async fn create_page(
    actor: ActorContext,
    State(db): State<Db>,
    State(policy): State<PolicyConfig>,
    Json(input): Json<PageInput>,
) -> Result<Json<ContentPage>> {
    pages::create_page(&db, &policy, &actor, &input)
        .await
        .map(Json)
}

async fn get_page(
    _actor: ActorContext,
    State(db): State<Db>,
    Path(page_id): Path<i64>,
) -> Result<Json<PageDetail>> {
    pages::get_page(&db, page_id).await.map(Json)
}

async fn update_page(
    actor: ActorContext,
    State(db): State<Db>,
    State(policy): State<PolicyConfig>,
    Path(page_id): Path<i64>,
    Json(input): Json<PageInput>,
) -> Result<Json<ContentPage>> {
    pages::update_page(&db, &policy, &actor, page_id, &input)
        .await
        .map(Json)
}

async fn delete_page(
    actor: ActorContext,
    State(db): State<Db>,
    State(policy): State<PolicyConfig>,
    Path(page_id): Path<i64>,
) -> Result<Json<SyncSummary>> {
    membership::delete_page_cascade(&db, &policy, &actor, page_id)
        .await
        .map(Json)
}

#[derive(Deserialize)]
struct SyncInput {
    app_ids: Vec<i64>,
}

async fn sync_apps(
    actor: ActorContext,
    State(db): State<Db>,
    State(policy): State<PolicyConfig>,
    Path(page_id): Path<i64>,
    Json(input): Json<SyncInput>,
) -> Result<Json<SyncSummary>> {
    membership::sync_page(&db, &policy, &actor, page_id, &input.app_ids)
        .await
        .map(Json)
}

#[rustfmt::skip]
pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/admin/reports",                get(list_reports))
        .route("/admin/reports/{id}",           get(report_detail))
        .route("/admin/reports/{id}/audit",     post(resolve_report))
        .route("/admin/comments",               get(list_comments))
        .route("/admin/comments/{id}",          put(comment_visibility).delete(delete_comment))
        .route("/admin/pages",                  get(list_pages).post(create_page))
        .route("/admin/pages/{id}",             get(get_page).put(update_page).delete(delete_page))
        .route("/admin/pages/{id}/sync-apps",   post(sync_apps))
}
