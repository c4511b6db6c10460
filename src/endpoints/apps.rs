use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::{delete, get, post},
};
use serde::Deserialize;

use super::{Json, Path, Query};
use crate::{
    AppState, Db, Result,
    apps::{self, AppFilter, AppPatch, NewApp, SimpleApp, Submission},
    audit::{self, AuditDecision, NewMirror, PendingMirror},
    auth::ActorContext,
    broker::UploadBroker,
    config::PolicyConfig,
    db::{
        pagination::{PageRequest, Paged},
        tables::market::{App, AppDownload, AuditStatus},
    },
    filestore::LocalStore,
};

async fn list_apps(
    actor: ActorContext,
    State(db): State<Db>,
    State(policy): State<PolicyConfig>,
    Query(filter): Query<AppFilter>,
    Query(page): Query<PageRequest>,
) -> Result<Json<Paged<App>>> {
    apps::list_apps(&db, &policy, &actor, &filter, &page)
        .await
        .map(Json)
}

async fn submit_app(
    actor: ActorContext,
    State(db): State<Db>,
    State(broker): State<Arc<dyn UploadBroker>>,
    Json(input): Json<NewApp>,
) -> Result<Json<Submission>> {
    apps::submit_app(&db, broker.as_ref(), &actor, &input)
        .await
        .map(Json)
}

async fn simple_list(_actor: ActorContext, State(db): State<Db>) -> Result<Json<Vec<SimpleApp>>> {
    apps::simple_list(&db).await.map(Json)
}

async fn get_app(
    _actor: ActorContext,
    State(db): State<Db>,
    Path(app_id): Path<i64>,
) -> Result<Json<App>> {
    apps::get_app(&db, app_id).await.map(Json)
}

async fn update_app(
    actor: ActorContext,
    State(db): State<Db>,
    State(store): State<LocalStore>,
    State(policy): State<PolicyConfig>,
    Path(app_id): Path<i64>,
    Json(patch): Json<AppPatch>,
) -> Result<StatusCode> {
    apps::update_app(&db, &store, &policy, &actor, app_id, patch).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_app(
    actor: ActorContext,
    State(db): State<Db>,
    State(store): State<LocalStore>,
    State(policy): State<PolicyConfig>,
    Path(app_id): Path<i64>,
) -> Result<StatusCode> {
    apps::delete_app(&db, &store, &policy, &actor, app_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct AuditInput {
    success: bool,
    #[serde(default)]
    reason: String,
}

#[derive(serde::Serialize)]
struct AuditOutput {
    audit_status: AuditStatus,
}

async fn audit_app(
    actor: ActorContext,
    State(db): State<Db>,
    State(policy): State<PolicyConfig>,
    Path(app_id): Path<i64>,
    Json(input): Json<AuditInput>,
) -> Result<Json<AuditOutput>> {
    let decision = AuditDecision::new(input.success, input.reason)?;
    let audit_status = audit::audit_app(&db, &policy, &actor, app_id, &decision).await?;
    Ok(Json(AuditOutput { audit_status }))
}

async fn list_downloads(
    _actor: ActorContext,
    State(db): State<Db>,
    Path(app_id): Path<i64>,
) -> Result<Json<Vec<AppDownload>>> {
    audit::list_mirrors(&db, app_id).await.map(Json)
}

async fn add_download(
    actor: ActorContext,
    State(db): State<Db>,
    State(policy): State<PolicyConfig>,
    Path(app_id): Path<i64>,
    Json(mirror): Json<NewMirror>,
) -> Result<Json<AppDownload>> {
    audit::add_mirror(&db, &policy, &actor, app_id, &mirror)
        .await
        .map(Json)
}

async fn download_test_url(
    _actor: ActorContext,
    State(db): State<Db>,
    Path(app_id): Path<i64>,
) -> Result<Json<Vec<AppDownload>>> {
    audit::approved_mirrors(&db, app_id).await.map(Json)
}

async fn delete_download(
    actor: ActorContext,
    State(db): State<Db>,
    State(policy): State<PolicyConfig>,
    Path(download_id): Path<i64>,
) -> Result<StatusCode> {
    audit::delete_mirror(&db, &policy, &actor, download_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct MirrorAuditInput {
    success: bool,
}

async fn audit_download(
    actor: ActorContext,
    State(db): State<Db>,
    State(policy): State<PolicyConfig>,
    Path(download_id): Path<i64>,
    Json(input): Json<MirrorAuditInput>,
) -> Result<Json<AuditOutput>> {
    let audit_status =
        audit::audit_download(&db, &policy, &actor, download_id, input.success).await?;
    Ok(Json(AuditOutput { audit_status }))
}

async fn downloads_to_audit(
    actor: ActorContext,
    State(db): State<Db>,
    State(policy): State<PolicyConfig>,
    Query(page): Query<PageRequest>,
) -> Result<Json<Paged<PendingMirror>>> {
    audit::pending_mirrors(&db, &policy, &actor, &page)
        .await
        .map(Json)
}

#[rustfmt::skip]
pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/apps",                         get(list_apps).post(submit_app))
        .route("/apps/simple",                  get(simple_list))
        .route("/apps/{id}",                    get(get_app).put(update_app).delete(delete_app))
        .route("/apps/{id}/audit",              post(audit_app))
        .route("/apps/{id}/downloads",          get(list_downloads).post(add_download))
        .route("/apps/{id}/download-test-url",  get(download_test_url))
        .route("/apps/downloads/{id}",          delete(delete_download))
        .route("/apps/downloads/{id}/audit",    post(audit_download))
        .route("/apps/downloads-to-audit",      get(downloads_to_audit))
}
