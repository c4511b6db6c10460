use std::sync::Arc;

use axum::{Router, extract::State, routing::post};

use super::Json;
use crate::{
    AppState, Db, Error, Result,
    auth::ActorContext,
    config::{AppConfig, PolicyConfig},
    fanout::{
        self, ActionsRequest, EmailRequest, EmailSummary, FanOutSummary, NoticeRequest,
        PopupRequest,
    },
    mailer::Mailer,
};

async fn notice(
    actor: ActorContext,
    State(db): State<Db>,
    State(config): State<AppConfig>,
    Json(req): Json<NoticeRequest>,
) -> Result<Json<FanOutSummary>> {
    fanout::send_notice(&db, &config.policy, config.fanout.batch_size, &actor, &req)
        .await
        .map(Json)
}

async fn popup(
    actor: ActorContext,
    State(db): State<Db>,
    State(config): State<AppConfig>,
    Json(req): Json<PopupRequest>,
) -> Result<Json<FanOutSummary>> {
    fanout::send_popup(&db, &config.policy, config.fanout.batch_size, &actor, &req)
        .await
        .map(Json)
}

async fn actions(
    actor: ActorContext,
    State(db): State<Db>,
    State(config): State<AppConfig>,
    Json(req): Json<ActionsRequest>,
) -> Result<Json<FanOutSummary>> {
    fanout::send_actions(&db, &config.policy, config.fanout.batch_size, &actor, &req)
        .await
        .map(Json)
}

async fn email(
    actor: ActorContext,
    State(db): State<Db>,
    State(policy): State<PolicyConfig>,
    State(mailer): State<Option<Arc<dyn Mailer>>>,
    Json(req): Json<EmailRequest>,
) -> Result<Json<EmailSummary>> {
    let mailer = mailer.ok_or_else(|| Error::from(anyhow::anyhow!("no mail relay configured")))?;
    fanout::send_email(&db, mailer.as_ref(), &policy, &actor, &req)
        .await
        .map(Json)
}

#[rustfmt::skip]
pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/operate/notice",  post(notice))
        .route("/operate/popup",   post(popup))
        .route("/operate/actions", post(actions))
        .route("/operate/email",   post(email))
}
