use axum::{
    Router,
    extract::State,
    routing::{get, post},
};
use serde::Serialize;

use super::Json;
use crate::{
    AppState, Db, Result,
    auth::ActorContext,
    notices::{self, Unread},
};

async fn unread(actor: ActorContext, State(db): State<Db>) -> Result<Json<Unread>> {
    notices::unread(&db, &actor).await.map(Json)
}

#[derive(Serialize)]
struct ReadAll {
    updated: u64,
}

async fn read_all(actor: ActorContext, State(db): State<Db>) -> Result<Json<ReadAll>> {
    let updated = notices::mark_all_read(&db, &actor).await?;
    Ok(Json(ReadAll { updated }))
}

#[rustfmt::skip]
pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/notices/unread",  get(unread))
        .route("/notices/readall", post(read_all))
}
