use axum::{
    Router,
    extract::{Multipart, State, multipart::MultipartRejection},
    routing::post,
};

use super::{Json, Path};
use crate::{
    AppState, Error, Result,
    auth::ActorContext,
    config::PolicyConfig,
    filestore::{LocalStore, StoredFile, UploadCategory},
};

/// Store the `file` field of a multipart body under `category`.
async fn upload(
    actor: ActorContext,
    State(store): State<LocalStore>,
    State(policy): State<PolicyConfig>,
    Path(category): Path<UploadCategory>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<StoredFile>> {
    let mut multipart = multipart?;
    if category == UploadCategory::Popup {
        actor.require(policy.operate)?;
    }

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field
            .file_name()
            .map(str::to_owned)
            .ok_or_else(|| Error::validation("upload is missing a file name"))?;
        let bytes = field.bytes().await?;
        if bytes.is_empty() {
            return Err(Error::validation("upload is empty"));
        }
        let stored = store.save(category, &file_name, &bytes).await?;
        return Ok(Json(stored));
    }
    Err(Error::validation("expected a multipart field named `file`"))
}

pub(super) fn routes() -> Router<AppState> {
    Router::new().route("/uploads/{category}", post(upload))
}
