use axum::{
    Router,
    extract::{FromRequest, FromRequestParts},
    response::{IntoResponse, Response},
};

use crate::{AppState, Error};

mod admin;
mod apps;
mod notices;
mod operate;
mod uploads;

/// JSON body whose rejections render like every other error.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(Error))]
pub(crate) struct Json<T>(pub T);

impl<T> IntoResponse for Json<T>
where
    axum::Json<T>: IntoResponse,
{
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(Error))]
pub(crate) struct Path<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(Error))]
pub(crate) struct Query<T>(pub T);

pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(apps::routes())
        .merge(notices::routes())
        .merge(operate::routes())
        .merge(admin::routes())
        .merge(uploads::routes())
}
