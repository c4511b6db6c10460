//! App marketplace moderation backend.
pub mod apps;
pub mod audit;
pub mod auth;
pub mod broker;
pub mod config;
pub mod db;
mod endpoints;
pub mod error;
pub mod fanout;
pub mod filestore;
pub mod mailer;
pub mod membership;
pub mod metrics;
pub mod moderation;
pub mod notices;
pub mod pages;
mod serve;

pub use db::Db;
pub use error::Error;
pub use serve::{APP_USER_AGENT, AppState, Result, router, run};

/// The index (/) route.
async fn index() -> impl axum::response::IntoResponse {
    r"
This is an app marketplace moderation backend.

Most API routes are under /api/v1/
    "
}
