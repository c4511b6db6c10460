use axum::{
    Json,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use crate::fanout::PartialDelivery;

/// Machine-checkable error category, rendered as `category` in error bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or missing input. Nothing was mutated.
    Validation,
    /// No usable session was presented.
    Unauthenticated,
    /// The actor's trust level does not allow the mutation.
    Forbidden,
    NotFound,
    /// The entity is not in a state that admits the transition.
    Conflict,
    /// A fan-out stopped part way; earlier batches are committed.
    PartialDelivery,
    /// Storage or collaborator failure. The transaction was rolled back.
    Internal,
}

impl ErrorKind {
    pub const fn status(self) -> StatusCode {
        match self {
            Self::Validation => StatusCode::BAD_REQUEST,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::PartialDelivery | Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// `axum`-compatible error handler.
#[derive(Error)]
pub struct Error {
    kind: ErrorKind,
    err: anyhow::Error,
}

impl Error {
    pub fn new(kind: ErrorKind, err: impl Into<anyhow::Error>) -> Self {
        Self {
            kind,
            err: err.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, anyhow::anyhow!(msg.into()))
    }

    pub fn unauthenticated(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthenticated, anyhow::anyhow!(msg.into()))
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, anyhow::anyhow!(msg.into()))
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, anyhow::anyhow!(msg.into()))
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, anyhow::anyhow!(msg.into()))
    }

    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The message shown to the caller. Internal failures only reveal their
    /// chain in debug builds.
    fn public_message(&self) -> String {
        match self.kind {
            ErrorKind::Internal if !cfg!(debug_assertions) => "internal server error".to_owned(),
            ErrorKind::Internal => format!("{:#}", self.err),
            _ => self.err.to_string(),
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::Internal,
            err,
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::new(ErrorKind::Internal, err)
    }
}

impl From<PartialDelivery> for Error {
    fn from(err: PartialDelivery) -> Self {
        Self::new(ErrorKind::PartialDelivery, err)
    }
}

impl From<JsonRejection> for Error {
    fn from(err: JsonRejection) -> Self {
        Self::validation(err.body_text())
    }
}

impl From<PathRejection> for Error {
    fn from(err: PathRejection) -> Self {
        Self::validation(err.body_text())
    }
}

impl From<QueryRejection> for Error {
    fn from(err: QueryRejection) -> Self {
        Self::validation(err.body_text())
    }
}

impl From<MultipartRejection> for Error {
    fn from(err: MultipartRejection) -> Self {
        Self::validation(err.body_text())
    }
}

impl From<MultipartError> for Error {
    fn from(err: MultipartError) -> Self {
        Self::validation(err.body_text())
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {:#}", self.kind, self.err)
    }
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.err.fmt(f)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: u16,
    category: ErrorKind,
    msg: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self.kind {
            ErrorKind::Internal | ErrorKind::PartialDelivery => error!("{:?}", self.err),
            _ => warn!("{}", self),
        }

        let status = self.kind.status();
        let body = ErrorBody {
            code: status.as_u16(),
            category: self.kind,
            msg: self.public_message(),
        };
        (status, Json(body)).into_response()
    }
}
