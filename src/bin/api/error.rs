use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tokio::task::JoinError;
use tracing::error;

use crate::{
    access_control::{Actor, Decision},
    store::StoreError,
};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication credentials were not provided or are invalid.")]
    Unauthorized,

    #[error("You do not have permission to perform this action.")]
    Forbidden,

    #[error("Not found.")]
    NotFound,

    #[error("{0}")]
    DuplicateEntry(String),

    #[error("You cannot subscribe to yourself.")]
    SelfFollowRejected,

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    MissingEntry(String),

    #[error("Data access failed: {0}")]
    DataAccess(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl AppError {
    /// Turns a denied decision into 401 for anonymous actors and 403 for everyone else.
    pub fn check(actor: &Actor, decision: Decision) -> Result<(), AppError> {
        match decision {
            Decision::Allow => Ok(()),
            Decision::Deny if actor.is_authenticated() => Err(AppError::Forbidden),
            Decision::Deny => Err(AppError::Unauthorized),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::DuplicateEntry(_)
            | AppError::SelfFollowRejected
            | AppError::Validation(_)
            | AppError::MissingEntry(_) => StatusCode::BAD_REQUEST,
            AppError::DataAccess(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::DuplicateEntry => AppError::DuplicateEntry("Entry already exists.".to_owned()),
            StoreError::NotFound => AppError::NotFound,
            StoreError::InvalidReference => AppError::Validation("Referenced object does not exist.".to_owned()),
            StoreError::SelfFollow => AppError::SelfFollowRejected,
            other => AppError::DataAccess(Box::new(other)),
        }
    }
}

impl From<JoinError> for AppError {
    fn from(error: JoinError) -> Self {
        AppError::DataAccess(Box::new(error))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let detail = match &self {
            AppError::DataAccess(source) => {
                error!("Request failed: {source}");
                "Internal server error.".to_owned()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}
