use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;
use crate::blockchain::reconciler::ReconcileError;
use crate::pipeline::BackfillError;
use crate::store::StoreError;
use crate::supervisor::LifecycleError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Backfill(#[from] BackfillError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!("Request failed: {}", self);

        let (status, message) = match &self {
            ApiError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Database error occurred".to_string()),
            ApiError::Lifecycle(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            ApiError::Store(StoreError::Corrupt { .. }) => (StatusCode::CONFLICT, self.to_string()),
            ApiError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            ApiError::Backfill(BackfillError::Reconcile(ReconcileError::Store(StoreError::Corrupt { .. }))) => {
                (StatusCode::CONFLICT, self.to_string())
            }
            ApiError::Backfill(BackfillError::Graph(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error occurred".to_string())
            }
            ApiError::Backfill(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
        };

        let body = Json(json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
