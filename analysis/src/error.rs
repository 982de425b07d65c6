use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common_blob_store::BlobStoreError;
use common_database::is_transient_error;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("file with id={0} not found")]
    FileNotFound(i64),
    #[error("file id must be a positive integer, got {0}")]
    InvalidFileId(i64),
    #[error("upstream request failed: {0}")]
    Upstream(String),
    #[error("repository error: {0}")]
    Repository(#[from] sqlx::Error),
    #[error(transparent)]
    BlobStore(#[from] BlobStoreError),
}

impl AnalysisError {
    fn status(&self) -> StatusCode {
        match self {
            AnalysisError::FileNotFound(_) => StatusCode::NOT_FOUND,
            AnalysisError::BlobStore(BlobStoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            AnalysisError::InvalidFileId(_) => StatusCode::BAD_REQUEST,
            AnalysisError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AnalysisError::Repository(e) if is_transient_error(e) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AnalysisError::Repository(_) | AnalysisError::BlobStore(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AnalysisError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
