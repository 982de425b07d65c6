use axum::{
    extract::multipart::MultipartError,
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
pub enum FileServiceError {
    #[error("repository error: {0}")]
    Repository(#[from] sqlx::Error),
    #[error(transparent)]
    BlobStore(#[from] BlobStoreError),
    #[error("stored content is not valid text: {0}")]
    InvalidContent(String),
}

/// Everything the HTTP layer can answer with besides a success.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Only .txt files allowed")]
    UnsupportedFileType,
    #[error("multipart field 'file' is required")]
    MissingFile,
    #[error("file name must be at most {0} characters")]
    FileNameTooLong(usize),
    #[error("file is not valid UTF-8 text")]
    NotUtf8,
    #[error("invalid multipart body: {0}")]
    Multipart(String),
    #[error("upload is too large")]
    UploadTooLarge,
    #[error("file id must be a positive integer, got {0}")]
    InvalidFileId(i64),
    #[error("file with id={0} not found")]
    FileNotFound(i64),
    #[error(transparent)]
    Service(#[from] FileServiceError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::UnsupportedFileType
            | ApiError::MissingFile
            | ApiError::FileNameTooLong(_)
            | ApiError::NotUtf8
            | ApiError::Multipart(_)
            | ApiError::InvalidFileId(_) => StatusCode::BAD_REQUEST,
            ApiError::UploadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::FileNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Service(FileServiceError::Repository(e)) if is_transient_error(e) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Service(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::UploadTooLarge
        } else {
            ApiError::Multipart(e.body_text())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
