use axum::{
    extract::{Multipart, Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{error::ApiError, router::AppState};

pub const MAX_FILE_NAME_LEN: usize = 255;
const ALLOWED_EXTENSION: &str = ".txt";

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadResponse {
    pub file_id: i64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileTextResponse {
    pub file_text: String,
}

pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }

        let name = field.file_name().unwrap_or_default().to_string();
        if !name.ends_with(ALLOWED_EXTENSION) {
            return Err(ApiError::UnsupportedFileType);
        }
        if name.chars().count() > MAX_FILE_NAME_LEN {
            return Err(ApiError::FileNameTooLong(MAX_FILE_NAME_LEN));
        }

        let bytes = field.bytes().await?;
        let content = String::from_utf8(bytes.to_vec()).map_err(|_| ApiError::NotUtf8)?;
        debug!(name = %name, size = content.len(), "received upload");

        let file_id = state.files.save_file(&name, &content).await?;
        return Ok(Json(UploadResponse { file_id }));
    }

    Err(ApiError::MissingFile)
}

pub async fn get_file(
    State(state): State<AppState>,
    Path(file_id): Path<i64>,
) -> Result<Json<FileTextResponse>, ApiError> {
    if file_id < 1 {
        return Err(ApiError::InvalidFileId(file_id));
    }

    match state.files.get_file(file_id).await? {
        Some(file_text) => Ok(Json(FileTextResponse { file_text })),
        None => Err(ApiError::FileNotFound(file_id)),
    }
}
