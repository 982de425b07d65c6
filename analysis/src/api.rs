use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{error::AnalysisError, repository::FileStatRecord, router::AppState};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileStatResponse {
    pub file_id: i64,
    pub word_count: i64,
    pub char_count: i64,
    pub is_unique: bool,
    pub wordcloud_location: String,
}

impl From<FileStatRecord> for FileStatResponse {
    fn from(stat: FileStatRecord) -> Self {
        Self {
            file_id: stat.file_id,
            word_count: stat.word_count,
            char_count: stat.char_count,
            is_unique: stat.is_unique,
            wordcloud_location: stat.wordcloud_location,
        }
    }
}

pub async fn get_file_stat(
    State(state): State<AppState>,
    Path(file_id): Path<i64>,
) -> Result<Json<FileStatResponse>, AnalysisError> {
    if file_id < 1 {
        return Err(AnalysisError::InvalidFileId(file_id));
    }
    let stat = state.analysis.get_file_stat(file_id).await?;
    Ok(Json(stat.into()))
}

pub async fn get_word_cloud(
    State(state): State<AppState>,
    Path(location): Path<String>,
) -> Result<impl IntoResponse, AnalysisError> {
    let picture = state.analysis.get_word_cloud(&location).await?;
    Ok(([(header::CONTENT_TYPE, state.picture_content_type)], picture))
}
