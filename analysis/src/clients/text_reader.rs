use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::error;

use crate::error::AnalysisError;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait TextProvider: Send + Sync {
    /// Text of the stored file, `FileNotFound` if the store does not know it.
    async fn fetch_text(&self, file_id: i64) -> Result<String, AnalysisError>;
}

#[derive(Deserialize)]
struct FileTextBody {
    file_text: String,
}

/// Reads file text from the store service's `GET /files/{id}`.
pub struct HttpFileTextReader {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFileTextReader {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: super::http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, file_id: i64) -> String {
        format!("{}/files/{}", self.base_url, file_id)
    }
}

#[async_trait]
impl TextProvider for HttpFileTextReader {
    async fn fetch_text(&self, file_id: i64) -> Result<String, AnalysisError> {
        let response = self.client.get(self.url(file_id)).send().await.map_err(|e| {
            error!(file_id, error = %e, "store service request failed");
            AnalysisError::Upstream(format!("store service unreachable: {e}"))
        })?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(AnalysisError::FileNotFound(file_id)),
            status if !status.is_success() => {
                error!(file_id, %status, "store service returned an error");
                return Err(AnalysisError::Upstream(format!(
                    "store service returned {status}"
                )));
            }
            _ => {}
        }

        let body: FileTextBody = response.json().await.map_err(|e| {
            AnalysisError::Upstream(format!("malformed store service response: {e}"))
        })?;
        Ok(body.file_text)
    }
}
