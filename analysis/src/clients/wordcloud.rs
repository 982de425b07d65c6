use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::Serialize;
use tracing::error;

use crate::error::AnalysisError;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait WordCloudRenderer: Send + Sync {
    async fn render(&self, text: &str) -> Result<Vec<u8>, AnalysisError>;
}

/// Rendering options sent with every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WordCloudOptions {
    pub format: String,
    pub width: u32,
    pub height: u32,
    pub font_family: String,
    pub font_scale: u32,
    pub scale: String,
}

impl WordCloudOptions {
    /// Media type of the rendered picture
    pub fn content_type(&self) -> &'static str {
        match self.format.to_ascii_lowercase().as_str() {
            "png" => "image/png",
            "svg" => "image/svg+xml",
            "jpg" | "jpeg" => "image/jpeg",
            "webp" => "image/webp",
            _ => "application/octet-stream",
        }
    }
}

#[derive(Serialize)]
struct RenderRequest<'a> {
    #[serde(flatten)]
    options: &'a WordCloudOptions,
    text: &'a str,
}

/// Client for a quickchart-style word cloud API: a JSON POST answered with image bytes.
pub struct HttpWordCloud {
    client: reqwest::Client,
    url: String,
    options: WordCloudOptions,
}

impl HttpWordCloud {
    pub fn new(
        url: &str,
        options: WordCloudOptions,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: super::http_client(timeout)?,
            url: url.to_string(),
            options,
        })
    }
}

#[async_trait]
impl WordCloudRenderer for HttpWordCloud {
    async fn render(&self, text: &str) -> Result<Vec<u8>, AnalysisError> {
        let request = RenderRequest {
            options: &self.options,
            text,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "word cloud request failed");
                AnalysisError::Upstream(format!("word cloud renderer unreachable: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            error!(%status, "word cloud renderer returned an error");
            return Err(AnalysisError::Upstream(format!(
                "word cloud renderer returned {status}"
            )));
        }

        let bytes = response.bytes().await.map_err(|e| {
            AnalysisError::Upstream(format!("failed to read word cloud body: {e}"))
        })?;
        Ok(bytes.to_vec())
    }
}
