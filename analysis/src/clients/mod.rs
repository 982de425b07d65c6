//! Outbound HTTP collaborators: the store service for source text and the
//! remote word-cloud renderer.

use std::time::Duration;

pub mod text_reader;
pub mod wordcloud;

pub use text_reader::{HttpFileTextReader, TextProvider};
pub use wordcloud::{HttpWordCloud, WordCloudOptions, WordCloudRenderer};

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("analysis/", env!("CARGO_PKG_VERSION")))
        .build()
}
