use std::sync::Arc;

use common_blob_store::BlobStore;
use common_database::Inserted;
use common_fingerprint::{normalized_fingerprint, word_count};
use tracing::{debug, info, warn};

use crate::{
    clients::{TextProvider, WordCloudRenderer},
    error::AnalysisError,
    repository::{FileStatRecord, FileStatRepository, NewFileStat},
};

const CACHE_HITS: &str = "analysis_stat_cache_hits_total";
const STATS_COMPUTED: &str = "analysis_stat_computed_total";
const RACE_LOST: &str = "analysis_insert_race_lost_total";

/// Computes file statistics and word clouds once per file and serves the
/// cached record afterwards.
pub struct AnalysisService {
    texts: Arc<dyn TextProvider>,
    renderer: Arc<dyn WordCloudRenderer>,
    pictures: Arc<dyn BlobStore>,
    stats: Arc<dyn FileStatRepository>,
}

impl AnalysisService {
    pub fn new(
        texts: Arc<dyn TextProvider>,
        renderer: Arc<dyn WordCloudRenderer>,
        pictures: Arc<dyn BlobStore>,
        stats: Arc<dyn FileStatRepository>,
    ) -> Self {
        Self {
            texts,
            renderer,
            pictures,
            stats,
        }
    }

    pub async fn get_file_stat(&self, file_id: i64) -> Result<FileStatRecord, AnalysisError> {
        if let Some(stat) = self.stats.find_by_file_id(file_id).await? {
            debug!(file_id, "file stat cache hit");
            common_metrics::inc(CACHE_HITS, &[], 1);
            return Ok(stat);
        }

        debug!(file_id, "file stat cache miss");
        self.compute_file_stat(file_id).await
    }

    /// Picture bytes by location, no caching involved.
    pub async fn get_word_cloud(&self, location: &str) -> Result<Vec<u8>, AnalysisError> {
        Ok(self.pictures.load(location).await?)
    }

    async fn compute_file_stat(&self, file_id: i64) -> Result<FileStatRecord, AnalysisError> {
        let text = self.texts.fetch_text(file_id).await?;

        let normalized_hash = normalized_fingerprint(&text);
        // Checked before our own insert, so only other files count
        let is_unique = !self
            .stats
            .exists_by_normalized_hash(&normalized_hash)
            .await?;

        let picture = self.renderer.render(&text).await?;
        let wordcloud_location = self.pictures.save(picture).await?;

        let new_stat = NewFileStat {
            file_id,
            word_count: word_count(&text) as i64,
            char_count: text.chars().count() as i64,
            is_unique,
            wordcloud_location,
            normalized_hash,
        };

        match self.stats.add_one(new_stat.clone()).await? {
            Inserted::Created(id) => {
                info!(
                    file_id,
                    stat_id = id,
                    is_unique,
                    location = %new_stat.wordcloud_location,
                    "computed file stat"
                );
                common_metrics::inc(STATS_COMPUTED, &[], 1);
                Ok(FileStatRecord {
                    id,
                    file_id: new_stat.file_id,
                    word_count: new_stat.word_count,
                    char_count: new_stat.char_count,
                    is_unique: new_stat.is_unique,
                    wordcloud_location: new_stat.wordcloud_location,
                    normalized_hash: new_stat.normalized_hash,
                })
            }
            Inserted::Existing(id) => {
                warn!(
                    file_id,
                    stat_id = id,
                    orphaned_location = %new_stat.wordcloud_location,
                    "lost insert race for file stat"
                );
                common_metrics::inc(RACE_LOST, &[], 1);
                self.stats
                    .find_by_file_id(file_id)
                    .await?
                    .ok_or(AnalysisError::Repository(sqlx::Error::RowNotFound))
            }
        }
    }
}
