use std::sync::Arc;

use common_blob_store::BlobStore;
use common_database::Inserted;
use common_fingerprint::{content_fingerprint, HashAlgorithm};
use tracing::{debug, info, warn};

use crate::{
    error::FileServiceError,
    repository::{FileRepository, NewFile},
};

const DEDUP_HITS: &str = "store_file_dedup_hits_total";
const FILES_SAVED: &str = "store_file_saved_total";
const RACE_LOST: &str = "store_insert_race_lost_total";

/// Content-addressed file storage: identical content is stored once and
/// always answers with the same id.
pub struct FileService {
    repository: Arc<dyn FileRepository>,
    storage: Arc<dyn BlobStore>,
    algorithm: HashAlgorithm,
}

impl FileService {
    pub fn new(
        repository: Arc<dyn FileRepository>,
        storage: Arc<dyn BlobStore>,
        algorithm: HashAlgorithm,
    ) -> Self {
        Self {
            repository,
            storage,
            algorithm,
        }
    }

    /// Returns the id of the record holding `content`, creating it if needed.
    /// On a hit `name` is ignored and nothing is written.
    pub async fn save_file(&self, name: &str, content: &str) -> Result<i64, FileServiceError> {
        let hash = content_fingerprint(content.as_bytes(), self.algorithm);

        if let Some(existing) = self.repository.find_by_hash(&hash).await? {
            debug!(file_id = existing.id, hash = %hash, "duplicate content, reusing file");
            common_metrics::inc(DEDUP_HITS, &[], 1);
            return Ok(existing.id);
        }

        let location = self.storage.save(content.as_bytes().to_vec()).await?;

        let new_file = NewFile {
            name: name.to_string(),
            hash,
            location: location.clone(),
        };
        match self.repository.add_one(new_file).await? {
            Inserted::Created(id) => {
                info!(file_id = id, location = %location, "stored new file");
                common_metrics::inc(FILES_SAVED, &[], 1);
                Ok(id)
            }
            Inserted::Existing(id) => {
                // The blob we just wrote is unreferenced from here on
                warn!(
                    file_id = id,
                    orphaned_location = %location,
                    "lost insert race for identical content"
                );
                common_metrics::inc(RACE_LOST, &[], 1);
                Ok(id)
            }
        }
    }

    /// `None` when no record has this id. Unknown ids never touch the blob store.
    pub async fn get_file(&self, id: i64) -> Result<Option<String>, FileServiceError> {
        let Some(location) = self.repository.get_location(id).await? else {
            debug!(file_id = id, "file not found");
            return Ok(None);
        };

        let bytes = self.storage.load(&location).await?;
        String::from_utf8(bytes)
            .map(Some)
            .map_err(|e| FileServiceError::InvalidContent(e.to_string()))
    }
}
