use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use common_database::{Inserted, Repository};
use sqlx::Error as SqlxError;

use crate::repository::{FileStatRecord, FileStatRepository, NewFileStat};

#[derive(Default)]
struct MemoryState {
    rows: Vec<FileStatRecord>,
    pending_competitor: Option<NewFileStat>,
    inserts: usize,
}

/// In-memory `file_stat` table, unique on `file_id`, ids start at 1.
#[derive(Clone, Default)]
pub struct MemoryFileStatRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryFileStatRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Makes a concurrent writer win the next insert with `competitor`.
    pub fn lose_next_insert_to(&self, competitor: NewFileStat) {
        self.lock().pending_competitor = Some(competitor);
    }

    pub fn rows(&self) -> Vec<FileStatRecord> {
        self.lock().rows.clone()
    }

    /// Insert attempts made through `add_one`
    pub fn inserts(&self) -> usize {
        self.lock().inserts
    }

    fn insert(state: &mut MemoryState, data: NewFileStat) -> Inserted<i64> {
        if let Some(existing) = state.rows.iter().find(|r| r.file_id == data.file_id) {
            return Inserted::Existing(existing.id);
        }
        let id = state.rows.len() as i64 + 1;
        state.rows.push(FileStatRecord {
            id,
            file_id: data.file_id,
            word_count: data.word_count,
            char_count: data.char_count,
            is_unique: data.is_unique,
            wordcloud_location: data.wordcloud_location,
            normalized_hash: data.normalized_hash,
        });
        Inserted::Created(id)
    }
}

#[async_trait]
impl Repository for MemoryFileStatRepository {
    type Record = FileStatRecord;
    type NewRecord = NewFileStat;

    async fn add_one(&self, data: NewFileStat) -> Result<Inserted<i64>, SqlxError> {
        let mut state = self.lock();
        state.inserts += 1;
        if let Some(competitor) = state.pending_competitor.take() {
            Self::insert(&mut state, competitor);
        }
        Ok(Self::insert(&mut state, data))
    }

    async fn find_all(&self) -> Result<Vec<FileStatRecord>, SqlxError> {
        Ok(self.rows())
    }
}

#[async_trait]
impl FileStatRepository for MemoryFileStatRepository {
    async fn find_by_file_id(&self, file_id: i64) -> Result<Option<FileStatRecord>, SqlxError> {
        Ok(self.lock().rows.iter().find(|r| r.file_id == file_id).cloned())
    }

    async fn exists_by_normalized_hash(&self, normalized_hash: &str) -> Result<bool, SqlxError> {
        Ok(self
            .lock()
            .rows
            .iter()
            .any(|r| r.normalized_hash == normalized_hash))
    }
}
