use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use common_database::{Inserted, Repository};
use sqlx::Error as SqlxError;

use crate::repository::{FileRecord, FileRepository, NewFile};

#[derive(Default)]
struct MemoryState {
    rows: Vec<FileRecord>,
    // Inserted by "another writer" right before the next add_one runs
    pending_competitor: Option<NewFile>,
    fail_with_pool_timeout: bool,
    lookups: usize,
}

/// Postgres stand-in with the same unique-hash semantics, ids start at 1.
#[derive(Clone, Default)]
pub struct MemoryFileRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryFileRepository {
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
    pub fn lose_next_insert_to(&self, competitor: NewFile) {
        self.lock().pending_competitor = Some(competitor);
    }

    pub fn fail_all(&self) {
        self.lock().fail_with_pool_timeout = true;
    }

    pub fn rows(&self) -> Vec<FileRecord> {
        self.lock().rows.clone()
    }

    pub fn lookups(&self) -> usize {
        self.lock().lookups
    }

    fn insert(state: &mut MemoryState, data: NewFile) -> Inserted<i64> {
        if let Some(existing) = state.rows.iter().find(|r| r.hash == data.hash) {
            return Inserted::Existing(existing.id);
        }
        let id = state.rows.len() as i64 + 1;
        state.rows.push(FileRecord {
            id,
            name: data.name,
            hash: data.hash,
            location: data.location,
        });
        Inserted::Created(id)
    }

    fn check(state: &MemoryState) -> Result<(), SqlxError> {
        if state.fail_with_pool_timeout {
            return Err(SqlxError::PoolTimedOut);
        }
        Ok(())
    }
}

#[async_trait]
impl Repository for MemoryFileRepository {
    type Record = FileRecord;
    type NewRecord = NewFile;

    async fn add_one(&self, data: NewFile) -> Result<Inserted<i64>, SqlxError> {
        let mut state = self.lock();
        Self::check(&state)?;
        if let Some(competitor) = state.pending_competitor.take() {
            Self::insert(&mut state, competitor);
        }
        Ok(Self::insert(&mut state, data))
    }

    async fn find_all(&self) -> Result<Vec<FileRecord>, SqlxError> {
        let state = self.lock();
        Self::check(&state)?;
        Ok(state.rows.clone())
    }
}

#[async_trait]
impl FileRepository for MemoryFileRepository {
    async fn find_by_hash(&self, hash: &str) -> Result<Option<FileRecord>, SqlxError> {
        let mut state = self.lock();
        Self::check(&state)?;
        state.lookups += 1;
        Ok(state.rows.iter().find(|r| r.hash == hash).cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<FileRecord>, SqlxError> {
        let mut state = self.lock();
        Self::check(&state)?;
        state.lookups += 1;
        Ok(state.rows.iter().find(|r| r.id == id).cloned())
    }

    async fn get_location(&self, id: i64) -> Result<Option<String>, SqlxError> {
        Ok(self.find_by_id(id).await?.map(|r| r.location))
    }
}
