use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::{BlobStore, BlobStoreError, KeyScheme};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobStoreCall {
    Save { location: String, size: usize },
    Load(String),
    Delete(String),
}

#[derive(Default)]
struct MockState {
    objects: HashMap<String, Vec<u8>>,
    calls: Vec<BlobStoreCall>,
    save_error: Option<BlobStoreError>,
    load_error: Option<BlobStoreError>,
    ping_error: Option<BlobStoreError>,
}

/// In-memory blob store that records every call. Clones share state, so a test
/// can keep one handle while the code under test owns another.
#[derive(Clone)]
pub struct MockBlobStore {
    keys: KeyScheme,
    state: Arc<Mutex<MockState>>,
}

impl MockBlobStore {
    pub fn new(keys: KeyScheme) -> Self {
        Self {
            keys,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Seeds an object without recording a call.
    pub fn with_object(self, location: &str, data: &[u8]) -> Self {
        self.lock()
            .objects
            .insert(location.to_string(), data.to_vec());
        self
    }

    pub fn fail_saves(&self, error: BlobStoreError) {
        self.lock().save_error = Some(error);
    }

    pub fn fail_loads(&self, error: BlobStoreError) {
        self.lock().load_error = Some(error);
    }

    pub fn fail_pings(&self, error: BlobStoreError) {
        self.lock().ping_error = Some(error);
    }

    pub fn calls(&self) -> Vec<BlobStoreCall> {
        self.lock().calls.clone()
    }

    pub fn save_count(&self) -> usize {
        self.count(|c| matches!(c, BlobStoreCall::Save { .. }))
    }

    pub fn load_count(&self) -> usize {
        self.count(|c| matches!(c, BlobStoreCall::Load(_)))
    }

    fn count(&self, pred: impl Fn(&BlobStoreCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn object(&self, location: &str) -> Option<Vec<u8>> {
        self.lock().objects.get(location).cloned()
    }

    pub fn object_count(&self) -> usize {
        self.lock().objects.len()
    }
}

#[async_trait]
impl BlobStore for MockBlobStore {
    async fn save(&self, data: Vec<u8>) -> Result<String, BlobStoreError> {
        let location = self.keys.generate();
        let mut state = self.lock();
        state.calls.push(BlobStoreCall::Save {
            location: location.clone(),
            size: data.len(),
        });
        if let Some(err) = state.save_error.clone() {
            return Err(err);
        }
        state.objects.insert(location.clone(), data);
        Ok(location)
    }

    async fn load(&self, location: &str) -> Result<Vec<u8>, BlobStoreError> {
        let mut state = self.lock();
        state.calls.push(BlobStoreCall::Load(location.to_string()));
        if let Some(err) = state.load_error.clone() {
            return Err(err);
        }
        state
            .objects
            .get(location)
            .cloned()
            .ok_or_else(|| BlobStoreError::NotFound(location.to_string()))
    }

    async fn delete(&self, location: &str) -> Result<(), BlobStoreError> {
        let mut state = self.lock();
        state.calls.push(BlobStoreCall::Delete(location.to_string()));
        state.objects.remove(location);
        Ok(())
    }

    async fn ping(&self) -> Result<(), BlobStoreError> {
        match self.lock().ping_error.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
