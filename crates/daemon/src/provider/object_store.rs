// Sync-target backend: notes are `<id>.md` objects, locking goes through
// list-based markers under `locks/`.

use std::time::Duration;

use notetally_common::note::Note;
use notetally_common::types::ProviderKind;

use super::{NoteProvider, ProviderError};
use crate::lock::{ListLock, LockConfig, LockGrant};
use crate::store::{list_all, ObjectStore};

pub struct ObjectStoreProvider<S: ObjectStore> {
    lock: ListLock<S>,
}

impl<S: ObjectStore> ObjectStoreProvider<S> {
    pub fn new(store: S, lock_config: LockConfig) -> Self {
        Self { lock: ListLock::new(store, lock_config) }
    }

    pub fn store(&self) -> &S {
        self.lock.store()
    }
}

impl<S: ObjectStore> NoteProvider for ObjectStoreProvider<S> {
    fn kind(&self) -> ProviderKind {
        ProviderKind::ObjectStore
    }

    async fn list_names(&self) -> Result<Vec<String>, ProviderError> {
        list_all(self.store(), None)
            .await
            .map_err(|err| ProviderError::Transport { operation: "list", message: err.to_string() })
    }

    async fn get(&self, name: &str) -> Result<Note, ProviderError> {
        let raw = self.store().get(name).await.map_err(|err| ProviderError::from_store(name, err))?;
        Ok(Note::from_raw(name, raw)?)
    }

    async fn put(&self, note: &Note) -> Result<(), ProviderError> {
        self.store()
            .put(&note.name, note.raw.clone().into_bytes())
            .await
            .map_err(|err| ProviderError::Write { name: note.name.clone(), message: err.to_string() })
    }

    async fn await_lock_release(&self, budget: Duration) -> Result<(), ProviderError> {
        Ok(self.lock.wait_for_release(budget).await?)
    }

    async fn acquire_lock(&self, holder: &str, timeout: Duration) -> Result<LockGrant, ProviderError> {
        Ok(self.lock.acquire(holder, timeout).await?)
    }

    async fn release_lock(&self, holder: &str) -> Result<(), ProviderError> {
        Ok(self.lock.release(holder).await?)
    }

    async fn lock_holders(&self) -> Result<Vec<String>, ProviderError> {
        Ok(self.lock.holders().await?)
    }
}
