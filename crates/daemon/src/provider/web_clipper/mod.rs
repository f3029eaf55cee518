// Web clipper backend. Notes come back as structured fields, so the raw
// payload convention and metadata timestamps do not apply. The service
// serializes writes itself; all lock operations succeed immediately.

mod client;

use std::time::Duration;

use notetally_common::note::Note;
use notetally_common::types::{note_file_name, ProviderKind, NOTE_SUFFIX};
use tracing::debug;

use super::{NoteProvider, ProviderError};
use crate::lock::LockGrant;

pub use client::{ClipperError, ClipperNote, NotePage, WebClipperClient};

pub struct WebClipperProvider {
    client: WebClipperClient,
}

impl WebClipperProvider {
    pub fn new(client: WebClipperClient) -> Self {
        Self { client }
    }
}

fn note_id(name: &str) -> &str {
    name.strip_suffix(NOTE_SUFFIX).unwrap_or(name)
}

fn transport(operation: &'static str, err: ClipperError) -> ProviderError {
    ProviderError::Transport { operation, message: err.to_string() }
}

impl NoteProvider for WebClipperProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::WebClipper
    }

    async fn list_names(&self) -> Result<Vec<String>, ProviderError> {
        let mut names = Vec::new();
        let mut page = 1;
        loop {
            let batch = self.client.list_page(page).await.map_err(|err| transport("list", err))?;
            names.extend(batch.items.iter().map(|note| note_file_name(&note.id)));
            if !batch.has_more {
                break;
            }
            page += 1;
        }
        debug!(notes = names.len(), pages = page, "web clipper listing complete");
        Ok(names)
    }

    async fn get(&self, name: &str) -> Result<Note, ProviderError> {
        let note = self.client.get_note(note_id(name)).await.map_err(|err| {
            if err.is_not_found() {
                ProviderError::NotFound { name: name.to_string() }
            } else {
                transport("get", err)
            }
        })?;

        Ok(Note::from_fields(name, note.title, note.body, &note.id, &note.parent_id))
    }

    async fn put(&self, note: &Note) -> Result<(), ProviderError> {
        self.client
            .put_body(note_id(&note.name), &note.body)
            .await
            .map(|_| ())
            .map_err(|err| ProviderError::Write { name: note.name.clone(), message: err.to_string() })
    }

    async fn await_lock_release(&self, _budget: Duration) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn acquire_lock(&self, holder: &str, _timeout: Duration) -> Result<LockGrant, ProviderError> {
        Ok(LockGrant { holder: holder.to_string(), attempts: 0, elapsed: Duration::ZERO })
    }

    async fn release_lock(&self, _holder: &str) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn lock_holders(&self) -> Result<Vec<String>, ProviderError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_id_strips_suffix_only() {
        assert_eq!(note_id("abc.md"), "abc");
        assert_eq!(note_id("abc"), "abc");
        assert_eq!(note_id("a.md.md"), "a.md");
    }

    #[tokio::test]
    async fn locking_is_a_no_op() {
        let client = WebClipperClient::new("http://127.0.0.1:9", "t", Duration::from_secs(1)).unwrap();
        let provider = WebClipperProvider::new(client);

        provider.await_lock_release(Duration::ZERO).await.unwrap();
        let grant = provider.acquire_lock("me", Duration::ZERO).await.unwrap();
        assert_eq!(grant.attempts, 0);
        assert!(provider.lock_holders().await.unwrap().is_empty());
        provider.release_lock("me").await.unwrap();
    }
}
