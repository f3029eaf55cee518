// Object storage behind the sync-target backend.
//
// The lock protocol and the object-store provider only need four
// primitives: paged listing, get, put and delete. `S3ObjectStore` talks to
// a real bucket; `MemoryObjectStore` keeps everything in-process for tests.

pub mod memory;
pub mod s3;

use std::future::Future;

pub use memory::MemoryObjectStore;
pub use s3::{S3ObjectStore, S3Settings};

/// Errors from an object store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("object `{key}` not found")]
    NotFound { key: String },

    #[error("object store {operation} failed: {message}")]
    Transport { operation: &'static str, message: String },
}

/// A flat key/value object namespace.
///
/// Precondition for the lock protocol: a `list` issued after a successful
/// `put` or `delete` by the same client must observe that write
/// (read-your-own-write consistency for listings). A holder that sees only
/// its own lock marker trusts that observation.
pub trait ObjectStore: Send + Sync + 'static {
    /// One page of keys in lexicographic order, optionally restricted to
    /// `prefix` and starting strictly after `start_after`. An empty page
    /// means the listing is exhausted.
    fn list(
        &self,
        prefix: Option<&str>,
        start_after: Option<&str>,
    ) -> impl Future<Output = Result<Vec<String>, StoreError>> + Send;

    fn get(&self, key: &str) -> impl Future<Output = Result<Vec<u8>, StoreError>> + Send;

    fn put(&self, key: &str, body: Vec<u8>) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Delete `key`. Deleting a missing key succeeds.
    fn delete(&self, key: &str) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Drain every page of a listing.
pub async fn list_all<S: ObjectStore>(
    store: &S,
    prefix: Option<&str>,
) -> Result<Vec<String>, StoreError> {
    let mut keys = Vec::new();
    loop {
        let page = store.list(prefix, keys.last().map(String::as_str)).await?;
        if page.is_empty() {
            break;
        }
        keys.extend(page);
    }
    Ok(keys)
}
