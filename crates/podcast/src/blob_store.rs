//! External blob store collaborator (spec §4.11 "Store" step). Out of
//! scope to implement for real; this is the seam C11 writes audio bytes
//! through, with an in-memory stand-in for tests.

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

#[derive(Debug, Clone, thiserror::Error)]
pub enum BlobStoreError {
    #[error("blob store unreachable: {0}")]
    Unreachable(String),
    #[error("object not found: {0}")]
    NotFound(String),
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Writes `bytes` and returns a URL the object can later be read back
    /// from. Never partially writes: either the whole object lands or this
    /// returns an error.
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, BlobStoreError>;

    /// Compensating delete for cleanup-on-failure (spec §4.11, §9).
    async fn delete(&self, url: &str) -> Result<(), BlobStoreError>;

    async fn get(&self, url: &str) -> Result<Vec<u8>, BlobStoreError>;
}

/// `DashMap`-backed store keyed by a synthetic `mem://<uuid>` URL, good
/// enough to exercise C11's store/cleanup paths without a real object
/// store dependency.
#[derive(Default, Clone)]
pub struct InMemoryBlobStore {
    objects: std::sync::Arc<DashMap<String, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<String, BlobStoreError> {
        let url = format!("mem://{key}-{}", Uuid::new_v4());
        self.objects.insert(url.clone(), bytes);
        Ok(url)
    }

    async fn delete(&self, url: &str) -> Result<(), BlobStoreError> {
        self.objects.remove(url);
        Ok(())
    }

    async fn get(&self, url: &str) -> Result<Vec<u8>, BlobStoreError> {
        self.objects.get(url).map(|v| v.clone()).ok_or_else(|| BlobStoreError::NotFound(url.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = InMemoryBlobStore::new();
        let url = store.put("episode", vec![1, 2, 3], "audio/mpeg").await.unwrap();
        assert_eq!(store.get(&url).await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn delete_then_get_is_not_found() {
        let store = InMemoryBlobStore::new();
        let url = store.put("episode", vec![1], "audio/mpeg").await.unwrap();
        store.delete(&url).await.unwrap();
        assert!(store.get(&url).await.is_err());
    }
}
