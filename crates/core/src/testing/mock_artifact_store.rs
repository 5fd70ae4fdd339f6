//! Mock artifact store for testing.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::artifact::{ArtifactError, ArtifactStore, StoredArtifact};

/// In-memory implementation of the ArtifactStore trait.
///
/// Provides controllable behavior for testing:
/// - Inspect stored artifacts and write counts
/// - Inject failures on the next put/get
pub struct MockArtifactStore {
    blobs: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
    puts: Arc<RwLock<u64>>,
    fail_next_put: Arc<RwLock<bool>>,
    fail_next_get: Arc<RwLock<bool>>,
}

impl Default for MockArtifactStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockArtifactStore {
    pub fn new() -> Self {
        Self {
            blobs: Arc::new(RwLock::new(BTreeMap::new())),
            puts: Arc::new(RwLock::new(0)),
            fail_next_put: Arc::new(RwLock::new(false)),
            fail_next_get: Arc::new(RwLock::new(false)),
        }
    }

    /// Number of successful put calls.
    pub async fn put_count(&self) -> u64 {
        *self.puts.read().await
    }

    /// All stored keys, sorted.
    pub async fn keys(&self) -> Vec<String> {
        self.blobs.read().await.keys().cloned().collect()
    }

    /// Configure the next put to fail.
    pub async fn fail_next_put(&self) {
        *self.fail_next_put.write().await = true;
    }

    /// Configure the next get to fail.
    pub async fn fail_next_get(&self) {
        *self.fail_next_get.write().await = true;
    }
}

#[async_trait]
impl ArtifactStore for MockArtifactStore {
    fn name(&self) -> &str {
        "mock"
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<StoredArtifact, ArtifactError> {
        if std::mem::take(&mut *self.fail_next_put.write().await) {
            return Err(ArtifactError::Storage("injected put failure".to_string()));
        }

        self.blobs
            .write()
            .await
            .insert(key.to_string(), bytes.to_vec());
        *self.puts.write().await += 1;

        Ok(StoredArtifact {
            reference: key.to_string(),
            size_bytes: bytes.len() as u64,
        })
    }

    async fn get(&self, reference: &str) -> Result<Vec<u8>, ArtifactError> {
        if std::mem::take(&mut *self.fail_next_get.write().await) {
            return Err(ArtifactError::Storage("injected get failure".to_string()));
        }

        self.blobs
            .read()
            .await
            .get(reference)
            .cloned()
            .ok_or_else(|| ArtifactError::NotFound(reference.to_string()))
    }

    async fn exists(&self, reference: &str) -> Result<bool, ArtifactError> {
        Ok(self.blobs.read().await.contains_key(reference))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, ArtifactError> {
        let want = format!("{}/", prefix.trim_end_matches('/'));
        Ok(self
            .blobs
            .read()
            .await
            .keys()
            .filter(|k| k.starts_with(&want))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_roundtrip() {
        let store = MockArtifactStore::new();
        store.put("a/b.json", b"data").await.unwrap();

        assert_eq!(store.get("a/b.json").await.unwrap(), b"data");
        assert!(store.exists("a/b.json").await.unwrap());
        assert_eq!(store.put_count().await, 1);
    }

    #[tokio::test]
    async fn test_missing_key() {
        let store = MockArtifactStore::new();
        assert!(matches!(
            store.get("nope").await,
            Err(ArtifactError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_filters_by_prefix() {
        let store = MockArtifactStore::new();
        store.put("articles/a.json", b"1").await.unwrap();
        store.put("articles/b.json", b"2").await.unwrap();
        store.put("pages/c.html", b"3").await.unwrap();

        let refs = store.list("articles").await.unwrap();
        assert_eq!(refs, vec!["articles/a.json", "articles/b.json"]);
    }

    #[tokio::test]
    async fn test_injected_failures_are_one_shot() {
        let store = MockArtifactStore::new();
        store.fail_next_put().await;

        assert!(store.put("a", b"x").await.is_err());
        assert!(store.put("a", b"x").await.is_ok());
    }
}
