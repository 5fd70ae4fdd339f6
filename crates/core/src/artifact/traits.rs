//! Trait definition for the shared artifact store.

use async_trait::async_trait;

use super::types::{ArtifactError, StoredArtifact};

/// Blob-style object store shared by all pipeline stages.
///
/// Keys are slash-separated paths like `articles/2024-06-01-abcd.json`.
/// The returned reference is opaque to callers and round-trips through
/// `get`.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Returns the name of this store implementation.
    fn name(&self) -> &str;

    /// Persist `bytes` under `key`, overwriting any previous content.
    ///
    /// The write must be durable before this returns: the drain loop
    /// deletes the source message only after put succeeds.
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<StoredArtifact, ArtifactError>;

    /// Retrieve an artifact by the reference returned from `put`.
    async fn get(&self, reference: &str) -> Result<Vec<u8>, ArtifactError>;

    /// Whether an artifact exists for the reference.
    async fn exists(&self, reference: &str) -> Result<bool, ArtifactError>;

    /// List references under a prefix, sorted ascending. An unknown
    /// prefix is an empty listing, not an error.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, ArtifactError>;
}
