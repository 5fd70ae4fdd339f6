//! Mock content collaborators for testing.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::stages::{ContentSource, Publisher, SourceDocument};
use crate::worker::StageError;

/// Mock implementation of the ContentSource trait.
///
/// Documents are registered per source reference; fetches of unknown
/// references return an empty listing, matching a quiet feed.
pub struct MockContentSource {
    documents: Arc<RwLock<HashMap<String, Vec<SourceDocument>>>>,
    next_error: Arc<RwLock<Option<StageError>>>,
    fetches: Arc<RwLock<Vec<String>>>,
}

impl Default for MockContentSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockContentSource {
    pub fn new() -> Self {
        Self {
            documents: Arc::new(RwLock::new(HashMap::new())),
            next_error: Arc::new(RwLock::new(None)),
            fetches: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Register a document under a source reference.
    pub async fn add_document(&self, source: &str, id: &str, body: &str) {
        self.documents
            .write()
            .await
            .entry(source.to_string())
            .or_default()
            .push(SourceDocument {
                source_id: id.to_string(),
                title: format!("Document {}", id),
                body: body.to_string(),
                url: None,
                published_at: None,
            });
    }

    /// Replace all documents for a source.
    pub async fn set_documents(&self, source: &str, documents: Vec<SourceDocument>) {
        self.documents
            .write()
            .await
            .insert(source.to_string(), documents);
    }

    /// Configure the next fetch to fail.
    pub async fn set_next_error(&self, error: StageError) {
        *self.next_error.write().await = Some(error);
    }

    /// References fetched so far.
    pub async fn fetched(&self) -> Vec<String> {
        self.fetches.read().await.clone()
    }
}

#[async_trait]
impl ContentSource for MockContentSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch(&self, reference: &str) -> Result<Vec<SourceDocument>, StageError> {
        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }

        self.fetches.write().await.push(reference.to_string());

        Ok(self
            .documents
            .read()
            .await
            .get(reference)
            .cloned()
            .unwrap_or_default())
    }
}

/// Mock implementation of the Publisher trait.
pub struct MockPublisher {
    published: Arc<RwLock<Vec<(String, Vec<u8>)>>>,
    next_error: Arc<RwLock<Option<StageError>>>,
}

impl Default for MockPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPublisher {
    pub fn new() -> Self {
        Self {
            published: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn publish_count(&self) -> usize {
        self.published.read().await.len()
    }

    /// Names published so far, in order.
    pub async fn published_names(&self) -> Vec<String> {
        self.published
            .read()
            .await
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Configure the next publish to fail.
    pub async fn set_next_error(&self, error: StageError) {
        *self.next_error.write().await = Some(error);
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    fn name(&self) -> &str {
        "mock"
    }

    async fn publish(&self, name: &str, content: &[u8]) -> Result<String, StageError> {
        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }

        self.published
            .write()
            .await
            .push((name.to_string(), content.to_vec()));

        Ok(format!("mock://published/{}", name))
    }
}
