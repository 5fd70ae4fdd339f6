//! Default HTTP content source.

use std::time::Duration;

use async_trait::async_trait;

use crate::worker::StageError;

use super::traits::{ContentSource, SourceDocument};

/// Fetches a source reference over HTTP and wraps the response body in
/// a single document.
///
/// Feed-format parsing (RSS, JSON feeds, social APIs) belongs to
/// dedicated `ContentSource` implementations; this one is the plain
/// fallback.
pub struct HttpContentSource {
    client: reqwest::Client,
}

impl HttpContentSource {
    pub fn new(timeout: Duration) -> Result<Self, StageError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StageError::Source(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    pub fn with_defaults() -> Result<Self, StageError> {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl ContentSource for HttpContentSource {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self, reference: &str) -> Result<Vec<SourceDocument>, StageError> {
        let response = self
            .client
            .get(reference)
            .send()
            .await
            .map_err(|e| StageError::Source(format!("request to {} failed: {}", reference, e)))?;

        if !response.status().is_success() {
            return Err(StageError::Source(format!(
                "{} returned HTTP {}",
                reference,
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| StageError::Source(format!("failed to read body: {}", e)))?;

        if body.trim().is_empty() {
            return Ok(Vec::new());
        }

        Ok(vec![SourceDocument {
            source_id: reference.to_string(),
            title: reference.to_string(),
            body,
            url: Some(reference.to_string()),
            published_at: None,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builds_with_defaults() {
        let source = HttpContentSource::with_defaults().unwrap();
        assert_eq!(source.name(), "http");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_source_error() {
        let source = HttpContentSource::new(Duration::from_millis(200)).unwrap();
        let result = source.fetch("http://127.0.0.1:1/feed").await;
        assert!(matches!(result, Err(StageError::Source(_))));
    }
}
