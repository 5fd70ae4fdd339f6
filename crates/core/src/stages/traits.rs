//! Collaborator seams for the business-logic ends of each stage.
//!
//! Ranking heuristics, article generation and the site build tool live
//! behind these traits; the stage handlers only coordinate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::worker::StageError;

/// A single document pulled from an external content source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocument {
    /// Stable id within the source (feed entry id, post id).
    pub source_id: String,
    pub title: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

/// Everything one collect sweep pulled from one source.
///
/// Serialized deterministically (documents sorted by `source_id`), so an
/// unchanged source produces byte-identical bundles and the
/// deduplicator collapses them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceBundle {
    pub source: String,
    pub documents: Vec<SourceDocument>,
}

impl SourceBundle {
    pub fn new(source: impl Into<String>, mut documents: Vec<SourceDocument>) -> Self {
        documents.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        Self {
            source: source.into(),
            documents,
        }
    }
}

/// An article generated from collected content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedArticle {
    /// URL-safe identifier, deterministic for identical content.
    pub slug: String,
    pub title: String,
    pub summary: String,
    pub body: String,
}

/// External content source (social feed, RSS endpoint).
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Returns the name of this source implementation.
    fn name(&self) -> &str;

    /// Fetch the current documents for a source reference.
    async fn fetch(&self, reference: &str) -> Result<Vec<SourceDocument>, StageError>;
}

/// Turns a collected bundle into an article.
#[async_trait]
pub trait ArticleGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, bundle: &SourceBundle) -> Result<GeneratedArticle, StageError>;
}

/// Renders an article into a servable page.
#[async_trait]
pub trait SiteRenderer: Send + Sync {
    fn name(&self) -> &str;

    async fn render(&self, article: &GeneratedArticle) -> Result<String, StageError>;
}

/// Pushes a rendered page to its public location.
#[async_trait]
pub trait Publisher: Send + Sync {
    fn name(&self) -> &str;

    /// Publish `content` under `name`, returning the public location.
    async fn publish(&self, name: &str, content: &[u8]) -> Result<String, StageError>;
}
