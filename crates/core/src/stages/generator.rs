//! Default article generator.

use async_trait::async_trait;

use crate::dedup::{fingerprint, normalize};
use crate::worker::StageError;

use super::traits::{ArticleGenerator, GeneratedArticle, SourceBundle};

const SUMMARY_CHARS: usize = 240;

/// Builds a digest article straight from the collected documents.
///
/// Deterministic by construction: no timestamps, no randomness, slug
/// derived from the content fingerprint. LLM-backed generators plug in
/// behind the same trait.
pub struct DigestGenerator;

impl DigestGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DigestGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArticleGenerator for DigestGenerator {
    fn name(&self) -> &str {
        "digest"
    }

    async fn generate(&self, bundle: &SourceBundle) -> Result<GeneratedArticle, StageError> {
        if bundle.documents.is_empty() {
            return Err(StageError::Generate(format!(
                "bundle from {} has no documents",
                bundle.source
            )));
        }

        let title = format!(
            "Digest: {} ({} items)",
            bundle.source,
            bundle.documents.len()
        );

        let body = bundle
            .documents
            .iter()
            .map(|doc| format!("## {}\n\n{}", doc.title, doc.body.trim()))
            .collect::<Vec<_>>()
            .join("\n\n");

        let summary: String = normalize(&body).chars().take(SUMMARY_CHARS).collect();

        let slug = format!("digest-{}", &fingerprint(body.as_bytes())[..12]);

        Ok(GeneratedArticle {
            slug,
            title,
            summary,
            body,
        })
    }
}
