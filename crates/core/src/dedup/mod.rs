//! Content-addressed deduplication.
//!
//! The fingerprint is computed over *output* content, not the inbound
//! message: two deliveries of the same input must collapse to one
//! artifact, and two different inputs that legitimately produce the same
//! output must too.

mod fingerprint;
mod sqlite;
mod store;

pub use fingerprint::{fingerprint, normalize};
pub use sqlite::*;
pub use store::*;

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::artifact::ArtifactStore;
use crate::metrics;

/// Outcome of a deduplication decision.
#[derive(Debug, Clone, PartialEq)]
pub enum DedupDecision {
    /// A new artifact was persisted and recorded.
    Created {
        fingerprint: String,
        artifact_ref: String,
    },
    /// The fingerprint already existed; nothing was written.
    Skipped {
        fingerprint: String,
        artifact_ref: String,
    },
}

impl DedupDecision {
    pub fn fingerprint(&self) -> &str {
        match self {
            Self::Created { fingerprint, .. } | Self::Skipped { fingerprint, .. } => fingerprint,
        }
    }

    pub fn artifact_ref(&self) -> &str {
        match self {
            Self::Created { artifact_ref, .. } | Self::Skipped { artifact_ref, .. } => artifact_ref,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created { .. })
    }
}

/// Decides whether candidate output is genuinely new content.
pub struct ContentDeduplicator {
    records: Arc<dyn DedupStore>,
    artifacts: Arc<dyn ArtifactStore>,
}

impl ContentDeduplicator {
    pub fn new(records: Arc<dyn DedupStore>, artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self { records, artifacts }
    }

    /// Fingerprint `content`, consult the record store, and either
    /// persist a new artifact under `key` or skip.
    ///
    /// `force` is the manual-reprocess path: the artifact is rewritten
    /// and the record updated even when the fingerprint already exists.
    ///
    /// A record store failure is returned as an error so the caller
    /// fails the work item; the message stays on the queue and retries
    /// after its lease lapses. Guessing here could silently drop new
    /// content during a store outage.
    pub async fn decide(
        &self,
        key: &str,
        content: &[u8],
        force: bool,
    ) -> Result<DedupDecision, DedupError> {
        let fp = fingerprint(content);

        let existing = self.records.get(&fp).inspect_err(|_| {
            metrics::DEDUP_STORE_FAILURES.with_label_values(&["get"]).inc();
        })?;

        let had_existing = existing.is_some();
        if let Some(record) = existing {
            if !force {
                debug!(fingerprint = %fp, artifact_ref = %record.artifact_ref, "duplicate content, skipping");
                metrics::DEDUP_DECISIONS.with_label_values(&["skip"]).inc();
                return Ok(DedupDecision::Skipped {
                    fingerprint: fp,
                    artifact_ref: record.artifact_ref,
                });
            }
            debug!(fingerprint = %fp, "forced overwrite of existing content");
        }

        // Artifact first, record second: a crash between the two leaves an
        // unrecorded artifact (rewritten on retry), never a record that
        // points at nothing.
        let stored = self.artifacts.put(key, content).await?;

        let record = DedupRecord {
            fingerprint: fp.clone(),
            artifact_ref: stored.reference.clone(),
            first_seen_at: Utc::now(),
        };
        self.records.put(&record).inspect_err(|_| {
            metrics::DEDUP_STORE_FAILURES.with_label_values(&["put"]).inc();
        })?;

        let label = if had_existing { "overwrite" } else { "create" };
        metrics::DEDUP_DECISIONS.with_label_values(&[label]).inc();

        Ok(DedupDecision::Created {
            fingerprint: fp,
            artifact_ref: stored.reference,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockArtifactStore;

    fn deduplicator() -> (Arc<MockArtifactStore>, ContentDeduplicator) {
        let artifacts = Arc::new(MockArtifactStore::new());
        let records = Arc::new(SqliteDedupStore::in_memory().unwrap());
        let dedup = ContentDeduplicator::new(records, Arc::clone(&artifacts) as Arc<dyn ArtifactStore>);
        (artifacts, dedup)
    }

    #[tokio::test]
    async fn test_new_content_is_created() {
        let (artifacts, dedup) = deduplicator();

        let decision = dedup.decide("articles/a.json", b"fresh", false).await.unwrap();
        assert!(decision.is_created());
        assert_eq!(decision.artifact_ref(), "articles/a.json");
        assert_eq!(artifacts.put_count().await, 1);
    }

    #[tokio::test]
    async fn test_repeat_content_is_skipped() {
        let (artifacts, dedup) = deduplicator();

        let first = dedup.decide("articles/a.json", b"same", false).await.unwrap();
        let second = dedup.decide("articles/b.json", b"same", false).await.unwrap();

        assert!(first.is_created());
        assert!(matches!(second, DedupDecision::Skipped { .. }));
        // Skip points back at the original artifact, and no second write happened
        assert_eq!(second.artifact_ref(), "articles/a.json");
        assert_eq!(artifacts.put_count().await, 1);
    }

    #[tokio::test]
    async fn test_normalized_variants_collapse() {
        let (_artifacts, dedup) = deduplicator();

        let first = dedup.decide("a.json", b"Garden Opens Saturday!", false).await.unwrap();
        let second = dedup.decide("b.json", b"garden   opens saturday", false).await.unwrap();

        assert!(first.is_created());
        assert!(matches!(second, DedupDecision::Skipped { .. }));
        assert_eq!(first.fingerprint(), second.fingerprint());
    }

    #[tokio::test]
    async fn test_force_overwrites_existing() {
        let (artifacts, dedup) = deduplicator();

        dedup.decide("a.json", b"same", false).await.unwrap();
        let forced = dedup.decide("updated/a.json", b"same", true).await.unwrap();

        assert!(forced.is_created());
        assert_eq!(forced.artifact_ref(), "updated/a.json");
        assert_eq!(artifacts.put_count().await, 2);

        // Subsequent non-forced call now skips onto the updated ref
        let after = dedup.decide("c.json", b"same", false).await.unwrap();
        assert_eq!(after.artifact_ref(), "updated/a.json");
    }

    #[tokio::test]
    async fn test_artifact_failure_propagates_without_record() {
        let (artifacts, dedup) = deduplicator();
        artifacts.fail_next_put().await;

        let result = dedup.decide("a.json", b"content", false).await;
        assert!(result.is_err());

        // Nothing recorded, a retry will create normally
        let retry = dedup.decide("a.json", b"content", false).await.unwrap();
        assert!(retry.is_created());
    }
}
