//! Deduplication record storage.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::artifact::ArtifactError;

/// Error type for deduplication.
#[derive(Debug, Error)]
pub enum DedupError {
    /// The record store is unavailable. The caller must fail the work
    /// item rather than guess, so the message redelivers after its lease.
    #[error("dedup store error: {0}")]
    Store(String),

    /// Persisting the artifact failed before the record could be written.
    #[error("artifact store error: {0}")]
    Artifact(#[from] ArtifactError),
}

/// Durable mapping from content fingerprint to the artifact it produced.
///
/// This is the only cross-instance shared state in the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct DedupRecord {
    pub fingerprint: String,
    pub artifact_ref: String,
    pub first_seen_at: DateTime<Utc>,
}

/// Trait for deduplication record storage backends.
///
/// `put` is an upsert: concurrent writers racing on the same fingerprint
/// resolve last-writer-wins, which costs at most one redundant artifact.
pub trait DedupStore: Send + Sync {
    /// Look up the record for a fingerprint.
    fn get(&self, fingerprint: &str) -> Result<Option<DedupRecord>, DedupError>;

    /// Insert or replace the record for a fingerprint.
    fn put(&self, record: &DedupRecord) -> Result<(), DedupError>;

    /// Total number of recorded fingerprints.
    fn count(&self) -> Result<u64, DedupError>;
}
