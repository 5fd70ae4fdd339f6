use thiserror::Error;

/// Error type for artifact store operations.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// Artifact does not exist.
    #[error("artifact not found: {0}")]
    NotFound(String),

    /// Key contains rejected path components.
    #[error("invalid artifact key: {0}")]
    InvalidKey(String),

    /// Backing storage failed.
    #[error("artifact storage error: {0}")]
    Storage(String),
}

/// Result of persisting an artifact.
#[derive(Debug, Clone)]
pub struct StoredArtifact {
    /// Opaque pointer usable to retrieve the artifact later.
    pub reference: String,
    pub size_bytes: u64,
}
