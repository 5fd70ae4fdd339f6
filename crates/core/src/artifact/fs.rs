//! File system artifact store.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::traits::ArtifactStore;
use super::types::{ArtifactError, StoredArtifact};

/// Artifact store rooted at a local directory.
///
/// Writes go to a temporary sibling first and are renamed into place, so
/// a crash mid-write never leaves a half-written artifact under the
/// final reference.
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Reject keys that would escape the store root.
    fn resolve(&self, key: &str) -> Result<PathBuf, ArtifactError> {
        if key.is_empty() {
            return Err(ArtifactError::InvalidKey("empty key".to_string()));
        }
        let relative = Path::new(key);
        for component in relative.components() {
            match component {
                Component::Normal(_) => {}
                _ => {
                    return Err(ArtifactError::InvalidKey(key.to_string()));
                }
            }
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    fn name(&self) -> &str {
        "fs"
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<StoredArtifact, ArtifactError> {
        let path = self.resolve(key)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ArtifactError::Storage(e.to_string()))?;
        }

        let tmp_path = path.with_extension("tmp");
        let mut file = fs::File::create(&tmp_path)
            .await
            .map_err(|e| ArtifactError::Storage(e.to_string()))?;
        file.write_all(bytes)
            .await
            .map_err(|e| ArtifactError::Storage(e.to_string()))?;
        file.flush()
            .await
            .map_err(|e| ArtifactError::Storage(e.to_string()))?;

        fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| ArtifactError::Storage(e.to_string()))?;

        Ok(StoredArtifact {
            reference: key.to_string(),
            size_bytes: bytes.len() as u64,
        })
    }

    async fn get(&self, reference: &str) -> Result<Vec<u8>, ArtifactError> {
        let path = self.resolve(reference)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ArtifactError::NotFound(reference.to_string()))
            }
            Err(e) => Err(ArtifactError::Storage(e.to_string())),
        }
    }

    async fn exists(&self, reference: &str) -> Result<bool, ArtifactError> {
        let path = self.resolve(reference)?;
        Ok(fs::try_exists(&path)
            .await
            .map_err(|e| ArtifactError::Storage(e.to_string()))?)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, ArtifactError> {
        let dir = self.resolve(prefix)?;

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ArtifactError::Storage(e.to_string())),
        };

        let mut refs = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ArtifactError::Storage(e.to_string()))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            // In-flight writes land as .tmp siblings; never list them.
            if name.ends_with(".tmp") {
                continue;
            }
            let is_file = entry
                .file_type()
                .await
                .map_err(|e| ArtifactError::Storage(e.to_string()))?
                .is_file();
            if is_file {
                refs.push(format!("{}/{}", prefix.trim_end_matches('/'), name));
            }
        }

        refs.sort();
        Ok(refs)
    }
}
