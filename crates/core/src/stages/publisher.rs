//! Default file system publisher.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::worker::StageError;

use super::traits::Publisher;

/// Publishes pages into a local directory (the web server's docroot).
pub struct FsPublisher {
    root: PathBuf,
}

impl FsPublisher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Publisher for FsPublisher {
    fn name(&self) -> &str {
        "fs"
    }

    async fn publish(&self, name: &str, content: &[u8]) -> Result<String, StageError> {
        // Page names come from artifact basenames; anything with a path
        // separator is wrong upstream.
        if name.is_empty() || name.contains('/') || name.contains("..") {
            return Err(StageError::Publish(format!("invalid page name: {}", name)));
        }

        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| StageError::Publish(e.to_string()))?;

        let final_path = self.root.join(name);
        let tmp_path = self.root.join(format!("{}.tmp", name));

        let mut file = fs::File::create(&tmp_path)
            .await
            .map_err(|e| StageError::Publish(e.to_string()))?;
        file.write_all(content)
            .await
            .map_err(|e| StageError::Publish(e.to_string()))?;
        file.flush()
            .await
            .map_err(|e| StageError::Publish(e.to_string()))?;

        fs::rename(&tmp_path, &final_path)
            .await
            .map_err(|e| StageError::Publish(e.to_string()))?;

        Ok(final_path.display().to_string())
    }
}
