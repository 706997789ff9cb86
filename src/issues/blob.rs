//! Image storage collaborator.
//!
//! Issues only hold an opaque reference; the bytes live behind `BlobStore`.

use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::errors::IssueError;

/// URL prefix under which the disk store's references are served.
pub const UPLOADS_PREFIX: &str = "/uploads/";

/// Bytes read back from the store together with their media type.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredBlob {
    pub bytes: Vec<u8>,
    pub media_type: String,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Persist `bytes` and return a reference to them.
    async fn store(
        &self,
        bytes: Vec<u8>,
        media_type: &str,
        filename: &str,
    ) -> Result<String, IssueError>;

    async fn serve(&self, reference: &str) -> Result<StoredBlob, IssueError>;

    /// Delete a stored blob. Removing an absent blob succeeds.
    async fn remove(&self, reference: &str) -> Result<(), IssueError>;
}

/// Stores each upload as a file under `root`, named
/// `<unix-millis>-<random><original extension>`.
pub struct DiskBlobStore {
    root: PathBuf,
}

impl DiskBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a reference back onto a file inside `root`, refusing anything
    /// that could escape it.
    fn resolve(&self, reference: &str) -> Option<PathBuf> {
        let name = reference.strip_prefix(UPLOADS_PREFIX).unwrap_or(reference);
        if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
            return None;
        }
        Some(self.root.join(name))
    }
}

#[async_trait]
impl BlobStore for DiskBlobStore {
    async fn store(
        &self,
        bytes: Vec<u8>,
        media_type: &str,
        filename: &str,
    ) -> Result<String, IssueError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("Failed to create uploads directory {}", self.root.display()))?;

        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_ascii_lowercase()))
            .unwrap_or_default();
        let name = format!(
            "{}-{}{}",
            Utc::now().timestamp_millis(),
            Uuid::new_v4().simple(),
            ext
        );
        let path = self.root.join(&name);
        tokio::fs::write(&path, &bytes)
            .await
            .with_context(|| format!("Failed to write image {}", path.display()))?;

        debug!(stored_as = %name, original = %filename, %media_type, size = bytes.len(), "stored image");
        Ok(format!("{}{}", UPLOADS_PREFIX, name))
    }

    async fn serve(&self, reference: &str) -> Result<StoredBlob, IssueError> {
        let not_found = || IssueError::ImageNotFound {
            reference: reference.to_string(),
        };
        let path = self.resolve(reference).ok_or_else(not_found)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("Failed to read image {}", path.display()))
                    .into());
            }
        };
        let media_type = mime_guess::from_path(&path)
            .first_or_octet_stream()
            .to_string();
        Ok(StoredBlob { bytes, media_type })
    }

    async fn remove(&self, reference: &str) -> Result<(), IssueError> {
        let Some(path) = self.resolve(reference) else {
            return Ok(());
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("Failed to remove image {}", path.display()))
                .into()),
        }
    }
}
