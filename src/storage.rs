//! Uploaded file storage

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("stored file not found: {0}")]
    NotFound(String),

    #[error("invalid stored file name: {0}")]
    InvalidName(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// What the store reports back after writing a file
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub filename: String,
    pub size_bytes: i64,
    pub sha256: String,
}

#[async_trait]
pub trait FileStore: Send + Sync {
    /// Persist `bytes` under a freshly generated name derived from `original_name`
    async fn put(&self, original_name: &str, bytes: &[u8]) -> Result<StoredFile, StorageError>;

    async fn get(&self, filename: &str) -> Result<Vec<u8>, StorageError>;

    /// Deleting a file that is already gone is not an error
    async fn delete(&self, filename: &str) -> Result<(), StorageError>;
}

/// Files kept in a single directory on the local filesystem
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_config() -> Self {
        Self::new(crate::config::config().storage.upload_dir.clone())
    }

    fn path_for(&self, filename: &str) -> Result<PathBuf, StorageError> {
        let valid = !filename.is_empty()
            && filename
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !filename.starts_with('.');
        if !valid {
            return Err(StorageError::InvalidName(filename.to_string()));
        }
        Ok(self.root.join(filename))
    }
}

/// `<uuid>.<ext>` keeping a short alphanumeric extension from the upload name
pub fn generated_name(original_name: &str) -> String {
    let extension = Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.len() <= 10 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| e.to_ascii_lowercase());

    match extension {
        Some(ext) => format!("{}.{}", Uuid::new_v4(), ext),
        None => Uuid::new_v4().to_string(),
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn put(&self, original_name: &str, bytes: &[u8]) -> Result<StoredFile, StorageError> {
        tokio::fs::create_dir_all(&self.root).await?;

        let filename = generated_name(original_name);
        let path = self.path_for(&filename)?;

        let mut file = tokio::fs::File::create(&path).await?;
        file.write_all(bytes).await?;
        file.flush().await?;

        tracing::debug!("Stored upload {} as {}", original_name, path.display());

        Ok(StoredFile {
            filename,
            size_bytes: bytes.len() as i64,
            sha256: sha256_hex(bytes),
        })
    }

    async fn get(&self, filename: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(filename)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(filename.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, filename: &str) -> Result<(), StorageError> {
        let path = self.path_for(filename)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
