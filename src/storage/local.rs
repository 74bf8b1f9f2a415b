use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::storage::{BlobStore, BlobWrite, Fingerprint};

/// Blob store backed by one flat directory of files named by fingerprint hex
pub struct LocalBlobStore {
    base_path: PathBuf,
}

impl LocalBlobStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn path_for(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.base_path.join(fingerprint.to_hex())
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn exists(&self, fingerprint: &Fingerprint) -> Result<bool> {
        Ok(fs::try_exists(self.path_for(fingerprint)).await?)
    }

    async fn put_if_absent(&self, fingerprint: &Fingerprint, data: &[u8]) -> Result<BlobWrite> {
        let full_path = self.path_for(fingerprint);

        fs::create_dir_all(&self.base_path).await?;

        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&full_path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                tracing::debug!("Blob {} already exists, skipping write", fingerprint);
                return Ok(BlobWrite::AlreadyExists);
            }
            Err(e) => return Err(e.into()),
        };

        let written = async {
            file.write_all(data).await?;
            file.flush().await?;
            file.sync_all().await
        }
        .await;

        if let Err(e) = written {
            // We created this file, so a partial one is ours to clean up.
            drop(file);
            if let Err(rm) = fs::remove_file(&full_path).await {
                tracing::error!("Failed to remove partial blob {:?}: {}", full_path, rm);
            }
            return Err(AppError::Io(e));
        }

        tracing::debug!("Saved blob to {:?} ({} bytes)", full_path, data.len());
        Ok(BlobWrite::Written)
    }

    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<Bytes>> {
        match fs::read(self.path_for(fingerprint)).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn storage_type(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_then_get() {
        let dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(dir.path());
        let fp = Fingerprint::of(b"tweet");

        assert!(!store.exists(&fp).await.unwrap());
        assert_eq!(store.get(&fp).await.unwrap(), None);

        assert_eq!(store.put_if_absent(&fp, b"tweet").await.unwrap(), BlobWrite::Written);
        assert!(store.exists(&fp).await.unwrap());
        assert_eq!(store.get(&fp).await.unwrap().unwrap(), Bytes::from_static(b"tweet"));
        assert_eq!(store.storage_type(), "local");
    }

    #[tokio::test]
    async fn test_file_named_by_lowercase_hex() {
        let dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(dir.path());
        let fp = Fingerprint::of(b"squawk");

        store.put_if_absent(&fp, b"squawk").await.unwrap();

        let expected = dir.path().join(fp.to_hex());
        assert_eq!(store.path_for(&fp), expected);
        assert_eq!(std::fs::read(expected).unwrap(), b"squawk");
        assert_eq!(fp.to_hex(), fp.to_hex().to_lowercase());
    }

    #[tokio::test]
    async fn test_second_write_never_overwrites() {
        let dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(dir.path());
        let fp = Fingerprint::of(b"original");

        store.put_if_absent(&fp, b"original").await.unwrap();
        let outcome = store.put_if_absent(&fp, b"something else").await.unwrap();

        assert_eq!(outcome, BlobWrite::AlreadyExists);
        assert_eq!(std::fs::read(store.path_for(&fp)).unwrap(), b"original");
    }

    #[tokio::test]
    async fn test_creates_missing_base_directory() {
        let dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(dir.path().join("nested").join("birbs"));
        let fp = Fingerprint::of(b"chirp");

        assert_eq!(store.put_if_absent(&fp, b"chirp").await.unwrap(), BlobWrite::Written);
        assert!(store.base_path().is_dir());
    }
}
