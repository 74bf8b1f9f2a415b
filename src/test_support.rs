//! Shared fixtures for unit tests.

use async_trait::async_trait;
use axum::Router;
use bytes::Bytes;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;
use tokio::net::TcpListener;

use crate::db::Database;
use crate::error::Result;
use crate::storage::{BlobStore, BlobWrite, Fingerprint, LocalBlobStore};

/// A migrated database and an empty blob directory in a scratch dir
pub struct TestEnv {
    pub dir: TempDir,
    pub db: Database,
    pub blobs: LocalBlobStore,
}

impl TestEnv {
    pub fn blob_dir(&self) -> PathBuf {
        self.dir.path().join("birbs")
    }
}

pub async fn test_env() -> TestEnv {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("birbs")).unwrap();
    let db = Database::new(dir.path().join("birbhoard.db").to_str().unwrap())
        .await
        .unwrap();
    let blobs = LocalBlobStore::new(dir.path().join("birbs"));
    db.run_migrations(&blobs).await.unwrap();
    TestEnv { dir, db, blobs }
}

/// Serve `app` on an ephemeral loopback port, returning `http://127.0.0.1:<port>`.
pub async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// A loopback URL nothing is listening on.
pub async fn refused_base_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

/// Local blob store that counts the blobs it actually wrote
pub struct CountingBlobStore {
    inner: LocalBlobStore,
    writes: AtomicUsize,
}

impl CountingBlobStore {
    pub fn new(base_path: PathBuf) -> Self {
        Self {
            inner: LocalBlobStore::new(base_path),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobStore for CountingBlobStore {
    async fn exists(&self, fingerprint: &Fingerprint) -> Result<bool> {
        self.inner.exists(fingerprint).await
    }

    async fn put_if_absent(&self, fingerprint: &Fingerprint, data: &[u8]) -> Result<BlobWrite> {
        let outcome = self.inner.put_if_absent(fingerprint, data).await?;
        if outcome == BlobWrite::Written {
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(outcome)
    }

    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<Bytes>> {
        self.inner.get(fingerprint).await
    }

    fn storage_type(&self) -> &'static str {
        "counting"
    }
}
