use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;
use crate::storage::Fingerprint;

/// Outcome of a write-once blob store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobWrite {
    Written,
    /// A blob with this fingerprint was already present and was left untouched.
    AlreadyExists,
}

/// Content-addressed blob storage
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Check whether a blob exists for the fingerprint
    async fn exists(&self, fingerprint: &Fingerprint) -> Result<bool>;

    /// Store data under its fingerprint unless a blob is already there.
    /// Never truncates or overwrites an existing blob.
    async fn put_if_absent(&self, fingerprint: &Fingerprint, data: &[u8]) -> Result<BlobWrite>;

    /// Read a blob, `None` if it does not exist
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<Bytes>>;

    /// Get the storage type name
    fn storage_type(&self) -> &'static str;
}
