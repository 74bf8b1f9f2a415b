use bytes::Bytes;

use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{NewImage, StoredImage};
use crate::storage::{BlobStore, Fingerprint};

/// An image row together with its blob, ready to be sent
#[derive(Debug, Clone)]
pub struct ServedImage {
    pub image: StoredImage,
    pub data: Bytes,
}

/// Image catalog service
pub struct ImageService;

impl ImageService {
    /// Insert a new image row and return its id
    pub async fn insert(db: &Database, image: &NewImage) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO birbs (hash, permalink, source_url, content_type) VALUES (?, ?, ?, ?)",
        )
        .bind(&image.hash)
        .bind(&image.permalink)
        .bind(&image.source_url)
        .bind(&image.content_type)
        .execute(db.pool())
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Pick one non-banned image uniformly at random
    pub async fn random(db: &Database) -> Result<Option<StoredImage>> {
        let image = sqlx::query_as(
            "SELECT id, hash, permalink, source_url, content_type, banned FROM birbs WHERE banned = 0 ORDER BY RANDOM() LIMIT 1",
        )
        .fetch_optional(db.pool())
        .await?;
        Ok(image)
    }

    /// Get an image row by id, banned or not
    pub async fn get(db: &Database, id: i64) -> Result<Option<StoredImage>> {
        let image = sqlx::query_as(
            "SELECT id, hash, permalink, source_url, content_type, banned FROM birbs WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(db.pool())
        .await?;
        Ok(image)
    }

    /// Number of images that can be served
    pub async fn count_servable(db: &Database) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM birbs WHERE banned = 0")
            .fetch_one(db.pool())
            .await?;
        Ok(count)
    }

    /// Random non-banned image with its bytes
    pub async fn random_image(db: &Database, blobs: &dyn BlobStore) -> Result<ServedImage> {
        let image = Self::random(db).await?.ok_or(AppError::NoImages)?;
        Self::load(blobs, image).await
    }

    /// A specific non-banned image with its bytes
    pub async fn image_by_id(db: &Database, blobs: &dyn BlobStore, id: i64) -> Result<ServedImage> {
        let image = Self::get(db, id)
            .await?
            .filter(|image| !image.banned)
            .ok_or_else(|| AppError::NotFound(format!("Image {} not found", id)))?;
        Self::load(blobs, image).await
    }

    /// Attach the blob to a row. A row without a blob is an invariant violation.
    async fn load(blobs: &dyn BlobStore, image: StoredImage) -> Result<ServedImage> {
        let missing = || AppError::MissingBlob {
            id: image.id,
            hash: image.hash_hex(),
        };

        let fingerprint = Fingerprint::from_slice(&image.hash).ok_or_else(missing)?;
        let data = blobs.get(&fingerprint).await?.ok_or_else(missing)?;

        Ok(ServedImage { image, data })
    }
}
