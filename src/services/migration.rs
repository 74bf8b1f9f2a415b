use std::collections::HashSet;

use crate::db::Database;
use crate::error::Result;
use crate::storage::{BlobStore, BlobWrite, Fingerprint};

/// What the legacy inline-image migration did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MigrationReport {
    /// Whether the table still had the inline `image` column.
    pub legacy: bool,
    pub rows: usize,
    pub written: usize,
    pub rehashed: usize,
    pub duplicates_removed: usize,
    /// Rows with no inline bytes, which can never get a blob.
    pub empty_removed: usize,
}

/// Moves images stored inline in `birbs.image` out to the blob store
pub struct MigrationService;

impl MigrationService {
    /// Copy every inline image to its blob, then drop the `image` column.
    ///
    /// The column drop runs only after every row has a blob, so an error
    /// part-way leaves the table intact for the next startup to resume.
    pub async fn migrate_legacy_blobs(
        db: &Database,
        blobs: &dyn BlobStore,
    ) -> Result<MigrationReport> {
        let mut report = MigrationReport::default();
        if !db.has_column("image").await? {
            return Ok(report);
        }
        report.legacy = true;
        tracing::info!("Found legacy inline image column, moving images to blob storage...");

        let ids: Vec<(i64,)> = sqlx::query_as("SELECT id FROM birbs ORDER BY id")
            .fetch_all(db.pool())
            .await?;

        let mut seen = HashSet::new();
        for (id,) in ids {
            let (hash, image): (Option<Vec<u8>>, Option<Vec<u8>>) =
                sqlx::query_as("SELECT hash, image FROM birbs WHERE id = ?")
                    .bind(id)
                    .fetch_one(db.pool())
                    .await?;
            report.rows += 1;

            let Some(image) = image else {
                tracing::warn!("Legacy row {} has no inline image, removing it", id);
                Self::delete_row(db, id).await?;
                report.empty_removed += 1;
                continue;
            };

            let stored = hash.as_deref().and_then(Fingerprint::from_slice);
            let fingerprint = stored.unwrap_or_else(|| Fingerprint::of(&image));

            // Both checks run before rehashing so the update can't collide with a stored hash.
            let duplicate = seen.contains(&fingerprint)
                || (stored.is_none() && Self::hash_taken(db, &fingerprint, id).await?);
            if duplicate {
                tracing::info!("Legacy row {} duplicates image {}, removing it", id, fingerprint);
                Self::delete_row(db, id).await?;
                report.duplicates_removed += 1;
                continue;
            }
            seen.insert(fingerprint);

            if stored.is_none() {
                sqlx::query("UPDATE birbs SET hash = ? WHERE id = ?")
                    .bind(fingerprint.to_vec())
                    .bind(id)
                    .execute(db.pool())
                    .await?;
                report.rehashed += 1;
            }

            if blobs.put_if_absent(&fingerprint, &image).await? == BlobWrite::Written {
                report.written += 1;
            }
        }

        sqlx::query("ALTER TABLE birbs DROP COLUMN image")
            .execute(db.pool())
            .await?;
        tracing::info!("Dropped legacy image column");

        Ok(report)
    }

    /// Whether a row other than `id` already stores this fingerprint
    async fn hash_taken(db: &Database, fingerprint: &Fingerprint, id: i64) -> Result<bool> {
        let found: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM birbs WHERE hash = ? AND id != ? LIMIT 1")
                .bind(fingerprint.to_vec())
                .bind(id)
                .fetch_optional(db.pool())
                .await?;
        Ok(found.is_some())
    }

    async fn delete_row(db: &Database, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM birbs WHERE id = ?")
            .bind(id)
            .execute(db.pool())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ImageService;
    use crate::storage::LocalBlobStore;
    use tempfile::TempDir;

    async fn legacy_db(dir: &TempDir) -> Database {
        legacy_db_with(dir, "image BLOB NOT NULL").await
    }

    async fn legacy_db_with(dir: &TempDir, image_column: &str) -> Database {
        let db = Database::new(dir.path().join("legacy.db").to_str().unwrap())
            .await
            .unwrap();
        let create = format!(
            r#"
            CREATE TABLE birbs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                hash BLOB,
                {},
                permalink TEXT NOT NULL,
                content_type TEXT NOT NULL,
                banned INTEGER NOT NULL DEFAULT 0
            )
            "#,
            image_column
        );
        sqlx::query(&create).execute(db.pool()).await.unwrap();
        db
    }

    async fn permalinks(db: &Database) -> Vec<String> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT permalink FROM birbs ORDER BY id")
            .fetch_all(db.pool())
            .await
            .unwrap();
        rows.into_iter().map(|(p,)| p).collect()
    }

    async fn insert_legacy(db: &Database, hash: Option<Vec<u8>>, image: &[u8], permalink: &str) {
        sqlx::query(
            "INSERT INTO birbs (hash, image, permalink, content_type) VALUES (?, ?, ?, 'image/jpeg')",
        )
        .bind(hash)
        .bind(image.to_vec())
        .bind(permalink)
        .execute(db.pool())
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_inline_images_move_to_blobs() {
        let dir = TempDir::new().unwrap();
        let db = legacy_db(&dir).await;
        let blobs = LocalBlobStore::new(dir.path().join("birbs"));

        let stored = Fingerprint::of(b"first birb");
        insert_legacy(&db, Some(stored.to_vec()), b"first birb", "/1").await;
        insert_legacy(&db, None, b"second birb", "/2").await;

        db.run_migrations(&blobs).await.unwrap();

        let first = std::fs::read(dir.path().join("birbs").join(stored.to_hex())).unwrap();
        assert_eq!(first, b"first birb");

        let recomputed = Fingerprint::of(b"second birb");
        let second = std::fs::read(blobs.path_for(&recomputed)).unwrap();
        assert_eq!(second, b"second birb");

        let (hash,): (Vec<u8>,) = sqlx::query_as("SELECT hash FROM birbs WHERE permalink = '/2'")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(hash, recomputed.to_vec());

        assert!(!db.has_column("image").await.unwrap());
        assert!(db.has_column("source_url").await.unwrap());
    }

    #[tokio::test]
    async fn test_second_run_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let db = legacy_db(&dir).await;
        let blobs = LocalBlobStore::new(dir.path().join("birbs"));
        insert_legacy(&db, None, b"only birb", "/1").await;

        let first = MigrationService::migrate_legacy_blobs(&db, &blobs).await.unwrap();
        assert!(first.legacy);
        assert_eq!(first.rows, 1);
        assert_eq!(first.written, 1);
        assert_eq!(first.rehashed, 1);

        let second = MigrationService::migrate_legacy_blobs(&db, &blobs).await.unwrap();
        assert_eq!(second, MigrationReport::default());
    }

    #[tokio::test]
    async fn test_existing_blobs_are_kept() {
        let dir = TempDir::new().unwrap();
        let db = legacy_db(&dir).await;
        let blobs = LocalBlobStore::new(dir.path().join("birbs"));
        let fp = Fingerprint::of(b"resumed");
        insert_legacy(&db, Some(fp.to_vec()), b"resumed", "/1").await;

        // A previous run got as far as writing the blob.
        blobs.put_if_absent(&fp, b"resumed").await.unwrap();

        let report = MigrationService::migrate_legacy_blobs(&db, &blobs).await.unwrap();
        assert_eq!(report.rows, 1);
        assert_eq!(report.written, 0);
        assert!(!db.has_column("image").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_legacy_rows_are_collapsed() {
        let dir = TempDir::new().unwrap();
        let db = legacy_db(&dir).await;
        let blobs = LocalBlobStore::new(dir.path().join("birbs"));
        // Older databases already carry the hash index; NULL hashes don't collide in it.
        sqlx::query("CREATE UNIQUE INDEX hash_uidx ON birbs(hash)")
            .execute(db.pool())
            .await
            .unwrap();
        insert_legacy(&db, None, b"same birb", "/1").await;
        insert_legacy(&db, None, b"same birb", "/2").await;

        db.run_migrations(&blobs).await.unwrap();

        assert_eq!(permalinks(&db).await, vec!["/1".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_hash_matching_a_later_stored_hash() {
        let dir = TempDir::new().unwrap();
        let db = legacy_db(&dir).await;
        let blobs = LocalBlobStore::new(dir.path().join("birbs"));
        sqlx::query("CREATE UNIQUE INDEX hash_uidx ON birbs(hash)")
            .execute(db.pool())
            .await
            .unwrap();
        let fp = Fingerprint::of(b"same birb");
        insert_legacy(&db, None, b"same birb", "/unhashed").await;
        insert_legacy(&db, Some(fp.to_vec()), b"same birb", "/hashed").await;

        let report = MigrationService::migrate_legacy_blobs(&db, &blobs).await.unwrap();
        assert_eq!(report.duplicates_removed, 1);
        assert_eq!(report.rehashed, 0);
        assert_eq!(report.written, 1);
        assert_eq!(permalinks(&db).await, vec!["/hashed".to_string()]);
        assert!(!db.has_column("image").await.unwrap());

        // The index creation that follows at startup succeeds too.
        db.run_migrations(&blobs).await.unwrap();
        let served = ImageService::random_image(&db, &blobs).await.unwrap();
        assert_eq!(served.data.as_ref(), b"same birb");
    }

    #[tokio::test]
    async fn test_rows_without_inline_bytes_are_removed() {
        let dir = TempDir::new().unwrap();
        let db = legacy_db_with(&dir, "image BLOB").await;
        let blobs = LocalBlobStore::new(dir.path().join("birbs"));
        sqlx::query(
            "INSERT INTO birbs (hash, image, permalink, content_type) VALUES (?, NULL, '/empty', 'image/png')",
        )
        .bind(Fingerprint::of(b"lost").to_vec())
        .execute(db.pool())
        .await
        .unwrap();
        insert_legacy(&db, None, b"kept birb", "/kept").await;

        db.run_migrations(&blobs).await.unwrap();

        assert_eq!(permalinks(&db).await, vec!["/kept".to_string()]);
        assert!(!db.has_column("image").await.unwrap());
        for _ in 0..5 {
            let served = ImageService::random_image(&db, &blobs).await.unwrap();
            assert_eq!(served.image.permalink, "/kept");
        }
    }

    #[tokio::test]
    async fn test_failure_keeps_column_for_retry() {
        let dir = TempDir::new().unwrap();
        let db = legacy_db(&dir).await;
        insert_legacy(&db, None, b"stuck birb", "/1").await;

        // A plain file where the blob directory should be makes every write fail.
        let blocked = dir.path().join("not-a-dir");
        std::fs::write(&blocked, b"").unwrap();
        let blobs = LocalBlobStore::new(&blocked);

        assert!(MigrationService::migrate_legacy_blobs(&db, &blobs).await.is_err());
        assert!(db.has_column("image").await.unwrap());

        let blobs = LocalBlobStore::new(dir.path().join("birbs"));
        let report = MigrationService::migrate_legacy_blobs(&db, &blobs).await.unwrap();
        assert_eq!(report.written, 1);
        assert!(!db.has_column("image").await.unwrap());
    }
}
