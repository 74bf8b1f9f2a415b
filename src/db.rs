use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use crate::error::Result;
use crate::services::MigrationService;
use crate::storage::BlobStore;

/// Database connection pool wrapper
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    pub async fn new(path: &str) -> Result<Self> {
        // Create database URL
        let url = format!("sqlite:{}?mode=rwc", path);

        // Create connection pool
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        Ok(Self { pool })
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run database migrations, moving any legacy inline images into `blobs`
    pub async fn run_migrations(&self, blobs: &dyn BlobStore) -> Result<()> {
        self.create_schema().await?;

        let report = MigrationService::migrate_legacy_blobs(self, blobs).await?;
        if report.legacy {
            tracing::info!(
                "Migrated {} inline images ({} written, {} duplicates, {} empty rows removed)",
                report.rows,
                report.written,
                report.duplicates_removed,
                report.empty_removed
            );
        }

        self.ensure_indexes().await?;

        tracing::info!("Database migrations completed");
        Ok(())
    }

    pub(crate) async fn create_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS birbs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                hash BLOB NOT NULL,
                permalink TEXT NOT NULL,
                source_url TEXT NOT NULL DEFAULT '',
                content_type TEXT NOT NULL,
                banned INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Backward-compatible columns for existing databases
        let _ = sqlx::query("ALTER TABLE birbs ADD COLUMN source_url TEXT NOT NULL DEFAULT ''")
            .execute(&self.pool)
            .await;
        let _ = sqlx::query(
            "ALTER TABLE birbs ADD COLUMN content_type TEXT NOT NULL DEFAULT 'application/octet-stream'",
        )
        .execute(&self.pool)
        .await;
        let _ = sqlx::query("ALTER TABLE birbs ADD COLUMN banned INTEGER NOT NULL DEFAULT 0")
            .execute(&self.pool)
            .await;

        Ok(())
    }

    /// Create the fingerprint uniqueness index; an existing index counts as success.
    pub(crate) async fn ensure_indexes(&self) -> Result<()> {
        sqlx::query("CREATE UNIQUE INDEX IF NOT EXISTS idx_birbs_hash ON birbs(hash)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_birbs_banned ON birbs(banned)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Whether `birbs` currently has a column with this name
    pub async fn has_column(&self, column: &str) -> Result<bool> {
        let found: Option<(String,)> =
            sqlx::query_as("SELECT name FROM pragma_table_info('birbs') WHERE name = ?")
                .bind(column)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }
}
