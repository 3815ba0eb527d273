//! Config store backed by SQLite
//!
//! Holds the singleton recording config record and the camera records.
//! Every statement is parameterized; the only column name ever formatted
//! into SQL comes from the fixed [`UniqueField`] allow-list.

use crate::camera::{CameraId, CameraRecord, NewCamera};
use crate::config::RecordingConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

const CREATE_CONFIG_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS config (
        id INTEGER PRIMARY KEY,
        segment_time INTEGER NOT NULL,
        retry_interval INTEGER NOT NULL,
        max_backoff INTEGER NOT NULL
    )
"#;

const CREATE_CAMERAS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS cameras (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        url TEXT NOT NULL UNIQUE,
        output_dir TEXT NOT NULL UNIQUE,
        restream_url TEXT UNIQUE,
        username TEXT,
        password TEXT
    )
"#;

const CAMERA_COLUMNS: &str = "id, name, url, output_dir, restream_url, username, password";

/// Error type for store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// A UNIQUE constraint rejected the write
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// No camera with the given id
    #[error("camera {0} not found")]
    NotFound(CameraId),

    /// Any other database failure
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Camera columns that carry a UNIQUE constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Name,
    Url,
    OutputDir,
    Restream,
}

impl UniqueField {
    fn column(self) -> &'static str {
        match self {
            UniqueField::Name => "name",
            UniqueField::Url => "url",
            UniqueField::OutputDir => "output_dir",
            UniqueField::Restream => "restream_url",
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CameraRow {
    id: i64,
    name: String,
    url: String,
    output_dir: String,
    restream_url: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

impl From<CameraRow> for CameraRecord {
    fn from(row: CameraRow) -> Self {
        CameraRecord {
            id: row.id,
            name: row.name,
            url: row.url,
            output_dir: row.output_dir,
            username: row.username,
            password: row.password,
            restream: row.restream_url,
        }
    }
}

/// Persistent store for the recording config and camera records
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if needed) the database file and its schema.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    /// Private in-memory database. A single connection that never expires
    /// keeps the data alive for the lifetime of the store.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::query(CREATE_CONFIG_TABLE).execute(&pool).await?;
        sqlx::query(CREATE_CAMERAS_TABLE).execute(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn get_config(&self) -> Result<Option<RecordingConfig>, StoreError> {
        let row: Option<(i64, i64, i64)> = sqlx::query_as(
            "SELECT segment_time, retry_interval, max_backoff FROM config WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(segment_time, retry_interval, max_backoff)| RecordingConfig {
            segment_time: to_secs(segment_time),
            retry_interval: to_secs(retry_interval),
            max_backoff: to_secs(max_backoff),
        }))
    }

    pub async fn set_config(&self, cfg: &RecordingConfig) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO config (id, segment_time, retry_interval, max_backoff)
            VALUES (1, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                segment_time = excluded.segment_time,
                retry_interval = excluded.retry_interval,
                max_backoff = excluded.max_backoff
            "#,
        )
        .bind(cfg.segment_time as i64)
        .bind(cfg.retry_interval as i64)
        .bind(cfg.max_backoff as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Return the stored config, seeding it with `seed` on first use.
    pub async fn load_or_seed_config(
        &self,
        seed: &RecordingConfig,
    ) -> Result<RecordingConfig, StoreError> {
        match self.get_config().await? {
            Some(cfg) => Ok(cfg),
            None => {
                tracing::info!(?seed, "no recording config stored, writing defaults");
                self.set_config(seed).await?;
                Ok(*seed)
            }
        }
    }

    pub async fn list_cameras(&self) -> Result<Vec<CameraRecord>, StoreError> {
        let rows: Vec<CameraRow> =
            sqlx::query_as(&format!("SELECT {} FROM cameras ORDER BY id", CAMERA_COLUMNS))
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(CameraRecord::from).collect())
    }

    pub async fn get_camera(&self, id: CameraId) -> Result<Option<CameraRecord>, StoreError> {
        let row: Option<CameraRow> =
            sqlx::query_as(&format!("SELECT {} FROM cameras WHERE id = ?", CAMERA_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(CameraRecord::from))
    }

    pub async fn camera_count(&self) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cameras")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Insert a camera and return its new identifier.
    pub async fn create_camera(&self, cam: &NewCamera) -> Result<CameraId, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO cameras (name, url, output_dir, restream_url, username, password)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&cam.name)
        .bind(&cam.url)
        .bind(&cam.output_dir)
        .bind(&cam.restream)
        .bind(&cam.username)
        .bind(&cam.password)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;

        Ok(result.last_insert_rowid())
    }

    /// Overwrite every mutable column of an existing camera.
    pub async fn update_camera(&self, cam: &CameraRecord) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE cameras
            SET name = ?, url = ?, output_dir = ?, restream_url = ?, username = ?, password = ?
            WHERE id = ?
            "#,
        )
        .bind(&cam.name)
        .bind(&cam.url)
        .bind(&cam.output_dir)
        .bind(&cam.restream)
        .bind(&cam.username)
        .bind(&cam.password)
        .bind(cam.id)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(cam.id));
        }
        Ok(())
    }

    pub async fn delete_camera(&self, id: CameraId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM cameras WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    /// Uniqueness probe for a single camera column.
    pub async fn exists_with_value(
        &self,
        field: UniqueField,
        value: &str,
    ) -> Result<bool, StoreError> {
        let sql = format!("SELECT COUNT(*) FROM cameras WHERE {} = ?", field.column());
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(value)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }
}

fn map_write_error(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(db.message().to_string())
        }
        _ => StoreError::Database(e),
    }
}

fn to_secs(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}
