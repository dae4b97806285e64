use crate::config::DatabaseConfig;
use crate::date::normalize_capture_date;
use crate::error::UploadError;
use crate::request::UploadRequest;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{error, info, instrument};

/// Insert statement for a new photo row. The store assigns `id`.
const INSERT_PHOTO_SQL: &str = r#"
    INSERT INTO photos (
        user_id, company_id, photo_s3_link, project_table_name,
        client_side_id, file_path, title, description,
        format, size, source_resolution_x, source_resolution_y,
        date_taken, date_uploaded, latitude, longitude
    ) VALUES (
        $1, $2, $3, $4,
        $5, $6, $7, $8,
        $9, $10, $11, $12,
        $13::date, $14, $15, $16
    )
    RETURNING id
"#;

/// Photo metadata as written to the `photos` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoRecord {
    pub user_id: Option<i64>,
    pub company_id: Option<i64>,
    pub photo_s3_link: Option<String>,
    pub project_table_name: Option<String>,
    pub client_side_id: Option<String>,
    pub file_path: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub format: Option<String>,
    pub size: Option<i64>,
    pub source_resolution_x: Option<i64>,
    pub source_resolution_y: Option<i64>,
    /// Capture date as `YYYY-MM-DD`
    pub date_taken: Option<String>,
    pub date_uploaded: DateTime<Utc>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl PhotoRecord {
    /// Build the row for a request.
    ///
    /// Empty optional text fields become NULL and the capture date is
    /// normalized, so an unreadable date fails here before any SQL runs.
    pub fn from_request(
        request: &UploadRequest,
        uploaded_at: DateTime<Utc>,
    ) -> Result<Self, UploadError> {
        Ok(Self {
            user_id: request.user_id,
            company_id: request.company_id,
            photo_s3_link: request.photo_s3_link.clone(),
            project_table_name: request.project_table_name.clone(),
            client_side_id: non_empty(&request.client_side_id),
            file_path: non_empty(&request.file_path),
            title: non_empty(&request.title),
            description: non_empty(&request.description),
            format: non_empty(&request.format),
            size: request.size,
            source_resolution_x: request.source_resolution_x,
            source_resolution_y: request.source_resolution_y,
            date_taken: normalize_capture_date(request.date_taken.as_deref())?,
            date_uploaded: uploaded_at,
            latitude: request.latitude,
            longitude: request.longitude,
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.is_empty()).cloned()
}

/// Relational store for photo metadata
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert a photo row and return the identifier the store generated
    async fn insert_photo(&self, photo: &PhotoRecord) -> Result<i64, UploadError>;

    /// Check that the store is reachable
    async fn ping(&self) -> Result<(), UploadError>;
}

/// PostgreSQL-backed metadata store
pub struct PgMetadataStore {
    pool: PgPool,
}

impl PgMetadataStore {
    /// Create a new metadata store with connection pool
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout())
            .idle_timeout(Some(config.idle_timeout()))
            .connect(&config.url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!("Connected to PostgreSQL database");

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for PgMetadataStore {
    #[instrument(skip(self, photo), fields(company_id = ?photo.company_id))]
    async fn insert_photo(&self, photo: &PhotoRecord) -> Result<i64, UploadError> {
        let row: Option<(i64,)> = sqlx::query_as(INSERT_PHOTO_SQL)
            .bind(photo.user_id)
            .bind(photo.company_id)
            .bind(&photo.photo_s3_link)
            .bind(&photo.project_table_name)
            .bind(&photo.client_side_id)
            .bind(&photo.file_path)
            .bind(&photo.title)
            .bind(&photo.description)
            .bind(&photo.format)
            .bind(photo.size)
            .bind(photo.source_resolution_x)
            .bind(photo.source_resolution_y)
            .bind(&photo.date_taken)
            .bind(photo.date_uploaded)
            .bind(photo.latitude)
            .bind(photo.longitude)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!(error = %e, "Photo insert failed");
                UploadError::Persistence(e.to_string())
            })?;

        match row {
            Some((photo_id,)) => {
                info!(photo_id, "Photo metadata inserted");
                Ok(photo_id)
            }
            None => {
                error!("Photo insert returned no rows");
                Err(UploadError::Persistence(
                    "insert returned no identifier".to_string(),
                ))
            }
        }
    }

    async fn ping(&self) -> Result<(), UploadError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| UploadError::Persistence(e.to_string()))?;

        Ok(())
    }
}
