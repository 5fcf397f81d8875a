use crate::config::DatabaseConfig;
use crate::error::ContentError;
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Kinds of rows held by the metadata store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Album,
    Image,
    Slide,
}

impl EntityKind {
    fn table(self) -> &'static str {
        match self {
            Self::Album => "gallery_albums",
            Self::Image => "gallery_images",
            Self::Slide => "slideshow_slides",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Album => "album",
            Self::Image => "image",
            Self::Slide => "slide",
        };
        f.write_str(name)
    }
}

/// Stored gallery album
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AlbumRecord {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Stored gallery image
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ImageRecord {
    pub id: String,
    pub album_id: String,
    /// File name of the blob in the upload directory
    #[sqlx(rename = "filename")]
    pub blob_ref: String,
    pub original_name: Option<String>,
    pub upload_date: DateTime<Utc>,
}

/// Stored slideshow slide
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SlideRecord {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    #[sqlx(rename = "filename")]
    pub blob_ref: String,
    pub original_name: Option<String>,
    pub button_text: Option<String>,
    pub button_link: Option<String>,
    pub order_index: i64,
    pub created_at: DateTime<Utc>,
}

/// Slide row to insert; the blob must already be stored
#[derive(Debug, Clone, Default)]
pub struct NewSlide {
    pub id: String,
    pub title: String,
    pub description: String,
    pub blob_ref: String,
    pub original_name: String,
    pub button_text: String,
    pub button_link: String,
    pub order_index: i64,
}

/// Row counts reported by the status endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ContentStatistics {
    pub albums: i64,
    pub images: i64,
    pub slides: i64,
}

/// Metadata store for albums, images and slides in SQLite
///
/// Every call borrows a pooled connection for a single statement (or one
/// short transaction) and hands it back on return.
pub struct MetadataStore {
    pool: SqlitePool,
}

impl MetadataStore {
    /// Create a new metadata store with connection pool
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let db_dir = database_file(&config.url).and_then(|p| p.parent().map(PathBuf::from));
        if let Some(dir) = db_dir.filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(&dir).with_context(|| {
                format!("Failed to create database directory {}", dir.display())
            })?;
        }

        let options = SqliteConnectOptions::from_str(&config.url)
            .context("Invalid SQLite connection URL")?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout())
            .idle_timeout(Some(config.idle_timeout()))
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite")?;

        info!(url = %config.url, "Connected to SQLite database");

        Ok(Self { pool })
    }

    /// Create a store backed by a private in-memory database
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .context("Invalid SQLite connection URL")?
            .foreign_keys(true);

        // A single connection that never expires, or the database vanishes
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect_with(options)
            .await
            .context("Failed to open in-memory SQLite")?;

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

    /// Check whether a row with the given id exists
    pub async fn exists(&self, kind: EntityKind, id: &str) -> Result<bool, ContentError> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE id = ?1", kind.table());

        let count: i64 = sqlx::query_scalar(&sql)
            .bind(id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count > 0)
    }

    /// Insert an album row
    #[instrument(skip(self, description))]
    pub async fn insert_album(
        &self,
        id: &str,
        name: &str,
        description: &str,
    ) -> Result<(), ContentError> {
        sqlx::query(
            r#"
            INSERT INTO gallery_albums (id, name, description, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(description)
        .bind(now_timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| classify_insert_error(e, EntityKind::Album, id))?;

        debug!(album_id = %id, "Album inserted");
        Ok(())
    }

    /// Insert an image row; the album must exist
    #[instrument(skip(self))]
    pub async fn insert_image(
        &self,
        id: &str,
        album_id: &str,
        blob_ref: &str,
        original_name: &str,
    ) -> Result<(), ContentError> {
        if !self.exists(EntityKind::Album, album_id).await? {
            return Err(ContentError::NotFound {
                kind: EntityKind::Album,
                id: album_id.to_string(),
            });
        }

        sqlx::query(
            r#"
            INSERT INTO gallery_images (id, album_id, filename, original_name, upload_date)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(id)
        .bind(album_id)
        .bind(blob_ref)
        .bind(original_name)
        .bind(now_timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
                ContentError::NotFound {
                    kind: EntityKind::Album,
                    id: album_id.to_string(),
                }
            }
            other => classify_insert_error(other, EntityKind::Image, id),
        })?;

        debug!(image_id = %id, album_id = %album_id, "Image inserted");
        Ok(())
    }

    /// Insert a slide row
    #[instrument(skip(self, slide), fields(slide_id = %slide.id))]
    pub async fn insert_slide(&self, slide: &NewSlide) -> Result<(), ContentError> {
        sqlx::query(
            r#"
            INSERT INTO slideshow_slides (
                id, title, description, filename, original_name,
                button_text, button_link, order_index, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&slide.id)
        .bind(&slide.title)
        .bind(&slide.description)
        .bind(&slide.blob_ref)
        .bind(&slide.original_name)
        .bind(&slide.button_text)
        .bind(&slide.button_link)
        .bind(slide.order_index)
        .bind(now_timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| classify_insert_error(e, EntityKind::Slide, &slide.id))?;

        debug!(slide_id = %slide.id, "Slide inserted");
        Ok(())
    }

    /// All albums, newest first
    pub async fn list_albums(&self) -> Result<Vec<AlbumRecord>, ContentError> {
        let albums = sqlx::query_as::<_, AlbumRecord>(
            r#"
            SELECT id, name, description, created_at
            FROM gallery_albums
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(albums)
    }

    /// Images of one album, newest first
    pub async fn list_images(&self, album_id: &str) -> Result<Vec<ImageRecord>, ContentError> {
        let images = sqlx::query_as::<_, ImageRecord>(
            r#"
            SELECT id, album_id, filename, original_name, upload_date
            FROM gallery_images
            WHERE album_id = ?1
            ORDER BY upload_date DESC, rowid DESC
            "#,
        )
        .bind(album_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(images)
    }

    /// Images of every album, newest first
    pub async fn list_all_images(&self) -> Result<Vec<ImageRecord>, ContentError> {
        let images = sqlx::query_as::<_, ImageRecord>(
            r#"
            SELECT id, album_id, filename, original_name, upload_date
            FROM gallery_images
            ORDER BY upload_date DESC, rowid DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(images)
    }

    /// All slides by display order, ties newest first
    pub async fn list_slides(&self) -> Result<Vec<SlideRecord>, ContentError> {
        let slides = sqlx::query_as::<_, SlideRecord>(
            r#"
            SELECT id, title, description, filename, original_name,
                   button_text, button_link, order_index, created_at
            FROM slideshow_slides
            ORDER BY order_index ASC, created_at DESC, rowid DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(slides)
    }

    /// Get a slide by ID
    pub async fn get_slide(&self, slide_id: &str) -> Result<Option<SlideRecord>, ContentError> {
        let slide = sqlx::query_as::<_, SlideRecord>(
            r#"
            SELECT id, title, description, filename, original_name,
                   button_text, button_link, order_index, created_at
            FROM slideshow_slides
            WHERE id = ?1
            "#,
        )
        .bind(slide_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(slide)
    }

    /// Delete an album and its image rows in one transaction
    ///
    /// Returns whether the album existed.
    #[instrument(skip(self))]
    pub async fn delete_album(&self, album_id: &str) -> Result<bool, ContentError> {
        let mut tx = self.pool.begin().await?;

        let images = sqlx::query("DELETE FROM gallery_images WHERE album_id = ?1")
            .bind(album_id)
            .execute(&mut *tx)
            .await?;

        let albums = sqlx::query("DELETE FROM gallery_albums WHERE id = ?1")
            .bind(album_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        debug!(
            album_id = %album_id,
            images_deleted = images.rows_affected(),
            "Album rows deleted"
        );

        Ok(albums.rows_affected() > 0)
    }

    /// Delete a slide row; returns whether it existed
    #[instrument(skip(self))]
    pub async fn delete_slide(&self, slide_id: &str) -> Result<bool, ContentError> {
        let result = sqlx::query("DELETE FROM slideshow_slides WHERE id = ?1")
            .bind(slide_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Get row counts
    pub async fn statistics(&self) -> Result<ContentStatistics, ContentError> {
        let stats: ContentStatistics = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM gallery_albums) AS albums,
                (SELECT COUNT(*) FROM gallery_images) AS images,
                (SELECT COUNT(*) FROM slideshow_slides) AS slides
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(stats)
    }
}

/// Server-assigned timestamp, fixed width so text ordering matches time ordering
fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn classify_insert_error(err: sqlx::Error, kind: EntityKind, id: &str) -> ContentError {
    match err {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => ContentError::Duplicate {
            kind,
            id: id.to_string(),
        },
        other => other.into(),
    }
}

/// File path behind a `sqlite:` URL, if it names one
fn database_file(url: &str) -> Option<PathBuf> {
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or_default();

    if path.is_empty() || path == ":memory:" {
        None
    } else {
        Some(PathBuf::from(path))
    }
}
