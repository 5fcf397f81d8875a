use crate::blob_store::{BlobStore, DeleteOutcome, INLINE_DATA_MARKER};
use crate::error::ContentError;
use crate::metadata_store::{ContentStatistics, EntityKind, MetadataStore, NewSlide};
use crate::projector::{AlbumView, ContentReader, Projector, SlideView};
use crate::snapshot::require;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Image file extensions accepted at the upload boundary
pub const ALLOWED_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "webp"];

/// One image of an "add images to album" batch
#[derive(Debug, Clone, Default)]
pub struct NewImage {
    /// Base64 payload, optionally with a data-URI header
    pub src: String,
    pub name: String,
}

/// Outcome of an image batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub attempted: usize,
    pub stored: usize,
    pub failed: usize,
}

/// Fields of a slide upload
#[derive(Debug, Clone, Default)]
pub struct SlideUpload {
    pub title: String,
    pub description: String,
    /// Base64 payload, optionally with a data-URI header
    pub image: String,
    pub button_text: String,
    pub button_link: String,
    pub original_name: String,
    pub order_index: i64,
}

/// Explicit content operations over the metadata store and blob store
///
/// Writes always store the blob before the row that references it, and
/// deletes always remove the blob before the row.
pub struct Catalog {
    metadata: Arc<MetadataStore>,
    blobs: Arc<BlobStore>,
    projector: Projector,
}

impl Catalog {
    pub fn new(metadata: Arc<MetadataStore>, blobs: Arc<BlobStore>, projector: Projector) -> Self {
        Self {
            metadata,
            blobs,
            projector,
        }
    }

    /// Create an album with a fresh id
    #[instrument(skip(self, description))]
    pub async fn create_album(&self, name: &str, description: &str) -> Result<String, ContentError> {
        require("name", name)?;

        let album_id = Uuid::new_v4().to_string();
        self.metadata
            .insert_album(&album_id, name.trim(), description)
            .await?;

        info!(album_id = %album_id, "Album created");
        metrics::counter!("content.albums.created").increment(1);

        Ok(album_id)
    }

    /// Add a batch of images to an existing album
    ///
    /// Images are committed one at a time. An image whose payload cannot be
    /// validated or stored is skipped and counted as failed; images before
    /// and after it stay committed. There is no batch rollback. A metadata
    /// store failure aborts the remaining batch.
    #[instrument(skip(self, images), fields(batch_size = images.len()))]
    pub async fn add_images(
        &self,
        album_id: &str,
        images: &[NewImage],
    ) -> Result<BatchReport, ContentError> {
        if !self.metadata.exists(EntityKind::Album, album_id).await? {
            return Err(ContentError::NotFound {
                kind: EntityKind::Album,
                id: album_id.to_string(),
            });
        }

        let prefix = format!("gallery_{}", album_id);
        let mut report = BatchReport {
            attempted: images.len(),
            ..Default::default()
        };

        for (index, image) in images.iter().enumerate() {
            let blob_ref = match self.store_image(&image.src, &image.name, &prefix).await {
                Ok(blob_ref) => blob_ref,
                Err(e) => {
                    warn!(album_id = %album_id, index, error = %e, "Skipping image");
                    metrics::counter!("content.images.failed").increment(1);
                    report.failed += 1;
                    continue;
                }
            };

            let image_id = Uuid::new_v4().to_string();
            if let Err(e) = self
                .metadata
                .insert_image(&image_id, album_id, &blob_ref, &image.name)
                .await
            {
                self.discard_blob(&blob_ref).await;
                return Err(e);
            }

            report.stored += 1;
            metrics::counter!("content.images.stored").increment(1);
        }

        info!(
            album_id = %album_id,
            attempted = report.attempted,
            stored = report.stored,
            failed = report.failed,
            "Image batch processed"
        );

        Ok(report)
    }

    /// Delete an album, its images and their blobs
    ///
    /// Returns whether the album existed; deleting an absent album is a no-op.
    #[instrument(skip(self))]
    pub async fn delete_album(&self, album_id: &str) -> Result<bool, ContentError> {
        let images = self.metadata.list_images(album_id).await?;
        for image in &images {
            self.discard_blob(&image.blob_ref).await;
        }

        let existed = self.metadata.delete_album(album_id).await?;
        if existed {
            info!(album_id = %album_id, images = images.len(), "Album deleted");
            metrics::counter!("content.albums.deleted").increment(1);
        }

        Ok(existed)
    }

    /// Create a slide; nothing is written unless its image is stored first
    #[instrument(skip(self, upload), fields(title = %upload.title))]
    pub async fn create_slide(&self, upload: &SlideUpload) -> Result<String, ContentError> {
        require("title", &upload.title)?;
        require("image", &upload.image)?;

        let original_name = if upload.original_name.trim().is_empty() {
            "slideshow_image".to_string()
        } else {
            upload.original_name.clone()
        };

        let blob_ref = self
            .store_image(&upload.image, &original_name, "slideshow")
            .await?;

        let slide = NewSlide {
            id: Uuid::new_v4().to_string(),
            title: upload.title.trim().to_string(),
            description: upload.description.clone(),
            blob_ref,
            original_name,
            button_text: upload.button_text.clone(),
            button_link: upload.button_link.clone(),
            order_index: upload.order_index,
        };

        if let Err(e) = self.metadata.insert_slide(&slide).await {
            self.discard_blob(&slide.blob_ref).await;
            return Err(e);
        }

        info!(slide_id = %slide.id, "Slide created");
        metrics::counter!("content.slides.created").increment(1);

        Ok(slide.id)
    }

    /// Delete a slide and its blob; absent slides are a no-op
    #[instrument(skip(self))]
    pub async fn delete_slide(&self, slide_id: &str) -> Result<bool, ContentError> {
        let Some(slide) = self.metadata.get_slide(slide_id).await? else {
            debug!(slide_id = %slide_id, "Slide already absent");
            return Ok(false);
        };

        self.discard_blob(&slide.blob_ref).await;
        let existed = self.metadata.delete_slide(slide_id).await?;

        info!(slide_id = %slide_id, "Slide deleted");
        metrics::counter!("content.slides.deleted").increment(1);

        Ok(existed)
    }

    /// Validate an upload against the allow-list, then store its bytes
    pub(crate) async fn store_image(
        &self,
        payload: &str,
        name: &str,
        prefix: &str,
    ) -> Result<String, ContentError> {
        ensure_allowed_image(name, payload)?;
        let blob_ref = self.blobs.store(payload, prefix).await?;
        Ok(blob_ref)
    }

    /// Best-effort blob removal; row deletion proceeds whatever happens here
    pub(crate) async fn discard_blob(&self, blob_ref: &str) {
        match self.blobs.delete(blob_ref).await {
            Ok(DeleteOutcome::Removed) => {}
            Ok(DeleteOutcome::Missing) => {
                debug!(blob_ref = %blob_ref, "Blob was already missing");
            }
            Err(e) => {
                warn!(blob_ref = %blob_ref, error = %e, "Failed to delete blob, leaving orphan");
                metrics::counter!("content.blobs.orphaned").increment(1);
            }
        }
    }

    pub fn metadata(&self) -> &Arc<MetadataStore> {
        &self.metadata
    }

    pub fn blobs(&self) -> &Arc<BlobStore> {
        &self.blobs
    }
}

#[async_trait]
impl ContentReader for Catalog {
    fn backend_name(&self) -> &'static str {
        "Axum + SQLite"
    }

    async fn albums(&self) -> Result<Vec<AlbumView>, ContentError> {
        let albums = self.metadata.list_albums().await?;
        let images = self.metadata.list_all_images().await?;
        Ok(self.projector.albums(albums, images))
    }

    async fn slides(&self) -> Result<Vec<SlideView>, ContentError> {
        let slides = self.metadata.list_slides().await?;
        Ok(slides
            .into_iter()
            .map(|slide| self.projector.slide(slide))
            .collect())
    }

    async fn statistics(&self) -> Result<ContentStatistics, ContentError> {
        self.metadata.statistics().await
    }
}

/// Enforce the image type allow-list on an upload
///
/// A data-URI media type decides on its own. Bare base64 payloads fall back
/// to the display name, and names without an alphabetic extension
/// ("Shrine Exterior", "Procession 2024.12") pass.
pub fn ensure_allowed_image(name: &str, payload: &str) -> Result<(), ContentError> {
    if let Some(media_type) = data_uri_media_type(payload) {
        let allowed = media_type
            .strip_prefix("image/")
            .is_some_and(is_allowed_extension);
        if !allowed {
            return Err(ContentError::validation(format!(
                "Image type {} is not allowed",
                media_type
            )));
        }
        return Ok(());
    }

    match name_extension(name) {
        Some(extension) if !is_allowed_extension(&extension) => Err(ContentError::validation(
            format!("File type .{} is not allowed", extension),
        )),
        _ => Ok(()),
    }
}

fn is_allowed_extension(extension: &str) -> bool {
    ALLOWED_EXTENSIONS.contains(&extension)
}

fn name_extension(name: &str) -> Option<String> {
    let (_, extension) = name.trim().rsplit_once('.')?;
    let looks_like_extension = !extension.is_empty()
        && extension.len() <= 4
        && extension.chars().all(|c| c.is_ascii_alphabetic());

    looks_like_extension.then(|| extension.to_ascii_lowercase())
}

fn data_uri_media_type(payload: &str) -> Option<String> {
    let header = payload.strip_prefix(INLINE_DATA_MARKER)?.split(',').next()?;
    let media_type = header.split(';').next()?.trim();
    (!media_type.is_empty()).then(|| media_type.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BlobConfig;
    use base64::{engine::general_purpose::STANDARD, Engine};
    use tempfile::TempDir;

    async fn create_test_catalog() -> (TempDir, Catalog) {
        let dir = TempDir::new().unwrap();
        let metadata = MetadataStore::in_memory().await.unwrap();
        metadata.run_migrations().await.unwrap();
        let blobs = BlobStore::new(&BlobConfig {
            upload_dir: dir.path().join("uploads"),
            serve_prefix: "/uploads".to_string(),
        })
        .await
        .unwrap();

        let catalog = Catalog::new(
            Arc::new(metadata),
            Arc::new(blobs),
            Projector::new("/uploads"),
        );
        (dir, catalog)
    }

    fn data_uri(bytes: &[u8]) -> String {
        format!("data:image/jpeg;base64,{}", STANDARD.encode(bytes))
    }

    fn upload(title: &str, image: String) -> SlideUpload {
        SlideUpload {
            title: title.to_string(),
            image,
            ..Default::default()
        }
    }

    fn blob_ref_from_url(url: &str) -> &str {
        url.rsplit('/').next().unwrap()
    }

    #[tokio::test]
    async fn test_create_album_requires_name() {
        let (_dir, catalog) = create_test_catalog().await;

        let result = catalog.create_album("   ", "").await;

        assert!(matches!(result, Err(ContentError::Validation(_))));
        assert_eq!(catalog.statistics().await.unwrap().albums, 0);
    }

    #[tokio::test]
    async fn test_batch_keeps_valid_images_around_invalid_one() {
        let (_dir, catalog) = create_test_catalog().await;
        let album_id = catalog.create_album("Feast Day", "").await.unwrap();

        let report = catalog
            .add_images(
                &album_id,
                &[
                    NewImage {
                        src: data_uri(b"first"),
                        name: "first.jpg".to_string(),
                    },
                    NewImage {
                        src: "data:image/jpeg;base64,%%%invalid%%%".to_string(),
                        name: "second.jpg".to_string(),
                    },
                    NewImage {
                        src: data_uri(b"third"),
                        name: "third.jpg".to_string(),
                    },
                ],
            )
            .await
            .unwrap();

        assert_eq!(
            report,
            BatchReport {
                attempted: 3,
                stored: 2,
                failed: 1
            }
        );

        let albums = catalog.albums().await.unwrap();
        let names: Vec<&str> = albums[0].images.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["third.jpg", "first.jpg"]);
        for image in &albums[0].images {
            let path = catalog.blobs().resolve(blob_ref_from_url(&image.src)).unwrap();
            assert!(path.exists());
        }
    }

    #[tokio::test]
    async fn test_add_images_to_missing_album_fails() {
        let (_dir, catalog) = create_test_catalog().await;

        let result = catalog
            .add_images(
                "no-such-album",
                &[NewImage {
                    src: data_uri(b"x"),
                    name: "x.jpg".to_string(),
                }],
            )
            .await;

        assert!(matches!(result, Err(ContentError::NotFound { .. })));
        assert_eq!(catalog.statistics().await.unwrap().images, 0);
    }

    #[tokio::test]
    async fn test_disallowed_extension_is_skipped() {
        let (_dir, catalog) = create_test_catalog().await;
        let album_id = catalog.create_album("Album", "").await.unwrap();

        let report = catalog
            .add_images(
                &album_id,
                &[NewImage {
                    src: format!("data:image/tiff;base64,{}", STANDARD.encode(b"tiff")),
                    name: "scan".to_string(),
                }],
            )
            .await
            .unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.stored, 0);
    }

    #[tokio::test]
    async fn test_data_uri_round_trip_through_album() {
        let (_dir, catalog) = create_test_catalog().await;
        let album_id = catalog.create_album("Album", "").await.unwrap();
        let bytes: Vec<u8> = (0..=255).collect();

        catalog
            .add_images(
                &album_id,
                &[NewImage {
                    src: data_uri(&bytes),
                    name: "all-bytes".to_string(),
                }],
            )
            .await
            .unwrap();

        let albums = catalog.albums().await.unwrap();
        let src = &albums[0].images[0].src;
        assert!(src.starts_with("/uploads/gallery_"));
        let served = catalog.blobs().read(blob_ref_from_url(src)).await.unwrap();
        assert_eq!(served, bytes);
    }

    #[tokio::test]
    async fn test_delete_album_cascades_to_images_and_blobs() {
        let (_dir, catalog) = create_test_catalog().await;
        let album_id = catalog.create_album("Album", "").await.unwrap();
        let keep_id = catalog.create_album("Keep", "").await.unwrap();
        let images = vec![
            NewImage {
                src: data_uri(b"one"),
                name: "one.jpg".to_string(),
            },
            NewImage {
                src: data_uri(b"two"),
                name: "two.jpg".to_string(),
            },
        ];
        catalog.add_images(&album_id, &images).await.unwrap();
        catalog.add_images(&keep_id, &images[..1]).await.unwrap();

        let blob_paths: Vec<_> = catalog
            .metadata()
            .list_images(&album_id)
            .await
            .unwrap()
            .iter()
            .map(|i| catalog.blobs().resolve(&i.blob_ref).unwrap())
            .collect();

        assert!(catalog.delete_album(&album_id).await.unwrap());

        assert!(blob_paths.iter().all(|p| !p.exists()));
        assert!(catalog.metadata().list_images(&album_id).await.unwrap().is_empty());
        for image in catalog.metadata().list_all_images().await.unwrap() {
            assert_eq!(image.album_id, keep_id);
        }
        assert_eq!(catalog.statistics().await.unwrap().albums, 1);
    }

    #[tokio::test]
    async fn test_delete_absent_album_is_noop() {
        let (_dir, catalog) = create_test_catalog().await;

        assert!(!catalog.delete_album("never-existed").await.unwrap());
    }

    #[tokio::test]
    async fn test_slide_not_created_when_image_fails() {
        let (_dir, catalog) = create_test_catalog().await;

        let result = catalog
            .create_slide(&upload("Welcome", "data:image/png;base64,###".to_string()))
            .await;

        assert!(matches!(result, Err(ContentError::InvalidEncoding(_))));
        assert_eq!(catalog.statistics().await.unwrap().slides, 0);
    }

    #[tokio::test]
    async fn test_slide_defaults_original_name() {
        let (_dir, catalog) = create_test_catalog().await;

        let slide_id = catalog
            .create_slide(&upload("Welcome", data_uri(b"slide")))
            .await
            .unwrap();

        let slide = catalog.metadata().get_slide(&slide_id).await.unwrap().unwrap();
        assert_eq!(slide.original_name.as_deref(), Some("slideshow_image"));
        assert!(slide.blob_ref.starts_with("slideshow_"));
    }

    #[tokio::test]
    async fn test_delete_slide_tolerates_missing_blob() {
        let (_dir, catalog) = create_test_catalog().await;
        let slide_id = catalog
            .create_slide(&upload("Welcome", data_uri(b"slide")))
            .await
            .unwrap();
        let slide = catalog.metadata().get_slide(&slide_id).await.unwrap().unwrap();
        std::fs::remove_file(catalog.blobs().resolve(&slide.blob_ref).unwrap()).unwrap();

        assert!(catalog.delete_slide(&slide_id).await.unwrap());
        assert!(catalog.metadata().get_slide(&slide_id).await.unwrap().is_none());
    }

    #[test]
    fn test_extension_allow_list() {
        assert!(ensure_allowed_image("photo.JPG", "SGVsbG8=").is_ok());
        assert!(ensure_allowed_image("Shrine Exterior", "SGVsbG8=").is_ok());
        assert!(ensure_allowed_image("Mr. Smith at Mass", "SGVsbG8=").is_ok());
        assert!(ensure_allowed_image("photo.bmp", "SGVsbG8=").is_err());
        assert!(ensure_allowed_image("photo", "data:image/webp;base64,AAAA").is_ok());
        assert!(ensure_allowed_image("photo", "data:image/svg+xml;base64,AAAA").is_err());
        assert!(ensure_allowed_image("photo", "data:text/html;base64,AAAA").is_err());
    }

    #[test]
    fn test_dotted_display_names_are_not_extensions() {
        assert!(ensure_allowed_image("Procession 2024.12", "SGVsbG8=").is_ok());
        assert!(ensure_allowed_image("Shrine.Exterior", "SGVsbG8=").is_ok());
        assert!(ensure_allowed_image("Shrine.Exterior", "data:image/jpeg;base64,SGVsbG8=").is_ok());
        assert!(ensure_allowed_image("scan.tiff", "data:image/png;base64,SGVsbG8=").is_ok());
        assert!(ensure_allowed_image("scan.tiff", "SGVsbG8=").is_err());
    }
}
