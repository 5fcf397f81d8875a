use crate::blob_store::{is_inline_data, BlobStore, DeleteOutcome};
use crate::catalog::ensure_allowed_image;
use crate::error::ContentError;
use crate::metadata_store::{EntityKind, MetadataStore, NewSlide};
use crate::snapshot::{ContentSnapshot, ExternalAlbum, ExternalSlide};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Counts produced by one reconcile run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    /// Images and slides written to the store
    pub migrated: usize,
    /// Entities that already existed, and items that carried no inline image
    pub skipped: usize,
    /// Items whose blob could not be stored or whose id collided
    pub failed: usize,
}

/// Snapshot entity that can be merged into the store by external id
#[async_trait]
pub trait Reconcilable: Send + Sync {
    const KIND: EntityKind;

    fn external_id(&self) -> &str;

    /// Write the entity (and any children) once it is known to be new
    async fn migrate(
        &self,
        reconciler: &Reconciler,
        report: &mut MigrationReport,
    ) -> Result<(), ContentError>;
}

/// Merges a client-held snapshot into the store, never overwriting
pub struct Reconciler {
    metadata: Arc<MetadataStore>,
    blobs: Arc<BlobStore>,
}

impl Reconciler {
    pub fn new(metadata: Arc<MetadataStore>, blobs: Arc<BlobStore>) -> Self {
        Self { metadata, blobs }
    }

    /// Import every album and slide of the snapshot that the store lacks
    ///
    /// Running the same snapshot twice migrates nothing the second time.
    /// Per-item failures are counted; only an unavailable store aborts.
    #[instrument(
        skip(self, snapshot),
        fields(
            albums = snapshot.gallery_albums.len(),
            slides = snapshot.home_slides.len()
        )
    )]
    pub async fn reconcile(
        &self,
        snapshot: &ContentSnapshot,
    ) -> Result<MigrationReport, ContentError> {
        snapshot.validate()?;

        let mut report = MigrationReport::default();

        for album in &snapshot.gallery_albums {
            self.upsert_or_skip(album, &mut report).await?;
        }

        for slide in &snapshot.home_slides {
            self.upsert_or_skip(slide, &mut report).await?;
        }

        info!(
            migrated = report.migrated,
            skipped = report.skipped,
            failed = report.failed,
            "Snapshot reconciled"
        );
        metrics::counter!("content.items.migrated").increment(report.migrated as u64);

        Ok(report)
    }

    /// Skip an entity whose id is already stored, otherwise migrate it
    pub async fn upsert_or_skip<E: Reconcilable>(
        &self,
        entity: &E,
        report: &mut MigrationReport,
    ) -> Result<(), ContentError> {
        let kind = E::KIND;
        let id = entity.external_id();

        if self.metadata.exists(kind, id).await? {
            debug!(kind = %kind, id = %id, "Already present, skipping");
            report.skipped += 1;
            return Ok(());
        }

        match entity.migrate(self, report).await {
            Err(ContentError::Duplicate { kind, id }) => {
                warn!(kind = %kind, id = %id, "Id collided during migration");
                report.failed += 1;
                Ok(())
            }
            other => other,
        }
    }

    /// Store an inline image for migration; failures are tallied, not raised
    async fn store_inline(
        &self,
        payload: &str,
        name: &str,
        prefix: &str,
        report: &mut MigrationReport,
    ) -> Option<String> {
        let stored = match ensure_allowed_image(name, payload) {
            Ok(()) => self.blobs.store(payload, prefix).await.map_err(ContentError::from),
            Err(e) => Err(e),
        };

        match stored {
            Ok(blob_ref) => Some(blob_ref),
            Err(e) => {
                warn!(prefix = %prefix, error = %e, "Failed to store migrated image");
                metrics::counter!("content.blobs.failed").increment(1);
                report.failed += 1;
                None
            }
        }
    }

    /// Undo a blob write whose row could not be inserted
    async fn discard(&self, blob_ref: &str) {
        match self.blobs.delete(blob_ref).await {
            Ok(DeleteOutcome::Removed | DeleteOutcome::Missing) => {}
            Err(e) => warn!(blob_ref = %blob_ref, error = %e, "Failed to discard blob"),
        }
    }
}

#[async_trait]
impl Reconcilable for ExternalAlbum {
    const KIND: EntityKind = EntityKind::Album;

    fn external_id(&self) -> &str {
        &self.id
    }

    async fn migrate(
        &self,
        reconciler: &Reconciler,
        report: &mut MigrationReport,
    ) -> Result<(), ContentError> {
        reconciler
            .metadata
            .insert_album(&self.id, self.name.trim(), &self.description)
            .await?;

        let prefix = format!("migrated_gallery_{}", self.id);

        for image in &self.images {
            if !is_inline_data(&image.src) {
                report.skipped += 1;
                continue;
            }

            let Some(blob_ref) = reconciler
                .store_inline(&image.src, &image.name, &prefix, report)
                .await
            else {
                continue;
            };

            match reconciler
                .metadata
                .insert_image(&image.id, &self.id, &blob_ref, &image.name)
                .await
            {
                Ok(()) => report.migrated += 1,
                Err(ContentError::Duplicate { id, .. }) => {
                    warn!(album_id = %self.id, image_id = %id, "Image id collided, skipping");
                    reconciler.discard(&blob_ref).await;
                    report.failed += 1;
                }
                Err(e) => {
                    reconciler.discard(&blob_ref).await;
                    return Err(e);
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Reconcilable for ExternalSlide {
    const KIND: EntityKind = EntityKind::Slide;

    fn external_id(&self) -> &str {
        &self.id
    }

    async fn migrate(
        &self,
        reconciler: &Reconciler,
        report: &mut MigrationReport,
    ) -> Result<(), ContentError> {
        if !is_inline_data(&self.image) {
            report.skipped += 1;
            return Ok(());
        }

        let Some(blob_ref) = reconciler
            .store_inline(&self.image, "", "migrated_slideshow", report)
            .await
        else {
            return Ok(());
        };

        let slide = NewSlide {
            id: self.id.clone(),
            title: self.title.trim().to_string(),
            description: self.description.clone(),
            blob_ref,
            original_name: "migrated_slide".to_string(),
            button_text: self.button_text.clone(),
            button_link: self.button_link.clone(),
            order_index: self.order_index,
        };

        if let Err(e) = reconciler.metadata.insert_slide(&slide).await {
            reconciler.discard(&slide.blob_ref).await;
            return Err(e);
        }

        report.migrated += 1;
        Ok(())
    }
}
