use crate::error::ContentError;
use crate::metadata_store::{AlbumRecord, ContentStatistics, ImageRecord, SlideRecord};
use crate::snapshot::{nullable_string, string_or_number};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Read model shared by every persistence backend
#[async_trait]
pub trait ContentReader: Send + Sync {
    /// Backend description reported by the status endpoint
    fn backend_name(&self) -> &'static str;

    async fn albums(&self) -> Result<Vec<AlbumView>, ContentError>;

    async fn slides(&self) -> Result<Vec<SlideView>, ContentError>;

    async fn statistics(&self) -> Result<ContentStatistics, ContentError>;
}

/// Album as returned by `GET /api/gallery/albums`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumView {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub name: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub description: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub created_at: String,
    #[serde(default)]
    pub images: Vec<ImageView>,
}

/// Image entry nested in an [`AlbumView`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageView {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub src: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub name: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub upload_date: String,
}

/// Slide as returned by `GET /api/slideshow/slides`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlideView {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub title: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub description: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub image: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub button_text: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub button_link: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub created_at: String,
}

/// Turns stored rows into the nested shapes clients consume
///
/// Image URLs are always `{serve_prefix}/{file name}`; storage paths on disk
/// never appear in a view.
#[derive(Debug, Clone)]
pub struct Projector {
    serve_prefix: String,
}

impl Projector {
    pub fn new(serve_prefix: &str) -> Self {
        Self {
            serve_prefix: serve_prefix.trim_end_matches('/').to_string(),
        }
    }

    /// Public URL of a stored blob
    pub fn blob_url(&self, blob_ref: &str) -> String {
        format!("{}/{}", self.serve_prefix, blob_ref)
    }

    /// Nest images under their albums, keeping both orderings as given
    pub fn albums(&self, albums: Vec<AlbumRecord>, images: Vec<ImageRecord>) -> Vec<AlbumView> {
        let mut by_album: HashMap<String, Vec<ImageView>> = HashMap::new();
        for image in images {
            let album_id = image.album_id.clone();
            by_album.entry(album_id).or_default().push(self.image(image));
        }

        albums
            .into_iter()
            .map(|album| {
                let images = by_album.remove(&album.id).unwrap_or_default();
                self.album(album, images)
            })
            .collect()
    }

    pub fn album(&self, album: AlbumRecord, images: Vec<ImageView>) -> AlbumView {
        AlbumView {
            id: album.id,
            name: album.name,
            description: album.description.unwrap_or_default(),
            created_at: format_timestamp(album.created_at),
            images,
        }
    }

    pub fn image(&self, image: ImageRecord) -> ImageView {
        ImageView {
            src: self.blob_url(&image.blob_ref),
            id: image.id,
            name: image.original_name.unwrap_or_default(),
            upload_date: format_timestamp(image.upload_date),
        }
    }

    pub fn slide(&self, slide: SlideRecord) -> SlideView {
        SlideView {
            image: self.blob_url(&slide.blob_ref),
            id: slide.id,
            title: slide.title,
            description: slide.description.unwrap_or_default(),
            button_text: slide.button_text.unwrap_or_default(),
            button_link: slide.button_link.unwrap_or_default(),
            created_at: format_timestamp(slide.created_at),
        }
    }
}

/// Render timestamps the way browsers' `toISOString()` does
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}
