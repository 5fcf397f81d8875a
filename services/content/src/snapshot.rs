//! Client-held content snapshot, as written by the admin panel into browser
//! storage and posted to the migration endpoint.

use crate::blob_store::is_inline_data;
use crate::error::ContentError;
use serde::{Deserialize, Deserializer};

/// Full snapshot: gallery albums and home page slides
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentSnapshot {
    #[serde(default)]
    pub gallery_albums: Vec<ExternalAlbum>,
    #[serde(default)]
    pub home_slides: Vec<ExternalSlide>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalAlbum {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub description: String,
    #[serde(default)]
    pub images: Vec<ExternalImage>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalImage {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    /// Inline data URI, or the URL of an already hosted image
    #[serde(default, deserialize_with = "nullable_string")]
    pub src: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalSlide {
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
    #[serde(default)]
    pub order_index: i64,
}

impl ContentSnapshot {
    /// Reject snapshots with blank ids or album names, and inline items
    /// without the fields they are stored under
    ///
    /// Items that only reference an already hosted image are skipped by the
    /// migration, so their image id and slide title may be absent.
    pub fn validate(&self) -> Result<(), ContentError> {
        for album in &self.gallery_albums {
            require("galleryAlbums[].id", &album.id)?;
            require("galleryAlbums[].name", &album.name)?;
            for image in album.images.iter().filter(|i| is_inline_data(&i.src)) {
                require("galleryAlbums[].images[].id", &image.id)?;
            }
        }

        for slide in &self.home_slides {
            require("homeSlides[].id", &slide.id)?;
            if is_inline_data(&slide.image) {
                require("homeSlides[].title", &slide.title)?;
            }
        }

        Ok(())
    }
}

/// Fail with a validation error when a required text field is blank
pub fn require(field: &str, value: &str) -> Result<(), ContentError> {
    if value.trim().is_empty() {
        return Err(ContentError::validation(format!("{} is required", field)));
    }
    Ok(())
}

/// Accept ids written either as JSON strings or numbers (`Date.now()` ids)
pub fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Number(number) => number.to_string(),
    })
}

/// Treat `null` like an absent string
pub fn nullable_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
