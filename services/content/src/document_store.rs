use crate::config::DocumentConfig;
use crate::error::ContentError;
use crate::metadata_store::ContentStatistics;
use crate::projector::{AlbumView, ContentReader, SlideView};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

pub const ALBUMS_KEY: &str = "galleryAlbums";
pub const SLIDES_KEY: &str = "homeSlides";
pub const SITE_INFO_KEY: &str = "siteInfo";

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("content key must not be blank")]
    BlankKey,

    #[error("content document {} is not a JSON object", path.display())]
    NotAnObject { path: PathBuf },

    #[error("content document {} is malformed: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("content document i/o failed for {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Content kept as one JSON object file, keyed by site section
///
/// Whole-section replacement only; a mutex serializes the read-modify-write
/// cycle so concurrent updates to different keys are not lost.
pub struct DocumentStore {
    path: PathBuf,
    site_name: String,
    lock: Mutex<()>,
}

impl DocumentStore {
    pub async fn new(config: &DocumentConfig) -> Result<Self, DocumentError> {
        if let Some(dir) = config.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .await
                .map_err(|source| DocumentError::Io {
                    path: dir.to_path_buf(),
                    source,
                })?;
        }

        info!(path = %config.path.display(), "Document store initialized");

        Ok(Self {
            path: config.path.clone(),
            site_name: config.site_name.clone(),
            lock: Mutex::new(()),
        })
    }

    /// Read the whole document; a missing file yields the default document
    pub async fn load(&self) -> Result<Map<String, Value>, DocumentError> {
        let raw = match fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No content document yet");
                return Ok(self.default_document());
            }
            Err(source) => {
                return Err(DocumentError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let value: Value =
            serde_json::from_slice(&raw).map_err(|source| DocumentError::Malformed {
                path: self.path.clone(),
                source,
            })?;

        match value {
            Value::Object(map) => Ok(map),
            _ => Err(DocumentError::NotAnObject {
                path: self.path.clone(),
            }),
        }
    }

    /// Replace one top-level section and persist the document
    #[instrument(skip(self, data))]
    pub async fn set_key(&self, key: &str, data: Value) -> Result<(), DocumentError> {
        if key.trim().is_empty() {
            return Err(DocumentError::BlankKey);
        }

        let _guard = self.lock.lock().await;

        let mut document = self.load().await?;
        document.insert(key.to_string(), data);
        self.write_atomically(&document).await?;

        info!(key = %key, "Content section updated");
        metrics::counter!("content.document.updates").increment(1);

        Ok(())
    }

    async fn write_atomically(&self, document: &Map<String, Value>) -> Result<(), DocumentError> {
        let rendered =
            serde_json::to_vec_pretty(document).map_err(|source| DocumentError::Malformed {
                path: self.path.clone(),
                source,
            })?;

        let tmp = temp_path(&self.path);
        fs::write(&tmp, rendered)
            .await
            .map_err(|source| DocumentError::Io {
                path: tmp.clone(),
                source,
            })?;

        fs::rename(&tmp, &self.path)
            .await
            .map_err(|source| DocumentError::Io {
                path: self.path.clone(),
                source,
            })
    }

    fn default_document(&self) -> Map<String, Value> {
        let mut document = Map::new();
        document.insert(
            SITE_INFO_KEY.to_string(),
            serde_json::json!({ "name": self.site_name }),
        );
        document
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ContentReader for DocumentStore {
    fn backend_name(&self) -> &'static str {
        "Axum + JSON document"
    }

    async fn albums(&self) -> Result<Vec<AlbumView>, ContentError> {
        let document = self.load().await?;
        Ok(section(&document, ALBUMS_KEY))
    }

    async fn slides(&self) -> Result<Vec<SlideView>, ContentError> {
        let document = self.load().await?;
        Ok(section(&document, SLIDES_KEY))
    }

    async fn statistics(&self) -> Result<ContentStatistics, ContentError> {
        let document = self.load().await?;
        let albums: Vec<AlbumView> = section(&document, ALBUMS_KEY);
        let slides: Vec<SlideView> = section(&document, SLIDES_KEY);

        Ok(ContentStatistics {
            albums: albums.len() as i64,
            images: albums.iter().map(|a| a.images.len() as i64).sum(),
            slides: slides.len() as i64,
        })
    }
}

/// Parse the entries of a list section, skipping ones that do not fit
fn section<T: DeserializeOwned>(document: &Map<String, Value>, key: &str) -> Vec<T> {
    let Some(Value::Array(entries)) = document.get(key) else {
        return Vec::new();
    };

    entries
        .iter()
        .enumerate()
        .filter_map(|(index, entry)| match T::deserialize(entry) {
            Ok(view) => Some(view),
            Err(e) => {
                warn!(section = %key, index, error = %e, "Skipping unreadable entry");
                None
            }
        })
        .collect()
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
