use crate::config::BlobConfig;
use base64::{engine::general_purpose::STANDARD, Engine};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Marker that distinguishes inline image data from an already-hosted URL
pub const INLINE_DATA_MARKER: &str = "data:";

#[derive(Error, Debug)]
pub enum BlobError {
    #[error("payload is not valid base64: {0}")]
    InvalidEncoding(#[from] base64::DecodeError),

    #[error("payload contains no image bytes")]
    Empty,

    #[error("invalid blob reference: {0}")]
    InvalidRef(String),

    #[error("blob i/o failed for {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result of a best-effort blob deletion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The file existed and was removed
    Removed,
    /// The file was already gone
    Missing,
}

/// Blob store writing uploaded images as flat files in one directory
///
/// A blob reference is the bare file name, e.g. `slideshow_3f2a...9c.jpg`.
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    /// Create a blob store rooted at the configured upload directory
    pub async fn new(config: &BlobConfig) -> Result<Self, BlobError> {
        fs::create_dir_all(&config.upload_dir)
            .await
            .map_err(|source| BlobError::Io {
                path: config.upload_dir.clone(),
                source,
            })?;

        info!(upload_dir = %config.upload_dir.display(), "Blob store initialized");

        Ok(Self {
            root: config.upload_dir.clone(),
        })
    }

    /// Decode an embedded image payload and write it as a fresh blob
    ///
    /// The payload may carry a data-URI header (`data:image/png;base64,`),
    /// which is stripped before decoding. Identical bytes always produce a
    /// new blob.
    #[instrument(skip(self, payload), fields(payload_len = payload.len()))]
    pub async fn store(&self, payload: &str, name_prefix: &str) -> Result<String, BlobError> {
        let (media_type, encoded) = split_data_uri(payload);
        let bytes = decode_payload(encoded)?;

        let blob_ref = generate_blob_ref(name_prefix, media_type);
        let path = self.root.join(&blob_ref);

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|source| BlobError::Io {
                path: path.clone(),
                source,
            })?;

        let written = async {
            file.write_all(&bytes).await?;
            file.flush().await
        }
        .await;

        if let Err(source) = written {
            // Do not leave a truncated file behind
            let _ = fs::remove_file(&path).await;
            return Err(BlobError::Io { path, source });
        }

        debug!(blob_ref = %blob_ref, size_bytes = bytes.len(), "Blob stored");
        metrics::counter!("content.blobs.stored").increment(1);

        Ok(blob_ref)
    }

    /// Delete a blob; a missing file is reported as [`DeleteOutcome::Missing`]
    #[instrument(skip(self))]
    pub async fn delete(&self, blob_ref: &str) -> Result<DeleteOutcome, BlobError> {
        let path = self.resolve(blob_ref)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(blob_ref = %blob_ref, "Blob deleted");
                Ok(DeleteOutcome::Removed)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(blob_ref = %blob_ref, "Blob already missing");
                Ok(DeleteOutcome::Missing)
            }
            Err(source) => Err(BlobError::Io { path, source }),
        }
    }

    /// Resolve a blob reference to its file path
    pub fn resolve(&self, blob_ref: &str) -> Result<PathBuf, BlobError> {
        if !is_plain_file_name(blob_ref) {
            return Err(BlobError::InvalidRef(blob_ref.to_string()));
        }
        Ok(self.root.join(blob_ref))
    }

    /// Read a blob's bytes back
    pub async fn read(&self, blob_ref: &str) -> Result<Vec<u8>, BlobError> {
        let path = self.resolve(blob_ref)?;
        fs::read(&path)
            .await
            .map_err(|source| BlobError::Io { path, source })
    }

    /// Directory holding the blobs (for static serving)
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Check whether a payload carries inline image data rather than a hosted URL
pub fn is_inline_data(payload: &str) -> bool {
    payload.starts_with(INLINE_DATA_MARKER)
}

/// Split a payload into its data-URI media type (if any) and the encoded part
fn split_data_uri(payload: &str) -> (Option<&str>, &str) {
    match payload.split_once(',') {
        Some((header, encoded)) => {
            let media_type = header
                .strip_prefix(INLINE_DATA_MARKER)
                .map(|rest| rest.split(';').next().unwrap_or_default());
            (media_type, encoded)
        }
        None => (None, payload),
    }
}

fn decode_payload(encoded: &str) -> Result<Vec<u8>, BlobError> {
    let compact: String = encoded
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();

    let bytes = STANDARD.decode(compact)?;
    if bytes.is_empty() {
        return Err(BlobError::Empty);
    }
    Ok(bytes)
}

/// Generate a unique blob file name: `{prefix}_{uuid}.{ext}`
fn generate_blob_ref(name_prefix: &str, media_type: Option<&str>) -> String {
    let extension = media_type.and_then(extension_for_media_type).unwrap_or("jpg");

    format!(
        "{prefix}_{id}.{ext}",
        prefix = sanitize_path_component(name_prefix),
        id = Uuid::new_v4().simple(),
        ext = extension
    )
}

fn extension_for_media_type(media_type: &str) -> Option<&'static str> {
    match media_type.to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

/// Sanitize a path component to prevent path traversal
pub fn sanitize_path_component(component: &str) -> String {
    component
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect()
}

fn is_plain_file_name(blob_ref: &str) -> bool {
    !blob_ref.is_empty()
        && blob_ref != "."
        && blob_ref != ".."
        && !blob_ref.contains(|c: char| c == '/' || c == '\\')
        && !blob_ref.starts_with('.')
}
