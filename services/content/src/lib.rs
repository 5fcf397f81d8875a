//! Shrine Content Service
//!
//! Content backend for the shrine website: photo gallery albums and the home
//! page slideshow. Images arrive base64-encoded from the admin panel, are
//! written to a blob directory and indexed in SQLite. A one-shot migration
//! endpoint merges the admin panel's browser-held snapshot into the store.
//!
//! ## Features
//!
//! - **Gallery albums**: create, list newest-first, delete with all images
//! - **Slideshow**: slides ordered by index, each backed by one image blob
//! - **Snapshot migration**: idempotent merge by external id, never overwrites
//! - **Document mode**: alternatively keep all content in one JSON document
//!   updated section by section
//!
//! ## Architecture
//!
//! ```text
//!   Admin panel / site                          uploads/
//! ┌──────────────────┐                      ┌──────────────┐
//! │ HTTP JSON API    │                      │ gallery_*    │
//! │ (axum)           │                      │ slideshow_*  │
//! └──────────────────┘                      └──────────────┘
//!     │          │                                 ▲
//!     │          ▼                                 │
//!     │   ┌──────────────┐    blobs first   ┌──────────────┐
//!     │   │ Catalog      │─────────────────▶│ Blob         │
//!     │   │ Reconciler   │                  │ Store        │
//!     │   └──────────────┘                  └──────────────┘
//!     │          │
//!     │          ▼                               SQLite
//!     │   ┌──────────────┐                  ┌──────────────┐
//!     │   │ Metadata     │─────────────────▶│ albums       │
//!     │   │ Store        │                  │ images       │
//!     │   └──────────────┘                  │ slides       │
//!     │          │                          └──────────────┘
//!     ▼          ▼
//! ┌──────────────────┐
//! │ Projector        │  rows ─▶ camelCase views with /uploads URLs
//! └──────────────────┘
//! ```

pub mod api;
pub mod blob_store;
pub mod catalog;
pub mod config;
pub mod document_store;
pub mod error;
pub mod metadata_store;
pub mod projector;
pub mod reconciler;
pub mod snapshot;

pub use api::{create_router, AppState, CatalogState, DocumentState};
pub use blob_store::{BlobStore, DeleteOutcome};
pub use catalog::{BatchReport, Catalog, NewImage, SlideUpload};
pub use config::{Backend, Config};
pub use document_store::DocumentStore;
pub use error::ContentError;
pub use metadata_store::{ContentStatistics, EntityKind, MetadataStore};
pub use projector::{AlbumView, ContentReader, ImageView, Projector, SlideView};
pub use reconciler::{MigrationReport, Reconciler};
pub use snapshot::ContentSnapshot;
