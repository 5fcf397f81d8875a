use crate::catalog::{Catalog, NewImage, SlideUpload};
use crate::config::{ApiConfig, BlobConfig};
use crate::document_store::DocumentStore;
use crate::error::ContentError;
use crate::metadata_store::ContentStatistics;
use crate::projector::{AlbumView, ContentReader, SlideView};
use crate::reconciler::Reconciler;
use crate::snapshot::{nullable_string, ContentSnapshot};
use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, FromRef, Path, State},
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};

/// State of the relational (SQLite + blob directory) API
#[derive(Clone)]
pub struct CatalogState {
    pub catalog: Arc<Catalog>,
    pub reconciler: Arc<Reconciler>,
}

/// State of the single-document API
#[derive(Clone)]
pub struct DocumentState {
    pub document: Arc<DocumentStore>,
}

/// Application state for whichever backend is configured
#[derive(Clone)]
pub enum AppState {
    Catalog(CatalogState),
    Document(DocumentState),
}

impl FromRef<CatalogState> for Arc<dyn ContentReader> {
    fn from_ref(state: &CatalogState) -> Self {
        state.catalog.clone()
    }
}

impl FromRef<DocumentState> for Arc<dyn ContentReader> {
    fn from_ref(state: &DocumentState) -> Self {
        state.document.clone()
    }
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Content error rendered as a JSON error body
#[derive(Debug)]
pub struct ApiError(ContentError);

impl From<ContentError> for ApiError {
    fn from(err: ContentError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return Self(ContentError::PayloadTooLarge(rejection.body_text()));
        }
        Self(ContentError::validation(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);

        if status.is_server_error() {
            error!(error = %self.0, code = self.0.code(), "Request failed");
        } else {
            warn!(error = %self.0, code = self.0.code(), "Request rejected");
        }

        let body = ErrorResponse {
            error: self.0.to_string(),
            code: self.0.code().to_string(),
        };

        (status, Json(body)).into_response()
    }
}

fn status_for(err: &ContentError) -> StatusCode {
    match err {
        ContentError::Validation(_) | ContentError::InvalidEncoding(_) => StatusCode::BAD_REQUEST,
        ContentError::NotFound { .. } => StatusCode::NOT_FOUND,
        ContentError::Duplicate { .. } => StatusCode::CONFLICT,
        ContentError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        ContentError::ImagePersistFailed(_) | ContentError::StoreUnavailable(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Deserialize)]
pub struct CreateAlbumRequest {
    pub name: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct AddImagesRequest {
    #[serde(default)]
    pub images: Vec<ImageUpload>,
}

#[derive(Debug, Deserialize)]
pub struct ImageUpload {
    pub src: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSlideRequest {
    pub title: String,
    pub image: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub description: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub button_text: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub button_link: String,
    #[serde(
        default,
        rename = "original_name",
        alias = "originalName",
        deserialize_with = "nullable_string"
    )]
    pub original_name: String,
    #[serde(default)]
    pub order_index: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateContentRequest {
    pub key: String,
    pub data: serde_json::Value,
}

/// Plain acknowledgement
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct AlbumCreatedResponse {
    pub success: bool,
    pub message: String,
    pub album_id: String,
}

#[derive(Debug, Serialize)]
pub struct ImagesAddedResponse {
    pub success: bool,
    pub message: String,
    pub stored: usize,
    pub failed: usize,
}

#[derive(Debug, Serialize)]
pub struct SlideCreatedResponse {
    pub success: bool,
    pub message: String,
    pub slide_id: String,
}

#[derive(Debug, Serialize)]
pub struct MigrationResponse {
    pub success: bool,
    pub message: String,
    pub migrated_count: usize,
    pub skipped_count: usize,
    pub failed_count: usize,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub backend: &'static str,
    pub statistics: ContentStatistics,
}

fn acknowledge(message: impl Into<String>) -> Json<MessageResponse> {
    Json(MessageResponse {
        success: true,
        message: message.into(),
    })
}

/// Create the API router
pub fn create_router(state: AppState, api: &ApiConfig, blobs: &BlobConfig) -> Router {
    let routes = match state {
        AppState::Catalog(state) => catalog_routes(state)
            .nest_service(&serve_prefix(&blobs.serve_prefix), ServeDir::new(&blobs.upload_dir)),
        AppState::Document(state) => document_routes(state),
    };

    let routes = match &api.static_dir {
        Some(dir) => routes.fallback_service(ServeDir::new(dir)),
        None => routes.fallback(not_found),
    };

    routes
        .layer(middleware::map_response(json_error_bodies))
        .layer(DefaultBodyLimit::max(api.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(api))
}

fn catalog_routes(state: CatalogState) -> Router {
    Router::new()
        .route("/api/gallery/albums", get(list_albums).post(create_album))
        .route("/api/gallery/albums/:album_id", delete(delete_album))
        .route("/api/gallery/albums/:album_id/images", post(add_images))
        .route("/api/slideshow/slides", get(list_slides).post(create_slide))
        .route("/api/slideshow/slides/:slide_id", delete(delete_slide))
        .route("/api/status", get(status))
        .route("/api/migrate-from-localstorage", post(migrate_snapshot))
        .with_state(state)
}

fn document_routes(state: DocumentState) -> Router {
    Router::new()
        .route("/api/gallery/albums", get(list_albums))
        .route("/api/slideshow/slides", get(list_slides))
        .route("/api/status", get(status))
        .route("/api/update-content", post(update_content))
        .with_state(state)
}

fn cors_layer(config: &ApiConfig) -> CorsLayer {
    if !config.cors_enabled {
        return CorsLayer::new();
    }

    if config.cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Normalize the blob URL prefix to `/segment` form
fn serve_prefix(prefix: &str) -> String {
    format!("/{}", prefix.trim_matches('/'))
}

/// Give bodiless 404 and 405 responses (missing blob files, unmatched
/// methods) the same JSON error body as every other failure
async fn json_error_bodies(response: Response) -> Response {
    let (error, code) = match response.status() {
        StatusCode::NOT_FOUND => ("Not found", "NOT_FOUND"),
        StatusCode::METHOD_NOT_ALLOWED => ("Method not allowed", "METHOD_NOT_ALLOWED"),
        _ => return response,
    };

    if response.headers().contains_key(header::CONTENT_TYPE) {
        return response;
    }

    let allow = response.headers().get(header::ALLOW).cloned();
    let mut rewritten = (
        response.status(),
        Json(ErrorResponse {
            error: error.to_string(),
            code: code.to_string(),
        }),
    )
        .into_response();

    if let Some(allow) = allow {
        rewritten.headers_mut().insert(header::ALLOW, allow);
    }
    rewritten
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: "Endpoint not found".to_string(),
            code: "NOT_FOUND".to_string(),
        }),
    )
}

/// List albums with their images, newest first
async fn list_albums(State(reader): State<Arc<dyn ContentReader>>) -> ApiResult<Vec<AlbumView>> {
    Ok(Json(reader.albums().await?))
}

/// List slides in display order
async fn list_slides(State(reader): State<Arc<dyn ContentReader>>) -> ApiResult<Vec<SlideView>> {
    Ok(Json(reader.slides().await?))
}

async fn status(State(reader): State<Arc<dyn ContentReader>>) -> ApiResult<StatusResponse> {
    Ok(Json(StatusResponse {
        status: "running",
        backend: reader.backend_name(),
        statistics: reader.statistics().await?,
    }))
}

#[instrument(skip(state, payload))]
async fn create_album(
    State(state): State<CatalogState>,
    payload: Result<Json<CreateAlbumRequest>, JsonRejection>,
) -> ApiResult<AlbumCreatedResponse> {
    let Json(request) = payload?;

    let album_id = state
        .catalog
        .create_album(&request.name, &request.description)
        .await?;

    Ok(Json(AlbumCreatedResponse {
        success: true,
        message: "Album created successfully".to_string(),
        album_id,
    }))
}

#[instrument(skip(state, payload))]
async fn add_images(
    State(state): State<CatalogState>,
    Path(album_id): Path<String>,
    payload: Result<Json<AddImagesRequest>, JsonRejection>,
) -> ApiResult<ImagesAddedResponse> {
    let Json(request) = payload?;

    let images: Vec<NewImage> = request
        .images
        .into_iter()
        .map(|image| NewImage {
            src: image.src,
            name: image.name,
        })
        .collect();

    let report = state.catalog.add_images(&album_id, &images).await?;

    Ok(Json(ImagesAddedResponse {
        success: true,
        message: format!("{} images added successfully", report.attempted),
        stored: report.stored,
        failed: report.failed,
    }))
}

#[instrument(skip(state))]
async fn delete_album(
    State(state): State<CatalogState>,
    Path(album_id): Path<String>,
) -> ApiResult<MessageResponse> {
    state.catalog.delete_album(&album_id).await?;
    Ok(acknowledge("Album deleted successfully"))
}

#[instrument(skip(state, payload))]
async fn create_slide(
    State(state): State<CatalogState>,
    payload: Result<Json<CreateSlideRequest>, JsonRejection>,
) -> ApiResult<SlideCreatedResponse> {
    let Json(request) = payload?;

    let slide_id = state
        .catalog
        .create_slide(&SlideUpload {
            title: request.title,
            description: request.description,
            image: request.image,
            button_text: request.button_text,
            button_link: request.button_link,
            original_name: request.original_name,
            order_index: request.order_index,
        })
        .await?;

    Ok(Json(SlideCreatedResponse {
        success: true,
        message: "Slideshow slide created successfully".to_string(),
        slide_id,
    }))
}

#[instrument(skip(state))]
async fn delete_slide(
    State(state): State<CatalogState>,
    Path(slide_id): Path<String>,
) -> ApiResult<MessageResponse> {
    state.catalog.delete_slide(&slide_id).await?;
    Ok(acknowledge("Slide deleted successfully"))
}

#[instrument(skip(state, payload))]
async fn migrate_snapshot(
    State(state): State<CatalogState>,
    payload: Result<Json<ContentSnapshot>, JsonRejection>,
) -> ApiResult<MigrationResponse> {
    let Json(snapshot) = payload?;

    let report = state.reconciler.reconcile(&snapshot).await?;

    Ok(Json(MigrationResponse {
        success: true,
        message: format!(
            "Successfully migrated {} items to backend database",
            report.migrated
        ),
        migrated_count: report.migrated,
        skipped_count: report.skipped,
        failed_count: report.failed,
    }))
}

#[instrument(skip(state, payload))]
async fn update_content(
    State(state): State<DocumentState>,
    payload: Result<Json<UpdateContentRequest>, JsonRejection>,
) -> ApiResult<MessageResponse> {
    let Json(request) = payload?;

    state
        .document
        .set_key(&request.key, request.data)
        .await
        .map_err(ContentError::from)?;

    Ok(acknowledge("Content updated successfully"))
}

/// Start the content API server, stopping when `shutdown` resolves
pub async fn start_api_server(
    router: Router,
    config: &ApiConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting content API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")?;

    Ok(())
}
