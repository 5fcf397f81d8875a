use axum::body::Body;
use axum::http::Request;
use axum::Router;
use base64::{engine::general_purpose::STANDARD, Engine};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use shrine_content::config::{ApiConfig, BlobConfig, DocumentConfig};
use shrine_content::{
    create_router, AppState, BlobStore, Catalog, CatalogState, DocumentState, DocumentStore,
    MetadataStore, Projector, Reconciler,
};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const PIXEL: &str = "data:image/png;base64,iVBORw0KGgo=";

async fn catalog_app() -> (TempDir, Router) {
    catalog_app_with(ApiConfig::default()).await
}

async fn catalog_app_with(api: ApiConfig) -> (TempDir, Router) {
    let dir = TempDir::new().unwrap();
    let blob_config = BlobConfig {
        upload_dir: dir.path().join("uploads"),
        serve_prefix: "/uploads".to_string(),
    };

    let metadata = Arc::new(MetadataStore::in_memory().await.unwrap());
    metadata.run_migrations().await.unwrap();
    let blobs = Arc::new(BlobStore::new(&blob_config).await.unwrap());

    let state = AppState::Catalog(CatalogState {
        catalog: Arc::new(Catalog::new(
            metadata.clone(),
            blobs.clone(),
            Projector::new(&blob_config.serve_prefix),
        )),
        reconciler: Arc::new(Reconciler::new(metadata, blobs)),
    });

    let router = create_router(state, &api, &blob_config);
    (dir, router)
}

async fn document_app() -> (TempDir, Router) {
    let dir = TempDir::new().unwrap();
    let document = DocumentStore::new(&DocumentConfig {
        path: dir.path().join("content.json"),
        site_name: "Test Shrine".to_string(),
    })
    .await
    .unwrap();

    let state = AppState::Document(DocumentState {
        document: Arc::new(document),
    });

    let router = create_router(state, &ApiConfig::default(), &BlobConfig::default());
    (dir, router)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> (u16, Value) {
    let res = router.clone().oneshot(request).await.unwrap();
    let status = res.status().as_u16();
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn create_album(router: &Router, name: &str) -> String {
    let (status, body) = send(
        router,
        post_json("/api/gallery/albums", json!({"name": name})),
    )
    .await;
    assert_eq!(status, 200);
    body["album_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn status_reports_backend_and_counts() {
    let (_dir, router) = catalog_app().await;

    let (status, body) = send(&router, get("/api/status")).await;

    assert_eq!(status, 200);
    assert_eq!(body["status"], "running");
    assert_eq!(body["backend"], "Axum + SQLite");
    assert_eq!(
        body["statistics"],
        json!({"albums": 0, "images": 0, "slides": 0})
    );
}

#[tokio::test]
async fn album_create_then_list() {
    let (_dir, router) = catalog_app().await;

    let (status, body) = send(
        &router,
        post_json(
            "/api/gallery/albums",
            json!({"name": "Shrine Photos", "description": "Grounds"}),
        ),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["message"], "Album created successfully");
    let album_id = body["album_id"].as_str().unwrap().to_string();

    let (status, albums) = send(&router, get("/api/gallery/albums")).await;

    assert_eq!(status, 200);
    assert_eq!(albums[0]["id"], album_id.as_str());
    assert_eq!(albums[0]["name"], "Shrine Photos");
    assert_eq!(albums[0]["description"], "Grounds");
    assert_eq!(albums[0]["images"], json!([]));
    assert!(albums[0]["createdAt"].as_str().unwrap().ends_with('Z'));
}

#[tokio::test]
async fn album_create_missing_name_is_json_400() {
    let (_dir, router) = catalog_app().await;

    let (status, body) = send(
        &router,
        post_json("/api/gallery/albums", json!({"description": "x"})),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, body) = send(
        &router,
        post_json("/api/gallery/albums", json!({"name": "   "})),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "name is required");

    let (_, stats) = send(&router, get("/api/status")).await;
    assert_eq!(stats["statistics"]["albums"], 0);
}

#[tokio::test]
async fn responses_allow_any_origin() {
    let (_dir, router) = catalog_app().await;

    let res = router
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/gallery/albums")
                .header("origin", "http://localhost:8000")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status().as_u16(), 200);
    assert_eq!(
        res.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );
}

#[tokio::test]
async fn image_batch_keeps_valid_images_and_serves_blobs() {
    let (_dir, router) = catalog_app().await;
    let album_id = create_album(&router, "Feast Day").await;
    let bytes = b"procession photo bytes";
    let src = format!("data:image/jpeg;base64,{}", STANDARD.encode(bytes));

    let (status, body) = send(
        &router,
        post_json(
            &format!("/api/gallery/albums/{}/images", album_id),
            json!({"images": [
                {"src": src, "name": "one.jpg"},
                {"src": "data:image/jpeg;base64,***", "name": "two.jpg"},
                {"src": src, "name": "three.jpg"}
            ]}),
        ),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(body["message"], "3 images added successfully");
    assert_eq!(body["stored"], 2);
    assert_eq!(body["failed"], 1);

    let (_, albums) = send(&router, get("/api/gallery/albums")).await;
    let images = albums[0]["images"].as_array().unwrap();
    assert_eq!(images.len(), 2);
    assert_eq!(images[0]["name"], "three.jpg");

    let url = images[0]["src"].as_str().unwrap();
    assert!(url.starts_with(&format!("/uploads/gallery_{}_", album_id)));
    let res = router.clone().oneshot(get(url)).await.unwrap();
    assert_eq!(res.status().as_u16(), 200);
    let served = res.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&served[..], bytes);
}

#[tokio::test]
async fn images_for_missing_album_is_404() {
    let (_dir, router) = catalog_app().await;

    let (status, body) = send(
        &router,
        post_json(
            "/api/gallery/albums/missing/images",
            json!({"images": [{"src": PIXEL, "name": "x.png"}]}),
        ),
    )
    .await;

    assert_eq!(status, 404);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn album_delete_removes_images() {
    let (_dir, router) = catalog_app().await;
    let album_id = create_album(&router, "Temporary").await;
    send(
        &router,
        post_json(
            &format!("/api/gallery/albums/{}/images", album_id),
            json!({"images": [{"src": PIXEL, "name": "x.png"}]}),
        ),
    )
    .await;

    let (status, body) = send(
        &router,
        delete(&format!("/api/gallery/albums/{}", album_id)),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "Album deleted successfully");

    let (_, stats) = send(&router, get("/api/status")).await;
    assert_eq!(stats["statistics"], json!({"albums": 0, "images": 0, "slides": 0}));

    let (status, _) = send(
        &router,
        delete(&format!("/api/gallery/albums/{}", album_id)),
    )
    .await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn slides_are_ordered_by_index() {
    let (_dir, router) = catalog_app().await;

    for (title, order) in [("Second", 1), ("First", 0)] {
        let (status, body) = send(
            &router,
            post_json(
                "/api/slideshow/slides",
                json!({
                    "title": title,
                    "image": PIXEL,
                    "buttonText": "Learn More",
                    "buttonLink": "about.html",
                    "orderIndex": order
                }),
            ),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(body["message"], "Slideshow slide created successfully");
        assert!(body["slide_id"].is_string());
    }

    let (status, slides) = send(&router, get("/api/slideshow/slides")).await;

    assert_eq!(status, 200);
    assert_eq!(slides[0]["title"], "First");
    assert_eq!(slides[1]["title"], "Second");
    assert_eq!(slides[0]["buttonText"], "Learn More");
    assert!(slides[0]["image"].as_str().unwrap().starts_with("/uploads/slideshow_"));
}

#[tokio::test]
async fn slide_with_bad_image_is_not_created() {
    let (_dir, router) = catalog_app().await;

    let (status, body) = send(
        &router,
        post_json(
            "/api/slideshow/slides",
            json!({"title": "Broken", "image": "data:image/png;base64,%%%"}),
        ),
    )
    .await;

    assert_eq!(status, 400);
    assert_eq!(body["code"], "INVALID_ENCODING");
    let (_, slides) = send(&router, get("/api/slideshow/slides")).await;
    assert_eq!(slides, json!([]));
}

#[tokio::test]
async fn slide_delete_of_unknown_id_succeeds() {
    let (_dir, router) = catalog_app().await;

    let (status, body) = send(&router, delete("/api/slideshow/slides/nope")).await;

    assert_eq!(status, 200);
    assert_eq!(body["success"], json!(true));
}

#[tokio::test]
async fn migration_is_idempotent() {
    let (_dir, router) = catalog_app().await;
    let snapshot = json!({
        "galleryAlbums": [{
            "id": 1725462000000u64,
            "name": "From the browser",
            "createdAt": "2025-09-04T15:00:00.000Z",
            "images": [
                {"id": 1, "src": PIXEL, "name": "a.png", "uploadDate": "2025-09-04T15:00:00.000Z"},
                {"id": 2, "src": "images/hosted.jpg", "name": "b.jpg"}
            ]
        }],
        "homeSlides": [{"id": "slide-1", "title": "Welcome", "image": PIXEL}]
    });

    let (status, first) = send(
        &router,
        post_json("/api/migrate-from-localstorage", snapshot.clone()),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(first["migrated_count"], 2);
    assert_eq!(
        first["message"],
        "Successfully migrated 2 items to backend database"
    );

    let (_, second) = send(
        &router,
        post_json("/api/migrate-from-localstorage", snapshot),
    )
    .await;
    assert_eq!(second["migrated_count"], 0);

    let (_, albums) = send(&router, get("/api/gallery/albums")).await;
    assert_eq!(albums.as_array().unwrap().len(), 1);
    assert_eq!(albums[0]["id"], "1725462000000");
    assert_eq!(albums[0]["images"][0]["id"], "1");
}

#[tokio::test]
async fn unknown_api_path_is_json_404() {
    let (_dir, router) = catalog_app().await;

    let (status, body) = send(&router, get("/api/nothing-here")).await;

    assert_eq!(status, 404);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn unsupported_method_is_json_405() {
    let (_dir, router) = catalog_app().await;

    let request = Request::builder()
        .method("PUT")
        .uri("/api/status")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&router, request).await;

    assert_eq!(status, 405);
    assert_eq!(body["code"], "METHOD_NOT_ALLOWED");
}

#[tokio::test]
async fn oversized_body_is_json_413() {
    let (_dir, router) = catalog_app_with(ApiConfig {
        max_body_bytes: 1024,
        ..ApiConfig::default()
    })
    .await;

    let (status, body) = send(
        &router,
        post_json("/api/gallery/albums", json!({"name": "x".repeat(4096)})),
    )
    .await;
    assert_eq!(status, 413);
    assert_eq!(body["code"], "PAYLOAD_TOO_LARGE");

    let (status, _) = send(
        &router,
        post_json("/api/gallery/albums", json!({"name": "Small"})),
    )
    .await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn missing_upload_is_json_404() {
    let (_dir, router) = catalog_app().await;

    let (status, body) = send(&router, get("/uploads/missing.jpg")).await;

    assert_eq!(status, 404);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn document_mode_updates_sections() {
    let (_dir, router) = document_app().await;

    let (status, body) = send(
        &router,
        post_json(
            "/api/update-content",
            json!({
                "key": "galleryAlbums",
                "data": [{
                    "id": 7,
                    "name": "Pilgrimage",
                    "images": [{"id": 1, "src": PIXEL, "name": "p.png"}]
                }]
            }),
        ),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "Content updated successfully");

    let (_, albums) = send(&router, get("/api/gallery/albums")).await;
    assert_eq!(albums[0]["id"], "7");
    assert_eq!(albums[0]["images"][0]["src"], PIXEL);

    let (_, stats) = send(&router, get("/api/status")).await;
    assert_eq!(stats["backend"], "Axum + JSON document");
    assert_eq!(stats["statistics"], json!({"albums": 1, "images": 1, "slides": 0}));
}

#[tokio::test]
async fn document_mode_rejects_malformed_update() {
    let (_dir, router) = document_app().await;

    let (status, body) = send(
        &router,
        post_json("/api/update-content", json!({"data": []})),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, _) = send(
        &router,
        post_json("/api/update-content", json!({"key": " ", "data": []})),
    )
    .await;
    assert_eq!(status, 400);
}
