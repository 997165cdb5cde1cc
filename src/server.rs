#![allow(missing_docs)]
//! HTTP query surface for the slideshow frontend.
//!
//! Every endpoint reflects whatever the cache currently holds. A degraded
//! cache is served as fewer (or no) posts, never as an error response.

use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::CONTENT_TYPE, Method, StatusCode},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::warn;

use crate::cache::{is_reserved_name, CacheStore};
use crate::config::Settings;
use crate::types::CacheEntry;

/// URL prefix under which cached image files are served
pub const CACHE_ROUTE: &str = "/cache";

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>Polaroid Wall</title>
  <style>
    body { margin: 0; background: #222; display: flex; flex-wrap: wrap; justify-content: center; }
    figure { background: #fff; padding: 12px 12px 36px; margin: 24px; box-shadow: 0 4px 12px #000; }
    figure img { display: block; max-width: 360px; max-height: 360px; }
    figcaption { font-family: sans-serif; margin-top: 8px; }
  </style>
</head>
<body id="wall"
      data-images-fetching-interval="{{images_fetching_interval}}"
      data-polaroid-batch-presentation-duration="{{polaroid_batch_presentation_duration}}">
<script>
  const wall = document.getElementById("wall");
  const fetchInterval = Number(wall.dataset.imagesFetchingInterval);
  const batchDuration = Number(wall.dataset.polaroidBatchPresentationDuration);
  let posts = [];
  let cursor = 0;

  async function refresh() {
    const response = await fetch("/api/posts");
    posts = await response.json();
  }

  function showBatch() {
    wall.querySelectorAll("figure").forEach((figure) => figure.remove());
    for (let i = 0; i < Math.min(3, posts.length); i++) {
      const post = posts[(cursor + i) % posts.length];
      const figure = document.createElement("figure");
      const img = document.createElement("img");
      img.src = post.images[0];
      const caption = document.createElement("figcaption");
      caption.textContent = "@" + post.username + " " + post.message;
      figure.append(img, caption);
      wall.append(figure);
    }
    cursor = posts.length ? (cursor + 3) % posts.length : 0;
  }

  refresh().then(showBatch);
  setInterval(refresh, fetchInterval);
  setInterval(showBatch, batchDuration);
</script>
</body>
</html>
"#;

/// Shared state of the HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<CacheStore>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(cache: Arc<CacheStore>, settings: Arc<Settings>) -> Self {
        Self { cache, settings }
    }

    async fn entries(&self) -> Vec<CacheEntry> {
        match self.cache.list().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Serving empty post list, cache unreadable: {}", e);
                Vec::new()
            }
        }
    }
}

/// A cached post as presented to the frontend
#[derive(Debug, Serialize)]
pub struct PostView {
    pub post_id: String,
    pub username: String,
    pub message: String,
    /// RFC 3339 creation time
    pub create_at: String,
    /// URLs of the image files
    pub images: Vec<String>,
}

impl PostView {
    fn from_entry(entry: CacheEntry) -> Self {
        let images = entry
            .images
            .iter()
            .map(|file| image_url(&entry.post_id, file))
            .collect();

        Self {
            create_at: chrono::DateTime::from_timestamp_millis(entry.metadata.create_at)
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
            post_id: entry.post_id,
            username: entry.metadata.username,
            message: entry.metadata.message,
            images,
        }
    }
}

/// Frontend display timing in milliseconds
#[derive(Debug, Serialize)]
pub struct FrontendTiming {
    pub images_fetching_interval: u64,
    pub polaroid_batch_presentation_duration: u64,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    timestamp: String,
}

/// Public URL of a cached image file
pub fn image_url(post_id: &str, file: &str) -> String {
    format!(
        "{}/{}/{}",
        CACHE_ROUTE,
        urlencoding::encode(post_id),
        urlencoding::encode(file)
    )
}

/// GET /api/posts - cached posts, oldest first
async fn posts(State(state): State<AppState>) -> Json<Vec<PostView>> {
    let mut entries = state.entries().await;
    entries.sort_by_key(|entry| entry.metadata.create_at);
    Json(entries.into_iter().map(PostView::from_entry).collect())
}

/// GET /api/images - flat list of image URLs
async fn images(State(state): State<AppState>) -> Json<Vec<String>> {
    let mut entries = state.entries().await;
    entries.sort_by_key(|entry| entry.metadata.create_at);
    Json(
        entries
            .iter()
            .flat_map(|entry| {
                entry
                    .images
                    .iter()
                    .map(|file| image_url(&entry.post_id, file))
            })
            .collect(),
    )
}

/// GET /api/settings - frontend timing
async fn frontend_settings(State(state): State<AppState>) -> Json<FrontendTiming> {
    Json(FrontendTiming {
        images_fetching_interval: state.settings.images_fetching_interval_ms(),
        polaroid_batch_presentation_duration: state
            .settings
            .polaroid_batch_presentation_duration_ms(),
    })
}

/// GET / - slideshow page
async fn index(State(state): State<AppState>) -> Html<String> {
    Html(
        INDEX_HTML
            .replace(
                "{{images_fetching_interval}}",
                &state.settings.images_fetching_interval_ms().to_string(),
            )
            .replace(
                "{{polaroid_batch_presentation_duration}}",
                &state
                    .settings
                    .polaroid_batch_presentation_duration_ms()
                    .to_string(),
            ),
    )
}

/// GET /health - health check
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// Only image files are public; metadata, the completion marker and
/// in-flight temporary files answer 404.
async fn hide_cache_internals(request: Request, next: Next) -> Response {
    let file = request.uri().path().rsplit('/').next().unwrap_or_default();
    let hidden = match urlencoding::decode(file) {
        Ok(name) => is_reserved_name(&name),
        Err(_) => true,
    };

    if hidden {
        return StatusCode::NOT_FOUND.into_response();
    }
    next.run(request).await
}

/// Build the router; image files are served from `cache_dir`.
pub fn build_router(state: AppState, cache_dir: impl AsRef<Path>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE]);

    let files = Router::new()
        .nest_service(CACHE_ROUTE, ServeDir::new(cache_dir.as_ref()))
        .layer(middleware::from_fn(hide_cache_internals));

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/posts", get(posts))
        .route("/api/images", get(images))
        .route("/api/settings", get(frontend_settings))
        .merge(files)
        .layer(cors)
        .with_state(state)
}
