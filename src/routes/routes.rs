//! Defines the HTTP surface of the image service.
//!
//! ## Structure
//! - `GET  /`                       — banner
//! - `GET  /healthz`, `GET /readyz` — probes
//! - `POST /api/images/upload`      — multipart upload, field `file`
//! - `GET  /api/images/{filename}`  — stream a stored file by key

use crate::{
    handlers::{
        health_handlers::{banner, healthz, readyz},
        image_handlers::{get_image, upload_image},
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderName, Method, header},
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Build the bare router. Carries `AppState` to all handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(banner))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .nest(
            "/api/images",
            Router::new()
                .route("/upload", post(upload_image))
                .route("/{filename}", get(get_image)),
        )
}

/// Full application: routes, state, upload limit, CORS and request tracing.
pub fn app(state: AppState, max_upload_bytes: usize) -> Router {
    routes()
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors_layer())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

/// Any origin, the usual browser methods and headers.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
            header::ACCEPT,
            header::ORIGIN,
        ])
}
