//! Helpers shared by the in-crate tests.

use crate::{
    routes::routes::app,
    services::{
        chunk_store::{ChunkStore, DEFAULT_BUCKET},
        store_handle::StoreHandle,
    },
    state::AppState,
};
use axum_test::{
    TestServer,
    multipart::{MultipartForm, Part},
};
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::{sync::Arc, time::Duration};

/// A private in-memory database. One connection that never expires, since
/// every new `:memory:` connection would see an empty database.
pub async fn memory_pool() -> Arc<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None::<Duration>)
        .max_lifetime(None::<Duration>)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory SQLite");
    Arc::new(pool)
}

/// App with an initialized store using `chunk_size`.
pub async fn create_test_app(chunk_size: usize) -> (TestServer, ChunkStore) {
    create_test_app_with(chunk_size, false, 1024 * 1024).await
}

pub async fn create_test_app_with(
    chunk_size: usize,
    download_content_type: bool,
    max_upload_bytes: usize,
) -> (TestServer, ChunkStore) {
    let store = ChunkStore::initialize(memory_pool().await, DEFAULT_BUCKET, chunk_size)
        .await
        .expect("Failed to initialize chunk store");
    let state = AppState::new(StoreHandle::ready_with(store.clone()))
        .with_download_content_type(download_content_type);

    let server =
        TestServer::new(app(state, max_upload_bytes)).expect("Failed to create test server");
    (server, store)
}

/// App whose store never became ready.
pub fn create_uninitialized_app() -> TestServer {
    let state = AppState::new(StoreHandle::new());
    TestServer::new(app(state, 1024 * 1024)).expect("Failed to create test server")
}

/// Multipart body with a single `file` part.
pub fn file_form(name: &str, mime: &str, data: Vec<u8>) -> MultipartForm {
    MultipartForm::new().add_part(
        "file",
        Part::bytes(data)
            .file_name(name.to_string())
            .mime_type(mime.to_string()),
    )
}
