//! Shared state handed to every handler.

use crate::services::store_handle::StoreHandle;

#[derive(Clone)]
pub struct AppState {
    /// Chunk store, available once initialization completes.
    pub store: StoreHandle,

    /// Whether downloads carry the stored MIME type as `Content-Type`.
    pub download_content_type: bool,
}

impl AppState {
    pub fn new(store: StoreHandle) -> Self {
        Self {
            store,
            download_content_type: false,
        }
    }

    pub fn with_download_content_type(mut self, enabled: bool) -> Self {
        self.download_content_type = enabled;
        self
    }
}
