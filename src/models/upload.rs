//! Transient upload input and the JSON returned once it is stored.

use super::stored_file::StoredFile;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// MIME type assumed when a multipart part declares none.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// A single file pulled out of a multipart body, fully buffered.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub original_name: String,
    pub mime_type: String,
    pub buffer: Bytes,
}

impl UploadRequest {
    /// Storage key for this upload at `timestamp_millis`.
    pub fn storage_key(&self, timestamp_millis: i64) -> String {
        storage_key(timestamp_millis, &self.original_name)
    }
}

/// Body of a successful `POST /api/images/upload`.
#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub file: StoredFile,
    pub image_url: String,
    pub filename: String,
}

impl UploadResponse {
    pub fn new(file: StoredFile) -> Self {
        let filename = file.filename.clone();
        Self {
            file,
            image_url: image_url(&filename),
            filename,
        }
    }
}

/// `image-<millis>-<original name>`. Two same-named uploads within one
/// millisecond get the same key; the store keeps both rows.
pub fn storage_key(timestamp_millis: i64, original_name: &str) -> String {
    format!("image-{}-{}", timestamp_millis, original_name)
}

/// Retrieval path for a stored key.
pub fn image_url(key: &str) -> String {
    format!("/api/images/{}", key)
}
