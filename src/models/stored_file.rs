//! Represents a file stored in a chunked bucket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Descriptor of a single file held by the chunk store.
///
/// The payload itself lives in the `chunks` table as `ceil(length / chunk_size)`
/// ordered blocks; this struct only carries the metadata row. Serializes in the
/// same shape a GridFS files document has, so existing clients can keep reading
/// `_id`, `uploadDate` and friends.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    /// Store-assigned identifier.
    #[serde(rename = "_id")]
    pub id: Uuid,

    /// Storage key the file was written under. Not unique across uploads.
    pub filename: String,

    /// MIME type declared by the uploader.
    pub content_type: Option<String>,

    /// Total size in bytes.
    pub length: i64,

    /// Size of every chunk except possibly the last one.
    pub chunk_size: i64,

    /// Hex MD5 of the payload, computed while streaming.
    pub md5: Option<String>,

    /// When the write stream finished.
    pub upload_date: DateTime<Utc>,
}

impl StoredFile {
    /// Number of chunk rows backing this file.
    pub fn chunk_count(&self) -> i64 {
        if self.length <= 0 || self.chunk_size <= 0 {
            return 0;
        }
        (self.length + self.chunk_size - 1) / self.chunk_size
    }

    /// Expected byte length of chunk `n`.
    pub fn chunk_len(&self, n: i64) -> i64 {
        let last = self.chunk_count() - 1;
        if n < last {
            self.chunk_size
        } else {
            self.length - last * self.chunk_size
        }
    }
}
