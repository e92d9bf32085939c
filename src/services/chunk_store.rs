//! src/services/chunk_store.rs
//!
//! ChunkStore — a GridFS-style file bucket on top of SQLite. Every stored file
//! is one row in `files` plus `ceil(length / chunk_size)` rows in `chunks`.
//! Writes go through a transaction so a file only becomes visible once its
//! upload stream finishes; reads pull one chunk per query so a dropped reader
//! never pins a connection.

use crate::models::stored_file::StoredFile;
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use futures::{StreamExt, stream::BoxStream};
use md5::Context;
use sqlx::{SqlitePool, Transaction, migrate::Migrator, sqlite::Sqlite};
use std::{io, sync::Arc};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Schema for the `files` and `chunks` tables, embedded at build time.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Bucket name used when none is configured.
pub const DEFAULT_BUCKET: &str = "uploads";

/// 255 KiB, the usual GridFS chunk size.
pub const DEFAULT_CHUNK_SIZE: usize = 261_120;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("file `{0}` not found")]
    FileNotFound(String),
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    #[error("chunk {n} of file {file_id} is missing")]
    ChunkMissing { file_id: Uuid, n: i64 },
    #[error("chunk {n} of file {file_id} has {actual} bytes, expected {expected}")]
    ChunkSizeMismatch {
        file_id: Uuid,
        n: i64,
        expected: i64,
        actual: i64,
    },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Byte stream of a stored file, chunk by chunk, in order.
pub type DownloadStream = BoxStream<'static, io::Result<Bytes>>;

/// A named bucket of chunked files.
#[derive(Clone)]
pub struct ChunkStore {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,

    bucket: String,
    chunk_size: usize,
}

impl ChunkStore {
    /// Apply the schema and return a store for `bucket`.
    ///
    /// This is the one-time initialization step; callers flip readiness only
    /// after it succeeds.
    pub async fn initialize(
        db: Arc<SqlitePool>,
        bucket: impl Into<String>,
        chunk_size: usize,
    ) -> StoreResult<Self> {
        if chunk_size == 0 {
            return Err(StoreError::InvalidChunkSize);
        }
        MIGRATOR.run(&*db).await?;

        Ok(Self {
            db,
            bucket: bucket.into(),
            chunk_size,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Cheap connectivity probe used by readiness checks.
    pub async fn ping(&self) -> StoreResult<()> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;
        Ok(())
    }

    /// Begin writing a new file called `filename`.
    ///
    /// Nothing is visible to `find` until [`UploadStream::finish`] returns.
    pub async fn open_upload_stream(
        &self,
        filename: &str,
        content_type: Option<String>,
    ) -> StoreResult<UploadStream> {
        let tx = self.db.begin().await?;
        let id = Uuid::new_v4();
        debug!(%id, filename, bucket = %self.bucket, "opened upload stream");

        Ok(UploadStream {
            tx,
            id,
            bucket: self.bucket.clone(),
            filename: filename.to_string(),
            content_type,
            chunk_size: self.chunk_size,
            buffer: BytesMut::with_capacity(self.chunk_size),
            next_chunk: 0,
            length: 0,
            digest: Context::new(),
        })
    }

    /// All files in this bucket whose name equals `filename` exactly, oldest
    /// first (insertion order).
    pub async fn find(&self, filename: &str) -> StoreResult<Vec<StoredFile>> {
        let files = sqlx::query_as::<_, StoredFile>(
            "SELECT id, filename, content_type, length, chunk_size, md5, upload_date
             FROM files
             WHERE bucket = ? AND filename = ?
             ORDER BY seq ASC",
        )
        .bind(&self.bucket)
        .bind(filename)
        .fetch_all(&*self.db)
        .await?;

        Ok(files)
    }

    /// Stream the chunks of `file` in order.
    ///
    /// Chunks are fetched lazily. A missing or wrongly sized chunk ends the
    /// stream with an error.
    pub fn open_download_stream(&self, file: &StoredFile) -> DownloadStream {
        let db = self.db.clone();
        let file = Arc::new(file.clone());
        let total = file.chunk_count();

        futures::stream::try_unfold(0i64, move |n| {
            let db = db.clone();
            let file = file.clone();
            async move {
                if n >= total {
                    return Ok(None);
                }
                let chunk = read_chunk(&db, &file, n).await.map_err(io::Error::other)?;
                Ok(Some((chunk, n + 1)))
            }
        })
        .boxed()
    }

    /// Resolve `filename` to its first stored revision and stream it.
    pub async fn open_download_stream_by_name(
        &self,
        filename: &str,
    ) -> StoreResult<(StoredFile, DownloadStream)> {
        let file = self
            .find(filename)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::FileNotFound(filename.to_string()))?;
        let stream = self.open_download_stream(&file);

        Ok((file, stream))
    }
}

async fn read_chunk(db: &SqlitePool, file: &StoredFile, n: i64) -> StoreResult<Bytes> {
    let data: Option<Vec<u8>> =
        sqlx::query_scalar("SELECT data FROM chunks WHERE files_id = ? AND n = ?")
            .bind(file.id)
            .bind(n)
            .fetch_optional(db)
            .await?;

    let data = data.ok_or(StoreError::ChunkMissing {
        file_id: file.id,
        n,
    })?;

    let expected = file.chunk_len(n);
    if data.len() as i64 != expected {
        return Err(StoreError::ChunkSizeMismatch {
            file_id: file.id,
            n,
            expected,
            actual: data.len() as i64,
        });
    }

    Ok(Bytes::from(data))
}

/// Write side of a file being stored.
///
/// Bytes are cut into `chunk_size` blocks and inserted as they fill. The
/// whole upload runs in one transaction: dropping the stream, or any error
/// before `finish`, rolls every chunk back.
pub struct UploadStream {
    tx: Transaction<'static, Sqlite>,
    id: Uuid,
    bucket: String,
    filename: String,
    content_type: Option<String>,
    chunk_size: usize,
    buffer: BytesMut,
    next_chunk: i64,
    length: i64,
    digest: Context,
}

impl UploadStream {
    /// Append `data`, flushing every full chunk to the database.
    pub async fn write(&mut self, mut data: &[u8]) -> StoreResult<()> {
        self.length += data.len() as i64;
        self.digest.consume(data);

        while !data.is_empty() {
            let room = self.chunk_size - self.buffer.len();
            let take = room.min(data.len());
            self.buffer.extend_from_slice(&data[..take]);
            data = &data[take..];

            if self.buffer.len() == self.chunk_size {
                self.flush_chunk().await?;
            }
        }
        Ok(())
    }

    async fn flush_chunk(&mut self) -> StoreResult<()> {
        let chunk = self.buffer.split().freeze();
        sqlx::query("INSERT INTO chunks (files_id, n, data) VALUES (?, ?, ?)")
            .bind(self.id)
            .bind(self.next_chunk)
            .bind(&chunk[..])
            .execute(&mut *self.tx)
            .await?;

        debug!(id = %self.id, n = self.next_chunk, size = chunk.len(), "wrote chunk");
        self.next_chunk += 1;
        Ok(())
    }

    /// Flush the tail chunk, record the file and commit.
    pub async fn finish(mut self) -> StoreResult<StoredFile> {
        if !self.buffer.is_empty() {
            self.flush_chunk().await?;
        }

        let Self {
            mut tx,
            id,
            bucket,
            filename,
            content_type,
            chunk_size,
            length,
            digest,
            ..
        } = self;
        let md5 = format!("{:x}", digest.compute());

        let file = sqlx::query_as::<_, StoredFile>(
            r#"
            INSERT INTO files (
                id, bucket, filename, content_type, length, chunk_size, md5, upload_date
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id, filename, content_type, length, chunk_size, md5, upload_date
            "#,
        )
        .bind(id)
        .bind(&bucket)
        .bind(&filename)
        .bind(content_type)
        .bind(length)
        .bind(chunk_size as i64)
        .bind(md5)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(%id, filename = %file.filename, length, "upload stream finished");
        Ok(file)
    }

    /// Discard everything written so far.
    pub async fn abort(self) -> StoreResult<()> {
        self.tx.rollback().await?;
        debug!(id = %self.id, "upload stream aborted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::memory_pool;
    use futures::TryStreamExt;

    async fn read_to_bytes(store: &ChunkStore, file: &StoredFile) -> io::Result<Bytes> {
        let mut out = BytesMut::new();
        let mut stream = store.open_download_stream(file);
        while let Some(chunk) = stream.try_next().await? {
            out.extend_from_slice(&chunk);
        }
        Ok(out.freeze())
    }

    async fn store(chunk_size: usize) -> ChunkStore {
        ChunkStore::initialize(memory_pool().await, DEFAULT_BUCKET, chunk_size)
            .await
            .unwrap()
    }

    async fn put(store: &ChunkStore, name: &str, data: &[u8]) -> StoredFile {
        let mut upload = store
            .open_upload_stream(name, Some("image/png".into()))
            .await
            .unwrap();
        upload.write(data).await.unwrap();
        upload.finish().await.unwrap()
    }

    #[tokio::test]
    async fn splits_payload_into_chunks_and_reads_it_back() {
        let store = store(4).await;
        let data = b"0123456789";
        let file = put(&store, "a.png", data).await;

        assert_eq!(file.length, 10);
        assert_eq!(file.chunk_size, 4);
        assert_eq!(file.content_type.as_deref(), Some("image/png"));
        assert_eq!(file.md5.as_deref(), Some(format!("{:x}", md5::compute(data)).as_str()));

        let chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE files_id = ?")
            .bind(file.id)
            .fetch_one(&*store.db)
            .await
            .unwrap();
        assert_eq!(chunks, 3);

        let bytes = read_to_bytes(&store, &file).await.unwrap();
        assert_eq!(&bytes[..], data);
    }

    #[tokio::test]
    async fn many_small_writes_preserve_byte_order() {
        let store = store(3).await;
        let mut upload = store.open_upload_stream("parts.bin", None).await.unwrap();
        for piece in [&b"ab"[..], b"cde", b"", b"fghij", b"k"] {
            upload.write(piece).await.unwrap();
        }
        let file = upload.finish().await.unwrap();

        let bytes = read_to_bytes(&store, &file).await.unwrap();
        assert_eq!(&bytes[..], b"abcdefghijk");
        assert_eq!(file.content_type, None);
    }

    #[tokio::test]
    async fn empty_file_has_no_chunks() {
        let store = store(4).await;
        let file = put(&store, "empty.png", b"").await;

        assert_eq!(file.length, 0);
        assert!(read_to_bytes(&store, &file).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unfinished_upload_leaves_nothing_behind() {
        let store = store(2).await;

        let mut aborted = store.open_upload_stream("gone.png", None).await.unwrap();
        aborted.write(b"abcdef").await.unwrap();
        aborted.abort().await.unwrap();

        let mut dropped = store.open_upload_stream("gone.png", None).await.unwrap();
        dropped.write(b"abcdef").await.unwrap();
        drop(dropped);

        assert!(store.find("gone.png").await.unwrap().is_empty());
        let chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&*store.db)
            .await
            .unwrap();
        assert_eq!(chunks, 0);
    }

    #[tokio::test]
    async fn find_is_exact_and_ordered_by_insertion() {
        let store = store(16).await;
        let first = put(&store, "dup.png", b"first").await;
        let second = put(&store, "dup.png", b"second").await;
        put(&store, "DUP.png", b"other").await;

        let found = store.find("dup.png").await.unwrap();
        assert_eq!(found, vec![first.clone(), second]);
        assert!(store.find("dup").await.unwrap().is_empty());

        let (file, _) = store.open_download_stream_by_name("dup.png").await.unwrap();
        assert_eq!(file, first);
    }

    #[tokio::test]
    async fn buckets_do_not_see_each_other() {
        let db = memory_pool().await;
        let uploads = ChunkStore::initialize(db.clone(), "uploads", 8).await.unwrap();
        let avatars = ChunkStore::initialize(db, "avatars", 8).await.unwrap();

        put(&uploads, "a.png", b"abc").await;
        assert!(avatars.find("a.png").await.unwrap().is_empty());
        assert_eq!(uploads.find("a.png").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn open_by_name_reports_missing_files() {
        let store = store(4).await;
        let err = store
            .open_download_stream_by_name("nope.png")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, StoreError::FileNotFound(name) if name == "nope.png"));
    }

    #[tokio::test]
    async fn missing_chunk_fails_the_stream() {
        let store = store(4).await;
        let file = put(&store, "broken.png", b"0123456789").await;
        sqlx::query("DELETE FROM chunks WHERE files_id = ? AND n = 1")
            .bind(file.id)
            .execute(&*store.db)
            .await
            .unwrap();

        let mut stream = store.open_download_stream(&file);
        assert_eq!(&stream.try_next().await.unwrap().unwrap()[..], b"0123");
        let err = stream.try_next().await.unwrap_err();
        assert!(err.to_string().contains("chunk 1"));
    }

    #[tokio::test]
    async fn rejects_zero_chunk_size() {
        let err = ChunkStore::initialize(memory_pool().await, DEFAULT_BUCKET, 0)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, StoreError::InvalidChunkSize));
    }
}
