//! HTTP handlers for image upload and download.
//! Uploads are buffered from the multipart body and then written into the
//! chunk store; downloads stream chunks straight into the response body.

use crate::{
    errors::AppError,
    models::{
        stored_file::StoredFile,
        upload::{DEFAULT_MIME_TYPE, UploadRequest, UploadResponse},
    },
    services::chunk_store::{ChunkStore, StoreError, StoreResult},
    state::AppState,
};
use axum::{
    Json,
    body::Body,
    extract::{
        Multipart, Path, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::{HeaderValue, header},
    response::Response,
};
use chrono::Utc;
use futures::TryStreamExt;
use tracing::{debug, error, info};

/// Multipart field the file must arrive in.
const FILE_FIELD: &str = "file";

/// `POST /api/images/upload` — store one file and describe where it went.
pub async fn upload_image(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, AppError> {
    // A body that is not multipart at all simply carries no file.
    let upload = match multipart {
        Ok(multipart) => read_file_field(multipart).await?,
        Err(rejection) => {
            debug!("upload without multipart body: {}", rejection);
            None
        }
    }
    .ok_or_else(|| AppError::bad_request("No file uploaded"))?;

    let store = state
        .store
        .get()
        .ok_or_else(|| AppError::service_unavailable("Database connection not ready"))?;

    let key = upload.storage_key(Utc::now().timestamp_millis());
    info!(
        filename = %key,
        size = upload.buffer.len(),
        content_type = %upload.mime_type,
        "storing upload"
    );

    let file = write_upload(store, &key, &upload).await.map_err(|err| {
        error!(filename = %key, error = %err, "chunk store upload error");
        AppError::internal("Error uploading image").with_details(err.to_string())
    })?;

    Ok(Json(UploadResponse::new(file)))
}

/// `GET /api/images/{filename}` — stream the stored bytes back.
pub async fn get_image(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, AppError> {
    let store = state
        .store
        .get()
        .ok_or_else(|| AppError::service_unavailable("Database not initialized").as_err_field())?;

    let (file, stream) = store
        .open_download_stream_by_name(&filename)
        .await
        .map_err(|err| match err {
            StoreError::FileNotFound(_) => AppError::not_found("No file exists").as_err_field(),
            other => {
                error!(%filename, error = %other, "chunk store lookup error");
                AppError::internal(other.to_string()).as_err_field()
            }
        })?;

    debug!(%filename, id = %file.id, length = file.length, "streaming file");

    // Once headers are out a failure can only cut the body short, which
    // closes the connection.
    let id = file.id;
    let stream = stream.inspect_err(move |err| {
        error!(%id, error = %err, "download stream failed");
    });

    let mut response = Response::new(Body::from_stream(stream));
    if state.download_content_type {
        set_content_type(&mut response, &file);
    }

    Ok(response)
}

/// Pull the single `file` part out of the body, buffering its bytes.
///
/// Parts under other names and `file` parts without a filename are ignored,
/// mirroring how form-data parsers treat non-file fields.
async fn read_file_field(mut multipart: Multipart) -> Result<Option<UploadRequest>, AppError> {
    let mut upload = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let Some(original_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        if upload.is_some() {
            return Err(AppError::bad_request("Unexpected field"));
        }

        let mime_type = field
            .content_type()
            .unwrap_or(DEFAULT_MIME_TYPE)
            .to_string();
        let buffer = field.bytes().await.map_err(multipart_error)?;

        upload = Some(UploadRequest {
            original_name,
            mime_type,
            buffer,
        });
    }

    Ok(upload)
}

async fn write_upload(
    store: &ChunkStore,
    key: &str,
    upload: &UploadRequest,
) -> StoreResult<StoredFile> {
    let mut stream = store
        .open_upload_stream(key, Some(upload.mime_type.clone()))
        .await?;

    if let Err(err) = stream.write(&upload.buffer).await {
        let _ = stream.abort().await; // best-effort, the transaction rolls back on drop anyway
        return Err(err);
    }

    stream.finish().await
}

fn multipart_error(err: MultipartError) -> AppError {
    AppError::bad_request(err.body_text())
}

fn set_content_type(response: &mut Response, file: &StoredFile) {
    if let Some(value) = file
        .content_type
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
    {
        response.headers_mut().insert(header::CONTENT_TYPE, value);
    }
}
