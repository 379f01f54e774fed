//! Uploaded-artifact storage and the `/v1/files` surface.
//!
//! Artifacts live in an object store behind the [`store::ObjectStore`]
//! seam; metadata rides as JSON side objects. The chat gateway consumes
//! [`FileStore::chat_context`] to inject processed file content into
//! requests.

mod artifact;
mod context;
mod error;
mod extract;
mod service;
pub mod store;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Multipart, Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};

pub use artifact::{ArtifactRecord, ArtifactStatus, ID_PREFIX};
pub use error::{FilesError, FilesResult};
pub use service::FileStore;

/// Builds the file store for the configured backend.
pub async fn build_store(config: &config::FilesConfig, fallback_region: Option<&str>) -> Arc<FileStore> {
    let backend = Arc::new(store::S3Store::new(config, fallback_region).await);
    Arc::new(FileStore::new(backend, config))
}

/// Axum router for the files endpoints.
pub fn router(store: Arc<FileStore>) -> Router {
    Router::new()
        .route("/v1/files", post(upload_file).get(list_files))
        .route("/v1/files/health", get(files_health))
        .route("/v1/files/{id}", get(file_metadata).delete(delete_file))
        .route("/v1/files/{id}/content", get(file_content))
        .with_state(store)
}

/// Wire shape of one file object, OpenAI-compatible.
#[derive(Debug, Serialize)]
struct FileObject {
    id: String,
    object: &'static str,
    bytes: u64,
    created_at: u64,
    filename: String,
    purpose: String,
    status: ArtifactStatus,
}

impl From<ArtifactRecord> for FileObject {
    fn from(record: ArtifactRecord) -> Self {
        Self {
            id: record.id,
            object: "file",
            bytes: record.size_bytes,
            created_at: record.created,
            filename: record.original_filename,
            purpose: record.purpose,
            status: record.status,
        }
    }
}

async fn upload_file(State(store): State<Arc<FileStore>>, mut multipart: Multipart) -> FilesResult<Response> {
    let mut file: Option<(String, String, bytes::Bytes)> = None;
    let mut purpose: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| FilesError::Validation(format!("Malformed multipart body: {e}")))?
    {
        let field_name = field.name().map(str::to_string);

        match field_name.as_deref() {
            Some("file") => {
                let filename = field.file_name().unwrap_or("unnamed").to_string();
                let media_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let body = field
                    .bytes()
                    .await
                    .map_err(|e| FilesError::Validation(format!("Failed to read file field: {e}")))?;

                file = Some((filename, media_type, body));
            }
            Some("purpose") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| FilesError::Validation(format!("Failed to read purpose field: {e}")))?;
                purpose = Some(value);
            }
            _ => {}
        }
    }

    let Some((filename, media_type, body)) = file else {
        return Err(FilesError::Validation("Missing 'file' field".to_string()));
    };

    let purpose = purpose.unwrap_or_else(|| "assistants".to_string());

    let record = store.upload(&filename, &media_type, &purpose, body).await?;

    log::debug!("Uploaded {} as {}", record.original_filename, record.id);

    Ok((StatusCode::OK, Json(FileObject::from(record))).into_response())
}

#[derive(Debug, Deserialize)]
struct ListParams {
    purpose: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct FileListResponse {
    object: &'static str,
    data: Vec<FileObject>,
}

async fn list_files(
    State(store): State<Arc<FileStore>>,
    Query(params): Query<ListParams>,
) -> FilesResult<Json<FileListResponse>> {
    let limit = params.limit.unwrap_or(20);

    if !(1..=100).contains(&limit) {
        return Err(FilesError::Validation(format!(
            "limit must be between 1 and 100, got {limit}"
        )));
    }

    let records = store.list(params.purpose.as_deref(), limit).await?;

    Ok(Json(FileListResponse {
        object: "list",
        data: records.into_iter().map(FileObject::from).collect(),
    }))
}

async fn file_metadata(
    State(store): State<Arc<FileStore>>,
    Path(id): Path<String>,
) -> FilesResult<Json<FileObject>> {
    let record = store.metadata(&id).await?;
    Ok(Json(FileObject::from(record)))
}

async fn file_content(State(store): State<Arc<FileStore>>, Path(id): Path<String>) -> FilesResult<Response> {
    let (record, body) = store.content(&id).await?;

    Ok((
        [
            (header::CONTENT_TYPE, record.media_type),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", record.original_filename),
            ),
        ],
        body,
    )
        .into_response())
}

#[derive(Debug, Serialize)]
struct DeleteResponse {
    id: String,
    object: &'static str,
    deleted: bool,
}

async fn delete_file(State(store): State<Arc<FileStore>>, Path(id): Path<String>) -> FilesResult<Json<DeleteResponse>> {
    store.delete(&id).await?;

    Ok(Json(DeleteResponse {
        id,
        object: "file",
        deleted: true,
    }))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    backend: &'static str,
}

async fn files_health(State(store): State<Arc<FileStore>>) -> Response {
    match store.probe().await {
        Ok(()) => Json(HealthResponse {
            status: "healthy",
            backend: "object-store",
        })
        .into_response(),
        Err(e) => {
            log::warn!("Files storage probe failed: {e}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unhealthy",
                    backend: "object-store",
                }),
            )
                .into_response()
        }
    }
}
