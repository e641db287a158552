//! `/api/upload` handlers: run the upload pipeline, list and delete stored files.

use crate::{
    auth::Identity,
    errors::AppError,
    models::upload::{FilePayload, UploadResult},
    services::blob_store::StoredBlob,
    state::AppState,
};
use axum::{
    Extension, Json,
    extract::{Multipart, Path, State, multipart::MultipartError},
};
use serde::Serialize;

/// Multipart field carrying the file.
const FILE_FIELD: &str = "file";
const LIST_LIMIT: u32 = 100;

#[derive(Debug, Serialize)]
pub struct FilesResponse {
    pub files: Vec<StoredBlob>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub message: &'static str,
    pub blob_id: String,
}

fn multipart_error(err: MultipartError) -> AppError {
    AppError::new(err.status(), err.body_text())
}

/// POST `/api/upload`: multipart upload of one `file` field.
pub async fn upload_file(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    mut multipart: Multipart,
) -> Result<Json<UploadResult>, AppError> {
    let mut payload = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let original_name = field.file_name().unwrap_or("upload").to_string();
        let mime_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;

        payload = Some(FilePayload {
            bytes,
            original_name,
            mime_type,
        });
        break;
    }

    let result = state.uploads.upload(&identity, payload).await?;
    Ok(Json(result))
}

/// GET `/api/upload/files`: newest stored files first.
pub async fn list_files(State(state): State<AppState>) -> Result<Json<FilesResponse>, AppError> {
    let folder = &state.uploads.settings().folder;
    let files = state.uploads.store().list(folder, LIST_LIMIT).await?;
    Ok(Json(FilesResponse { files }))
}

/// DELETE `/api/upload/{*blob_id}`
pub async fn delete_file(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(blob_id): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    state.uploads.store().delete(&blob_id).await?;
    tracing::info!(user = %identity.user_id, %blob_id, "blob deleted");

    Ok(Json(DeleteResponse {
        message: "File deleted successfully",
        blob_id,
    }))
}
