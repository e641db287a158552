//! Metadata kept for every blob written by the local blob store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One stored blob, mirrored in the `blobs` table.
///
/// The payload itself lives on disk; this row only describes it.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct BlobRecord {
    /// Public identifier, `{folder}/{unique name}`.
    pub id: String,

    /// Namespace the blob was uploaded into.
    pub folder: String,

    /// Relative storage key, the public id plus the original extension.
    pub key: String,

    /// Filename supplied by the uploader.
    pub original_name: String,

    /// Content type (MIME type).
    pub content_type: String,

    /// Size in bytes.
    pub size_bytes: i64,

    /// MD5 hex digest of the payload.
    pub etag: String,

    /// `image` for images, `raw` for everything else.
    pub resource_type: String,

    pub created_at: DateTime<Utc>,
}
