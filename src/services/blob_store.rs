//! Blob storage for uploaded files.
//!
//! `BlobStore` is the seam the upload pipeline writes through. The shipped
//! implementation, `LocalBlobStore`, keeps metadata in SQLite and payloads on
//! local disk sharded beneath `base_path/{shard}/{shard}/{key}`, and serves
//! them back under `{public_url}/blobs/{key}`.

use crate::models::blob::BlobRecord;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum BlobStoreError {
    #[error("blob `{0}` not found")]
    NotFound(String),
    #[error("invalid blob key")]
    InvalidKey,
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type BlobStoreResult<T> = Result<T, BlobStoreError>;

/// What the caller hands to the store.
#[derive(Clone, Debug)]
pub struct NewBlob {
    pub bytes: Bytes,
    /// Namespace to file the blob under.
    pub folder: String,
    /// Filename from the client, used to derive a readable unique name.
    pub original_name: String,
    pub content_type: String,
}

/// What the store hands back once the payload is durable.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoredBlob {
    pub blob_id: String,
    pub url: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub resource_type: String,
    pub original_name: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Persist `blob` and return its durable address.
    async fn put(&self, blob: NewBlob) -> BlobStoreResult<StoredBlob>;

    /// Most recent blobs in `folder`, newest first.
    async fn list(&self, folder: &str, limit: u32) -> BlobStoreResult<Vec<StoredBlob>>;

    /// Remove a blob by its public id.
    async fn delete(&self, blob_id: &str) -> BlobStoreResult<()>;
}

const MAX_KEY_LEN: usize = 1024;
const MAX_STEM_LEN: usize = 64;
const MAX_EXTENSION_LEN: usize = 8;

/// Disk + SQLite backed blob store.
#[derive(Clone)]
pub struct LocalBlobStore {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where blob payloads are stored.
    pub base_path: PathBuf,

    /// Externally reachable base URL of this service, without trailing slash.
    pub public_url: String,
}

impl LocalBlobStore {
    pub fn new(
        db: Arc<SqlitePool>,
        base_path: impl Into<PathBuf>,
        public_url: impl Into<String>,
    ) -> Self {
        Self {
            db,
            base_path: base_path.into(),
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Whether `base_path` currently exists as a directory.
    pub async fn is_available(&self) -> bool {
        fs::metadata(&self.base_path)
            .await
            .is_ok_and(|meta| meta.is_dir())
    }

    /// Reject keys that could escape `base_path`.
    fn ensure_key_safe(key: &str) -> BlobStoreResult<()> {
        if key.is_empty() || key.len() > MAX_KEY_LEN {
            return Err(BlobStoreError::InvalidKey);
        }
        if key.starts_with('/') || key.contains("..") {
            return Err(BlobStoreError::InvalidKey);
        }
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(BlobStoreError::InvalidKey);
        }
        Ok(())
    }

    /// Two-level shard directories from MD5(key), e.g. `("3f", "a0")`.
    fn shards(key: &str) -> (String, String) {
        let digest = md5::compute(key);
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::shards(key);
        let mut path = self.base_path.clone();
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    /// Public URL for a storage key.
    pub fn url_for(&self, key: &str) -> String {
        format!("{}/blobs/{}", self.public_url, key)
    }

    fn to_stored(&self, record: BlobRecord) -> StoredBlob {
        StoredBlob {
            url: self.url_for(&record.key),
            blob_id: record.id,
            content_type: record.content_type,
            size_bytes: record.size_bytes.max(0) as u64,
            resource_type: record.resource_type,
            original_name: record.original_name,
            created_at: record.created_at,
        }
    }

    async fn fetch_by_id(&self, blob_id: &str) -> BlobStoreResult<BlobRecord> {
        sqlx::query_as::<_, BlobRecord>(
            "SELECT id, folder, key, original_name, content_type, size_bytes, etag,
                    resource_type, created_at
             FROM blobs WHERE id = ?",
        )
        .bind(blob_id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => BlobStoreError::NotFound(blob_id.to_string()),
            other => BlobStoreError::Sqlx(other),
        })
    }

    async fn fetch_by_key(&self, key: &str) -> BlobStoreResult<BlobRecord> {
        sqlx::query_as::<_, BlobRecord>(
            "SELECT id, folder, key, original_name, content_type, size_bytes, etag,
                    resource_type, created_at
             FROM blobs WHERE key = ?",
        )
        .bind(key)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => BlobStoreError::NotFound(key.to_string()),
            other => BlobStoreError::Sqlx(other),
        })
    }

    /// Open a stored blob for streaming out.
    ///
    /// Returns NotFound when either the metadata row or the payload file is gone.
    pub async fn open(&self, key: &str) -> BlobStoreResult<(BlobRecord, File)> {
        Self::ensure_key_safe(key)?;
        let record = self.fetch_by_key(key).await?;

        let file = File::open(self.blob_path(key)).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                BlobStoreError::NotFound(key.to_string())
            } else {
                BlobStoreError::Io(err)
            }
        })?;

        Ok((record, file))
    }

    /// Write `bytes` next to `final_path` and rename into place once synced.
    async fn write_payload(&self, final_path: &Path, bytes: &[u8]) -> BlobStoreResult<()> {
        let parent = final_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            BlobStoreError::Io(io::Error::other("blob path missing parent directory"))
        })?;
        let (tmp_path, mut file) = create_tmp_file(&parent).await?;

        let written = async {
            file.write_all(bytes).await?;
            file.flush().await?;
            file.sync_all().await
        }
        .await;
        if let Err(err) = written {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(BlobStoreError::Io(err));
        }

        if let Err(err) = fs::rename(&tmp_path, final_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(BlobStoreError::Io(err));
        }
        Ok(())
    }

    /// Recursively remove empty directories up to `stop`.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, blob: NewBlob) -> BlobStoreResult<StoredBlob> {
        let folder = sanitize_segment(&blob.folder, "uploads");
        let blob_id = format!("{}/{}", folder, unique_name(&blob.original_name));
        let key = match extension_of(&blob.original_name) {
            Some(ext) => format!("{}.{}", blob_id, ext),
            None => blob_id.clone(),
        };
        Self::ensure_key_safe(&key)?;

        let file_path = self.blob_path(&key);
        self.write_payload(&file_path, &blob.bytes).await?;

        let record = BlobRecord {
            id: blob_id,
            folder,
            key,
            original_name: blob.original_name,
            etag: format!("{:x}", md5::compute(&blob.bytes)),
            resource_type: resource_type_for(&blob.content_type).to_string(),
            content_type: blob.content_type,
            size_bytes: blob.bytes.len() as i64,
            created_at: Utc::now(),
        };

        let insert = sqlx::query(
            "INSERT INTO blobs (
                id, folder, key, original_name, content_type, size_bytes,
                etag, resource_type, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.folder)
        .bind(&record.key)
        .bind(&record.original_name)
        .bind(&record.content_type)
        .bind(record.size_bytes)
        .bind(&record.etag)
        .bind(&record.resource_type)
        .bind(record.created_at)
        .execute(&*self.db)
        .await;

        if let Err(err) = insert {
            let _ = fs::remove_file(&file_path).await;
            return Err(BlobStoreError::Sqlx(err));
        }

        debug!(blob_id = %record.id, size = record.size_bytes, "stored blob");
        Ok(self.to_stored(record))
    }

    async fn list(&self, folder: &str, limit: u32) -> BlobStoreResult<Vec<StoredBlob>> {
        let rows = sqlx::query_as::<_, BlobRecord>(
            "SELECT id, folder, key, original_name, content_type, size_bytes, etag,
                    resource_type, created_at
             FROM blobs WHERE folder = ?
             ORDER BY created_at DESC, id DESC
             LIMIT ?",
        )
        .bind(folder)
        .bind(i64::from(limit))
        .fetch_all(&*self.db)
        .await?;

        Ok(rows.into_iter().map(|r| self.to_stored(r)).collect())
    }

    async fn delete(&self, blob_id: &str) -> BlobStoreResult<()> {
        Self::ensure_key_safe(blob_id)?;
        let record = self.fetch_by_id(blob_id).await?;

        let result = sqlx::query("DELETE FROM blobs WHERE id = ?")
            .bind(&record.id)
            .execute(&*self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(BlobStoreError::NotFound(blob_id.to_string()));
        }

        let file_path = self.blob_path(&record.key);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed physical file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", file_path.display());
            }
            Err(err) => return Err(BlobStoreError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent, &self.base_path).await;
        }

        Ok(())
    }
}

/// Create a fresh temp file in `dir`, creating `dir` first.
///
/// A concurrent delete may prune `dir` between the two steps; the directory
/// is recreated once when that happens.
async fn create_tmp_file(dir: &Path) -> io::Result<(PathBuf, File)> {
    let tmp_path = dir.join(format!(".tmp-{}", Uuid::new_v4()));
    let mut retried = false;
    loop {
        fs::create_dir_all(dir).await?;
        match File::create(&tmp_path).await {
            Ok(file) => return Ok((tmp_path, file)),
            Err(err) if err.kind() == ErrorKind::NotFound && !retried => {
                debug!("{} vanished before temp file creation, retrying", dir.display());
                retried = true;
            }
            Err(err) => return Err(err),
        }
    }
}

/// `image` for image types, `raw` for everything else.
pub fn resource_type_for(content_type: &str) -> &'static str {
    if crate::models::upload::is_image_mime(content_type) {
        "image"
    } else {
        "raw"
    }
}

/// `{unix millis}-{stem}-{8 hex}`; unique even for identical filenames.
fn unique_name(original_name: &str) -> String {
    let stem = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original_name)
        .split('.')
        .next()
        .unwrap_or_default();
    let stem = sanitize_segment(stem, "file");
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}-{}",
        Utc::now().timestamp_millis(),
        stem,
        &suffix[..8]
    )
}

/// Lowercased alphanumeric extension of `name`, if it has a usable one.
fn extension_of(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.len() > MAX_EXTENSION_LEN {
        return None;
    }
    if !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Keep `[A-Za-z0-9_-]`, replace the rest with `_`, cap the length.
fn sanitize_segment(raw: &str, fallback: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_STEM_LEN)
        .collect();
    if cleaned.trim_matches('_').is_empty() {
        fallback.to_string()
    } else {
        cleaned
    }
}
