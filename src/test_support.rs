//! In-process fakes for the pipeline's collaborators.

use crate::{
    auth::Claims,
    services::{
        analysis::{AnalysisError, InlineImage, TextGenerator},
        blob_store::{BlobStore, BlobStoreError, BlobStoreResult, NewBlob, StoredBlob},
        fetcher::{ContentFetcher, FetchError, FetchedContent},
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use reqwest::StatusCode;
use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str = "test-secret";

/// A token for `user_id` signed with [`TEST_JWT_SECRET`], valid for an hour.
pub fn token_for(user_id: &str) -> String {
    let claims = Claims {
        user_id: user_id.to_string(),
        exp: (Utc::now().timestamp() + 3600) as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes()),
    )
    .expect("encode test token")
}

/// Keeps blobs in a vector; ids are unique per call.
#[derive(Default)]
pub struct MemoryStore {
    blobs: Mutex<Vec<StoredBlob>>,
}

impl MemoryStore {
    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap().len()
    }

    pub fn ids(&self) -> Vec<String> {
        self.blobs
            .lock()
            .unwrap()
            .iter()
            .map(|b| b.blob_id.clone())
            .collect()
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn put(&self, blob: NewBlob) -> BlobStoreResult<StoredBlob> {
        let blob_id = format!("{}/{}", blob.folder, Uuid::new_v4().simple());
        let stored = StoredBlob {
            url: format!("http://blobs.test/{}", blob_id),
            blob_id,
            size_bytes: blob.bytes.len() as u64,
            resource_type: crate::services::blob_store::resource_type_for(&blob.content_type)
                .to_string(),
            content_type: blob.content_type,
            original_name: blob.original_name,
            created_at: Utc::now(),
        };
        self.blobs.lock().unwrap().push(stored.clone());
        Ok(stored)
    }

    async fn list(&self, folder: &str, limit: u32) -> BlobStoreResult<Vec<StoredBlob>> {
        let prefix = format!("{}/", folder);
        Ok(self
            .blobs
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|b| b.blob_id.starts_with(&prefix))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn delete(&self, blob_id: &str) -> BlobStoreResult<()> {
        let mut blobs = self.blobs.lock().unwrap();
        let before = blobs.len();
        blobs.retain(|b| b.blob_id != blob_id);
        if blobs.len() == before {
            return Err(BlobStoreError::NotFound(blob_id.to_string()));
        }
        Ok(())
    }
}

/// Every operation fails with an I/O error.
pub struct FailingStore;

#[async_trait]
impl BlobStore for FailingStore {
    async fn put(&self, _blob: NewBlob) -> BlobStoreResult<StoredBlob> {
        Err(BlobStoreError::Io(std::io::Error::other("disk unavailable")))
    }

    async fn list(&self, _folder: &str, _limit: u32) -> BlobStoreResult<Vec<StoredBlob>> {
        Err(BlobStoreError::Io(std::io::Error::other("disk unavailable")))
    }

    async fn delete(&self, _blob_id: &str) -> BlobStoreResult<()> {
        Err(BlobStoreError::Io(std::io::Error::other("disk unavailable")))
    }
}

pub struct FakeFetcher {
    response: Option<FetchedContent>,
    urls: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn returning(bytes: &'static [u8], mime_type: &str) -> Self {
        Self {
            response: Some(FetchedContent {
                bytes: Bytes::from_static(bytes),
                mime_type: mime_type.to_string(),
            }),
            urls: Mutex::new(Vec::new()),
        }
    }

    /// Every fetch answers 502.
    pub fn failing() -> Self {
        Self {
            response: None,
            urls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.urls.lock().unwrap().len()
    }

    pub fn fetched_urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedContent, FetchError> {
        self.urls.lock().unwrap().push(url.to_string());
        self.response.clone().ok_or_else(|| FetchError::Status {
            url: url.to_string(),
            status: StatusCode::BAD_GATEWAY,
        })
    }
}

/// Sets its flag when dropped, whether the future completed or not.
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

pub struct FakeGenerator {
    configured: bool,
    reply: Result<String, String>,
    delay: Duration,
    calls: AtomicUsize,
    dropped: Arc<AtomicBool>,
    finished: AtomicBool,
    last_image: Mutex<Option<InlineImage>>,
    last_prompt: Mutex<Option<String>>,
}

impl FakeGenerator {
    fn with_reply(configured: bool, reply: Result<String, String>) -> Self {
        Self {
            configured,
            reply,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            dropped: Arc::new(AtomicBool::new(false)),
            finished: AtomicBool::new(false),
            last_image: Mutex::new(None),
            last_prompt: Mutex::new(None),
        }
    }

    pub fn replying(text: &str) -> Self {
        Self::with_reply(true, Ok(text.to_string()))
    }

    pub fn failing(message: &str) -> Self {
        Self::with_reply(true, Err(message.to_string()))
    }

    pub fn unconfigured() -> Self {
        Self::with_reply(false, Ok("unreachable".to_string()))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_image(&self) -> Option<InlineImage> {
        self.last_image.lock().unwrap().clone()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().unwrap().clone()
    }

    /// The generation future was dropped before it finished.
    pub fn was_cancelled(&self) -> bool {
        self.dropped.load(Ordering::SeqCst) && !self.finished.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for FakeGenerator {
    fn is_configured(&self) -> bool {
        self.configured
    }

    fn model(&self) -> &str {
        "fake-model"
    }

    async fn generate(
        &self,
        prompt: &str,
        image: Option<&InlineImage>,
    ) -> Result<String, AnalysisError> {
        if !self.configured {
            return Err(AnalysisError::ConfigMissing);
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_image.lock().unwrap() = image.cloned();
        *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
        let _guard = DropFlag(self.dropped.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.finished.store(true, Ordering::SeqCst);
        self.reply.clone().map_err(AnalysisError::Upstream)
    }
}
