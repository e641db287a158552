//! Retrieves stored content over HTTP so it can be handed to the AI service.

use crate::models::upload::mime_essence;
use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::{Client, StatusCode, header};
use std::time::Duration;
use thiserror::Error;

/// Used when the response doesn't declare a usable image type.
pub const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

const USER_AGENT: &str = concat!("study-buddy/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to fetch `{url}`: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to fetch `{url}`: upstream returned {status}")]
    Status { url: String, status: StatusCode },
    #[error("failed to fetch `{url}`: body exceeds {limit} bytes")]
    TooLarge { url: String, limit: usize },
}

/// Bytes plus the image type they should be submitted as.
#[derive(Clone, Debug)]
pub struct FetchedContent {
    pub bytes: Bytes,
    pub mime_type: String,
}

#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedContent, FetchError>;
}

pub struct HttpContentFetcher {
    client: Client,
    max_bytes: usize,
}

impl HttpContentFetcher {
    /// Bodies longer than `max_bytes` are refused, declared or not.
    pub fn new(timeout: Duration, max_bytes: usize) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("building HTTP client for content fetcher")?;
        Ok(Self { client, max_bytes })
    }
}

#[async_trait]
impl ContentFetcher for HttpContentFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedContent, FetchError> {
        let request_error = |source| FetchError::Request {
            url: url.to_string(),
            source,
        };

        let mut response = self.client.get(url).send().await.map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        let mime_type = image_mime_or_default(
            response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
        );
        let too_large = || FetchError::TooLarge {
            url: url.to_string(),
            limit: self.max_bytes,
        };
        if response
            .content_length()
            .is_some_and(|len| len > self.max_bytes as u64)
        {
            return Err(too_large());
        }

        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await.map_err(request_error)? {
            if body.len() + chunk.len() > self.max_bytes {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }
        let bytes = body.freeze();
        tracing::debug!(url, size = bytes.len(), %mime_type, "fetched content");

        Ok(FetchedContent { bytes, mime_type })
    }
}

/// Essence of a `Content-Type` header when it names an image, otherwise
/// [`DEFAULT_IMAGE_MIME`].
pub fn image_mime_or_default(content_type: Option<&str>) -> String {
    content_type
        .and_then(mime_essence)
        .filter(|essence| essence.starts_with("image/"))
        .unwrap_or_else(|| DEFAULT_IMAGE_MIME.to_string())
}
