//! Upload orchestration: validate, store, then (for images) a best-effort AI
//! analysis bounded by a deadline.
//!
//! Only validation and storage failures fail the request. Everything that goes
//! wrong on the analysis path is folded into a fixed fallback text, and the
//! upload is still reported as successful.

use crate::{
    auth::Identity,
    models::upload::{FilePayload, UploadResult, is_accepted_mime},
    services::{
        analysis::{AnalysisError, ImageAnalyzer},
        blob_store::{BlobStore, BlobStoreError, NewBlob},
        prompts,
    },
};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{info, warn};

pub const UPLOAD_SUCCESS_MESSAGE: &str = "File uploaded successfully";

pub const ANALYSIS_TIMEOUT_MESSAGE: &str = "Image uploaded successfully, but AI analysis did not \
finish in time. You can try re-uploading or analyze the content manually.";

pub const FETCH_FAILED_MESSAGE: &str = "Unable to access the uploaded image for AI analysis. The \
image was uploaded successfully, but AI analysis is temporarily unavailable due to network \
connectivity issues.";

pub const NOT_CONFIGURED_MESSAGE: &str =
    "AI analysis is not configured. Please contact the administrator.";

pub const ANALYSIS_FAILED_MESSAGE: &str = "AI analysis encountered an error. The image was \
uploaded successfully, but automatic analysis failed. You can try uploading again or analyze \
the content manually.";

pub const DEFAULT_FOLDER: &str = "aistudybuddy";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_ANALYSIS_TIMEOUT: Duration = Duration::from_secs(45);

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("{0}")]
    InvalidInput(String),
    #[error(transparent)]
    Storage(#[from] BlobStoreError),
}

#[derive(Clone, Debug)]
pub struct UploadSettings {
    /// Blob-store namespace uploads are filed under.
    pub folder: String,
    pub max_upload_bytes: usize,
    /// Wall-clock budget for fetch + generation.
    pub analysis_timeout: Duration,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            folder: DEFAULT_FOLDER.to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            analysis_timeout: DEFAULT_ANALYSIS_TIMEOUT,
        }
    }
}

/// How the bounded analysis attempt settled.
#[derive(Debug)]
pub enum AnalysisOutcome {
    Completed(String),
    TimedOut,
    Failed(AnalysisError),
}

impl AnalysisOutcome {
    pub fn analyzed(&self) -> bool {
        matches!(self, AnalysisOutcome::Completed(_))
    }

    /// Generated text, or the fallback for whatever went wrong.
    pub fn into_text(self) -> String {
        match self {
            AnalysisOutcome::Completed(text) => text,
            AnalysisOutcome::TimedOut => ANALYSIS_TIMEOUT_MESSAGE.to_string(),
            AnalysisOutcome::Failed(AnalysisError::Fetch(_)) => FETCH_FAILED_MESSAGE.to_string(),
            AnalysisOutcome::Failed(AnalysisError::ConfigMissing) => {
                NOT_CONFIGURED_MESSAGE.to_string()
            }
            AnalysisOutcome::Failed(AnalysisError::Upstream(_)) => {
                ANALYSIS_FAILED_MESSAGE.to_string()
            }
        }
    }
}

#[derive(Clone)]
pub struct UploadService {
    store: Arc<dyn BlobStore>,
    analyzer: ImageAnalyzer,
    settings: UploadSettings,
}

impl UploadService {
    pub fn new(store: Arc<dyn BlobStore>, analyzer: ImageAnalyzer, settings: UploadSettings) -> Self {
        Self {
            store,
            analyzer,
            settings,
        }
    }

    pub fn settings(&self) -> &UploadSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    fn validate(&self, payload: Option<FilePayload>) -> Result<FilePayload, UploadError> {
        let payload =
            payload.ok_or_else(|| UploadError::InvalidInput("No file uploaded".into()))?;

        if !is_accepted_mime(&payload.mime_type) {
            return Err(UploadError::InvalidInput(
                "Invalid file type. Only images and PDFs are allowed.".into(),
            ));
        }
        if payload.bytes.len() > self.settings.max_upload_bytes {
            return Err(UploadError::InvalidInput(format!(
                "File too large. The limit is {} bytes.",
                self.settings.max_upload_bytes
            )));
        }
        Ok(payload)
    }

    /// Run the whole pipeline for one file.
    pub async fn upload(
        &self,
        identity: &Identity,
        payload: Option<FilePayload>,
    ) -> Result<UploadResult, UploadError> {
        let payload = self.validate(payload)?;
        let is_image = payload.is_image();
        let size_bytes = payload.size_bytes();

        info!(
            user = %identity.user_id,
            file = %payload.original_name,
            mime = %payload.mime_type,
            size_bytes,
            "upload received"
        );

        let stored = self
            .store
            .put(NewBlob {
                bytes: payload.bytes,
                folder: self.settings.folder.clone(),
                original_name: payload.original_name.clone(),
                content_type: payload.mime_type.clone(),
            })
            .await
            .inspect_err(|err| warn!(user = %identity.user_id, error = %err, "blob store write failed"))?;

        info!(blob_id = %stored.blob_id, "blob stored");

        let (analyzed, analysis_text) = if is_image {
            let outcome = self.bounded_analysis(&stored.url).await;
            (outcome.analyzed(), outcome.into_text())
        } else {
            (false, UPLOAD_SUCCESS_MESSAGE.to_string())
        };

        Ok(UploadResult {
            blob_id: stored.blob_id,
            url: stored.url,
            mime_type: payload.mime_type,
            size_bytes,
            is_image,
            analyzed,
            analysis_text,
            original_name: payload.original_name,
        })
    }

    /// Race the analysis against the configured deadline.
    ///
    /// When the deadline wins the analysis future is dropped, which aborts any
    /// in-flight fetch or generation request.
    pub async fn bounded_analysis(&self, url: &str) -> AnalysisOutcome {
        let deadline = self.settings.analysis_timeout;
        let attempt = self.analyzer.analyze(url, prompts::STUDY_ANALYSIS);

        match tokio::time::timeout(deadline, attempt).await {
            Ok(Ok(text)) => {
                info!(url, len = text.len(), "AI analysis completed");
                AnalysisOutcome::Completed(text)
            }
            Ok(Err(err)) => {
                warn!(url, error = %err, "AI analysis failed");
                AnalysisOutcome::Failed(err)
            }
            Err(_) => {
                warn!(url, timeout_secs = deadline.as_secs(), "AI analysis timed out");
                AnalysisOutcome::TimedOut
            }
        }
    }
}
