//! Shared state handed to every handler.

use crate::{
    auth::JwtVerifier,
    services::{
        analysis::ImageAnalyzer, blob_store::LocalBlobStore, chat::ChatAssistant,
        upload_service::UploadService,
    },
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    /// The upload pipeline.
    pub uploads: UploadService,

    /// Backing store, used directly to serve blob URLs and for readiness.
    pub blobs: LocalBlobStore,

    /// On-demand analysis for the `/api/ai` endpoints.
    pub analyzer: ImageAnalyzer,

    /// Text-only study chat.
    pub chat: ChatAssistant,

    pub auth: Arc<JwtVerifier>,
}
