//! Defines the HTTP surface of the service.
//!
//! ## Structure
//! - **Public**
//!   - `GET    /healthz`, `GET /readyz` — probes
//!   - `GET    /blobs/{*key}` — stored file contents (the URLs uploads return)
//!
//! - **Authenticated** (`Authorization: Bearer <jwt>`)
//!   - `POST   /api/upload` — store a file, analyze images
//!   - `GET    /api/upload/files` — list stored files
//!   - `DELETE /api/upload/{*blob_id}` — delete a stored file
//!   - `POST   /api/ai/analyze-image`, `/api/ai/analyze-multiple`, `/api/ai/extract-text`
//!   - `GET    /api/ai/health`
//!   - `POST   /api/chat`, `/api/chat-context` — stateless study chat

use crate::{
    auth::require_auth,
    handlers::{
        ai_handlers::{ai_health, analyze_image, analyze_multiple, extract_text},
        blob_handlers::get_blob,
        chat_handlers::{chat, chat_with_context},
        health_handlers::{healthz, readyz},
        upload_handlers::{delete_file, list_files, upload_file},
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post},
};
use tower_http::trace::TraceLayer;

/// Room for multipart boundaries and headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Build the full application router with its state applied.
pub fn routes(state: AppState) -> Router {
    let body_limit = state.uploads.settings().max_upload_bytes + MULTIPART_OVERHEAD;

    let api = Router::new()
        .route("/api/upload", post(upload_file))
        .route("/api/upload/files", get(list_files))
        .route("/api/upload/{*blob_id}", delete(delete_file))
        .route("/api/ai/analyze-image", post(analyze_image))
        .route("/api/ai/analyze-multiple", post(analyze_multiple))
        .route("/api/ai/extract-text", post(extract_text))
        .route("/api/ai/health", get(ai_health))
        .route("/api/chat", post(chat))
        .route("/api/chat-context", post(chat_with_context))
        .route_layer(middleware::from_fn_with_state(
            state.auth.clone(),
            require_auth,
        ));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/blobs/{*key}", get(get_blob))
        .merge(api)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
