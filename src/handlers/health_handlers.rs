//! Liveness and readiness probes.
//!
//! - GET /healthz  -> "ok", no I/O
//! - GET /readyz   -> blob metadata DB, blob disk, AI credential

use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::{collections::BTreeMap, path::Path};
use tokio::fs;
use uuid::Uuid;

const DISK_PROBE: &[u8] = b"readyz";

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    checks: BTreeMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    /// Readiness fails only when a required check fails. Uploads still work
    /// without the AI credential, so that check is informational.
    required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl CheckStatus {
    fn required(result: Result<(), String>) -> Self {
        Self {
            ok: result.is_ok(),
            required: true,
            error: result.err(),
        }
    }

    fn optional(result: Result<(), String>) -> Self {
        Self {
            required: false,
            ..Self::required(result)
        }
    }
}

/// `GET /healthz`
pub async fn healthz() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// `GET /readyz`
///
/// 200 when every required check passes, 503 otherwise.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let mut checks = BTreeMap::new();
    checks.insert("sqlite", CheckStatus::required(check_database(&state).await));
    checks.insert(
        "disk",
        CheckStatus::required(check_disk(&state.blobs.base_path).await),
    );
    checks.insert(
        "ai_credential",
        CheckStatus::optional(if state.analyzer.is_configured() {
            Ok(())
        } else {
            Err("GEMINI_API_KEY is not set; analysis and chat degrade".to_string())
        }),
    );

    let ready = checks.values().all(|c| c.ok || !c.required);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = ReadyResponse {
        status: if ready { "ok" } else { "error" },
        checks,
    };
    (status, Json(body))
}

async fn check_database(state: &AppState) -> Result<(), String> {
    match sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&*state.blobs.db)
        .await
    {
        Ok(1) => Ok(()),
        Ok(v) => Err(format!("unexpected result: {}", v)),
        Err(e) => Err(format!("error: {}", e)),
    }
}

/// Round-trips a small file through the blob directory.
async fn check_disk(base: &Path) -> Result<(), String> {
    let probe = base.join(format!(".readyz-{}", Uuid::new_v4()));
    fs::write(&probe, DISK_PROBE)
        .await
        .map_err(|e| format!("could not write probe file: {}", e))?;

    let read = fs::read(&probe).await;
    let removed = fs::remove_file(&probe).await;
    match read {
        Ok(bytes) if bytes == DISK_PROBE => {}
        Ok(_) => return Err("probe file content mismatch".to_string()),
        Err(e) => return Err(format!("could not read probe file: {}", e)),
    }
    if let Err(e) = removed {
        tracing::warn!(path = %probe.display(), error = %e, "readyz probe file left behind");
    }
    Ok(())
}
