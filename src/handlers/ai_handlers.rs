//! `/api/ai` handlers: on-demand analysis of images that are already hosted
//! somewhere reachable by URL.
//!
//! Unlike the upload pipeline these surface analysis failures as HTTP errors,
//! except in the batch endpoint where each image reports its own outcome.

use crate::{
    errors::AppError,
    services::{analysis::AnalysisError, prompts},
    state::AppState,
};
use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use futures::{StreamExt, stream};
use reqwest::Url;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRequest {
    pub image_url: String,
    pub public_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    #[serde(default)]
    pub images: Vec<ImageRequest>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAnalysis {
    pub public_id: Option<String>,
    pub image_url: String,
    pub summary: String,
    pub analyzed_at: DateTime<Utc>,
    pub ai_model: String,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeImageResponse {
    pub success: bool,
    pub message: &'static str,
    pub analysis: ImageAnalysis,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextExtraction {
    pub public_id: Option<String>,
    pub image_url: String,
    pub extracted_text: String,
    pub extracted_at: DateTime<Utc>,
    pub ai_model: String,
}

#[derive(Debug, Serialize)]
pub struct ExtractTextResponse {
    pub success: bool,
    pub message: &'static str,
    pub extraction: TextExtraction,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItem {
    pub public_id: Option<String>,
    pub image_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub success: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub success: bool,
    pub message: String,
    pub results: Vec<BatchItem>,
    pub analyzed_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub gemini: &'static str,
    pub blob_store: &'static str,
}

#[derive(Debug, Serialize)]
pub struct AiHealthResponse {
    pub success: bool,
    pub message: &'static str,
    pub services: ServiceStatus,
    pub timestamp: DateTime<Utc>,
}

impl ImageRequest {
    /// `imageUrl` must be an absolute http(s) URL; `publicId`, when present,
    /// must not be blank.
    fn validate(&self) -> Result<(), AppError> {
        let url = Url::parse(self.image_url.trim())
            .map_err(|_| AppError::bad_request("Valid image URL is required"))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AppError::bad_request("Valid image URL is required"));
        }
        if self
            .public_id
            .as_deref()
            .is_some_and(|id| id.trim().is_empty())
        {
            return Err(AppError::bad_request(
                "Public ID cannot be empty if provided",
            ));
        }
        Ok(())
    }
}

/// POST `/api/ai/analyze-image`
pub async fn analyze_image(
    State(state): State<AppState>,
    Json(req): Json<ImageRequest>,
) -> Result<Json<AnalyzeImageResponse>, AppError> {
    req.validate()?;
    tracing::info!(target_image = req.public_id.as_deref().unwrap_or(&req.image_url), "analyzing image");

    let summary = state
        .analyzer
        .analyze(req.image_url.trim(), prompts::STUDY_SUMMARY)
        .await?;

    Ok(Json(AnalyzeImageResponse {
        success: true,
        message: "Image analyzed successfully",
        analysis: ImageAnalysis {
            public_id: req.public_id,
            image_url: req.image_url,
            summary,
            analyzed_at: Utc::now(),
            ai_model: state.analyzer.model().to_string(),
        },
    }))
}

/// POST `/api/ai/extract-text`
pub async fn extract_text(
    State(state): State<AppState>,
    Json(req): Json<ImageRequest>,
) -> Result<Json<ExtractTextResponse>, AppError> {
    req.validate()?;
    tracing::info!(target_image = req.public_id.as_deref().unwrap_or(&req.image_url), "extracting text");

    let extracted_text = state
        .analyzer
        .analyze(req.image_url.trim(), prompts::EXTRACT_TEXT)
        .await?;

    Ok(Json(ExtractTextResponse {
        success: true,
        message: "Text extracted successfully",
        extraction: TextExtraction {
            public_id: req.public_id,
            image_url: req.image_url,
            extracted_text,
            extracted_at: Utc::now(),
            ai_model: state.analyzer.model().to_string(),
        },
    }))
}

/// POST `/api/ai/analyze-multiple`: images are processed one after another.
pub async fn analyze_multiple(
    State(state): State<AppState>,
    Json(req): Json<BatchRequest>,
) -> Result<Json<BatchResponse>, AppError> {
    if req.images.is_empty() {
        return Err(AppError::bad_request(
            "Images array is required and must contain at least one image",
        ));
    }
    for image in &req.images {
        image.validate()?;
    }
    if !state.analyzer.is_configured() {
        return Err(AnalysisError::ConfigMissing.into());
    }

    let total = req.images.len();
    tracing::info!(total, "starting batch image analysis");

    let analyzer = &state.analyzer;
    let results: Vec<BatchItem> = stream::iter(req.images)
        .then(|image| async move {
            match analyzer
                .analyze(image.image_url.trim(), prompts::BRIEF_SUMMARY)
                .await
            {
                Ok(summary) => BatchItem {
                    public_id: image.public_id,
                    image_url: image.image_url,
                    summary: Some(summary),
                    error: None,
                    success: true,
                },
                Err(err) => {
                    tracing::warn!(url = %image.image_url, error = %err, "batch item failed");
                    BatchItem {
                        public_id: image.public_id,
                        image_url: image.image_url,
                        summary: None,
                        error: Some(err.to_string()),
                        success: false,
                    }
                }
            }
        })
        .collect()
        .await;

    let succeeded = results.iter().filter(|r| r.success).count();
    Ok(Json(BatchResponse {
        success: true,
        message: format!("Analyzed {} out of {} images", succeeded, total),
        results,
        analyzed_at: Utc::now(),
    }))
}

/// GET `/api/ai/health`
pub async fn ai_health(State(state): State<AppState>) -> Json<AiHealthResponse> {
    Json(AiHealthResponse {
        success: true,
        message: "AI service is running",
        services: ServiceStatus {
            gemini: if state.analyzer.is_configured() {
                "configured"
            } else {
                "not configured"
            },
            blob_store: if state.blobs.is_available().await {
                "available"
            } else {
                "unavailable"
            },
        },
        timestamp: Utc::now(),
    })
}
