//! AI analysis of stored images.
//!
//! `TextGenerator` is the seam to the vision model; `GeminiClient` implements
//! it against the Gemini `generateContent` REST endpoint. `ImageAnalyzer`
//! chains fetch, base64 encoding and generation for a single image URL.

use crate::services::fetcher::{ContentFetcher, FetchError};
use anyhow::Context;
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use thiserror::Error;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("AI service credential is not configured")]
    ConfigMissing,
    #[error("AI service error: {0}")]
    Upstream(String),
}

/// Image bytes ready for inline submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineImage {
    pub data_base64: String,
    pub mime_type: String,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Whether a credential is present. Checked before any network work.
    fn is_configured(&self) -> bool;

    fn model(&self) -> &str;

    /// One non-streaming generation; returns the model text verbatim.
    /// Without an image the request is text-only.
    async fn generate(
        &self,
        prompt: &str,
        image: Option<&InlineImage>,
    ) -> Result<String, AnalysisError>;
}

pub struct GeminiClient {
    client: Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(
        api_key: Option<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("building HTTP client for Gemini")?;

        Ok(Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }
}

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text {
        text: &'a str,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData<'a>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// Concatenated text parts of the first candidate.
fn first_candidate_text(response: GenerateContentResponse) -> Option<String> {
    let content = response.candidates.into_iter().next()?.content?;
    let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
    (!text.is_empty()).then_some(text)
}

#[async_trait]
impl TextGenerator for GeminiClient {
    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        prompt: &str,
        image: Option<&InlineImage>,
    ) -> Result<String, AnalysisError> {
        let api_key = self.api_key.as_deref().ok_or(AnalysisError::ConfigMissing)?;

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let mut parts = vec![Part::Text { text: prompt }];
        if let Some(image) = image {
            parts.push(Part::Inline {
                inline_data: InlineData {
                    mime_type: &image.mime_type,
                    data: &image.data_base64,
                },
            });
        }
        let body = GenerateContentRequest {
            contents: [Content {
                role: "user",
                parts,
            }],
        };

        tracing::debug!(
            model = %self.model,
            mime = image.map(|i| i.mime_type.as_str()),
            "sending generateContent request"
        );
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AnalysisError::Upstream(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AnalysisError::Upstream(format!(
                "generateContent returned {}: {}",
                status, error_text
            )));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::Upstream(format!("invalid response body: {}", e)))?;

        first_candidate_text(parsed)
            .ok_or_else(|| AnalysisError::Upstream("response contained no text".into()))
    }
}

/// Fetch → encode → generate for one image URL.
#[derive(Clone)]
pub struct ImageAnalyzer {
    fetcher: Arc<dyn ContentFetcher>,
    generator: Arc<dyn TextGenerator>,
}

impl ImageAnalyzer {
    pub fn new(fetcher: Arc<dyn ContentFetcher>, generator: Arc<dyn TextGenerator>) -> Self {
        Self { fetcher, generator }
    }

    pub fn is_configured(&self) -> bool {
        self.generator.is_configured()
    }

    pub fn model(&self) -> &str {
        self.generator.model()
    }

    pub async fn analyze(&self, url: &str, prompt: &str) -> Result<String, AnalysisError> {
        if !self.generator.is_configured() {
            return Err(AnalysisError::ConfigMissing);
        }

        let content = self.fetcher.fetch(url).await?;
        let image = InlineImage {
            data_base64: general_purpose::STANDARD.encode(&content.bytes),
            mime_type: content.mime_type,
        };
        tracing::debug!(url, encoded_len = image.data_base64.len(), "image encoded for analysis");

        self.generator.generate(prompt, Some(&image)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeFetcher, FakeGenerator};
    use axum::{
        Json, Router,
        extract::Path,
        http::{HeaderMap, StatusCode},
        routing::post,
    };
    use serde_json::{Value, json};
    use tokio::net::TcpListener;

    async fn serve(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn image() -> InlineImage {
        InlineImage {
            data_base64: "iVBORw0KGgo=".into(),
            mime_type: "image/png".into(),
        }
    }

    #[test]
    fn candidate_parts_are_joined_verbatim() {
        let parsed: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "A diagram " }, { "text": "of a cell.\n" }] }
            }]
        }))
        .unwrap();
        assert_eq!(
            first_candidate_text(parsed).as_deref(),
            Some("A diagram of a cell.\n")
        );
    }

    #[test]
    fn empty_candidates_yield_nothing() {
        let parsed: GenerateContentResponse =
            serde_json::from_value(json!({ "candidates": [] })).unwrap();
        assert!(first_candidate_text(parsed).is_none());
    }

    #[tokio::test]
    async fn missing_key_fails_without_network() {
        // Nothing listens on port 9; a network attempt would surface as Upstream.
        let client = GeminiClient::new(None, DEFAULT_MODEL, Duration::from_secs(1))
            .unwrap()
            .with_base_url("http://127.0.0.1:9");

        assert!(!client.is_configured());
        assert!(matches!(
            client.generate("prompt", Some(&image())).await,
            Err(AnalysisError::ConfigMissing)
        ));
    }

    #[tokio::test]
    async fn blank_key_counts_as_missing() {
        let client =
            GeminiClient::new(Some("  ".into()), DEFAULT_MODEL, Duration::from_secs(1)).unwrap();
        assert!(!client.is_configured());
    }

    #[tokio::test]
    async fn generate_posts_prompt_and_inline_image() {
        let app = Router::new().route(
            "/v1beta/models/{action}",
            post(
                |Path(action): Path<String>, headers: HeaderMap, Json(body): Json<Value>| async move {
                    assert_eq!(action, "gemini-2.5-flash:generateContent");
                    assert_eq!(headers["x-goog-api-key"], "secret");
                    let parts = &body["contents"][0]["parts"];
                    assert_eq!(parts[0]["text"], "describe");
                    assert_eq!(parts[1]["inlineData"]["mimeType"], "image/png");
                    assert_eq!(parts[1]["inlineData"]["data"], "iVBORw0KGgo=");
                    Json(json!({
                        "candidates": [{ "content": { "parts": [{ "text": "A diagram of..." }] } }]
                    }))
                },
            ),
        );
        let base = serve(app).await;
        let client = GeminiClient::new(Some("secret".into()), DEFAULT_MODEL, Duration::from_secs(5))
            .unwrap()
            .with_base_url(base);

        let text = client.generate("describe", Some(&image())).await.unwrap();
        assert_eq!(text, "A diagram of...");
    }

    #[tokio::test]
    async fn text_only_request_has_a_single_part() {
        let app = Router::new().route(
            "/v1beta/models/{action}",
            post(|Json(body): Json<Value>| async move {
                let parts = body["contents"][0]["parts"].as_array().unwrap().clone();
                assert_eq!(parts.len(), 1);
                assert_eq!(parts[0]["text"], "explain the OSI model");
                Json(json!({
                    "candidates": [{ "content": { "parts": [{ "text": "Seven layers..." }] } }]
                }))
            }),
        );
        let base = serve(app).await;
        let client = GeminiClient::new(Some("secret".into()), DEFAULT_MODEL, Duration::from_secs(5))
            .unwrap()
            .with_base_url(base);

        let text = client.generate("explain the OSI model", None).await.unwrap();
        assert_eq!(text, "Seven layers...");
    }

    #[tokio::test]
    async fn upstream_error_status_is_reported() {
        let app = Router::new().route(
            "/v1beta/models/{action}",
            post(|| async { (StatusCode::TOO_MANY_REQUESTS, "quota exceeded") }),
        );
        let base = serve(app).await;
        let client = GeminiClient::new(Some("secret".into()), DEFAULT_MODEL, Duration::from_secs(5))
            .unwrap()
            .with_base_url(base);

        match client.generate("describe", Some(&image())).await {
            Err(AnalysisError::Upstream(msg)) => assert!(msg.contains("quota exceeded")),
            other => panic!("expected upstream error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn analyzer_encodes_fetched_bytes() {
        let fetcher = Arc::new(FakeFetcher::returning(b"\x89PNG", "image/png"));
        let generator = Arc::new(FakeGenerator::replying("ok"));
        let analyzer = ImageAnalyzer::new(fetcher.clone(), generator.clone());

        let text = analyzer.analyze("http://blobs/x.png", "prompt").await.unwrap();

        assert_eq!(text, "ok");
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(
            generator.last_image(),
            Some(InlineImage {
                data_base64: general_purpose::STANDARD.encode(b"\x89PNG"),
                mime_type: "image/png".into(),
            })
        );
    }

    #[tokio::test]
    async fn analyzer_checks_configuration_before_fetching() {
        let fetcher = Arc::new(FakeFetcher::returning(b"img", "image/png"));
        let generator = Arc::new(FakeGenerator::unconfigured());
        let analyzer = ImageAnalyzer::new(fetcher.clone(), generator.clone());

        let err = analyzer.analyze("http://blobs/x.png", "prompt").await.unwrap_err();

        assert!(matches!(err, AnalysisError::ConfigMissing));
        assert_eq!(fetcher.calls(), 0);
        assert_eq!(generator.calls(), 0);
    }
}
