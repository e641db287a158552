//! `/api/chat` handlers. No history is kept between requests.

use crate::{errors::AppError, state::AppState};
use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    /// Study material to ground the answer in; only read by `/api/chat-context`.
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub message: String,
    pub success: bool,
}

impl ChatRequest {
    fn validate(&self) -> Result<(), AppError> {
        if self.message.trim().is_empty() {
            return Err(AppError::bad_request("Message is required"));
        }
        Ok(())
    }
}

/// POST `/api/chat`
pub async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    req.validate()?;
    tracing::info!(message_len = req.message.len(), "chat request");

    let message = state.chat.answer(&req.message).await?;
    Ok(Json(ChatResponse {
        message,
        success: true,
    }))
}

/// POST `/api/chat-context`
pub async fn chat_with_context(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    req.validate()?;
    tracing::info!(
        message_len = req.message.len(),
        has_context = req.context.as_deref().is_some_and(|c| !c.trim().is_empty()),
        "chat request with context"
    );

    let message = state
        .chat
        .answer_with_context(&req.message, req.context.as_deref())
        .await?;
    Ok(Json(ChatResponse {
        message,
        success: true,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_message_is_rejected() {
        let req: ChatRequest = serde_json::from_str(r#"{"message":"   "}"#).unwrap();
        let err = req.validate().unwrap_err();
        assert_eq!(err.message, "Message is required");
    }

    #[test]
    fn missing_message_is_rejected() {
        let req: ChatRequest = serde_json::from_str(r#"{"context":"notes"}"#).unwrap();
        assert!(req.validate().is_err());
    }
}
