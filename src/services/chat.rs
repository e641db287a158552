//! Stateless study chat: one question in, one generated answer out.

use crate::services::{
    analysis::{AnalysisError, TextGenerator},
    prompts,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct ChatAssistant {
    generator: Arc<dyn TextGenerator>,
}

impl ChatAssistant {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Tutor-style answer to a free-standing question.
    pub async fn answer(&self, message: &str) -> Result<String, AnalysisError> {
        self.ask(prompts::tutor(message.trim())).await
    }

    /// Answer grounded in `context`; blank context falls back to a plain
    /// question prompt.
    pub async fn answer_with_context(
        &self,
        message: &str,
        context: Option<&str>,
    ) -> Result<String, AnalysisError> {
        let prompt = match context.map(str::trim).filter(|c| !c.is_empty()) {
            Some(context) => prompts::with_context(context, message.trim()),
            None => prompts::question_only(message.trim()),
        };
        self.ask(prompt).await
    }

    async fn ask(&self, prompt: String) -> Result<String, AnalysisError> {
        if !self.generator.is_configured() {
            return Err(AnalysisError::ConfigMissing);
        }
        tracing::debug!(prompt_len = prompt.len(), "sending chat prompt");
        self.generator.generate(&prompt, None).await
    }
}
