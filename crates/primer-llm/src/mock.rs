//! Test-only mock LLM provider.

use std::sync::{Arc, Mutex};

use crate::provider::{LlmProvider, Message};

#[derive(Debug, Clone)]
pub struct MockProvider {
    responses: Arc<Mutex<Vec<String>>>,
    embeddings: Arc<Mutex<Vec<Vec<f32>>>>,
    pub default_response: String,
    pub default_embedding: Vec<f32>,
    pub fail_chat: bool,
    pub fail_embed: bool,
    pub fail_batch: bool,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            embeddings: Arc::new(Mutex::new(Vec::new())),
            default_response: "mock response".into(),
            default_embedding: vec![0.0; 8],
            fail_chat: false,
            fail_embed: false,
            fail_batch: false,
        }
    }
}

impl MockProvider {
    /// Queue canned chat replies, consumed in order; falls back to
    /// `default_response` once drained.
    #[must_use]
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            ..Self::default()
        }
    }

    /// Queue canned embeddings, consumed in order; falls back to
    /// `default_embedding` once drained.
    #[must_use]
    pub fn with_embeddings(mut self, embeddings: Vec<Vec<f32>>) -> Self {
        self.embeddings = Arc::new(Mutex::new(embeddings));
        self
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_chat: true,
            ..Self::default()
        }
    }

    /// Batch endpoint errors while single embeds still work.
    #[must_use]
    pub fn failing_batch(mut self) -> Self {
        self.fail_batch = true;
        self
    }

    #[must_use]
    pub fn failing_embed(mut self) -> Self {
        self.fail_embed = true;
        self
    }
}

impl LlmProvider for MockProvider {
    async fn chat(&self, _messages: &[Message]) -> Result<String, crate::LlmError> {
        if self.fail_chat {
            return Err(crate::LlmError::Other("mock LLM error".into()));
        }
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(self.default_response.clone())
        } else {
            Ok(responses.remove(0))
        }
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, crate::LlmError> {
        if self.fail_embed {
            return Err(crate::LlmError::Other("mock embed error".into()));
        }
        let mut embeddings = self.embeddings.lock().unwrap();
        if embeddings.is_empty() {
            Ok(self.default_embedding.clone())
        } else {
            Ok(embeddings.remove(0))
        }
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, crate::LlmError> {
        if self.fail_batch {
            return Err(crate::LlmError::Other("mock batch error".into()));
        }
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
