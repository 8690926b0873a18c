use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::provider::{LlmProvider, Message, Role};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_SECS: u64 = 1;

/// Gemini REST backend: `generateContent` for chat, `embedContent` /
/// `batchEmbedContents` for vectors.
#[derive(Clone)]
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    generation_model: String,
    embedding_model: String,
    embedding_dim: usize,
    base_url: String,
}

impl fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &"<redacted>")
            .field("generation_model", &self.generation_model)
            .field("embedding_model", &self.embedding_model)
            .field("embedding_dim", &self.embedding_dim)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl GeminiProvider {
    #[must_use]
    pub fn new(
        api_key: String,
        generation_model: String,
        embedding_model: String,
        embedding_dim: usize,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            generation_model,
            embedding_model,
            embedding_dim,
            base_url: DEFAULT_BASE_URL.to_owned(),
        }
    }

    /// Override the API endpoint, mainly for tests against a local server.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn embedding_model_name(&self) -> &str {
        // Config may carry either "gemini-embedding-001" or the full
        // "models/gemini-embedding-001" resource name.
        self.embedding_model
            .strip_prefix("models/")
            .unwrap_or(&self.embedding_model)
    }

    async fn post_with_retry<B: Serialize>(
        &self,
        url: &str,
        body: &B,
        what: &str,
    ) -> Result<String, LlmError> {
        for attempt in 0..=MAX_RETRIES {
            let response = self
                .client
                .post(url)
                .header("x-goog-api-key", &self.api_key)
                .header("content-type", "application/json")
                .json(body)
                .send()
                .await?;

            let status = response.status();

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                if attempt == MAX_RETRIES {
                    return Err(LlmError::RateLimited);
                }
                let delay = retry_delay(&response, attempt);
                tracing::warn!(
                    "Gemini rate limited, retrying in {}s (attempt {}/{})",
                    delay.as_secs(),
                    attempt + 1,
                    MAX_RETRIES
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            let text = response.text().await.map_err(LlmError::Http)?;

            if !status.is_success() {
                tracing::error!("Gemini {what} error {status}: {text}");
                return Err(LlmError::Other(format!(
                    "Gemini {what} request failed (status {status})"
                )));
            }

            return Ok(text);
        }

        Err(LlmError::RateLimited)
    }
}

impl LlmProvider for GeminiProvider {
    async fn chat(&self, messages: &[Message]) -> Result<String, LlmError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url, self.generation_model
        );
        let (system, turns) = split_contents(messages);
        let body = GenerateRequest {
            system_instruction: system.as_deref().map(|text| Instruction {
                parts: vec![Part { text }],
            }),
            contents: &turns,
        };

        let text = self.post_with_retry(&url, &body, "generateContent").await?;
        let resp: GenerateResponse = serde_json::from_str(&text)?;

        let combined = resp
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect::<String>()
            })
            .unwrap_or_default();

        if combined.is_empty() {
            return Err(LlmError::EmptyResponse { provider: "gemini" });
        }
        Ok(combined)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let model_name = self.embedding_model_name();
        let url = format!("{}/models/{model_name}:embedContent", self.base_url);
        let resource = format!("models/{model_name}");
        let body = EmbedRequest {
            model: &resource,
            content: Instruction {
                parts: vec![Part { text }],
            },
            output_dimensionality: self.embedding_dim,
        };

        let raw = self.post_with_retry(&url, &body, "embedContent").await?;
        let resp: EmbedResponse = serde_json::from_str(&raw)?;

        let values = resp.embedding.map(|e| e.values).unwrap_or_default();
        if values.is_empty() {
            return Err(LlmError::EmptyResponse { provider: "gemini" });
        }
        Ok(values)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model_name = self.embedding_model_name();
        let url = format!("{}/models/{model_name}:batchEmbedContents", self.base_url);
        let resource = format!("models/{model_name}");
        let body = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| EmbedRequest {
                    model: &resource,
                    content: Instruction {
                        parts: vec![Part { text }],
                    },
                    output_dimensionality: self.embedding_dim,
                })
                .collect(),
        };

        let raw = self
            .post_with_retry(&url, &body, "batchEmbedContents")
            .await?;
        let resp: BatchEmbedResponse = serde_json::from_str(&raw)?;

        if resp.embeddings.is_empty() {
            return Err(LlmError::EmptyResponse { provider: "gemini" });
        }
        if resp.embeddings.len() != texts.len() {
            return Err(LlmError::BatchMismatch {
                expected: texts.len(),
                got: resp.embeddings.len(),
            });
        }
        Ok(resp.embeddings.into_iter().map(|e| e.values).collect())
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

fn retry_delay(response: &reqwest::Response, attempt: u32) -> Duration {
    if let Some(val) = response.headers().get("retry-after")
        && let Ok(s) = val.to_str()
        && let Ok(secs) = s.parse::<u64>()
    {
        return Duration::from_secs(secs);
    }
    Duration::from_secs(BASE_BACKOFF_SECS << attempt)
}

/// Fold system messages into one instruction; map the rest onto Gemini's
/// "user"/"model" turn roles.
fn split_contents(messages: &[Message]) -> (Option<String>, Vec<Turn<'_>>) {
    let mut system_parts = Vec::new();
    let mut turns = Vec::new();

    for msg in messages {
        match msg.role {
            Role::System => system_parts.push(msg.content.as_str()),
            Role::User => turns.push(Turn {
                role: "user",
                parts: vec![Part {
                    text: &msg.content,
                }],
            }),
            Role::Assistant => turns.push(Turn {
                role: "model",
                parts: vec![Part {
                    text: &msg.content,
                }],
            }),
        }
    }

    let system = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n\n"))
    };

    (system, turns)
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Instruction<'a>>,
    contents: &'a [Turn<'a>],
}

#[derive(Serialize)]
struct Turn<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Instruction<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    content: Instruction<'a>,
    #[serde(rename = "outputDimensionality")]
    output_dimensionality: usize,
}

#[derive(Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedRequest<'a>>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embedding: Option<EmbeddingValues>,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    #[serde(default)]
    values: Vec<f32>,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}
