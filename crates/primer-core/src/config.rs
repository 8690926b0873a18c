use std::path::Path;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub llm: LlmConfig,
    pub store: StoreConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: String,
    pub api_key: String,
    pub generation_model: String,
    pub embedding_model: String,
    pub embedding_dim: usize,
    pub embedding_batch_size: usize,
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub sqlite_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub min_chars: usize,
    pub max_chars: usize,
    pub overlap_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub score_threshold: f32,
    pub min_chunks: usize,
}

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to built-in defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Reject configurations that cannot possibly run before any work starts.
    ///
    /// # Errors
    ///
    /// Returns an error on a missing credential, an unknown provider name,
    /// or chunking/retrieval bounds that make no sense.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.llm.provider != "gemini" {
            bail!("unknown llm provider: {}", self.llm.provider);
        }
        if self.llm.api_key.trim().is_empty() {
            bail!("llm.api_key is required (set PRIMER_GEMINI_API_KEY or run `primer init`)");
        }
        if self.llm.embedding_dim == 0 {
            bail!("llm.embedding_dim must be positive");
        }
        if self.llm.embedding_batch_size == 0 {
            bail!("llm.embedding_batch_size must be positive");
        }
        if self.chunking.min_chars == 0 || self.chunking.min_chars > self.chunking.max_chars {
            bail!(
                "chunking bounds invalid: min_chars {} must be in 1..=max_chars {}",
                self.chunking.min_chars,
                self.chunking.max_chars
            );
        }
        if self.chunking.overlap_chars >= self.chunking.max_chars {
            bail!("chunking.overlap_chars must be smaller than max_chars");
        }
        if self.retrieval.top_k == 0 {
            bail!("retrieval.top_k must be positive");
        }
        if !(0.0..=1.0).contains(&self.retrieval.score_threshold) {
            bail!("retrieval.score_threshold must be within [0.0, 1.0]");
        }
        if self.retrieval.min_chunks == 0 {
            bail!("retrieval.min_chunks must be positive");
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("PRIMER_GEMINI_API_KEY") {
            self.llm.api_key = v;
        }
        if let Ok(v) = std::env::var("PRIMER_LLM_MODEL") {
            self.llm.generation_model = v;
        }
        if let Ok(v) = std::env::var("PRIMER_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("PRIMER_SQLITE_PATH") {
            self.store.sqlite_path = v;
        }
    }

    fn default() -> Self {
        Self {
            llm: LlmConfig {
                provider: "gemini".into(),
                api_key: String::new(),
                generation_model: "gemini-2.0-flash".into(),
                embedding_model: "gemini-embedding-001".into(),
                embedding_dim: 768,
                embedding_batch_size: 64,
                base_url: "https://generativelanguage.googleapis.com/v1beta".into(),
            },
            store: StoreConfig {
                sqlite_path: "data/primer.db".into(),
            },
            chunking: ChunkingConfig {
                min_chars: 800,
                max_chars: 1200,
                overlap_chars: 150,
            },
            retrieval: RetrievalConfig {
                top_k: 8,
                score_threshold: 0.25,
                min_chunks: 2,
            },
        }
    }
}
