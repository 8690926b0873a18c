//! Batched embedding with per-item fallback and fixed output dimension.

use std::sync::Arc;

use primer_llm::LlmProvider;

use crate::error::Result;

/// Default number of texts per batch call.
pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Embeds passage texts through an [`LlmProvider`], batching calls and
/// falling back to one call per item when a batch misbehaves.
pub struct EmbeddingBatcher<P> {
    provider: Arc<P>,
    dimension: usize,
    batch_size: usize,
}

impl<P: LlmProvider> EmbeddingBatcher<P> {
    #[must_use]
    pub fn new(provider: Arc<P>, dimension: usize, batch_size: usize) -> Self {
        Self {
            provider,
            dimension,
            batch_size: batch_size.max(1),
        }
    }

    /// Embed one text, truncated to the configured dimension.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider call fails.
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = self.provider.embed(&sanitize(text)).await?;
        vector.truncate(self.dimension);
        Ok(vector)
    }

    /// Embed many texts preserving input order and length. Each batch that
    /// fails or returns a mismatched count is retried one item at a time;
    /// items are never dropped.
    ///
    /// # Errors
    ///
    /// Returns an error only when a per-item fallback call itself fails.
    pub async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            let sanitized: Vec<String> = batch.iter().map(|t| sanitize(t)).collect();
            match self.provider.embed_batch(&sanitized).await {
                Ok(vectors) if vectors.len() == batch.len() => {
                    for mut vector in vectors {
                        vector.truncate(self.dimension);
                        out.push(vector);
                    }
                }
                Ok(vectors) => {
                    tracing::warn!(
                        "embedding batch returned {} vectors for {} texts, retrying singly",
                        vectors.len(),
                        batch.len()
                    );
                    self.embed_singly(&sanitized, &mut out).await?;
                }
                Err(err) => {
                    tracing::warn!("embedding batch failed ({err}), retrying singly");
                    self.embed_singly(&sanitized, &mut out).await?;
                }
            }
        }

        Ok(out)
    }

    async fn embed_singly(&self, texts: &[String], out: &mut Vec<Vec<f32>>) -> Result<()> {
        for text in texts {
            let mut vector = self.provider.embed(text).await?;
            vector.truncate(self.dimension);
            out.push(vector);
        }
        Ok(())
    }
}

/// Providers reject empty input; send a single space instead.
fn sanitize(text: &str) -> String {
    if text.trim().is_empty() {
        " ".to_owned()
    } else {
        text.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use primer_llm::mock::MockProvider;
    use primer_llm::{LlmError, Message};

    use super::*;

    #[test]
    fn sanitize_replaces_blank_text() {
        assert_eq!(sanitize(""), " ");
        assert_eq!(sanitize("  \n\t"), " ");
        assert_eq!(sanitize("cells"), "cells");
    }

    #[tokio::test]
    async fn embed_one_truncates_to_dimension() {
        let mock = MockProvider::default().with_embeddings(vec![vec![1.0, 2.0, 3.0, 4.0]]);
        let batcher = EmbeddingBatcher::new(Arc::new(mock), 2, DEFAULT_BATCH_SIZE);

        let vector = batcher.embed_one("text").await.unwrap();
        assert_eq!(vector, vec![1.0, 2.0]);
    }

    #[tokio::test]
    async fn embed_many_preserves_order_across_batches() {
        let mock = MockProvider::default().with_embeddings(vec![
            vec![1.0],
            vec![2.0],
            vec![3.0],
            vec![4.0],
            vec![5.0],
        ]);
        let batcher = EmbeddingBatcher::new(Arc::new(mock), 8, 2);

        let texts: Vec<String> = (0..5).map(|i| format!("t{i}")).collect();
        let vectors = batcher.embed_many(&texts).await.unwrap();

        assert_eq!(vectors.len(), 5);
        assert_eq!(vectors[0], vec![1.0]);
        assert_eq!(vectors[4], vec![5.0]);
    }

    #[tokio::test]
    async fn batch_failure_falls_back_to_singles() {
        let mock = MockProvider::default()
            .with_embeddings(vec![vec![1.0], vec![2.0], vec![3.0]])
            .failing_batch();
        let batcher = EmbeddingBatcher::new(Arc::new(mock), 8, 3);

        let texts: Vec<String> = (0..3).map(|i| format!("t{i}")).collect();
        let vectors = batcher.embed_many(&texts).await.unwrap();

        assert_eq!(vectors, vec![vec![1.0], vec![2.0], vec![3.0]]);
    }

    #[tokio::test]
    async fn fallback_item_failure_propagates() {
        let mock = MockProvider::default().failing_batch().failing_embed();
        let batcher = EmbeddingBatcher::new(Arc::new(mock), 8, 2);

        let texts = vec!["a".to_owned(), "b".to_owned()];
        assert!(batcher.embed_many(&texts).await.is_err());
    }

    #[tokio::test]
    async fn empty_input_yields_empty_output() {
        let batcher = EmbeddingBatcher::new(Arc::new(MockProvider::default()), 8, 2);
        assert!(batcher.embed_many(&[]).await.unwrap().is_empty());
    }

    /// Provider that structurally returns one vector too few per batch.
    #[derive(Clone)]
    struct ShortBatch;

    impl primer_llm::LlmProvider for ShortBatch {
        async fn chat(&self, _messages: &[Message]) -> std::result::Result<String, LlmError> {
            Ok(String::new())
        }

        async fn embed(&self, _text: &str) -> std::result::Result<Vec<f32>, LlmError> {
            Ok(vec![7.0, 7.0])
        }

        async fn embed_batch(
            &self,
            texts: &[String],
        ) -> std::result::Result<Vec<Vec<f32>>, LlmError> {
            Ok(vec![vec![1.0, 1.0]; texts.len().saturating_sub(1)])
        }

        fn name(&self) -> &'static str {
            "short-batch"
        }
    }

    #[tokio::test]
    async fn count_mismatch_falls_back_to_singles() {
        let batcher = EmbeddingBatcher::new(Arc::new(ShortBatch), 2, 4);

        let texts: Vec<String> = (0..4).map(|i| format!("t{i}")).collect();
        let vectors = batcher.embed_many(&texts).await.unwrap();

        assert_eq!(vectors.len(), 4);
        assert!(vectors.iter().all(|v| *v == vec![7.0, 7.0]));
    }
}
