//! Scoped similarity retrieval: score stored chunks against a query
//! vector, keep the ones above threshold, return the best first.

use std::sync::Arc;

use primer_llm::LlmProvider;
use primer_store::CourseStore;

use crate::error::Result;

/// Retrieval knobs, applied after candidate loading.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Maximum passages returned per query.
    pub top_k: usize,
    /// Candidates scoring below this cosine similarity are dropped.
    pub score_threshold: f32,
    /// Fewer surviving passages than this counts as insufficient material.
    pub min_chunks: usize,
    /// Dimension vectors are compared at. Stored vectors are truncated to
    /// it at ingest; query vectors longer than it are clipped here.
    pub embedding_dim: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 8,
            score_threshold: 0.25,
            min_chunks: 2,
            embedding_dim: 768,
        }
    }
}

/// Narrows retrieval to chunks assigned to a plan node. Empty fields are
/// unconstrained; the default scope searches the whole course.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    pub unit_id: String,
    pub topic_id: String,
    pub subtopic_id: String,
}

/// A scoring passage with its citation fields.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub text: String,
    pub document_title: String,
    pub course_name: String,
    pub module_name: String,
    pub score: f32,
}

pub struct Retriever<P> {
    store: CourseStore,
    provider: Arc<P>,
    config: RetrievalConfig,
}

impl<P: LlmProvider> Retriever<P> {
    #[must_use]
    pub fn new(store: CourseStore, provider: Arc<P>, config: RetrievalConfig) -> Self {
        Self {
            store,
            provider,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Embed the query text and retrieve against the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the embedding call or a store read fails.
    pub async fn search(
        &self,
        course_id: &str,
        query: &str,
        scope: &Scope,
    ) -> Result<Vec<RetrievedChunk>> {
        let vector = self.provider.embed(query).await?;
        self.retrieve(course_id, &vector, scope).await
    }

    /// Score candidates in scope, drop those under the threshold, return
    /// at most `top_k` in descending score order. The query vector is
    /// clipped to `embedding_dim`, matching the stored vectors.
    ///
    /// # Errors
    ///
    /// Returns an error if the candidate read fails.
    pub async fn retrieve(
        &self,
        course_id: &str,
        query_vector: &[f32],
        scope: &Scope,
    ) -> Result<Vec<RetrievedChunk>> {
        let query_vector = &query_vector[..query_vector.len().min(self.config.embedding_dim)];
        let candidates = self
            .store
            .candidate_chunks(course_id, &scope.unit_id, &scope.topic_id, &scope.subtopic_id)
            .await?;

        let mut scored: Vec<RetrievedChunk> = candidates
            .into_iter()
            .map(|c| RetrievedChunk {
                score: cosine_similarity(query_vector, &c.embedding),
                chunk_id: c.chunk_id,
                text: c.text,
                document_title: c.document_title,
                course_name: c.course_name,
                module_name: c.module_name,
            })
            .collect();

        scored.retain(|c| c.score >= self.config.score_threshold);
        scored.sort_unstable_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(self.config.top_k);
        Ok(scored)
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
