//! Error types for primer-rag.

/// Errors that can occur in the content pipeline.
#[derive(Debug, thiserror::Error)]
pub enum RagError {
    /// IO error reading source material.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Content store error.
    #[error("store error: {0}")]
    Store(#[from] primer_store::StoreError),

    /// LLM provider error (generation or embedding).
    #[error("LLM error: {0}")]
    Llm(#[from] primer_llm::LlmError),

    /// Tagging or scoped work requested before a lesson plan exists.
    #[error("no lesson plan for course {course_id}; build one first")]
    MissingPlan { course_id: String },

    /// Question generation called with an empty query.
    #[error("query text is empty")]
    EmptyQuery,
}

/// Result type alias using `RagError`.
pub type Result<T> = std::result::Result<T, RagError>;
