//! Grounded practice-question generation: retrieve passages for a query,
//! then ask the model to write questions answerable from that material
//! alone, with chunk-level citations.

use std::collections::HashMap;
use std::sync::Arc;

use primer_llm::payload::extract_payload;
use primer_llm::{LlmProvider, Message};
use primer_store::CourseStore;
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::retriever::{RetrievalConfig, RetrievedChunk, Retriever, Scope};

pub const DEFAULT_NUM_QUESTIONS: usize = 5;

/// Shown to users when retrieval found too little material.
pub const INSUFFICIENT_MATERIAL_MESSAGE: &str =
    "Not enough course material available to generate meaningful practice questions.";

const RAG_PROMPT_TEMPLATE: &str = "\
You are a practice question generator for a course. Use ONLY the following course material to generate {count} practice questions. Do not use external knowledge.

Topic/query from the user: {query}

Course material (each has a chunk_id for citation):
{material}

Instructions:
- Generate exactly {count} questions that test understanding of the material above.
- Use a mix of short-answer and multiple-choice questions where appropriate.
- Each question must be answerable from the material above only.
- For each question, you MUST cite one or more chunk_ids from the list above (e.g. source_chunk_ids: [\"<chunk_id>\"]).
- Format your response as a JSON object with a single key \"questions\" whose value is an array of objects. Each object must have:
  - \"question\": string (the question text)
  - \"answer\": string (the correct answer)
  - \"type\": \"short_answer\" or \"multiple_choice\"
  - \"source_chunk_ids\": array of strings (chunk_ids from the material above that support this question)
  - If type is \"multiple_choice\", also include \"options\": array of strings (all choices) and \"correct_index\": integer (0-based index of the correct option in \"options\")

Return only valid JSON, no markdown or extra text.";

/// One generated question with its citations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PracticeQuestion {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub answer: String,
    /// "short_answer" or "multiple_choice".
    #[serde(default, rename = "type")]
    pub question_type: String,
    /// Cited chunk ids, filtered to the retrieved set.
    #[serde(default)]
    pub source_chunk_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_index: Option<i64>,
    /// Human-readable source line per citation.
    #[serde(default)]
    pub source_display: Vec<String>,
}

#[derive(Debug)]
pub enum QuestionOutcome {
    /// Fewer passages cleared the threshold than the configured minimum.
    InsufficientMaterial { retrieved: usize },
    Generated {
        questions: Vec<PracticeQuestion>,
        retrieved: usize,
    },
}

#[derive(Debug, Deserialize)]
struct QuestionsPayload {
    #[serde(default)]
    questions: Vec<PracticeQuestion>,
}

pub struct QuestionGenerator<P> {
    retriever: Retriever<P>,
    provider: Arc<P>,
}

impl<P: LlmProvider> QuestionGenerator<P> {
    #[must_use]
    pub fn new(store: CourseStore, provider: Arc<P>, config: RetrievalConfig) -> Self {
        Self {
            retriever: Retriever::new(store, Arc::clone(&provider), config),
            provider,
        }
    }

    /// Retrieve scoring passages and generate questions from them.
    /// Unparseable model output yields an empty question list, not an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmptyQuery`] for a blank query, or an error if
    /// embedding, retrieval, or the generation call fails.
    pub async fn generate(
        &self,
        course_id: &str,
        query: &str,
        num_questions: usize,
        scope: &Scope,
    ) -> Result<QuestionOutcome> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RagError::EmptyQuery);
        }

        let chunks = self.retriever.search(course_id, query, scope).await?;
        if chunks.len() < self.retriever.config().min_chunks {
            return Ok(QuestionOutcome::InsufficientMaterial {
                retrieved: chunks.len(),
            });
        }

        let prompt = rag_prompt(&chunks, query, num_questions);
        let raw = self.provider.chat(&[Message::user(prompt)]).await?;
        let mut questions = extract_payload::<QuestionsPayload>(&raw)
            .map(|p| p.questions)
            .unwrap_or_default();

        let by_id: HashMap<&str, &RetrievedChunk> =
            chunks.iter().map(|c| (c.chunk_id.as_str(), c)).collect();
        for question in &mut questions {
            question
                .source_chunk_ids
                .retain(|id| by_id.contains_key(id.as_str()));
            question.source_display = question
                .source_chunk_ids
                .iter()
                .map(|id| {
                    by_id
                        .get(id.as_str())
                        .map_or_else(|| id.clone(), |c| source_display(c))
                })
                .collect();
        }

        Ok(QuestionOutcome::Generated {
            questions,
            retrieved: chunks.len(),
        })
    }
}

fn rag_prompt(chunks: &[RetrievedChunk], query: &str, num_questions: usize) -> String {
    let material: Vec<String> = chunks
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let title = if c.document_title.is_empty() {
                "Unknown document"
            } else {
                c.document_title.as_str()
            };
            format!(
                "[Source {}] (chunk_id: {})\n  Course: {} | Module: {} | Document: {}\n  Content:\n{}\n",
                i + 1,
                c.chunk_id,
                c.course_name,
                c.module_name,
                title,
                c.text.trim()
            )
        })
        .collect();

    RAG_PROMPT_TEMPLATE
        .replace("{count}", &num_questions.to_string())
        .replace("{query}", query)
        .replace("{material}", &material.join("\n"))
}

fn source_display(chunk: &RetrievedChunk) -> String {
    let title = if chunk.document_title.is_empty() {
        chunk.chunk_id.as_str()
    } else {
        chunk.document_title.as_str()
    };
    [chunk.course_name.as_str(), chunk.module_name.as_str(), title]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" | ")
}
