//! Course ingestion: upsert documents, re-chunk their text, embed the
//! passages, and store everything with citation fields denormalized.

use std::time::Instant;

use primer_llm::LlmProvider;
use primer_store::CourseStore;
use primer_store::sqlite::{ChunkRecord, DocumentRecord};

use crate::chunker::{ChunkerConfig, chunk_text};
use crate::embedder::EmbeddingBatcher;
use crate::error::Result;

/// Module id recorded for documents that belong to no module.
pub const UNCATEGORIZED_MODULE: &str = "uncategorized";

#[derive(Debug, Clone)]
pub struct ModuleInput {
    pub module_id: String,
    pub module_name: String,
}

#[derive(Debug, Clone)]
pub struct DocumentInput {
    pub document_id: String,
    /// Empty when the document belongs to no module.
    pub module_id: String,
    /// "syllabus", "assignment", "page", or "file".
    pub document_type: String,
    pub title: String,
    pub raw_text: String,
}

/// A course and its raw documents, ready for ingestion.
#[derive(Debug, Clone, Default)]
pub struct CourseInput {
    pub course_id: String,
    pub course_name: String,
    pub modules: Vec<ModuleInput>,
    pub documents: Vec<DocumentInput>,
}

#[derive(Debug, Default)]
pub struct IngestReport {
    pub documents_seen: usize,
    /// Documents with non-empty text that were stored and chunked.
    pub documents_ingested: usize,
    pub chunks_created: usize,
    /// Stale chunks deleted ahead of re-chunking.
    pub chunks_removed: u64,
    /// One entry per failed document, as "document_id: error".
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

pub struct CourseIngestor<P> {
    store: CourseStore,
    embedder: EmbeddingBatcher<P>,
    chunker: ChunkerConfig,
}

impl<P: LlmProvider> CourseIngestor<P> {
    #[must_use]
    pub fn new(store: CourseStore, embedder: EmbeddingBatcher<P>, chunker: ChunkerConfig) -> Self {
        Self {
            store,
            embedder,
            chunker,
        }
    }

    /// Ingest a whole course. Documents with empty text are skipped; a
    /// document that fails mid-way is recorded in the report and does not
    /// stop the remaining documents. Re-running replaces each document's
    /// chunks.
    ///
    /// # Errors
    ///
    /// Returns an error if the course or module upserts fail.
    pub async fn ingest(&self, input: &CourseInput) -> Result<IngestReport> {
        let started = Instant::now();
        let course_name = display_or(&input.course_name, &input.course_id);
        self.store
            .upsert_course(&input.course_id, course_name)
            .await?;

        for module in &input.modules {
            let name = display_or(&module.module_name, &module.module_id);
            self.store
                .upsert_module(&module.module_id, &input.course_id, name)
                .await?;
        }

        let mut report = IngestReport::default();
        for document in &input.documents {
            report.documents_seen += 1;
            if document.raw_text.trim().is_empty() {
                tracing::debug!(document_id = %document.document_id, "skipping empty document");
                continue;
            }
            match self.ingest_document(input, document).await {
                Ok((created, removed)) => {
                    report.documents_ingested += 1;
                    report.chunks_created += created;
                    report.chunks_removed += removed;
                }
                Err(err) => {
                    tracing::warn!(document_id = %document.document_id, "document failed: {err}");
                    report.errors.push(format!("{}: {err}", document.document_id));
                }
            }
        }

        report.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::info!(
            course_id = %input.course_id,
            documents = report.documents_ingested,
            chunks = report.chunks_created,
            duration_ms = report.duration_ms,
            "ingest finished"
        );
        Ok(report)
    }

    async fn ingest_document(
        &self,
        course: &CourseInput,
        document: &DocumentInput,
    ) -> Result<(usize, u64)> {
        let module_id = if document.module_id.is_empty() {
            UNCATEGORIZED_MODULE
        } else {
            document.module_id.as_str()
        };
        let title = display_or(&document.title, &document.document_id);
        let module_name = course
            .modules
            .iter()
            .find(|m| m.module_id == document.module_id)
            .map_or("", |m| display_or(&m.module_name, &m.module_id));

        self.store
            .upsert_document(&DocumentRecord {
                document_id: document.document_id.clone(),
                course_id: course.course_id.clone(),
                module_id: module_id.to_owned(),
                document_type: document.document_type.clone(),
                title: title.to_owned(),
                raw_text: document.raw_text.clone(),
            })
            .await?;

        let removed = self
            .store
            .delete_chunks_for_document(&document.document_id)
            .await?;
        let passages = chunk_text(&document.raw_text, &self.chunker);
        let embeddings = self.embedder.embed_many(&passages).await?;

        let course_name = display_or(&course.course_name, &course.course_id);
        for (text, embedding) in passages.iter().zip(embeddings) {
            self.store
                .insert_chunk(&ChunkRecord {
                    chunk_id: uuid::Uuid::new_v4().to_string(),
                    document_id: document.document_id.clone(),
                    course_id: course.course_id.clone(),
                    module_id: module_id.to_owned(),
                    text: text.clone(),
                    embedding,
                    document_title: title.to_owned(),
                    course_name: course_name.to_owned(),
                    module_name: module_name.to_owned(),
                })
                .await?;
        }

        Ok((passages.len(), removed))
    }
}

fn display_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    let trimmed = value.trim();
    if trimmed.is_empty() { fallback } else { trimmed }
}
