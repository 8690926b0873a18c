//! Concept tagging: batched model calls that assign each stored chunk to
//! nodes of the lesson plan. Re-running replaces all assignments for the
//! course.

use std::collections::HashSet;
use std::sync::Arc;

use primer_llm::payload::extract_payload;
use primer_llm::{LlmProvider, Message};
use primer_store::CourseStore;
use primer_store::sqlite::{LessonPlan, StoredChunk};
use serde::Deserialize;

use crate::chunker::clip;
use crate::error::{RagError, Result};

pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Chunk text beyond this many chars is not shown to the model.
const CHUNK_PROMPT_CHARS: usize = 600;

const TAG_PROMPT_TEMPLATE: &str = "\
You are assigning course chunks to a lesson plan hierarchy (unit, optional topic, optional subtopic).

{plan}

Chunks to assign (each can have MULTIPLE assignments if it spans units/topics):
{chunks}

For each chunk_id, output one or more assignments. Use ONLY the unit_id, topic_id, subtopic_id values from the list above. Use empty string \"\" for topic_id or subtopic_id if the chunk is only assigned to a unit.
Return ONLY valid JSON (no markdown) in this format:
{\"assignments\": [{\"chunk_id\": \"...\", \"unit_id\": \"...\", \"topic_id\": \"...\", \"subtopic_id\": \"...\"}, ...]}
Include every chunk_id at least once. A chunk can appear multiple times with different (unit_id, topic_id, subtopic_id).";

/// Outcome of one tagging run.
#[derive(Debug, Default)]
pub struct TagReport {
    /// Assignments persisted.
    pub tagged: usize,
    /// Batches that completed a model round trip.
    pub batches: usize,
    pub chunks_total: usize,
    /// Set when a model call failed mid-run; the counts cover what
    /// completed before the failure.
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagPayload {
    #[serde(default)]
    assignments: Vec<AssignmentPayload>,
}

#[derive(Debug, Deserialize)]
struct AssignmentPayload {
    #[serde(default)]
    chunk_id: String,
    #[serde(default)]
    unit_id: String,
    #[serde(default)]
    topic_id: String,
    #[serde(default)]
    subtopic_id: String,
}

struct ValidIds {
    chunks: HashSet<String>,
    units: HashSet<String>,
    topics: HashSet<String>,
    subtopics: HashSet<String>,
}

impl ValidIds {
    fn collect(plan: &LessonPlan, chunks: &[StoredChunk]) -> Self {
        let mut ids = Self {
            chunks: chunks.iter().map(|c| c.chunk_id.clone()).collect(),
            units: HashSet::new(),
            topics: HashSet::new(),
            subtopics: HashSet::new(),
        };
        for unit in &plan.units {
            ids.units.insert(unit.unit_id.clone());
            for topic in &unit.topics {
                ids.topics.insert(topic.topic_id.clone());
                for subtopic in &topic.subtopics {
                    ids.subtopics.insert(subtopic.subtopic_id.clone());
                }
            }
        }
        ids
    }
}

pub struct ConceptTagger<P> {
    store: CourseStore,
    provider: Arc<P>,
}

impl<P: LlmProvider> ConceptTagger<P> {
    #[must_use]
    pub fn new(store: CourseStore, provider: Arc<P>) -> Self {
        Self { store, provider }
    }

    /// Classify every chunk of the course against the stored plan,
    /// `batch_size` chunks per model call. A model failure aborts the run
    /// and is reported in [`TagReport::error`] rather than as an `Err`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::MissingPlan`] when the course has no lesson
    /// plan, or an error if a store operation fails.
    pub async fn tag_course(&self, course_id: &str, batch_size: usize) -> Result<TagReport> {
        let plan = self.store.lesson_plan(course_id).await?;
        if plan.is_empty() {
            return Err(RagError::MissingPlan {
                course_id: course_id.to_owned(),
            });
        }

        self.store.delete_assignments_for_course(course_id).await?;

        let chunks = self.store.chunks_for_course(course_id).await?;
        if chunks.is_empty() {
            return Ok(TagReport::default());
        }

        let summary = plan_summary(&plan);
        let ids = ValidIds::collect(&plan, &chunks);
        let mut report = TagReport {
            chunks_total: chunks.len(),
            ..TagReport::default()
        };

        for batch in chunks.chunks(batch_size.max(1)) {
            let prompt = tag_prompt(&summary, batch);
            let raw = match self.provider.chat(&[Message::user(prompt)]).await {
                Ok(raw) => raw,
                Err(err) => {
                    tracing::warn!(
                        batches = report.batches,
                        "tagging aborted on model error: {err}"
                    );
                    report.error = Some(err.to_string());
                    return Ok(report);
                }
            };

            let assignments = extract_payload::<TagPayload>(&raw)
                .map(|p| p.assignments)
                .unwrap_or_default();
            for assignment in &assignments {
                if let Some((chunk_id, unit_id, topic_id, subtopic_id)) =
                    validated(assignment, &ids)
                {
                    self.store
                        .insert_assignment(chunk_id, unit_id, topic_id, subtopic_id)
                        .await?;
                    report.tagged += 1;
                }
            }
            report.batches += 1;
        }

        Ok(report)
    }
}

/// Degrade invented ids instead of rejecting the whole assignment: an
/// unknown topic clears both topic and subtopic, an unknown subtopic
/// clears just the subtopic. Unknown chunk or unit ids drop it entirely.
fn validated<'a>(
    assignment: &'a AssignmentPayload,
    ids: &ValidIds,
) -> Option<(&'a str, &'a str, &'a str, &'a str)> {
    let chunk_id = assignment.chunk_id.trim();
    let unit_id = assignment.unit_id.trim();
    let mut topic_id = assignment.topic_id.trim();
    let mut subtopic_id = assignment.subtopic_id.trim();

    if chunk_id.is_empty() || !ids.chunks.contains(chunk_id) || !ids.units.contains(unit_id) {
        return None;
    }
    if !topic_id.is_empty() && !ids.topics.contains(topic_id) {
        topic_id = "";
        subtopic_id = "";
    }
    if !subtopic_id.is_empty() && !ids.subtopics.contains(subtopic_id) {
        subtopic_id = "";
    }
    Some((chunk_id, unit_id, topic_id, subtopic_id))
}

fn plan_summary(plan: &LessonPlan) -> String {
    let mut lines = vec!["Valid IDs (use these exact strings in your response):".to_owned()];
    for unit in &plan.units {
        lines.push(format!("  Unit: {} = {}", unit.unit_id, unit.unit_name));
        for topic in &unit.topics {
            lines.push(format!(
                "    Topic: {} = {} (unit {})",
                topic.topic_id, topic.topic_name, unit.unit_id
            ));
            for subtopic in &topic.subtopics {
                lines.push(format!(
                    "      Subtopic: {} = {} (topic {})",
                    subtopic.subtopic_id, subtopic.subtopic_name, topic.topic_id
                ));
            }
        }
    }
    lines.join("\n")
}

fn tag_prompt(summary: &str, batch: &[StoredChunk]) -> String {
    let blobs: Vec<String> = batch
        .iter()
        .map(|c| {
            format!(
                "[chunk_id: {}]\n{}",
                c.chunk_id,
                clip(&c.text, CHUNK_PROMPT_CHARS).trim()
            )
        })
        .collect();
    TAG_PROMPT_TEMPLATE
        .replace("{plan}", summary)
        .replace("{chunks}", &blobs.join("\n\n"))
}
