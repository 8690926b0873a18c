//! Lesson plan extraction: syllabus-first, with a content-sample fallback
//! when the syllabus is missing, too thin, or yields no units.

use std::fmt;
use std::sync::Arc;

use primer_llm::payload::extract_payload;
use primer_llm::{LlmProvider, Message};
use primer_store::CourseStore;
use primer_store::sqlite::LessonPlan;
use serde::Deserialize;

use crate::chunker::clip;
use crate::error::Result;

/// Syllabi at or below this trimmed length are treated as absent.
const MIN_SYLLABUS_CHARS: usize = 100;
const SYLLABUS_PROMPT_CAP: usize = 12_000;
const MAX_SAMPLED_CHUNKS: usize = 20;
const MAX_PROMPT_SAMPLES: usize = 15;
const SAMPLE_CHARS: usize = 800;
const COMBINED_SAMPLE_CAP: usize = 10_000;

/// Shown to users when neither strategy produced a plan.
pub const NO_PLAN_MESSAGE: &str = "Could not extract or generate a lesson plan.";

const SYLLABUS_PROMPT_TEMPLATE: &str = "\
You are analyzing a course syllabus to extract a conceptual lesson plan.

Course: {course}

Syllabus text:
{syllabus}

Extract a hierarchical structure: Units (major conceptual areas), each with optional Topics, each with optional Subtopics.
Example for \"Data Structures\": Unit \"Trees\" -> Topic \"Binary Search Trees\" -> Subtopics \"Insertion\", \"Deletion\".
Return ONLY valid JSON in this exact format (no markdown, no explanation):
{\"units\": [{\"unit_name\": \"Name\", \"topics\": [{\"topic_name\": \"Name\", \"subtopics\": [\"Name1\", \"Name2\"]}]}]}
Use empty arrays where there are no topics or subtopics. Be concise with names.";

const CONTENT_PROMPT_TEMPLATE: &str = "\
You are creating a conceptual lesson plan for a course based on sample content.

Course: {course}

Sample content from course materials:
{samples}

Propose a hierarchy: Units (major conceptual areas), each with optional Topics, each with optional Subtopics.
Return ONLY valid JSON in this format (no markdown):
{\"units\": [{\"unit_name\": \"Name\", \"topics\": [{\"topic_name\": \"Name\", \"subtopics\": [\"Name1\", \"Name2\"]}]}]}
Use empty arrays where needed. Be concise.";

/// Provenance of a persisted plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanSource {
    Syllabus,
    Content,
    None,
}

impl fmt::Display for PlanSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Self::Syllabus => "syllabus",
            Self::Content => "content",
            Self::None => "none",
        };
        f.write_str(tag)
    }
}

#[derive(Debug)]
pub struct PlanOutcome {
    /// The stored plan, empty when `source` is [`PlanSource::None`].
    pub plan: LessonPlan,
    pub source: PlanSource,
}

#[derive(Debug, Deserialize)]
struct PlanPayload {
    #[serde(default)]
    units: Vec<UnitPayload>,
}

#[derive(Debug, Deserialize)]
struct UnitPayload {
    #[serde(default)]
    unit_name: String,
    #[serde(default)]
    topics: Vec<TopicPayload>,
}

#[derive(Debug, Deserialize)]
struct TopicPayload {
    #[serde(default)]
    topic_name: String,
    #[serde(default)]
    subtopics: Vec<serde_json::Value>,
}

/// Builds the unit -> topic -> subtopic tree for a course.
pub struct LessonPlanner<P> {
    store: CourseStore,
    provider: Arc<P>,
}

impl<P: LlmProvider> LessonPlanner<P> {
    #[must_use]
    pub fn new(store: CourseStore, provider: Arc<P>) -> Self {
        Self { store, provider }
    }

    /// Build and persist the plan, replacing any previously stored tree.
    /// Model failures and unparseable output are absorbed into a
    /// [`PlanSource::None`] outcome.
    ///
    /// # Errors
    ///
    /// Returns an error if a store read or write fails.
    pub async fn build(&self, course_id: &str, course_name: &str) -> Result<PlanOutcome> {
        let display_name = if course_name.trim().is_empty() {
            course_id
        } else {
            course_name
        };

        let syllabus = self.store.syllabus_text(course_id).await?;
        let mut source = PlanSource::Syllabus;
        let mut payload: Option<PlanPayload> = None;

        if let Some(syllabus) = syllabus.as_deref()
            && syllabus.chars().count() > MIN_SYLLABUS_CHARS
        {
            payload = self
                .ask_for_plan(&syllabus_prompt(syllabus, display_name))
                .await;
        }

        if payload.as_ref().is_none_or(|p| p.units.is_empty()) {
            let chunks = self.store.chunks_for_course(course_id).await?;
            let samples: Vec<&str> = chunks
                .iter()
                .map(|c| c.text.as_str())
                .filter(|t| !t.trim().is_empty())
                .take(MAX_SAMPLED_CHUNKS)
                .collect();
            if !samples.is_empty() {
                source = PlanSource::Content;
                payload = self
                    .ask_for_plan(&content_prompt(&samples, display_name))
                    .await;
            }
        }

        let Some(payload) = payload.filter(|p| !p.units.is_empty()) else {
            return Ok(PlanOutcome {
                plan: LessonPlan::default(),
                source: PlanSource::None,
            });
        };

        self.persist(course_id, &payload).await?;
        let plan = self.store.lesson_plan(course_id).await?;
        Ok(PlanOutcome { plan, source })
    }

    async fn ask_for_plan(&self, prompt: &str) -> Option<PlanPayload> {
        match self.provider.chat(&[Message::user(prompt)]).await {
            Ok(raw) => extract_payload(&raw),
            Err(err) => {
                tracing::warn!("lesson plan request failed: {err}");
                None
            }
        }
    }

    /// Replace-persist: fresh ids per node, sequential sort order for
    /// units, flat zero for topics and subtopics. Nodes with empty trimmed
    /// names are skipped without consuming a sort slot.
    async fn persist(&self, course_id: &str, payload: &PlanPayload) -> Result<()> {
        self.store.delete_plan(course_id).await?;

        let mut sort_order = 0i64;
        for unit in &payload.units {
            let unit_name = unit.unit_name.trim();
            if unit_name.is_empty() {
                continue;
            }
            let unit_id = short_id();
            self.store
                .upsert_unit(&unit_id, course_id, unit_name, sort_order)
                .await?;
            sort_order += 1;

            for topic in &unit.topics {
                let topic_name = topic.topic_name.trim();
                if topic_name.is_empty() {
                    continue;
                }
                let topic_id = short_id();
                self.store
                    .upsert_topic(&topic_id, &unit_id, topic_name, 0)
                    .await?;

                for subtopic in &topic.subtopics {
                    let name = subtopic_name(subtopic);
                    let name = name.trim();
                    if name.is_empty() {
                        continue;
                    }
                    self.store
                        .upsert_subtopic(&short_id(), &topic_id, name, 0)
                        .await?;
                }
            }
        }

        Ok(())
    }
}

fn syllabus_prompt(syllabus: &str, course: &str) -> String {
    SYLLABUS_PROMPT_TEMPLATE
        .replace("{course}", course)
        .replace("{syllabus}", clip(syllabus, SYLLABUS_PROMPT_CAP))
}

fn content_prompt(samples: &[&str], course: &str) -> String {
    let combined = samples
        .iter()
        .take(MAX_PROMPT_SAMPLES)
        .map(|t| clip(t, SAMPLE_CHARS))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");
    CONTENT_PROMPT_TEMPLATE
        .replace("{course}", course)
        .replace("{samples}", clip(&combined, COMBINED_SAMPLE_CAP))
}

/// Models occasionally emit numbers or objects in the subtopics array;
/// render them rather than dropping the entry.
fn subtopic_name(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn short_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(12);
    id
}

#[cfg(test)]
mod tests {
    use primer_llm::mock::MockProvider;
    use primer_store::sqlite::DocumentRecord;

    use super::*;

    const PLAN_JSON: &str = r#"{"units": [
        {"unit_name": "Cells", "topics": [
            {"topic_name": "Organelles", "subtopics": ["Mitochondria", "Ribosomes"]}
        ]},
        {"unit_name": "Genetics", "topics": []}
    ]}"#;

    async fn store_with_syllabus(raw_text: &str) -> CourseStore {
        let store = CourseStore::new(":memory:").await.unwrap();
        store.upsert_course("c1", "Biology").await.unwrap();
        store
            .upsert_document(&DocumentRecord {
                document_id: "syl".into(),
                course_id: "c1".into(),
                module_id: String::new(),
                document_type: "syllabus".into(),
                title: "Syllabus".into(),
                raw_text: raw_text.into(),
            })
            .await
            .unwrap();
        store
    }

    fn long_syllabus() -> String {
        "Week 1: cell structure and organelles. ".repeat(10)
    }

    #[tokio::test]
    async fn syllabus_plan_persisted_with_fresh_ids() {
        let store = store_with_syllabus(&long_syllabus()).await;
        let mock = MockProvider::with_responses(vec![PLAN_JSON.into()]);
        let planner = LessonPlanner::new(store.clone(), Arc::new(mock));

        let outcome = planner.build("c1", "Biology").await.unwrap();

        assert_eq!(outcome.source, PlanSource::Syllabus);
        assert_eq!(outcome.plan.units.len(), 2);
        assert_eq!(outcome.plan.units[0].unit_name, "Cells");
        assert_eq!(outcome.plan.units[0].sort_order, 0);
        assert_eq!(outcome.plan.units[1].sort_order, 1);
        assert_eq!(outcome.plan.units[0].topics[0].subtopics.len(), 2);
        assert_eq!(outcome.plan.units[0].unit_id.len(), 12);
        // Topics and subtopics share a flat zero sort order.
        assert_eq!(outcome.plan.units[0].topics[0].sort_order, 0);
        assert_eq!(outcome.plan.units[0].topics[0].subtopics[0].sort_order, 0);
    }

    #[tokio::test]
    async fn fenced_model_output_tolerated() {
        let store = store_with_syllabus(&long_syllabus()).await;
        let fenced = format!("Here is the plan:\n```json\n{PLAN_JSON}\n```");
        let mock = MockProvider::with_responses(vec![fenced]);
        let planner = LessonPlanner::new(store, Arc::new(mock));

        let outcome = planner.build("c1", "Biology").await.unwrap();
        assert_eq!(outcome.source, PlanSource::Syllabus);
        assert_eq!(outcome.plan.units.len(), 2);
    }

    #[tokio::test]
    async fn short_syllabus_falls_back_to_content() {
        let store = store_with_syllabus("Too short to be useful.").await;
        seed_chunk(&store, "ch1", "Photosynthesis converts light into chemical energy.").await;
        let mock = MockProvider::with_responses(vec![PLAN_JSON.into()]);
        let planner = LessonPlanner::new(store, Arc::new(mock));

        let outcome = planner.build("c1", "Biology").await.unwrap();
        assert_eq!(outcome.source, PlanSource::Content);
        assert_eq!(outcome.plan.units.len(), 2);
    }

    #[tokio::test]
    async fn syllabus_without_units_falls_back_to_content() {
        let store = store_with_syllabus(&long_syllabus()).await;
        seed_chunk(&store, "ch1", "Photosynthesis converts light into chemical energy.").await;
        let mock = MockProvider::with_responses(vec![
            r#"{"units": []}"#.into(),
            PLAN_JSON.into(),
        ]);
        let planner = LessonPlanner::new(store, Arc::new(mock));

        let outcome = planner.build("c1", "Biology").await.unwrap();
        assert_eq!(outcome.source, PlanSource::Content);
        assert_eq!(outcome.plan.units.len(), 2);
    }

    #[tokio::test]
    async fn nothing_to_work_with_yields_none() {
        let store = CourseStore::new(":memory:").await.unwrap();
        store.upsert_course("c1", "Biology").await.unwrap();
        let planner = LessonPlanner::new(store, Arc::new(MockProvider::default()));

        let outcome = planner.build("c1", "Biology").await.unwrap();
        assert_eq!(outcome.source, PlanSource::None);
        assert!(outcome.plan.is_empty());
    }

    #[tokio::test]
    async fn provider_error_absorbed_into_none_outcome() {
        let store = store_with_syllabus(&long_syllabus()).await;
        let planner = LessonPlanner::new(store, Arc::new(MockProvider::failing()));

        let outcome = planner.build("c1", "Biology").await.unwrap();
        assert_eq!(outcome.source, PlanSource::None);
        assert!(outcome.plan.is_empty());
    }

    #[tokio::test]
    async fn empty_names_skipped_without_consuming_sort_order() {
        let store = store_with_syllabus(&long_syllabus()).await;
        let response = r#"{"units": [
            {"unit_name": "   ", "topics": []},
            {"unit_name": "Kept", "topics": [{"topic_name": "", "subtopics": ["x"]}]}
        ]}"#;
        let mock = MockProvider::with_responses(vec![response.into()]);
        let planner = LessonPlanner::new(store, Arc::new(mock));

        let outcome = planner.build("c1", "Biology").await.unwrap();
        assert_eq!(outcome.plan.units.len(), 1);
        assert_eq!(outcome.plan.units[0].unit_name, "Kept");
        assert_eq!(outcome.plan.units[0].sort_order, 0);
        assert!(outcome.plan.units[0].topics.is_empty());
    }

    #[tokio::test]
    async fn non_string_subtopics_rendered() {
        let store = store_with_syllabus(&long_syllabus()).await;
        let response = r#"{"units": [
            {"unit_name": "Cells", "topics": [{"topic_name": "Counts", "subtopics": [42, "Named"]}]}
        ]}"#;
        let mock = MockProvider::with_responses(vec![response.into()]);
        let planner = LessonPlanner::new(store, Arc::new(mock));

        let outcome = planner.build("c1", "Biology").await.unwrap();
        let names: Vec<&str> = outcome.plan.units[0].topics[0]
            .subtopics
            .iter()
            .map(|s| s.subtopic_name.as_str())
            .collect();
        assert!(names.contains(&"42"));
        assert!(names.contains(&"Named"));
    }

    #[tokio::test]
    async fn rebuild_replaces_previous_plan() {
        let store = store_with_syllabus(&long_syllabus()).await;
        let mock = MockProvider::with_responses(vec![
            PLAN_JSON.into(),
            r#"{"units": [{"unit_name": "Fresh Start", "topics": []}]}"#.into(),
        ]);
        let planner = LessonPlanner::new(store.clone(), Arc::new(mock));

        planner.build("c1", "Biology").await.unwrap();
        let outcome = planner.build("c1", "Biology").await.unwrap();

        assert_eq!(outcome.plan.units.len(), 1);
        assert_eq!(outcome.plan.units[0].unit_name, "Fresh Start");
        let persisted = store.lesson_plan("c1").await.unwrap();
        assert_eq!(persisted.units.len(), 1);
    }

    async fn seed_chunk(store: &CourseStore, chunk_id: &str, text: &str) {
        store
            .upsert_document(&DocumentRecord {
                document_id: "d1".into(),
                course_id: "c1".into(),
                module_id: String::new(),
                document_type: "page".into(),
                title: "Notes".into(),
                raw_text: text.into(),
            })
            .await
            .unwrap();
        store
            .insert_chunk(&primer_store::sqlite::ChunkRecord {
                chunk_id: chunk_id.into(),
                document_id: "d1".into(),
                course_id: "c1".into(),
                module_id: String::new(),
                text: text.into(),
                embedding: vec![0.0],
                document_title: "Notes".into(),
                course_name: "Biology".into(),
                module_name: String::new(),
            })
            .await
            .unwrap();
    }
}
