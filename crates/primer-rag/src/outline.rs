//! Concept outline: the stored lesson plan annotated with assignment
//! counts per node, for status reporting.

use primer_store::CourseStore;
use serde::Serialize;

use crate::error::Result;

#[derive(Debug, Serialize)]
pub struct OutlineUnit {
    pub unit_id: String,
    pub unit_name: String,
    pub chunk_count: i64,
    pub topics: Vec<OutlineTopic>,
}

#[derive(Debug, Serialize)]
pub struct OutlineTopic {
    pub topic_id: String,
    pub topic_name: String,
    pub chunk_count: i64,
    pub subtopics: Vec<OutlineSubtopic>,
}

#[derive(Debug, Serialize)]
pub struct OutlineSubtopic {
    pub subtopic_id: String,
    pub subtopic_name: String,
    pub chunk_count: i64,
}

/// Lesson plan merged with per-node assignment counts, in display order.
/// A parent's count includes assignments made at deeper levels beneath
/// it. Empty when the course has no plan.
///
/// # Errors
///
/// Returns an error if a store read fails.
pub async fn concept_outline(store: &CourseStore, course_id: &str) -> Result<Vec<OutlineUnit>> {
    let plan = store.lesson_plan(course_id).await?;
    if plan.is_empty() {
        return Ok(Vec::new());
    }
    let counts = store.assignment_counts(course_id).await?;

    let units = plan
        .units
        .into_iter()
        .map(|unit| {
            let unit_count: i64 = counts
                .iter()
                .filter(|c| c.unit_id == unit.unit_id)
                .map(|c| c.count)
                .sum();
            let topics = unit
                .topics
                .into_iter()
                .map(|topic| {
                    let topic_count: i64 = counts
                        .iter()
                        .filter(|c| c.unit_id == unit.unit_id && c.topic_id == topic.topic_id)
                        .map(|c| c.count)
                        .sum();
                    let subtopics = topic
                        .subtopics
                        .into_iter()
                        .map(|subtopic| {
                            let subtopic_count = counts
                                .iter()
                                .find(|c| {
                                    c.unit_id == unit.unit_id
                                        && c.topic_id == topic.topic_id
                                        && c.subtopic_id == subtopic.subtopic_id
                                })
                                .map_or(0, |c| c.count);
                            OutlineSubtopic {
                                subtopic_id: subtopic.subtopic_id,
                                subtopic_name: subtopic.subtopic_name,
                                chunk_count: subtopic_count,
                            }
                        })
                        .collect();
                    OutlineTopic {
                        topic_id: topic.topic_id,
                        topic_name: topic.topic_name,
                        chunk_count: topic_count,
                        subtopics,
                    }
                })
                .collect();
            OutlineUnit {
                unit_id: unit.unit_id,
                unit_name: unit.unit_name,
                chunk_count: unit_count,
                topics,
            }
        })
        .collect();

    Ok(units)
}
