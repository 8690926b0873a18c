use std::collections::HashMap;

use serde::Serialize;

use super::CourseStore;
use crate::error::StoreError;

/// Unit -> topic -> subtopic tree for one course.
#[derive(Debug, Default, Serialize)]
pub struct LessonPlan {
    pub units: Vec<PlanUnit>,
}

#[derive(Debug, Serialize)]
pub struct PlanUnit {
    pub unit_id: String,
    pub unit_name: String,
    pub sort_order: i64,
    pub topics: Vec<PlanTopic>,
}

#[derive(Debug, Serialize)]
pub struct PlanTopic {
    pub topic_id: String,
    pub topic_name: String,
    pub sort_order: i64,
    pub subtopics: Vec<PlanSubtopic>,
}

#[derive(Debug, Serialize)]
pub struct PlanSubtopic {
    pub subtopic_id: String,
    pub subtopic_name: String,
    pub sort_order: i64,
}

impl LessonPlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

impl CourseStore {
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn upsert_unit(
        &self,
        unit_id: &str,
        course_id: &str,
        unit_name: &str,
        sort_order: i64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO units (unit_id, course_id, unit_name, sort_order) VALUES (?, ?, ?, ?) \
             ON CONFLICT(unit_id) DO UPDATE SET \
             unit_name = excluded.unit_name, \
             course_id = excluded.course_id, \
             sort_order = excluded.sort_order",
        )
        .bind(unit_id)
        .bind(course_id)
        .bind(unit_name)
        .bind(sort_order)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn upsert_topic(
        &self,
        topic_id: &str,
        unit_id: &str,
        topic_name: &str,
        sort_order: i64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO topics (topic_id, unit_id, topic_name, sort_order) VALUES (?, ?, ?, ?) \
             ON CONFLICT(topic_id) DO UPDATE SET \
             topic_name = excluded.topic_name, \
             unit_id = excluded.unit_id, \
             sort_order = excluded.sort_order",
        )
        .bind(topic_id)
        .bind(unit_id)
        .bind(topic_name)
        .bind(sort_order)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn upsert_subtopic(
        &self,
        subtopic_id: &str,
        topic_id: &str,
        subtopic_name: &str,
        sort_order: i64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO subtopics (subtopic_id, topic_id, subtopic_name, sort_order) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT(subtopic_id) DO UPDATE SET \
             subtopic_name = excluded.subtopic_name, \
             topic_id = excluded.topic_id, \
             sort_order = excluded.sort_order",
        )
        .bind(subtopic_id)
        .bind(topic_id)
        .bind(subtopic_name)
        .bind(sort_order)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Drop the course's whole concept tree. Topics, subtopics and chunk
    /// assignments cascade with the units.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete_plan(&self, course_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM units WHERE course_id = ?")
            .bind(course_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Nested concept tree in display order: sort order first, then name,
    /// then id for ties.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the three reads fails.
    pub async fn lesson_plan(&self, course_id: &str) -> Result<LessonPlan, StoreError> {
        let units: Vec<(String, String, i64)> = sqlx::query_as(
            "SELECT unit_id, unit_name, sort_order FROM units \
             WHERE course_id = ? \
             ORDER BY sort_order, unit_name, unit_id",
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;

        if units.is_empty() {
            return Ok(LessonPlan::default());
        }

        let topics: Vec<(String, String, String, i64)> = sqlx::query_as(
            "SELECT t.unit_id, t.topic_id, t.topic_name, t.sort_order \
             FROM topics t \
             INNER JOIN units u ON u.unit_id = t.unit_id \
             WHERE u.course_id = ? \
             ORDER BY t.sort_order, t.topic_name, t.topic_id",
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;

        let subtopics: Vec<(String, String, String, i64)> = sqlx::query_as(
            "SELECT s.topic_id, s.subtopic_id, s.subtopic_name, s.sort_order \
             FROM subtopics s \
             INNER JOIN topics t ON t.topic_id = s.topic_id \
             INNER JOIN units u ON u.unit_id = t.unit_id \
             WHERE u.course_id = ? \
             ORDER BY s.sort_order, s.subtopic_name, s.subtopic_id",
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;

        let mut subtopics_by_topic: HashMap<String, Vec<PlanSubtopic>> = HashMap::new();
        for (topic_id, subtopic_id, subtopic_name, sort_order) in subtopics {
            subtopics_by_topic
                .entry(topic_id)
                .or_default()
                .push(PlanSubtopic {
                    subtopic_id,
                    subtopic_name,
                    sort_order,
                });
        }

        let mut topics_by_unit: HashMap<String, Vec<PlanTopic>> = HashMap::new();
        for (unit_id, topic_id, topic_name, sort_order) in topics {
            let subtopics = subtopics_by_topic.remove(&topic_id).unwrap_or_default();
            topics_by_unit.entry(unit_id).or_default().push(PlanTopic {
                topic_id,
                topic_name,
                sort_order,
                subtopics,
            });
        }

        let units = units
            .into_iter()
            .map(|(unit_id, unit_name, sort_order)| {
                let topics = topics_by_unit.remove(&unit_id).unwrap_or_default();
                PlanUnit {
                    unit_id,
                    unit_name,
                    sort_order,
                    topics,
                }
            })
            .collect();

        Ok(LessonPlan { units })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::{ChunkRecord, DocumentRecord};

    async fn test_store() -> CourseStore {
        CourseStore::new(":memory:").await.unwrap()
    }

    async fn seed_plan(store: &CourseStore) {
        store.upsert_course("c1", "Biology").await.unwrap();
        store.upsert_unit("u1", "c1", "Cells", 1).await.unwrap();
        store.upsert_unit("u2", "c1", "Genetics", 2).await.unwrap();
        store.upsert_topic("t1", "u1", "Organelles", 0).await.unwrap();
        store.upsert_topic("t2", "u1", "Membranes", 0).await.unwrap();
        store
            .upsert_subtopic("s1", "t1", "Mitochondria", 0)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn lesson_plan_nests_topics_and_subtopics() {
        let store = test_store().await;
        seed_plan(&store).await;

        let plan = store.lesson_plan("c1").await.unwrap();
        assert_eq!(plan.units.len(), 2);
        assert_eq!(plan.units[0].unit_name, "Cells");
        assert_eq!(plan.units[0].topics.len(), 2);
        assert_eq!(plan.units[0].topics[0].subtopics.len(), 1);
        assert_eq!(plan.units[0].topics[0].subtopics[0].subtopic_name, "Mitochondria");
        assert!(plan.units[1].topics.is_empty());
    }

    #[tokio::test]
    async fn plan_ties_order_by_name() {
        let store = test_store().await;
        seed_plan(&store).await;

        // t1 and t2 share sort_order 0; name decides.
        let plan = store.lesson_plan("c1").await.unwrap();
        let names: Vec<&str> = plan.units[0]
            .topics
            .iter()
            .map(|t| t.topic_name.as_str())
            .collect();
        assert_eq!(names, ["Membranes", "Organelles"]);
    }

    #[tokio::test]
    async fn empty_plan_for_unknown_course() {
        let store = test_store().await;
        let plan = store.lesson_plan("missing").await.unwrap();
        assert!(plan.is_empty());
    }

    #[tokio::test]
    async fn delete_plan_cascades_children_and_assignments() {
        let store = test_store().await;
        seed_plan(&store).await;
        store
            .upsert_document(&DocumentRecord {
                document_id: "d1".into(),
                course_id: "c1".into(),
                module_id: String::new(),
                document_type: "page".into(),
                title: "Cells".into(),
                raw_text: "text".into(),
            })
            .await
            .unwrap();
        store
            .insert_chunk(&ChunkRecord {
                chunk_id: "ch1".into(),
                document_id: "d1".into(),
                course_id: "c1".into(),
                module_id: String::new(),
                text: "passage".into(),
                embedding: vec![0.0],
                document_title: "Cells".into(),
                course_name: "Biology".into(),
                module_name: String::new(),
            })
            .await
            .unwrap();
        store.insert_assignment("ch1", "u1", "t1", "s1").await.unwrap();

        store.delete_plan("c1").await.unwrap();

        assert!(store.lesson_plan("c1").await.unwrap().is_empty());
        let topics: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM topics")
            .fetch_one(store.pool())
            .await
            .unwrap();
        let assignments: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_assignments")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(topics, 0);
        assert_eq!(assignments, 0);
    }
}
