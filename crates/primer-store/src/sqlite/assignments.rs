use super::CourseStore;
use crate::error::StoreError;

/// Assignment count for one (unit, topic, subtopic) path. Empty topic or
/// subtopic ids mean the count is for a coarser-level assignment.
#[derive(Debug)]
pub struct AssignmentCount {
    pub unit_id: String,
    pub topic_id: String,
    pub subtopic_id: String,
    pub count: i64,
}

impl CourseStore {
    /// Insert-or-ignore on the full (chunk, unit, topic, subtopic) tuple;
    /// re-tagging the same chunk is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn insert_assignment(
        &self,
        chunk_id: &str,
        unit_id: &str,
        topic_id: &str,
        subtopic_id: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR IGNORE INTO chunk_assignments (chunk_id, unit_id, topic_id, subtopic_id) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(chunk_id)
        .bind(unit_id)
        .bind(topic_id)
        .bind(subtopic_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Clear assignments for every chunk of the course ahead of a re-tag.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete_assignments_for_course(&self, course_id: &str) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM chunk_assignments \
             WHERE chunk_id IN \
             (SELECT chunk_id FROM document_chunks WHERE course_id = ?)",
        )
        .bind(course_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Assignment counts grouped by concept path, for the course outline.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn assignment_counts(
        &self,
        course_id: &str,
    ) -> Result<Vec<AssignmentCount>, StoreError> {
        let rows: Vec<(String, String, String, i64)> = sqlx::query_as(
            "SELECT a.unit_id, \
             COALESCE(a.topic_id, '') AS topic_id, \
             COALESCE(a.subtopic_id, '') AS subtopic_id, \
             COUNT(*) AS cnt \
             FROM chunk_assignments a \
             INNER JOIN document_chunks c ON c.chunk_id = a.chunk_id \
             WHERE c.course_id = ? \
             GROUP BY a.unit_id, a.topic_id, a.subtopic_id",
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(unit_id, topic_id, subtopic_id, count)| AssignmentCount {
                unit_id,
                topic_id,
                subtopic_id,
                count,
            })
            .collect())
    }
}
